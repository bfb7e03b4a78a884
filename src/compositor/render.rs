//! Per-frame overlay drawing
//!
//! Draw order is fixed: screen, then the clipped webcam, then the border
//! stroke. Each step paints on top of the previous one.

use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};
use std::borrow::Cow;

use super::layout::OverlayRect;

pub const OVERLAY_CORNER_RADIUS: f32 = 12.0;
pub const OVERLAY_BORDER_WIDTH: f32 = 2.0;
/// rgba(255, 255, 255, 0.3)
pub const OVERLAY_BORDER_COLOR: Rgba<u8> = Rgba([255, 255, 255, 77]);

/// Draw one composed frame into `canvas`.
///
/// A missing screen frame keeps the previous canvas contents; a missing
/// webcam frame draws the screen only.
pub fn draw_frame(
    canvas: &mut RgbaImage,
    screen: Option<&RgbaImage>,
    webcam: Option<&RgbaImage>,
    rect: OverlayRect,
) {
    if let Some(screen) = screen {
        draw_background(canvas, screen);
    }

    if let Some(webcam) = webcam {
        draw_overlay(canvas, webcam, rect);
        stroke_border(canvas, rect);
    }
}

fn draw_background(canvas: &mut RgbaImage, screen: &RgbaImage) {
    if canvas.dimensions() == screen.dimensions() {
        let pixels: &mut [u8] = &mut **canvas;
        pixels.copy_from_slice(screen.as_raw());
    } else {
        let (width, height) = canvas.dimensions();
        *canvas = imageops::resize(screen, width, height, FilterType::Triangle);
    }
}

/// Signed distance from a point to the rounded rectangle outline
/// (negative inside)
fn rounded_rect_distance(px: f32, py: f32, rect: OverlayRect, radius: f32) -> f32 {
    let half_w = rect.width as f32 / 2.0;
    let half_h = rect.height as f32 / 2.0;
    let radius = radius.min(half_w).min(half_h);
    let cx = rect.x as f32 + half_w;
    let cy = rect.y as f32 + half_h;

    let qx = (px - cx).abs() - (half_w - radius);
    let qy = (py - cy).abs() - (half_h - radius);
    let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
    outside + qx.max(qy).min(0.0) - radius
}

fn draw_overlay(canvas: &mut RgbaImage, webcam: &RgbaImage, rect: OverlayRect) {
    if rect.width == 0 || rect.height == 0 {
        return;
    }

    let scaled: Cow<RgbaImage> = if webcam.dimensions() == (rect.width, rect.height) {
        Cow::Borrowed(webcam)
    } else {
        Cow::Owned(imageops::resize(
            webcam,
            rect.width,
            rect.height,
            FilterType::Triangle,
        ))
    };

    let (canvas_w, canvas_h) = canvas.dimensions();
    for oy in 0..rect.height {
        let y = rect.y + oy as i64;
        if y < 0 || y >= canvas_h as i64 {
            continue;
        }
        for ox in 0..rect.width {
            let x = rect.x + ox as i64;
            if x < 0 || x >= canvas_w as i64 {
                continue;
            }

            let d = rounded_rect_distance(
                x as f32 + 0.5,
                y as f32 + 0.5,
                rect,
                OVERLAY_CORNER_RADIUS,
            );
            if d <= 0.0 {
                canvas.put_pixel(x as u32, y as u32, *scaled.get_pixel(ox, oy));
            }
        }
    }
}

fn stroke_border(canvas: &mut RgbaImage, rect: OverlayRect) {
    let half = OVERLAY_BORDER_WIDTH / 2.0;
    let margin = half.ceil() as i64 + 1;
    let (canvas_w, canvas_h) = canvas.dimensions();

    let y_start = (rect.y - margin).max(0);
    let y_end = (rect.y + rect.height as i64 + margin).min(canvas_h as i64);
    let x_start = (rect.x - margin).max(0);
    let x_end = (rect.x + rect.width as i64 + margin).min(canvas_w as i64);

    for y in y_start..y_end {
        for x in x_start..x_end {
            let d = rounded_rect_distance(
                x as f32 + 0.5,
                y as f32 + 0.5,
                rect,
                OVERLAY_CORNER_RADIUS,
            );
            if d.abs() <= half {
                canvas
                    .get_pixel_mut(x as u32, y as u32)
                    .blend(&OVERLAY_BORDER_COLOR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::layout::{OverlayLayout, OverlayPosition, OverlaySize};

    const SCREEN: Rgba<u8> = Rgba([20, 40, 160, 255]);
    const WEBCAM: Rgba<u8> = Rgba([230, 120, 30, 255]);

    fn close(a: &Rgba<u8>, b: &Rgba<u8>) -> bool {
        a.0.iter().zip(b.0.iter()).all(|(x, y)| x.abs_diff(*y) <= 1)
    }

    fn composed(position: OverlayPosition, size: OverlaySize) -> (RgbaImage, OverlayRect) {
        let screen = RgbaImage::from_pixel(640, 360, SCREEN);
        let webcam = RgbaImage::from_pixel(640, 480, WEBCAM);
        let mut canvas = RgbaImage::new(640, 360);
        let rect = OverlayLayout::new(position, size).rect(640, 360);
        draw_frame(&mut canvas, Some(&screen), Some(&webcam), rect);
        (canvas, rect)
    }

    #[test]
    fn test_bottom_right_medium_occupies_inset_block() {
        let (canvas, rect) = composed(OverlayPosition::BottomRight, OverlaySize::Medium);
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (380, 160, 240, 180));

        // Interior of the block, away from the rounded corners and border
        for y in (rect.y + 14)..(rect.y + 180 - 14) {
            for x in (rect.x + 2)..(rect.x + 240 - 2) {
                let px = canvas.get_pixel(x as u32, y as u32);
                assert!(close(px, &WEBCAM), "({}, {}) = {:?}", x, y, px);
            }
        }

        // Everything farther than the stroke from the block is screen
        for (x, y) in [(0, 0), (377, 250), (500, 157), (639, 359), (624, 250), (500, 343)] {
            assert_eq!(canvas.get_pixel(x, y), &SCREEN, "({}, {})", x, y);
        }
    }

    #[test]
    fn test_rounded_corner_is_clipped() {
        let (canvas, rect) = composed(OverlayPosition::TopLeft, OverlaySize::Small);
        assert_eq!((rect.x, rect.y), (20, 20));
        // The block's corner pixel lies outside the 12px rounding
        assert_eq!(canvas.get_pixel(20, 20), &SCREEN);
        assert!(close(canvas.get_pixel(20 + 80, 20 + 60), &WEBCAM));
    }

    #[test]
    fn test_border_stroke_is_translucent_white() {
        let (canvas, rect) = composed(OverlayPosition::BottomLeft, OverlaySize::Large);
        // Just outside the left edge, mid-height: screen blended with the stroke
        let px = canvas.get_pixel((rect.x - 1) as u32, (rect.y + 120) as u32);
        assert_ne!(px, &SCREEN);
        assert!(px[0] > SCREEN[0] && px[1] > SCREEN[1]);
        assert!(px[0] < 255);
    }

    #[test]
    fn test_screen_only_when_webcam_missing() {
        let screen = RgbaImage::from_pixel(64, 36, SCREEN);
        let mut canvas = RgbaImage::new(64, 36);
        let rect = OverlayLayout::default().rect(64, 36);
        draw_frame(&mut canvas, Some(&screen), None, rect);
        assert!(canvas.pixels().all(|p| p == &SCREEN));
    }

    #[test]
    fn test_screen_is_scaled_to_canvas() {
        let screen = RgbaImage::from_pixel(32, 18, SCREEN);
        let mut canvas = RgbaImage::new(64, 36);
        draw_frame(&mut canvas, Some(&screen), None, OverlayLayout::default().rect(64, 36));
        assert_eq!(canvas.dimensions(), (64, 36));
        assert!(close(canvas.get_pixel(40, 20), &SCREEN));
    }

    #[test]
    fn test_overlay_larger_than_canvas_is_clipped() {
        let screen = RgbaImage::from_pixel(100, 80, SCREEN);
        let webcam = RgbaImage::from_pixel(10, 10, WEBCAM);
        let mut canvas = RgbaImage::new(100, 80);
        let rect = OverlayLayout::new(OverlayPosition::BottomRight, OverlaySize::Large).rect(100, 80);
        assert!(rect.x < 0 && rect.y < 0);
        draw_frame(&mut canvas, Some(&screen), Some(&webcam), rect);
        assert!(close(canvas.get_pixel(50, 40), &WEBCAM));
    }
}
