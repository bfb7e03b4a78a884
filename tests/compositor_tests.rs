// Integration tests for stream composition

use gorec::compositor::{CompositorOptions, OverlayLayout};
use gorec::error::RecorderError;
use gorec::media::{
    DeviceProvider, MediaSource, MediaTrack, ScreenConstraints, SourceKind, SyntheticConfig,
    SyntheticDevices, VideoSettings, WebcamConstraints,
};
use gorec::{CompositionConfig, OverlayPosition, OverlaySize, StreamCompositor};
use image::Rgba;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

const SCREEN: Rgba<u8> = Rgba([10, 20, 200, 255]);
const WEBCAM: Rgba<u8> = Rgba([200, 180, 20, 255]);

fn devices(screen_size: (u32, u32)) -> Arc<SyntheticDevices> {
    Arc::new(SyntheticDevices::new(SyntheticConfig {
        screen_size,
        screen_color: SCREEN,
        webcam_color: WEBCAM,
        ..SyntheticConfig::default()
    }))
}

fn compositor() -> StreamCompositor {
    StreamCompositor::new(CompositorOptions {
        canvas_frame_rate: 30,
        readiness_timeout: Duration::from_millis(500),
        settle_delay: Duration::from_millis(100),
    })
}

fn close_to(actual: &Rgba<u8>, expected: Rgba<u8>) -> bool {
    actual
        .0
        .iter()
        .zip(expected.0.iter())
        .all(|(a, e)| (*a as i16 - *e as i16).abs() <= 2)
}

async fn screen(devices: &SyntheticDevices, audio: bool) -> MediaSource {
    devices
        .acquire_screen(ScreenConstraints {
            audio,
            ..ScreenConstraints::default()
        })
        .await
        .unwrap()
}

async fn webcam(devices: &SyntheticDevices) -> MediaSource {
    devices
        .acquire_webcam(WebcamConstraints::default())
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_without_webcam_screen_is_passed_through() {
    let devices = devices((320, 180));
    let mut screen = screen(&devices, false).await;
    let (_layout_tx, layout) = watch::channel(OverlayLayout::default());

    let mut composition = compositor()
        .compose(
            devices.as_ref(),
            &screen,
            None,
            &CompositionConfig::default(),
            layout,
        )
        .await
        .unwrap();

    let screen_video = screen.first_video_track().unwrap();
    assert_eq!(composition.stream().video_track().id(), screen_video.id());
    assert_eq!(composition.stream().audio_track_count(), 0);
    assert!(!composition.is_overlay_active());

    composition.teardown().await;
    devices.release(&mut screen);
    assert!(devices.live_tracks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_webcam_disabled_in_config_is_ignored() {
    let devices = devices((320, 180));
    let screen = screen(&devices, false).await;
    let webcam = webcam(&devices).await;
    let (_layout_tx, layout) = watch::channel(OverlayLayout::default());

    let mut composition = compositor()
        .compose(
            devices.as_ref(),
            &screen,
            Some(&webcam),
            &CompositionConfig::default(),
            layout,
        )
        .await
        .unwrap();

    assert!(!composition.is_overlay_active());
    composition.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_overlay_draws_webcam_in_bottom_right_corner() {
    let devices = devices((640, 360));
    let screen = screen(&devices, false).await;
    let webcam = webcam(&devices).await;
    let (_layout_tx, layout) = watch::channel(OverlayLayout::new(
        OverlayPosition::BottomRight,
        OverlaySize::Medium,
    ));
    let config = CompositionConfig {
        webcam_enabled: true,
        ..CompositionConfig::default()
    };

    let mut composition = compositor()
        .compose(devices.as_ref(), &screen, Some(&webcam), &config, layout)
        .await
        .unwrap();
    assert!(composition.is_overlay_active());

    let video = composition.stream().video_track().clone();
    assert_eq!(video.label(), "Composited Display");
    assert_eq!(
        video.video_settings(),
        Some(VideoSettings {
            width: 640,
            height: 360,
            frame_rate: 30
        })
    );

    sleep(Duration::from_millis(200)).await;
    let frame = video.latest_frame().expect("composited frame");
    assert_eq!((frame.width(), frame.height()), (640, 360));

    // Medium overlay sits at (380, 160) .. (620, 340)
    assert!(close_to(frame.image().get_pixel(500, 250), WEBCAM));
    assert!(close_to(frame.image().get_pixel(10, 10), SCREEN));
    assert!(close_to(frame.image().get_pixel(630, 350), SCREEN));

    composition.teardown().await;
    assert!(!video.is_live());
}

#[tokio::test(start_paused = true)]
async fn test_layout_change_applies_to_next_frames() {
    let devices = devices((640, 360));
    let screen = screen(&devices, false).await;
    let webcam = webcam(&devices).await;
    let (layout_tx, layout) = watch::channel(OverlayLayout::default());
    let config = CompositionConfig {
        webcam_enabled: true,
        ..CompositionConfig::default()
    };

    let mut composition = compositor()
        .compose(devices.as_ref(), &screen, Some(&webcam), &config, layout)
        .await
        .unwrap();
    let video = composition.stream().video_track().clone();

    sleep(Duration::from_millis(100)).await;
    let before = video.latest_frame().unwrap();
    assert!(close_to(before.image().get_pixel(40, 40), SCREEN));

    layout_tx.send_modify(|l| l.position = OverlayPosition::TopLeft);
    sleep(Duration::from_millis(100)).await;
    let after = video.latest_frame().unwrap();
    assert!(close_to(after.image().get_pixel(40, 40), WEBCAM));
    assert!(close_to(after.image().get_pixel(500, 250), SCREEN));

    composition.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_render_stops_publishing_frames() {
    let devices = devices((320, 180));
    let screen = screen(&devices, false).await;
    let webcam = webcam(&devices).await;
    let (_layout_tx, layout) = watch::channel(OverlayLayout::default());
    let config = CompositionConfig {
        webcam_enabled: true,
        ..CompositionConfig::default()
    };

    let mut composition = compositor()
        .compose(devices.as_ref(), &screen, Some(&webcam), &config, layout)
        .await
        .unwrap();
    let video = composition.stream().video_track().clone();
    sleep(Duration::from_millis(200)).await;

    composition.cancel_render().await;
    let last = video.latest_frame().unwrap().timestamp_ms;
    sleep(Duration::from_millis(500)).await;
    assert_eq!(video.latest_frame().unwrap().timestamp_ms, last);

    // Safe to repeat, and release still works afterwards
    composition.cancel_render().await;
    composition.release();
    composition.release();
    assert!(!video.is_live());
}

#[tokio::test(start_paused = true)]
async fn test_webcam_ending_degrades_to_screen_only() {
    let devices = devices((640, 360));
    let screen = screen(&devices, false).await;
    let mut webcam = webcam(&devices).await;
    let (_layout_tx, layout) = watch::channel(OverlayLayout::default());
    let config = CompositionConfig {
        webcam_enabled: true,
        ..CompositionConfig::default()
    };

    let mut composition = compositor()
        .compose(devices.as_ref(), &screen, Some(&webcam), &config, layout)
        .await
        .unwrap();
    let video = composition.stream().video_track().clone();

    devices.release(&mut webcam);
    sleep(Duration::from_millis(200)).await;

    assert!(video.is_live(), "composed track keeps running");
    let frame = video.latest_frame().unwrap();
    assert!(close_to(frame.image().get_pixel(500, 250), SCREEN));

    composition.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_screen_video_fails() {
    let devices = devices((320, 180));
    let (audio_only, _writer) = MediaTrack::audio("System Audio");
    let screen = MediaSource::new(SourceKind::Screen, vec![audio_only]);
    let (_layout_tx, layout) = watch::channel(OverlayLayout::default());

    let err = compositor()
        .compose(
            devices.as_ref(),
            &screen,
            None,
            &CompositionConfig::default(),
            layout,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::NoVideoSource));
}

#[tokio::test(start_paused = true)]
async fn test_ended_screen_video_fails() {
    let devices = devices((320, 180));
    let screen = screen(&devices, false).await;
    devices.end_screen_share();
    let (_layout_tx, layout) = watch::channel(OverlayLayout::default());

    let err = compositor()
        .compose(
            devices.as_ref(),
            &screen,
            None,
            &CompositionConfig::default(),
            layout,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::NoVideoSource));
}

#[tokio::test(start_paused = true)]
async fn test_audio_sources_follow_config() {
    let devices = devices((320, 180));
    let screen = screen(&devices, true).await;
    let (_layout_tx, layout) = watch::channel(OverlayLayout::default());
    let config = CompositionConfig {
        system_audio_enabled: true,
        microphone_enabled: true,
        microphone_device_id: Some("default".to_string()),
        ..CompositionConfig::default()
    };

    let mut composition = compositor()
        .compose(devices.as_ref(), &screen, None, &config, layout)
        .await
        .unwrap();
    assert_eq!(composition.stream().audio_track_count(), 2);
    assert_eq!(devices.acquisitions(SourceKind::Microphone), 1);

    composition.teardown().await;
    let live_mics = devices
        .live_tracks()
        .into_iter()
        .filter(|(kind, _)| *kind == SourceKind::Microphone)
        .count();
    assert_eq!(live_mics, 0, "composition releases its microphone");
}

#[tokio::test(start_paused = true)]
async fn test_microphone_without_device_is_skipped() {
    let devices = devices((320, 180));
    let screen = screen(&devices, false).await;
    let (_layout_tx, layout) = watch::channel(OverlayLayout::default());
    let config = CompositionConfig {
        microphone_enabled: true,
        microphone_device_id: None,
        ..CompositionConfig::default()
    };

    let mut composition = compositor()
        .compose(devices.as_ref(), &screen, None, &config, layout)
        .await
        .unwrap();
    assert_eq!(composition.stream().audio_track_count(), 0);
    assert_eq!(devices.acquisitions(SourceKind::Microphone), 0);
    composition.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_microphone_degrades() {
    let devices = devices((320, 180));
    devices.unplug("default");
    let screen = screen(&devices, true).await;
    let (_layout_tx, layout) = watch::channel(OverlayLayout::default());
    let config = CompositionConfig {
        system_audio_enabled: true,
        microphone_enabled: true,
        microphone_device_id: Some("default".to_string()),
        ..CompositionConfig::default()
    };

    let mut composition = compositor()
        .compose(devices.as_ref(), &screen, None, &config, layout)
        .await
        .unwrap();
    assert_eq!(composition.stream().audio_track_count(), 1);
    assert_eq!(composition.stream().audio_tracks()[0].label(), "System Audio");
    composition.teardown().await;
}
