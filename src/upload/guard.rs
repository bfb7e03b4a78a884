use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Containers accepted for upload
pub const ALLOWED_TYPES: [&str; 3] = ["video/webm", "video/mp4", "video/x-matroska"];

const MAX_FILENAME_LEN: usize = 255;

/// Fixed-window rate limiter. The window opens on the first request and
/// admits `limit` requests until it expires.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    entry: Mutex<Option<WindowEntry>>,
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: usize,
    reset_at: Instant,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            entry: Mutex::new(None),
        }
    }

    /// Take one slot. On refusal returns the time until the window resets.
    pub fn check(&self) -> Result<usize, Duration> {
        let now = Instant::now();
        let mut entry = self.entry.lock();

        match entry.as_mut() {
            Some(window) if now < window.reset_at => {
                if window.count >= self.limit {
                    return Err(window.reset_at - now);
                }
                window.count += 1;
                Ok(self.limit - window.count)
            }
            _ => {
                if self.limit == 0 {
                    return Err(self.window);
                }
                *entry = Some(WindowEntry {
                    count: 1,
                    reset_at: now + self.window,
                });
                Ok(self.limit - 1)
            }
        }
    }
}

/// Make a filename safe to use as a storage object name
pub fn sanitize_filename(name: &str) -> String {
    if name.is_empty() {
        return "unnamed".to_string();
    }

    name.replace("..", "")
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect()
}

/// Whether a (possibly codec-qualified) MIME type is an accepted container
pub fn is_allowed_type(mime_type: &str) -> bool {
    let container = mime_type.split(';').next().unwrap_or_default().trim();
    ALLOWED_TYPES.contains(&container)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_traversal_and_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename("a\\b\0c.webm"), "abc.webm");
        assert_eq!(sanitize_filename("my clip (1).webm"), "my_clip__1_.webm");
        assert_eq!(sanitize_filename("recording-1700000000000.webm"), "recording-1700000000000.webm");
        assert_eq!(sanitize_filename(""), "unnamed");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(400);
        assert_eq!(sanitize_filename(&long).len(), 255);
    }

    #[test]
    fn test_allowed_types() {
        assert!(is_allowed_type("video/webm"));
        assert!(is_allowed_type("video/webm;codecs=vp9"));
        assert!(is_allowed_type("video/mp4"));
        assert!(is_allowed_type("video/x-matroska"));
        assert!(!is_allowed_type("video/quicktime"));
        assert!(!is_allowed_type(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert_eq!(limiter.check(), Ok(1));
        assert_eq!(limiter.check(), Ok(0));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(limiter.check(), Err(Duration::from_secs(45)));

        tokio::time::advance(Duration::from_secs(46)).await;
        assert_eq!(limiter.check(), Ok(1));
    }
}
