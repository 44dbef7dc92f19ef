use std::env;
use std::time::Duration;

use easel_core::DEFAULT_CHUNK_SIZE;

/// Runtime configuration, read once at startup and threaded into the
/// router and session layers by value. Nothing here is a mutable global,
/// so tests can construct per-test variants freely.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Unset means offline mode: canvases live in process memory only.
    pub redis_url: Option<String>,
    /// Inbound frames larger than this many bytes are rejected unparsed.
    pub max_frame_bytes: usize,
    /// Pixels per chunk, and the threshold above which reads are chunked.
    pub chunk_size: usize,
    /// Pause between consecutive chunk frames; bounds outbound burst size.
    pub chunk_delay: Duration,
    /// Frames admitted per connection per window; 0 disables the limiter.
    pub rate_limit: u32,
    pub rate_window: Duration,
    /// Serialize read-modify-write per map within this process.
    pub serialize_writes: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env::var("EASEL_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            redis_url: env::var("EASEL_REDIS_URL").ok().filter(|v| !v.is_empty()),
            max_frame_bytes: env::var("EASEL_MAX_FRAME_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_frame_bytes),
            chunk_size: env::var("EASEL_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.chunk_size),
            chunk_delay: env::var("EASEL_CHUNK_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.chunk_delay),
            rate_limit: env::var("EASEL_RATE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit),
            rate_window: env::var("EASEL_RATE_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_window),
            serialize_writes: env::var("EASEL_SERIALIZE_WRITES")
                .map(|v| matches_truthy(&v))
                .unwrap_or(defaults.serialize_writes),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4600,
            redis_url: None,
            max_frame_bytes: 1_000_000,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::from_millis(10),
            rate_limit: 0,
            rate_window: Duration::from_secs(60),
            serialize_writes: false,
        }
    }
}

fn matches_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
