use std::time::Duration;

pub const API_HELIX_URL: &str = "https://api.twitch.tv/helix";
pub const API_OAUTH_URL: &str = "https://id.twitch.tv/oauth2";
pub const CHANNEL_URL_BASE: &str = "https://twitch.tv";

// Helix caps `first` and repeated `id=` parameters at 100 per request.
pub const HELIX_BATCH_LIMIT: usize = 100;
pub const MAX_TRACKED_CHANNELS: usize = 100;

pub const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const RATE_LIMIT_MAX_ATTEMPTS: usize = 3;
pub const AVATAR_REFETCH_WORKERS: usize = 10;

pub const DEFAULT_STREAMER_COUNT: usize = 3;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_LINGER_TICKS: u32 = 10;
pub const DEFAULT_QUIET_WINDOW_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_VOLUME: f32 = 0.5;
pub const DEFAULT_SOUND_FILE: &str = "default.wav";

pub const SUB_WAIT: Duration = Duration::from_secs(1);
pub const CUE_TOGGLE_INTERVAL: Duration = Duration::from_millis(500);
pub const SESSION_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub const BUNDLED_SOUND: &[u8] = include_bytes!("../assets/default.wav");
pub const BUNDLED_SOUND_NAME: &str = "stream-scout-default.wav";
