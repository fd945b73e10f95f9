/// Application name
pub const APP_NAME: &str = "chatdrop";

/// Number of records kept in the message log
pub const MAX_HISTORY: usize = 100;

/// Maximum upload payload in bytes (16 MiB)
pub const MAX_UPLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Display format for record timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Longest edge of an inline image preview, in pixels
pub const PREVIEW_MAX_EDGE: u32 = 200;

/// Chat-completion endpoint used when none is configured
pub const DEFAULT_AI_API_URL: &str = "https://apiserver.alcex.cn/v1/chat/completions";

/// Model requested from the completion endpoint
pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";

/// Reply text used whenever the completion endpoint cannot produce an answer
pub const AI_FALLBACK_REPLY: &str = "AI reflection failed, please try again later";
