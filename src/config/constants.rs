pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/api";

pub const LOG_FILE_PATH: &str = "/tmp/chatstream.log";

/// Prefix of client-minted message ids
pub const TEMP_ID_PREFIX: &str = "temp-";

pub const BRANCH_NAME_PREFIX: &str = "branch-";

/// How long a settlement keeps the next stale refresh away
pub const REFRESH_GUARD_MS: u64 = 1000; // 1 second

/// Largest file accepted as a message attachment
pub const MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024; // 20 MiB

pub const ATTACHMENT_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
];
