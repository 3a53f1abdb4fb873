pub const TCP_PORT: &str = "TCP_PORT";
pub const TRACKER_HOST: &str = "TRACKER_HOST";
pub const TRACKER_PORT: &str = "TRACKER_PORT";
pub const LOG_DIRECTORY: &str = "LOG_DIRECTORY";
pub const TORRENT_DIRECTORY: &str = "TORRENT_DIRECTORY";
pub const DOWNLOAD_DIRECTORY: &str = "DOWNLOAD_DIRECTORY";
pub const UPLOAD_DIRECTORY: &str = "UPLOAD_DIRECTORY";
pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";
pub const REQUEST_SECS_TIMEOUT: &str = "REQUEST_SECS_TIMEOUT";
pub const MAX_LOG_FILE_KB_SIZE: &str = "MAX_LOG_FILE_KB_SIZE";

/// Every key a settings file may contain.
pub const SETTING_KEYS: [&str; 10] = [
    TCP_PORT,
    TRACKER_HOST,
    TRACKER_PORT,
    LOG_DIRECTORY,
    TORRENT_DIRECTORY,
    DOWNLOAD_DIRECTORY,
    UPLOAD_DIRECTORY,
    MAX_CONNECTIONS,
    REQUEST_SECS_TIMEOUT,
    MAX_LOG_FILE_KB_SIZE,
];
