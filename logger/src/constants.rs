pub const LOGGER_THREAD_NAME: &str = "logger";
pub const LOG_FILE_NAME: &str = "app.log";
