use std::collections::HashMap;
use std::fs;
use std::io;
use std::str::FromStr;

use super::constants;

/// Runtime settings for a peer node.
///
/// Loaded once at startup from a `KEY=VALUE` file (one setting per line,
/// blank lines ignored) and handed to every component by value. All ten
/// keys are required; there are no built-in defaults.
#[derive(Debug, Clone)]
pub struct Cfg {
    /// Port the peer listens on for incoming sessions.
    pub tcp_port: u16,
    pub tracker_host: String,
    pub tracker_port: u16,
    pub log_directory: String,
    pub torrent_directory: String,
    pub download_directory: String,
    /// Created at startup; reserved for shared uploads.
    pub upload_directory: String,
    pub max_connections: u32,
    /// How long a piece request may wait for its reply, in seconds.
    pub request_secs_timeout: u64,
    pub max_log_file_kb_size: u32,
}

impl Cfg {
    /// Reads the settings file at `path`.
    ///
    /// Anything wrong with the file comes back as
    /// `io::ErrorKind::InvalidInput` naming the offending line or key:
    /// lines that are not `KEY=VALUE`, keys that are not settings, values
    /// of the wrong type, and required keys that never appear.
    pub fn new(path: &str) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let settings = Self::collect_settings(&contents)?;

        Ok(Self {
            tcp_port: Self::numeric(&settings, constants::TCP_PORT)?,
            tracker_host: Self::text(&settings, constants::TRACKER_HOST)?,
            tracker_port: Self::numeric(&settings, constants::TRACKER_PORT)?,
            log_directory: Self::text(&settings, constants::LOG_DIRECTORY)?,
            torrent_directory: Self::text(&settings, constants::TORRENT_DIRECTORY)?,
            download_directory: Self::text(&settings, constants::DOWNLOAD_DIRECTORY)?,
            upload_directory: Self::text(&settings, constants::UPLOAD_DIRECTORY)?,
            max_connections: Self::numeric(&settings, constants::MAX_CONNECTIONS)?,
            request_secs_timeout: Self::numeric(&settings, constants::REQUEST_SECS_TIMEOUT)?,
            max_log_file_kb_size: Self::numeric(&settings, constants::MAX_LOG_FILE_KB_SIZE)?,
        })
    }

    /// First pass over the file: split lines into a key/value map, refusing
    /// anything that is not a known setting. Field extraction happens
    /// afterwards so a missing key can be reported by name.
    fn collect_settings(contents: &str) -> io::Result<HashMap<&str, &str>> {
        let mut settings = HashMap::new();

        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some(split) => split,
                None => return Err(Self::bad_input(format!("not a KEY=VALUE line: {}", line))),
            };
            if !constants::SETTING_KEYS.contains(&key) {
                return Err(Self::bad_input(format!("unknown setting: {}", key)));
            }
            if value.contains('=') {
                return Err(Self::bad_input(format!(
                    "malformed value for {}: {}",
                    key, value
                )));
            }
            settings.insert(key, value);
        }

        Ok(settings)
    }

    fn text(settings: &HashMap<&str, &str>, key: &str) -> io::Result<String> {
        match settings.get(key) {
            Some(value) => Ok((*value).to_string()),
            None => Err(Self::bad_input(format!("missing setting: {}", key))),
        }
    }

    fn numeric<F: FromStr>(settings: &HashMap<&str, &str>, key: &str) -> io::Result<F> {
        let raw = Self::text(settings, key)?;
        raw.parse()
            .map_err(|_| Self::bad_input(format!("{} is not a valid number: {}", key, raw)))
    }

    fn bad_input(message: String) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidInput, message)
    }
}
