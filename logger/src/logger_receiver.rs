use super::constants::{LOGGER_THREAD_NAME, LOG_FILE_NAME};
use super::logger_error::LoggerError;
use super::logger_sender::LoggerSender;
use std::sync::mpsc::channel;
use std::sync::mpsc::{Receiver, Sender};
use std::{fs, thread};

use std::fs::File;
use std::io::Write;

/// A logger that writes into a single `app.log` file.
///
/// The logger works with channels: one receiver thread owns the file and
/// any number of `LoggerSender` clones feed it from other threads. The log
/// file is truncated every time a new `Logger` is built, so each run starts
/// with a fresh log.
///
/// To get a sender channel call the `new_sender()` method.
#[derive(Debug)]
pub struct Logger {
    sender: LoggerSender,
}

impl Logger {
    /// Constructs a new Logger writing to `<dir_path>/app.log`.
    ///
    /// The receiver stops on its own once the file grows past
    /// `max_log_file_kb_size` kilobytes.
    ///
    /// It returns a LoggerError if:
    /// - The logging directory could not be created.
    /// - The log file could not be created inside it.
    /// - The receiver thread could not be spawned.
    pub fn new(dir_path: &str, max_log_file_kb_size: u32) -> Result<Self, LoggerError> {
        let (sender, receiver): (Sender<String>, Receiver<String>) = channel();

        Self::create_log_directory(dir_path)?;
        let file = Self::create_log_file(dir_path)?;
        Self::spawn_log_receiver(receiver, file, max_log_file_kb_size)?;

        Ok(Self {
            sender: LoggerSender::new(sender),
        })
    }

    /// Creates a new LoggerSender for the current Logger.
    pub fn new_sender(&self) -> LoggerSender {
        self.sender.clone()
    }

    fn create_log_directory(dir_path: &str) -> Result<(), LoggerError> {
        fs::create_dir_all(dir_path)
            .map_err(|error| LoggerError::LogDirectoryError(format!("{}", error)))
    }

    fn create_log_file(dir_path: &str) -> Result<File, LoggerError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(format!("{}/{}", dir_path, LOG_FILE_NAME));

        match file {
            Ok(file) => Ok(file),
            Err(_) => Err(LoggerError::LogFileError(dir_path.to_string())),
        }
    }

    fn spawn_log_receiver(
        receiver: Receiver<String>,
        file: File,
        max_log_file_kb_size: u32,
    ) -> Result<(), LoggerError> {
        let builder = thread::Builder::new().name(LOGGER_THREAD_NAME.to_string());
        let result = builder.spawn(move || {
            let mut file = file;
            let max_bytes = max_log_file_kb_size as u64 * 1024;

            while let Ok(msg) = receiver.recv() {
                if let Err(err) = file.write_all(msg.as_bytes()) {
                    eprintln!("Error({err}) writing to the log");
                }
                match file.metadata() {
                    Ok(metadata) => {
                        if metadata.len() > max_bytes {
                            eprintln!(
                                "Max log file size of {}kb has been reached. Closing logger receiver.",
                                max_log_file_kb_size
                            );
                            break;
                        }
                    }
                    Err(err) => eprintln!("Error({err}) reading log file metadata"),
                }
            }
        });
        match result {
            Ok(_) => Ok(()),
            Err(_) => Err(LoggerError::SpawnThreadError),
        }
    }
}
