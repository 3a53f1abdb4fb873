use ptracker::bt_tracker::tracker::BtTracker;
use std::env;
use tracing::error;

fn main() {
    // install global collector configured based on RUST_LOG env var.
    tracing_subscriber::fmt::init();

    if env::args().count() != 2 {
        return error!("Incorrect number of arguments. Only a port number should be passed");
    };
    let port = match env::args().last() {
        Some(s) if s.parse::<u16>().is_ok() => s.parse::<u16>().unwrap_or(0),
        _ => return error!("Invalid port number"),
    };

    match BtTracker::init(port) {
        Ok(tracker) => {
            if let Err(e) = tracker.run() {
                error!("Error: {:?}", e);
            }
            tracker.stop();
        }
        Err(e) => {
            error!("Error: {:?}", e);
        }
    }
}
