pub mod bt_tracker;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod swarm;
pub mod sweeper;
