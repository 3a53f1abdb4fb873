pub mod request_handler;
pub mod server;
pub mod thread_pool;
pub mod wire;
