pub mod connection_pool;
