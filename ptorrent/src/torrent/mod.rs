pub mod creator;
pub mod info;
pub mod parser;
pub mod torrent;
