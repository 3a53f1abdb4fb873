use clap::{Parser, Subcommand};
use logger::logger_receiver::Logger;
use ptorrent::config::cfg::Cfg;
use ptorrent::peer::node::PeerNode;
use ptorrent::torrent::creator::TorrentCreator;
use ptorrent::torrent::parser::TorrentParser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::thread;
use std::time::Duration;
use tracing::error;

#[derive(Parser, Debug)]
#[command(about = "P2P file sharing - BitTorrent style peer")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start seeding the content described by a torrent file
    Seed {
        /// Torrent file, looked up in the torrent directory when relative
        torrent_file: String,
        #[arg(short, long, default_value = "config.cfg")]
        config: String,
        /// Host other peers reach this node at
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Listening port, overrides the configured one
        #[arg(long)]
        port: Option<u16>,
    },
    /// Download the content described by a torrent file
    Download {
        torrent_file: String,
        #[arg(short, long, default_value = "config.cfg")]
        config: String,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long)]
        port: Option<u16>,
        /// Save directory, overrides the configured one
        #[arg(short, long)]
        save_dir: Option<String>,
    },
    /// Create a torrent file for sharing
    Create {
        /// File or directory to package
        filepath: String,
        /// Tracker address to include in the manifest
        #[arg(long)]
        tracker: String,
        /// Piece length in KiB
        #[arg(long, default_value_t = 512)]
        piece_length: u64,
        /// Output directory, defaults to the configured torrent directory
        #[arg(short, long)]
        save_dir: Option<String>,
        #[arg(short, long, default_value = "config.cfg")]
        config: String,
    },
}

fn main() {
    // install global collector configured based on RUST_LOG env var.
    tracing_subscriber::fmt::init();

    match Args::parse().command {
        Command::Seed {
            torrent_file,
            config,
            host,
            port,
        } => run_seed(&torrent_file, &config, host, port),
        Command::Download {
            torrent_file,
            config,
            host,
            port,
            save_dir,
        } => run_download(&torrent_file, &config, host, port, save_dir),
        Command::Create {
            filepath,
            tracker,
            piece_length,
            save_dir,
            config,
        } => run_create(&filepath, tracker, piece_length, save_dir, &config),
    }
}

fn run_seed(torrent_file: &str, config_path: &str, host: String, port: Option<u16>) {
    let (node, _logger) = build_node(torrent_file, config_path, host, port);

    node.start().expect("Failed to start the peer node");
    match node.announce() {
        Ok(peers) => println!("Announced; swarm currently has {} peer(s)", peers.len()),
        Err(e) => error!("Announce failed: {:?}", e),
    }
    node.spawn_keepalive().expect("Failed to spawn the keep-alive loop");

    println!("Seeding. Press Ctrl-C to stop.");
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}

fn run_download(
    torrent_file: &str,
    config_path: &str,
    host: String,
    port: Option<u16>,
    save_dir: Option<String>,
) {
    let (node, _logger) = build_node_with(torrent_file, config_path, host, port, |config| {
        if let Some(save_dir) = save_dir {
            config.download_directory = save_dir;
        }
    });

    node.start().expect("Failed to start the peer node");
    match node.announce() {
        Ok(peers) => println!("Announced; swarm currently has {} peer(s)", peers.len()),
        Err(e) => error!("Announce failed: {:?}", e),
    }

    match node.download() {
        Ok(()) => {
            println!("Download complete: {}", node.output_path().display());
            node.stop();
        }
        Err(e) => {
            error!("Download failed: {:?}", e);
            node.stop();
            exit(1);
        }
    }
}

fn run_create(
    filepath: &str,
    tracker: String,
    piece_length: u64,
    save_dir: Option<String>,
    config_path: &str,
) {
    let config = Cfg::new(config_path).expect("Config file not found or incomplete");
    let output_dir = save_dir.unwrap_or_else(|| config.torrent_directory.clone());

    let creator = TorrentCreator::new(Path::new(filepath), tracker, piece_length, 0);
    match creator.create(&output_dir) {
        Ok(path) => println!("Torrent file created: {}", path.display()),
        Err(e) => {
            error!("Torrent creation failed: {:?}", e);
            exit(1);
        }
    }
}

fn build_node(
    torrent_file: &str,
    config_path: &str,
    host: String,
    port: Option<u16>,
) -> (PeerNode, Logger) {
    build_node_with(torrent_file, config_path, host, port, |_| {})
}

fn build_node_with<F: FnOnce(&mut Cfg)>(
    torrent_file: &str,
    config_path: &str,
    host: String,
    port: Option<u16>,
    adjust: F,
) -> (PeerNode, Logger) {
    let mut config = Cfg::new(config_path).expect("Config file not found or incomplete");
    adjust(&mut config);
    ensure_data_directories(&config);

    let logger = Logger::new(&config.log_directory, config.max_log_file_kb_size)
        .expect("logger could not be created");

    let torrent_path = resolve_torrent_path(torrent_file, &config);
    let torrent = TorrentParser::parse(&torrent_path).expect("parser could not read the file");
    let torrent_id = torrent_path
        .file_name()
        .expect("torrent path has no file name")
        .to_string_lossy()
        .to_string();

    let port = port.unwrap_or(config.tcp_port);
    let node = PeerNode::new(
        torrent,
        torrent_id,
        (host, port),
        config,
        logger.new_sender(),
    );
    (node, logger)
}

/// A bare file name is looked up in the configured torrent directory;
/// anything that exists as given is used as-is.
fn resolve_torrent_path(torrent_file: &str, config: &Cfg) -> PathBuf {
    let direct = PathBuf::from(torrent_file);
    if direct.exists() {
        return direct;
    }
    Path::new(&config.torrent_directory).join(torrent_file)
}

fn ensure_data_directories(config: &Cfg) {
    for dir in [
        &config.torrent_directory,
        &config.download_directory,
        &config.upload_directory,
    ] {
        if let Err(e) = fs::create_dir_all(dir) {
            error!("Could not create directory {}: {}", dir, e);
        }
    }
}
