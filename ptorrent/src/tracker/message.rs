use serde::{Deserialize, Serialize};

/// A tracker wire request, dispatched on its `action` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action")]
pub enum TrackerRequest {
    #[serde(rename = "announce")]
    Announce {
        torrent_id: String,
        peer_ip: String,
        port: u16,
    },
    #[serde(rename = "peer_list_update")]
    PeerListUpdate { torrent_id: String },
    #[serde(rename = "stop")]
    Stop {
        torrent_id: String,
        peer_ip: String,
        port: u16,
    },
    #[serde(rename = "time_update")]
    TimeUpdate {
        torrent_id: String,
        peer_ip: String,
        port: u16,
    },
}

/// A tracker wire reply: a peer list under `command:"MESSAGE"`, a non-fatal
/// warning, or an error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TrackerResponse {
    PeerList {
        command: String,
        peer_list: Vec<(String, u16)>,
    },
    Warning {
        warning: String,
    },
    Error {
        error: String,
    },
}
