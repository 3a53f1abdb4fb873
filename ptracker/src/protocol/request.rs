use serde::Deserialize;

/// A tracker request header, dispatched on its `action` tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
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
