use serde::Serialize;

use crate::swarm::swarm::PeerAddress;

/// A tracker reply: a peer list under `command:"MESSAGE"`, a non-fatal
/// warning, or an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TrackerResponse {
    PeerList {
        command: String,
        peer_list: Vec<PeerAddress>,
    },
    Warning {
        warning: String,
    },
    Error {
        error: String,
    },
}

impl TrackerResponse {
    pub fn peer_list(peers: Vec<PeerAddress>) -> Self {
        TrackerResponse::PeerList {
            command: "MESSAGE".to_string(),
            peer_list: peers,
        }
    }

    pub fn warning(message: &str) -> Self {
        TrackerResponse::Warning {
            warning: message.to_string(),
        }
    }

    pub fn error(message: &str) -> Self {
        TrackerResponse::Error {
            error: message.to_string(),
        }
    }
}
