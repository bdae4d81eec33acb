use leaderboard_core::ConnectionId;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("invalid room name: {0:?}")]
    InvalidRoom(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}
