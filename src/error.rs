#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind udp socket on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("socket i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode packet: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("fin retries exhausted without a fin-ack")]
    FinRetriesExhausted,
}
