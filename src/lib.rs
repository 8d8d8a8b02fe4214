pub mod checksum;
pub mod chunker;
pub mod config;
pub mod error;
pub mod logging;
pub mod packet;
mod sync_util;
pub mod transport;

pub use config::{Config, IntermediaryConfig};
pub use error::TransportError;
pub use packet::{AckPacket, DataPacket};
pub use transport::intermediary::{Intermediary, RunningIntermediary};
pub use transport::receiver::Receiver;
pub use transport::sender::Sender;
