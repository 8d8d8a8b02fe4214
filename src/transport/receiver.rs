use std::collections::BTreeMap;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, info, info_span};

use crate::config::Config;
use crate::error::TransportError;
use crate::packet::{AckPacket, DataPacket};

/// Lifecycle states from §4.2. Tracked only for logging here; nothing outside `run`
/// inspects the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiverState {
    Listening,
    Receiving,
    Draining,
    Lingering,
    Closed,
}

struct ReassemblyState {
    expected: u32,
    buffer: BTreeMap<u32, Vec<u8>>,
    delivered: Vec<Vec<u8>>,
    termination_seen: bool,
}

impl ReassemblyState {
    fn new() -> Self {
        ReassemblyState {
            expected: 0,
            buffer: BTreeMap::new(),
            delivered: Vec::new(),
            termination_seen: false,
        }
    }
}

/// The reordering and acknowledgement engine described in §4.2.
pub struct Receiver {
    config: Config,
    data_bind_addr: SocketAddr,
    ack_send_addr: SocketAddr,
}

impl Receiver {
    /// `send_port` is `P_s`: the receiver binds `P_s + 1` for data and acks to `P_s`.
    pub fn new(send_port: u16, config: Config) -> Result<Self, TransportError> {
        Ok(Receiver {
            config,
            data_bind_addr: ([127, 0, 0, 1], send_port + 1).into(),
            ack_send_addr: ([127, 0, 0, 1], send_port).into(),
        })
    }

    /// Binds the data endpoint and processes packets until a FIN has drained the buffer,
    /// then lingers to absorb retransmitted FINs before returning the delivered payloads.
    pub fn run(&self) -> Result<Vec<Vec<u8>>, TransportError> {
        let span = info_span!("receiver", send_port = self.ack_send_addr.port());
        let _enter = span.enter();

        let socket = UdpSocket::bind(self.data_bind_addr).map_err(|source| TransportError::Bind {
            addr: self.data_bind_addr,
            source,
        })?;
        info!("bound, listening");

        let mut state = ReassemblyState::new();
        let mut machine = ReceiverState::Listening;

        let mut buf = [0u8; 2048];
        loop {
            let (n, _) = match socket.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(_) => break,
            };

            if machine == ReceiverState::Listening {
                machine = ReceiverState::Receiving;
                debug!("first packet observed");
            }

            match DataPacket::decode(&buf[..n]) {
                Ok(packet) if packet.verify_checksum() => {
                    self.process_packet(&socket, &mut state, packet);
                }
                Ok(_) => debug!("checksum mismatch, dropping"),
                Err(_) => debug!("malformed packet, dropping"),
            }

            if state.termination_seen && machine == ReceiverState::Receiving {
                machine = ReceiverState::Draining;
                info!("fin observed, draining reorder buffer");
            }
            if state.termination_seen && state.buffer.is_empty() {
                break;
            }
        }

        info!("buffer drained, entering lingering phase");
        self.linger(&socket);

        info!(delivered = state.delivered.len(), "closed");

        Ok(state.delivered)
    }

    /// Classifies and handles one checksum-valid packet. The FIN's `seq` is treated as
    /// out-of-band per §9's adopted resolution: it may still earn an ack (if its seq falls
    /// in range) but its sentinel payload is never written into `buffer`.
    fn process_packet(&self, socket: &UdpSocket, state: &mut ReassemblyState, packet: DataPacket) {
        let window = self.config.window_size;
        let seq = packet.seq;
        let expected = state.expected;

        if seq >= expected && seq < expected + window {
            self.send_ack(socket, seq);
            if !packet.terminate {
                state.buffer.insert(seq, packet.data);
                while let Some(data) = state.buffer.remove(&state.expected) {
                    state.delivered.push(data);
                    state.expected += 1;
                }
            }
        } else if seq >= expected.saturating_sub(window) && seq < expected {
            self.send_ack(socket, seq);
        } else {
            debug!(seq, expected, "out of range, dropping");
        }

        if packet.terminate {
            state.termination_seen = true;
            self.send_fin_ack(socket);
            debug!(seq, "fin received");
        }
    }

    /// Grace period absorbing FIN retransmissions whose FIN-ACK the sender never saw.
    fn linger(&self, socket: &UdpSocket) {
        if socket.set_read_timeout(Some(Duration::from_secs(5))).is_err() {
            return;
        }

        let mut buf = [0u8; 2048];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((n, _)) => {
                    if let Ok(packet) = DataPacket::decode(&buf[..n]) {
                        if packet.verify_checksum() && packet.terminate {
                            self.send_fin_ack(socket);
                            debug!("re-sent fin-ack during lingering");
                        }
                    }
                }
                Err(_) => break,
            }
        }
    }

    fn send_ack(&self, socket: &UdpSocket, seq: u32) {
        if let Ok(bytes) = AckPacket::ack(seq).encode() {
            let _ = socket.send_to(&bytes, self.ack_send_addr);
        }
    }

    fn send_fin_ack(&self, socket: &UdpSocket) {
        if let Ok(bytes) = AckPacket::fin_ack().encode() {
            let _ = socket.send_to(&bytes, self.ack_send_addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            window_size: 4,
            timeout: Duration::from_millis(300),
            max_fin_retries: 2,
        }
    }

    #[test]
    fn out_of_window_seq_is_dropped_without_panic() {
        // Regression-style smoke test for the classification arithmetic: a receiver
        // freshly constructed with `expected == 0` must not underflow when a far-future
        // seq is classified.
        let receiver = Receiver::new(43200, test_config()).unwrap();
        let mut state = ReassemblyState::new();
        let socket = UdpSocket::bind(("127.0.0.1", 0)).unwrap();

        let packet = DataPacket::new(false, 1000, b"late".to_vec());
        receiver.process_packet(&socket, &mut state, packet);

        assert!(state.delivered.is_empty());
        assert!(state.buffer.is_empty());
    }

    #[test]
    fn duplicate_below_window_does_not_redeliver() {
        let receiver = Receiver::new(43210, test_config()).unwrap();
        let mut state = ReassemblyState::new();
        let socket = UdpSocket::bind(("127.0.0.1", 0)).unwrap();

        for seq in 0..3u32 {
            receiver.process_packet(&socket, &mut state, DataPacket::new(false, seq, vec![seq as u8]));
        }
        assert_eq!(state.delivered.len(), 3);

        // Sender retries seq 0 after it already slid past; must be acked but not stored.
        receiver.process_packet(&socket, &mut state, DataPacket::new(false, 0, vec![0]));
        assert_eq!(state.delivered.len(), 3);
    }

    #[test]
    fn fin_sentinel_is_never_delivered() {
        let receiver = Receiver::new(43220, test_config()).unwrap();
        let mut state = ReassemblyState::new();
        let socket = UdpSocket::bind(("127.0.0.1", 0)).unwrap();

        receiver.process_packet(&socket, &mut state, DataPacket::new(false, 0, b"a".to_vec()));
        receiver.process_packet(&socket, &mut state, DataPacket::fin(1));

        assert!(state.termination_seen);
        assert_eq!(state.delivered, vec![b"a".to_vec()]);
    }

    #[test]
    fn out_of_order_arrival_buffers_until_gap_fills() {
        let receiver = Receiver::new(43230, test_config()).unwrap();
        let mut state = ReassemblyState::new();
        let socket = UdpSocket::bind(("127.0.0.1", 0)).unwrap();

        receiver.process_packet(&socket, &mut state, DataPacket::new(false, 1, vec![1]));
        assert!(state.delivered.is_empty());
        assert_eq!(state.buffer.len(), 1);

        receiver.process_packet(&socket, &mut state, DataPacket::new(false, 0, vec![0]));
        assert_eq!(state.delivered, vec![vec![0], vec![1]]);
        assert!(state.buffer.is_empty());
    }
}
