use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, info_span, warn};

use crate::config::IntermediaryConfig;
use crate::error::TransportError;
use crate::packet::DataPacket;
use crate::sync_util::join_with_timeout;

/// Fault-injection relay from §4.4: two independent directions, each with its own thread,
/// sitting between the ports the sender and receiver transmit to.
pub struct Intermediary {
    config: IntermediaryConfig,
    sender_recv_addr: SocketAddr,
    sender_send_addr: SocketAddr,
    receiver_recv_addr: SocketAddr,
    receiver_send_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
}

/// Handles returned by [`Intermediary::start`]; keep alive until [`Intermediary::shutdown`].
pub struct RunningIntermediary {
    data_thread: JoinHandle<()>,
    ack_thread: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl Intermediary {
    /// `sender_recv_port`/`sender_send_port` are the sender's `P_r`/`P_r + 1`;
    /// `receiver_send_port`/`receiver_recv_port` are the receiver's `P_s`/`P_s + 1`. The
    /// intermediary binds the ports each endpoint transmits *to* and forwards onward to
    /// the ports each endpoint binds to receive on.
    pub fn new(
        sender_recv_port: u16,
        receiver_send_port: u16,
        config: IntermediaryConfig,
    ) -> Self {
        Intermediary {
            config,
            sender_recv_addr: ([127, 0, 0, 1], sender_recv_port).into(),
            sender_send_addr: ([127, 0, 0, 1], sender_recv_port + 1).into(),
            receiver_recv_addr: ([127, 0, 0, 1], receiver_send_port + 1).into(),
            receiver_send_addr: ([127, 0, 0, 1], receiver_send_port).into(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Binds both listening sockets and spawns the two forwarding threads.
    pub fn start(&self) -> Result<RunningIntermediary, TransportError> {
        let span = info_span!(
            "intermediary",
            sender_recv = self.sender_recv_addr.port(),
            receiver_send = self.receiver_send_addr.port()
        );
        let _enter = span.enter();

        let data_socket =
            UdpSocket::bind(self.sender_send_addr).map_err(|source| TransportError::Bind {
                addr: self.sender_send_addr,
                source,
            })?;
        let ack_socket =
            UdpSocket::bind(self.receiver_send_addr).map_err(|source| TransportError::Bind {
                addr: self.receiver_send_addr,
                source,
            })?;

        data_socket.set_read_timeout(Some(Duration::from_secs(1)))?;
        ack_socket.set_read_timeout(Some(Duration::from_secs(1)))?;

        info!(
            data_listen = ?self.sender_send_addr,
            ack_listen = ?self.receiver_send_addr,
            "intermediary listening"
        );

        let shutdown = Arc::clone(&self.shutdown);
        let config = self.config;
        let forward_to = self.receiver_recv_addr;
        let data_thread = thread::spawn(move || {
            forward_direction(data_socket, forward_to, shutdown, config, true)
        });

        let shutdown = Arc::clone(&self.shutdown);
        let forward_to = self.sender_recv_addr;
        let ack_thread = thread::spawn(move || {
            forward_direction(ack_socket, forward_to, shutdown, IntermediaryConfig {
                corrupt_prob: 0.0,
                ..config
            }, false)
        });

        Ok(RunningIntermediary {
            data_thread,
            ack_thread,
            shutdown: Arc::clone(&self.shutdown),
        })
    }
}

impl RunningIntermediary {
    /// Signals both forwarding threads to stop and joins them with a bounded timeout,
    /// proceeding regardless per §5's shutdown discipline.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        join_with_timeout(self.data_thread, Duration::from_secs(2));
        join_with_timeout(self.ack_thread, Duration::from_secs(2));
        info!("intermediary shutdown complete");
    }
}

fn forward_direction(
    socket: UdpSocket,
    forward_to: SocketAddr,
    shutdown: Arc<AtomicBool>,
    config: IntermediaryConfig,
    is_data_direction: bool,
) {
    let mut buf = [0u8; 4096];
    let mut rng = rand::thread_rng();

    while !shutdown.load(Ordering::Acquire) {
        let (n, _) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(_) => break,
        };

        if config.drop_prob > 0.0 && rng.gen_bool(config.drop_prob) {
            debug!("dropped packet");
            continue;
        }

        let mut payload = buf[..n].to_vec();

        if is_data_direction && config.corrupt_prob > 0.0 && rng.gen_bool(config.corrupt_prob) {
            if let Ok(mut packet) = DataPacket::decode(&payload) {
                packet.checksum = packet.checksum.map(|c| c.wrapping_add(1));
                if let Ok(bytes) = packet.encode() {
                    payload = bytes;
                    debug!("corrupted packet");
                }
            }
        }

        let (min, max) = config.delay_range;
        if max > Duration::ZERO {
            let delay = if min >= max {
                min
            } else {
                let min_nanos = min.as_nanos();
                let max_nanos = max.as_nanos();
                let sampled = rng.gen_range(min_nanos..=max_nanos);
                Duration::from_nanos(sampled as u64)
            };
            thread::sleep(delay);
        }

        if !shutdown.load(Ordering::Acquire) {
            if let Err(err) = socket.send_to(&payload, forward_to) {
                warn!(%err, "failed to forward packet");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transport::receiver::Receiver;
    use crate::transport::sender::Sender;
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn clean_relay_preserves_delivery_order() {
        let sender_recv_port = 43300;
        let receiver_send_port = 43310;

        let engine_config = Config {
            window_size: 4,
            timeout: StdDuration::from_millis(300),
            max_fin_retries: 2,
        };

        let receiver = Receiver::new(receiver_send_port, engine_config).unwrap();
        let receiver_thread = thread::spawn(move || receiver.run());
        thread::sleep(StdDuration::from_millis(100));

        let intermediary = Intermediary::new(
            sender_recv_port,
            receiver_send_port,
            IntermediaryConfig::default(),
        );
        let running = intermediary.start().unwrap();
        thread::sleep(StdDuration::from_millis(100));

        let sender = Sender::new(sender_recv_port, engine_config).unwrap();
        let chunks: Vec<Vec<u8>> = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        sender.send(chunks.clone()).unwrap();

        let delivered = receiver_thread.join().unwrap().unwrap();
        assert_eq!(delivered, chunks);

        running.shutdown();
    }

    #[test]
    fn corruption_injection_only_mutates_checksum() {
        let packet = DataPacket::new(false, 1, b"payload".to_vec());
        let original_data = packet.data.clone();
        let mut corrupted = packet.clone();
        corrupted.checksum = corrupted.checksum.map(|c| c.wrapping_add(1));

        assert_eq!(corrupted.data, original_data);
        assert!(!corrupted.verify_checksum());
    }
}
