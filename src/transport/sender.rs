use std::collections::{BTreeMap, VecDeque};
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::packet::{AckPacket, DataPacket};
use crate::sync_util::join_with_timeout;

/// A window slot: the payload currently in flight for a sequence number, the time it was
/// last transmitted, and whether the receiver has acknowledged it.
struct WindowSlot {
    payload: Vec<u8>,
    last_tx: Instant,
    acked: bool,
}

/// State shared between the send loop and the ack-listener thread. Mirrors
/// `examples/maminrayej-handshake`'s pattern of a single struct behind one `Arc<Mutex<_>>`
/// that both the main loop and the background thread mutate directly.
struct SenderState {
    base: u32,
    seq_next: u32,
    window: BTreeMap<u32, WindowSlot>,
    sending: bool,
    terminated: bool,
}

impl SenderState {
    fn new() -> Self {
        SenderState {
            base: 0,
            seq_next: 0,
            window: BTreeMap::new(),
            sending: false,
            terminated: false,
        }
    }
}

/// The sliding-window sender described in §4.1. Owns a send endpoint (used for data and
/// FIN packets) and knows where its ack-listener thread must bind.
pub struct Sender {
    config: Config,
    recv_addr: SocketAddr,
    send_to_addr: SocketAddr,
    send_socket: UdpSocket,
    state: Arc<Mutex<SenderState>>,
}

impl Sender {
    /// `recv_port` is `P_r`: the sender binds it for acks and sends data to `P_r + 1`.
    pub fn new(recv_port: u16, config: Config) -> Result<Self, TransportError> {
        let recv_addr: SocketAddr = ([127, 0, 0, 1], recv_port).into();
        let send_to_addr: SocketAddr = ([127, 0, 0, 1], recv_port + 1).into();

        let bind_addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let send_socket = UdpSocket::bind(bind_addr).map_err(|source| TransportError::Bind {
            addr: bind_addr,
            source,
        })?;

        Ok(Sender {
            config,
            recv_addr,
            send_to_addr,
            send_socket,
            state: Arc::new(Mutex::new(SenderState::new())),
        })
    }

    /// Sends every chunk in order, then performs the FIN handshake. Returns once the
    /// transfer is acknowledged in full or retries are exhausted; a mid-transfer socket
    /// failure is absorbed into early termination rather than surfaced here (§7).
    pub fn send(&self, chunks: Vec<Vec<u8>>) -> Result<(), TransportError> {
        let span = info_span!("sender", recv_port = self.recv_addr.port());
        let _enter = span.enter();

        let mut remaining: VecDeque<Vec<u8>> = chunks.into();

        {
            let mut state = self.state.lock().unwrap();
            state.sending = true;
        }

        let listener_state = Arc::clone(&self.state);
        let recv_addr = self.recv_addr;
        let ack_timeout = self.config.timeout;
        let listener = thread::spawn(move || ack_listener(listener_state, recv_addr, ack_timeout));

        loop {
            self.fill_window(&mut remaining)?;
            self.slide();
            self.retransmit_expired();

            thread::sleep(Duration::from_millis(100));

            let (forced_stop, window_empty) = {
                let state = self.state.lock().unwrap();
                (!state.sending, state.window.is_empty())
            };
            if forced_stop || (remaining.is_empty() && window_empty) {
                break;
            }
        }

        info!("send loop complete, starting fin handshake");
        self.run_fin_handshake(listener)
    }

    fn fill_window(&self, remaining: &mut VecDeque<Vec<u8>>) -> Result<(), TransportError> {
        loop {
            let seq = {
                let state = self.state.lock().unwrap();
                if state.seq_next >= state.base + self.config.window_size {
                    break;
                }
                state.seq_next
            };
            let Some(chunk) = remaining.pop_front() else {
                break;
            };

            let packet = DataPacket::new(false, seq, chunk.clone());
            if let Err(err) = self.transmit(&packet) {
                warn!(%err, seq, "fatal error sending data packet, forcing termination");
                let mut state = self.state.lock().unwrap();
                state.sending = false;
                remaining.push_front(packet.data);
                return Ok(());
            }
            debug!(seq, "sent");

            let mut state = self.state.lock().unwrap();
            state.window.insert(
                seq,
                WindowSlot {
                    payload: chunk,
                    last_tx: Instant::now(),
                    acked: false,
                },
            );
            state.seq_next += 1;
        }
        Ok(())
    }

    fn slide(&self) {
        let mut state = self.state.lock().unwrap();
        while state
            .window
            .get(&state.base)
            .map(|slot| slot.acked)
            .unwrap_or(false)
        {
            let base = state.base;
            state.window.remove(&base);
            state.base += 1;
        }
    }

    fn retransmit_expired(&self) {
        let timeout = self.config.timeout;
        let due: Vec<(u32, Vec<u8>)> = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            let mut due = Vec::new();
            for (seq, slot) in state.window.iter_mut() {
                if !slot.acked && now.duration_since(slot.last_tx) > timeout {
                    slot.last_tx = now;
                    due.push((*seq, slot.payload.clone()));
                }
            }
            due
        };

        for (seq, payload) in due {
            debug!(seq, "retransmitting");
            if let Err(err) = self.transmit(&DataPacket::new(false, seq, payload)) {
                warn!(%err, seq, "fatal error retransmitting, forcing termination");
                self.state.lock().unwrap().sending = false;
                return;
            }
        }
    }

    fn run_fin_handshake(&self, listener: thread::JoinHandle<()>) -> Result<(), TransportError> {
        let max_attempts = self.config.max_fin_retries + 1;

        for attempt in 0..max_attempts {
            let seq = self.state.lock().unwrap().seq_next;
            info!(attempt, seq, "sending fin");
            if let Err(err) = self.transmit(&DataPacket::fin(seq)) {
                warn!(%err, "failed to send fin packet");
            }

            let deadline = Instant::now() + self.config.timeout;
            loop {
                if self.is_terminated() || Instant::now() >= deadline {
                    break;
                }
                thread::sleep(Duration::from_millis(100));
            }

            if self.is_terminated() {
                break;
            }
        }

        join_with_timeout(listener, Duration::from_secs(2));

        if self.is_terminated() {
            info!("fin-ack received, transfer complete");
            Ok(())
        } else {
            warn!("fin retries exhausted without a fin-ack, closing anyway");
            Err(TransportError::FinRetriesExhausted)
        }
    }

    fn is_terminated(&self) -> bool {
        self.state.lock().unwrap().terminated
    }

    fn transmit(&self, packet: &DataPacket) -> Result<(), TransportError> {
        let bytes = packet.encode()?;
        self.send_socket.send_to(&bytes, self.send_to_addr)?;
        Ok(())
    }
}

/// Runs on its own thread for the lifetime of a transfer; the sole reader and closer of
/// the ack socket (§5's shared-resource policy).
fn ack_listener(state: Arc<Mutex<SenderState>>, recv_addr: SocketAddr, timeout: Duration) {
    let socket = match UdpSocket::bind(recv_addr) {
        Ok(socket) => socket,
        Err(err) => {
            warn!(%err, "ack listener failed to bind");
            let mut state = state.lock().unwrap();
            state.sending = false;
            state.terminated = true;
            return;
        }
    };

    if socket
        .set_read_timeout(Some(timeout + Duration::from_secs(5)))
        .is_err()
    {
        return;
    }

    let mut buf = [0u8; 2048];
    loop {
        {
            let state = state.lock().unwrap();
            if !state.sending && state.terminated {
                break;
            }
        }

        match socket.recv_from(&mut buf) {
            Ok((n, _)) => match AckPacket::decode(&buf[..n]) {
                Ok(AckPacket::FinAck { fin_ack: true }) => {
                    info!("received fin-ack");
                    state.lock().unwrap().terminated = true;
                    break;
                }
                Ok(AckPacket::FinAck { fin_ack: false }) => continue,
                Ok(AckPacket::Ack { ack }) => {
                    debug!(ack, "received ack");
                    if let Some(slot) = state.lock().unwrap().window.get_mut(&ack) {
                        slot.acked = true;
                    }
                }
                Err(err) => {
                    warn!(%err, "malformed ack packet, stopping listener");
                    break;
                }
            },
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => {
                warn!(%err, "ack socket error, stopping listener");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::receiver::Receiver;
    use std::time::Duration as StdDuration;

    fn test_config() -> Config {
        Config {
            window_size: 4,
            timeout: StdDuration::from_millis(300),
            max_fin_retries: 2,
        }
    }

    #[test]
    fn clean_transfer_delivers_all_chunks_in_order() {
        let recv_port = 43100;
        let receiver = Receiver::new(recv_port, test_config()).unwrap();
        let receiver_thread = thread::spawn(move || receiver.run());

        thread::sleep(Duration::from_millis(100));

        let sender = Sender::new(recv_port, test_config()).unwrap();
        let chunks: Vec<Vec<u8>> = (0..5).map(|i| format!("chunk-{i}").into_bytes()).collect();
        sender.send(chunks.clone()).unwrap();

        let delivered = receiver_thread.join().unwrap().unwrap();
        assert_eq!(delivered, chunks);
    }

    #[test]
    fn empty_input_only_performs_fin_handshake() {
        let recv_port = 43110;
        let receiver = Receiver::new(recv_port, test_config()).unwrap();
        let receiver_thread = thread::spawn(move || receiver.run());

        thread::sleep(Duration::from_millis(100));

        let sender = Sender::new(recv_port, test_config()).unwrap();
        sender.send(vec![]).unwrap();

        let delivered = receiver_thread.join().unwrap().unwrap();
        assert!(delivered.is_empty());
    }
}
