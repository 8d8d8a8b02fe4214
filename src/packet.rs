use serde::{Deserialize, Serialize};

use crate::checksum::internet_checksum;
use crate::error::TransportError;

/// Payload carried by the FIN packet; its content is never inspected by the receiver.
pub const FIN_SENTINEL: &[u8] = b"Connection Termination";

/// A data-direction record: the atomic unit the sender transmits and the receiver verifies.
///
/// `checksum` is required on the wire (its absence or an explicit `null` both make the
/// packet undecodable/invalid) but is computed over every other field with the checksum
/// field itself left out of the input bytes entirely, not merely set to a placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPacket {
    pub terminate: bool,
    pub seq: u32,
    pub data: Vec<u8>,
    pub checksum: Option<u16>,
}

/// The subset of fields the checksum is computed over. Kept as a separate type (rather
/// than an `Option<u16>` field toggled to `None`) so the checksum field is truly absent
/// from the serialised bytes, matching the wire contract in §4.3.
#[derive(Serialize)]
struct ChecksumView<'a> {
    terminate: bool,
    seq: u32,
    data: &'a [u8],
}

impl DataPacket {
    pub fn new(terminate: bool, seq: u32, data: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(terminate, seq, &data);
        DataPacket {
            terminate,
            seq,
            data,
            checksum: Some(checksum),
        }
    }

    pub fn fin(seq: u32) -> Self {
        DataPacket::new(true, seq, FIN_SENTINEL.to_vec())
    }

    fn compute_checksum(terminate: bool, seq: u32, data: &[u8]) -> u16 {
        let view = ChecksumView {
            terminate,
            seq,
            data,
        };
        // A `Vec<u8>` built from our own `ChecksumView` can never fail to serialise.
        let bytes = serde_json::to_vec(&view).expect("checksum view is always serialisable");
        internet_checksum(&bytes)
    }

    /// True iff `checksum` is present and matches the recomputed checksum over the
    /// remaining fields.
    pub fn verify_checksum(&self) -> bool {
        match self.checksum {
            Some(checksum) => checksum == Self::compute_checksum(self.terminate, self.seq, &self.data),
            None => false,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a datagram into a `DataPacket`. Any of the four required fields missing,
    /// or a type mismatch, is reported as an error the caller should treat as a drop.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// An ack-direction record. The two forms are disjoint: a single datagram is either a
/// per-seq ack or a fin-ack, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AckPacket {
    Ack { ack: u32 },
    FinAck { fin_ack: bool },
}

impl AckPacket {
    pub fn ack(seq: u32) -> Self {
        AckPacket::Ack { ack: seq }
    }

    pub fn fin_ack() -> Self {
        AckPacket::FinAck { fin_ack: true }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_packet_round_trips_and_verifies() {
        let pkt = DataPacket::new(false, 7, b"hello".to_vec());
        let bytes = pkt.encode().unwrap();
        let decoded = DataPacket::decode(&bytes).unwrap();
        assert!(decoded.verify_checksum());
        assert_eq!(decoded.seq, 7);
        assert_eq!(decoded.data, b"hello");
    }

    #[test]
    fn tampered_checksum_fails_verification() {
        let mut pkt = DataPacket::new(false, 1, b"x".to_vec());
        pkt.checksum = pkt.checksum.map(|c| c.wrapping_add(1));
        assert!(!pkt.verify_checksum());
    }

    #[test]
    fn missing_checksum_field_fails_to_decode() {
        let bytes = serde_json::to_vec(&serde_json::json!({
            "terminate": false,
            "seq": 3,
            "data": [1, 2, 3],
        }))
        .unwrap();
        assert!(DataPacket::decode(&bytes).is_err());
    }

    #[test]
    fn null_checksum_decodes_but_fails_verification() {
        let bytes = serde_json::to_vec(&serde_json::json!({
            "terminate": false,
            "seq": 3,
            "data": [1, 2, 3],
            "checksum": null,
        }))
        .unwrap();
        let pkt = DataPacket::decode(&bytes).unwrap();
        assert!(!pkt.verify_checksum());
    }

    #[test]
    fn fin_packet_carries_sentinel_payload() {
        let pkt = DataPacket::fin(42);
        assert!(pkt.terminate);
        assert_eq!(pkt.data, FIN_SENTINEL);
    }

    #[test]
    fn ack_and_fin_ack_are_disjoint_on_the_wire() {
        let ack = AckPacket::ack(5);
        let fin_ack = AckPacket::fin_ack();

        let ack_bytes = ack.encode().unwrap();
        let fin_ack_bytes = fin_ack.encode().unwrap();

        match AckPacket::decode(&ack_bytes).unwrap() {
            AckPacket::Ack { ack: 5 } => {}
            other => panic!("expected Ack(5), got {other:?}"),
        }
        match AckPacket::decode(&fin_ack_bytes).unwrap() {
            AckPacket::FinAck { fin_ack: true } => {}
            other => panic!("expected FinAck(true), got {other:?}"),
        }
    }
}
