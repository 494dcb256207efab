//! RTP codec layer capability
//!
//! Packetization and depacketization are supplied by the caller. The
//! session hands each opened writer/reader a [`PacketTransport`] for its
//! track and only ever moves whole elementary-stream packets through it.

pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::media::{CodecId, Packet, StreamParams};
use crate::sdp::MediaDescription;

pub use transport::TrackTransport;

/// Largest RTP packet handed to the transport
pub const RTP_MAX_PACKET_SIZE: usize = 1280;

/// First dynamic RTP payload type
pub const DYNAMIC_PAYLOAD_TYPE_BASE: u8 = 96;

/// Payload type conventionally allocated to a stream at `index`.
///
/// Static types for G.711, dynamic types offset by stream index otherwise.
pub fn payload_type_for(codec: CodecId, index: usize) -> u8 {
    match codec {
        CodecId::PcmMulaw => 0,
        CodecId::PcmAlaw => 8,
        _ => DYNAMIC_PAYLOAD_TYPE_BASE.saturating_add(index.min(31) as u8),
    }
}

/// Message-oriented byte transport for one track
pub trait PacketTransport: Send + Sync {
    /// Receive one message into `buf`
    fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// Send one message
    fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Largest message this transport accepts
    fn max_packet_size(&self) -> usize {
        RTP_MAX_PACKET_SIZE
    }

    /// Timeout the underlying transport enforces per call
    fn rw_timeout(&self) -> Duration;
}

/// Packetizer for one outgoing stream
pub trait RtpWriter: Send {
    /// Payload type the writer stamps on outgoing packets
    fn payload_type(&self) -> u8;

    /// Synchronization source of outgoing packets
    fn ssrc(&self) -> u32;

    /// Packetize and send one elementary-stream packet
    fn write_packet(&mut self, packet: &Packet) -> Result<()>;
}

/// Depacketizer for one incoming stream
pub trait RtpReader: Send {
    /// Parameters of the stream being received
    fn params(&self) -> &StreamParams;

    /// Read the next elementary-stream packet; `Error::WouldBlock` when
    /// nothing is available yet
    fn read_packet(&mut self) -> Result<Packet>;
}

/// Factory for RTP writers and readers
pub trait RtpCodecLayer: Send + Sync {
    /// Open a packetizer for a caller stream
    fn open_writer(
        &self,
        params: &StreamParams,
        index: usize,
        transport: Arc<dyn PacketTransport>,
    ) -> Result<Box<dyn RtpWriter>>;

    /// Open a depacketizer for a negotiated media line
    fn open_reader(
        &self,
        media: &MediaDescription,
        transport: Arc<dyn PacketTransport>,
    ) -> Result<Box<dyn RtpReader>>;
}
