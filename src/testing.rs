//! In-memory capabilities for tests
//!
//! - [`MemoryEngine`]: peer-connection engine with scripted state changes
//!   delivered from its own thread, track bookkeeping and leak counters
//! - [`ScriptedHttp`]: HTTP transport replaying queued responses
//! - [`MemoryRtp`]: RTP codec layer framing each packet as
//!   `[keyframe flag] ++ payload`

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::StatusCode;

use crate::engine::{
    Direction, EngineLogLevel, LogSink, PeerConnection, PeerConnectionEngine, RtcCodec,
    RtcConfiguration, SdpType, StateCallback, TrackId, TrackInit,
};
use crate::error::{EngineError, Error, Result, SignalingError};
use crate::media::{CodecId, MediaKind, Packet, StreamParams};
use crate::rtp::{payload_type_for, PacketTransport, RtpCodecLayer, RtpReader, RtpWriter};
use crate::sdp::MediaDescription;
use crate::session::state::ConnectionState;
use crate::session::Backend;
use crate::signaling::{HttpTransport, SignalingRequest, SignalingResponse};

/// Minimal answer accepted by [`MemoryEngine`] peers
pub const ANSWER_SDP: &str = "v=0\r\n\
o=- 1 1 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n";

/// Delay between scripted state notifications
const SCRIPT_STEP: Duration = Duration::from_millis(2);

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Backend over in-memory capabilities
pub fn backend(engine: &MemoryEngine, http: &ScriptedHttp) -> Backend {
    backend_with_rtp(engine, http, &MemoryRtp::new())
}

pub fn backend_with_rtp(engine: &MemoryEngine, http: &ScriptedHttp, rtp: &MemoryRtp) -> Backend {
    init_tracing();
    Backend {
        engine: Arc::new(engine.clone()),
        http: Arc::new(http.clone()),
        rtp: Arc::new(rtp.clone()),
    }
}

/// Track as the engine saw it added
#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub handle: TrackId,
    pub direction: Direction,
    pub codec: RtcCodec,
    pub payload_type: u8,
    pub ssrc: u32,
    pub mid: String,
    pub name: String,
    pub msid: String,
    pub track_id: String,
    pub profile: Option<String>,
}

impl TrackRecord {
    fn new(handle: TrackId, init: &TrackInit) -> Self {
        Self {
            handle,
            direction: init.direction,
            codec: init.codec,
            payload_type: init.payload_type,
            ssrc: init.ssrc,
            mid: init.mid.clone(),
            name: init.name.clone(),
            msid: init.msid.clone(),
            track_id: init.track_id.clone(),
            profile: init.profile.clone(),
        }
    }

    /// Media line the engine negotiates for this track
    fn describe(&self) -> MediaDescription {
        let codec = self.codec.codec_id();
        let channels = match codec.kind() {
            MediaKind::Audio if codec == CodecId::Opus => Some(2),
            MediaKind::Audio => Some(1),
            MediaKind::Video => None,
        };
        MediaDescription {
            kind: codec.kind(),
            port: 9,
            protocol: "UDP/TLS/RTP/SAVPF".to_owned(),
            payload_type: self.payload_type,
            codec,
            clock_rate: codec.clock_rate(48_000),
            channels,
            fmtp: self.profile.clone(),
            mid: Some(self.mid.clone()),
            direction: Some(self.direction),
        }
    }
}

#[derive(Default)]
struct EngineShared {
    next_track: AtomicU32,
    tracks_added: AtomicUsize,
    peers_created: AtomicUsize,
    refuse_peers: AtomicBool,
    refuse_tracks_after: Mutex<Option<usize>>,
    script: Mutex<Vec<ConnectionState>>,
    /// Answered codec, payload type and fmtp per mid
    answers: Mutex<HashMap<String, (RtcCodec, u8, Option<String>)>>,
    logger_installs: AtomicUsize,
}

/// In-memory peer-connection engine
#[derive(Clone, Default)]
pub struct MemoryEngine {
    shared: Arc<EngineShared>,
    peers: Arc<Mutex<Vec<Arc<MemoryPeer>>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// States delivered, from another thread, once a remote answer is applied
    pub fn script_states(&self, states: &[ConnectionState]) {
        *self.shared.script.lock().unwrap() = states.to_vec();
    }

    /// Answer the track with `mid` using another codec and payload type
    /// than the one it was offered with
    pub fn answer_track(&self, mid: &str, codec: RtcCodec, payload_type: u8, fmtp: Option<&str>) {
        self.shared.answers.lock().unwrap().insert(
            mid.to_owned(),
            (codec, payload_type, fmtp.map(str::to_owned)),
        );
    }

    /// Times `set_logger` was called on this engine
    pub fn logger_installs(&self) -> usize {
        self.shared.logger_installs.load(Ordering::SeqCst)
    }

    pub fn refuse_peer_connections(&self) {
        self.shared.refuse_peers.store(true, Ordering::SeqCst);
    }

    /// Refuse every track added after the first `n`
    pub fn refuse_tracks_after(&self, n: usize) {
        *self.shared.refuse_tracks_after.lock().unwrap() = Some(n);
    }

    /// Deliver a state change to the most recent peer connection
    pub fn notify(&self, state: ConnectionState) {
        if let Some(peer) = self.latest() {
            peer.notify(state);
        }
    }

    pub fn peers_created(&self) -> usize {
        self.shared.peers_created.load(Ordering::SeqCst)
    }

    /// Peer connections not yet closed
    pub fn live_peers(&self) -> usize {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .filter(|p| !p.closed.load(Ordering::SeqCst))
            .count()
    }

    /// Tracks not yet deleted, across every peer connection
    pub fn live_tracks(&self) -> usize {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.tracks.lock().unwrap().len())
            .sum()
    }

    /// Live tracks of the most recent peer connection, in add order
    pub fn tracks(&self) -> Vec<TrackRecord> {
        self.latest()
            .map(|p| p.tracks.lock().unwrap().values().cloned().collect())
            .unwrap_or_default()
    }

    /// Queue an incoming message on a track
    pub fn push_incoming(&self, track: TrackId, data: &[u8]) {
        for peer in self.peers.lock().unwrap().iter() {
            if peer.tracks.lock().unwrap().contains_key(&track.get()) {
                peer.incoming
                    .lock()
                    .unwrap()
                    .entry(track.get())
                    .or_default()
                    .push_back(data.to_vec());
            }
        }
    }

    /// Messages sent on a track
    pub fn sent(&self, track: TrackId) -> Vec<Vec<u8>> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.sent.lock().unwrap().clone())
            .filter(|(t, _)| *t == track)
            .map(|(_, data)| data)
            .collect()
    }

    /// Messages sent on any track
    pub fn sent_all(&self) -> Vec<Vec<u8>> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.sent.lock().unwrap().clone())
            .map(|(_, data)| data)
            .collect()
    }

    fn latest(&self) -> Option<Arc<MemoryPeer>> {
        self.peers.lock().unwrap().last().cloned()
    }
}

impl PeerConnectionEngine for MemoryEngine {
    fn create_peer_connection(
        &self,
        _config: &RtcConfiguration,
    ) -> std::result::Result<Arc<dyn PeerConnection>, EngineError> {
        if self.shared.refuse_peers.load(Ordering::SeqCst) {
            return Err(EngineError::Failure("peer connection refused".into()));
        }
        self.shared.peers_created.fetch_add(1, Ordering::SeqCst);

        let peer = Arc::new(MemoryPeer {
            shared: Arc::clone(&self.shared),
            callback: Mutex::new(None),
            tracks: Mutex::new(BTreeMap::new()),
            incoming: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(peer)
    }

    fn set_logger(&self, _level: EngineLogLevel, sink: LogSink) {
        self.shared.logger_installs.fetch_add(1, Ordering::SeqCst);
        sink(EngineLogLevel::Info, "memory engine logger installed");
    }
}

type SharedCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

struct MemoryPeer {
    shared: Arc<EngineShared>,
    callback: Mutex<Option<SharedCallback>>,
    /// Keyed by raw handle, so iteration follows add order
    tracks: Mutex<BTreeMap<u32, TrackRecord>>,
    incoming: Mutex<HashMap<u32, VecDeque<Vec<u8>>>>,
    sent: Mutex<Vec<(TrackId, Vec<u8>)>>,
    local: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl MemoryPeer {
    fn notify(&self, state: ConnectionState) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(state);
        }
    }

    fn check_track(&self, track: TrackId) -> std::result::Result<(), EngineError> {
        if self.tracks.lock().unwrap().contains_key(&track.get()) {
            Ok(())
        } else {
            Err(EngineError::Invalid)
        }
    }
}

impl PeerConnection for MemoryPeer {
    fn on_state_change(&self, callback: StateCallback) -> std::result::Result<(), EngineError> {
        *self.callback.lock().unwrap() = Some(Arc::from(callback));
        Ok(())
    }

    fn add_track(&self, init: &TrackInit) -> std::result::Result<TrackId, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Invalid);
        }
        if let Some(limit) = *self.shared.refuse_tracks_after.lock().unwrap() {
            if self.shared.tracks_added.load(Ordering::SeqCst) >= limit {
                return Err(EngineError::Failure("track refused".into()));
            }
        }
        self.shared.tracks_added.fetch_add(1, Ordering::SeqCst);

        let raw = self.shared.next_track.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = TrackId::new(raw).ok_or(EngineError::Invalid)?;
        self.tracks
            .lock()
            .unwrap()
            .insert(raw, TrackRecord::new(handle, init));
        Ok(handle)
    }

    fn delete_track(&self, track: TrackId) {
        self.tracks.lock().unwrap().remove(&track.get());
        self.incoming.lock().unwrap().remove(&track.get());
    }

    fn set_local_description(&self, kind: SdpType) -> std::result::Result<(), EngineError> {
        if kind != SdpType::Offer {
            return Err(EngineError::Invalid);
        }
        let mut sdp = String::from("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n");
        for track in self.tracks.lock().unwrap().values() {
            sdp.push_str(&track.describe().render());
        }
        *self.local.lock().unwrap() = Some(sdp);
        Ok(())
    }

    fn local_description(&self) -> std::result::Result<String, EngineError> {
        self.local.lock().unwrap().clone().ok_or(EngineError::Invalid)
    }

    fn set_remote_description(
        &self,
        sdp: &str,
        kind: SdpType,
    ) -> std::result::Result<(), EngineError> {
        if kind != SdpType::Answer || !sdp.starts_with("v=0") {
            return Err(EngineError::Failure("invalid remote description".into()));
        }

        let script = self.shared.script.lock().unwrap().clone();
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            std::thread::spawn(move || {
                for state in script {
                    std::thread::sleep(SCRIPT_STEP);
                    callback(state);
                }
            });
        }
        Ok(())
    }

    fn track_description(&self, track: TrackId) -> std::result::Result<String, EngineError> {
        let mut negotiated = self
            .tracks
            .lock()
            .unwrap()
            .get(&track.get())
            .cloned()
            .ok_or(EngineError::Invalid)?;
        if let Some((codec, payload_type, fmtp)) =
            self.shared.answers.lock().unwrap().get(&negotiated.mid).cloned()
        {
            negotiated.codec = codec;
            negotiated.payload_type = payload_type;
            negotiated.profile = fmtp;
        }
        Ok(negotiated.describe().render())
    }

    fn send(&self, track: TrackId, data: &[u8]) -> std::result::Result<(), EngineError> {
        self.check_track(track)?;
        self.sent.lock().unwrap().push((track, data.to_vec()));
        Ok(())
    }

    fn receive(&self, track: TrackId, buf: &mut [u8]) -> std::result::Result<usize, EngineError> {
        self.check_track(track)?;
        let mut incoming = self.incoming.lock().unwrap();
        let queue = incoming.entry(track.get()).or_default();
        let Some(message) = queue.front() else {
            return Err(EngineError::NotAvailable);
        };
        if message.len() > buf.len() {
            return Err(EngineError::TooSmall);
        }
        let n = message.len();
        buf[..n].copy_from_slice(message);
        queue.pop_front();
        Ok(n)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct HttpScript {
    responses: VecDeque<std::result::Result<SignalingResponse, SignalingError>>,
    requests: Vec<SignalingRequest>,
}

/// HTTP transport replaying queued responses in order
#[derive(Clone, Default)]
pub struct ScriptedHttp {
    inner: Arc<Mutex<HttpScript>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: SignalingResponse) {
        self.inner.lock().unwrap().responses.push_back(Ok(response));
    }

    pub fn push_error(&self, error: SignalingError) {
        self.inner.lock().unwrap().responses.push_back(Err(error));
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<SignalingRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// `201 Created` with a resource location and an answer body
    pub fn created(location: &str, body: &str) -> SignalingResponse {
        SignalingResponse {
            status: StatusCode::CREATED,
            location: Some(location.to_owned()),
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    pub fn redirect(status: u16, location: &str) -> SignalingResponse {
        SignalingResponse {
            status: StatusCode::from_u16(status).unwrap(),
            location: Some(location.to_owned()),
            body: Bytes::new(),
        }
    }

    pub fn status(status: u16) -> SignalingResponse {
        SignalingResponse {
            status: StatusCode::from_u16(status).unwrap(),
            location: None,
            body: Bytes::new(),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedHttp {
    async fn execute(
        &self,
        request: SignalingRequest,
    ) -> std::result::Result<SignalingResponse, SignalingError> {
        let mut script = self.inner.lock().unwrap();
        script.requests.push(request);
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(SignalingError::Transport("connection refused".into())))
    }
}

/// Writer as seen by the RTP layer
#[derive(Debug)]
pub struct WriterRecord {
    pub payload_type: u8,
    pub ssrc: u32,
    pub params: StreamParams,
    pub packets: Mutex<Vec<Packet>>,
}

/// Reader as opened from a negotiated media line
#[derive(Debug)]
pub struct ReaderRecord {
    pub payload_type: u8,
    pub codec: CodecId,
    pub fmtp: Option<String>,
}

#[derive(Default)]
struct RtpShared {
    writers: Mutex<Vec<Arc<WriterRecord>>>,
    readers: Mutex<Vec<Arc<ReaderRecord>>>,
    open: AtomicUsize,
}

/// In-memory RTP codec layer
#[derive(Clone, Default)]
pub struct MemoryRtp {
    shared: Arc<RtpShared>,
}

impl MemoryRtp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writers and readers not yet dropped
    pub fn open_sessions(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub fn writers(&self) -> Vec<Arc<WriterRecord>> {
        self.shared.writers.lock().unwrap().clone()
    }

    pub fn readers(&self) -> Vec<Arc<ReaderRecord>> {
        self.shared.readers.lock().unwrap().clone()
    }
}

impl RtpCodecLayer for MemoryRtp {
    fn open_writer(
        &self,
        params: &StreamParams,
        index: usize,
        transport: Arc<dyn PacketTransport>,
    ) -> Result<Box<dyn RtpWriter>> {
        let record = Arc::new(WriterRecord {
            payload_type: payload_type_for(params.codec, index),
            ssrc: fastrand::u32(..),
            params: params.clone(),
            packets: Mutex::new(Vec::new()),
        });
        self.shared.writers.lock().unwrap().push(Arc::clone(&record));
        self.shared.open.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryWriter {
            record,
            transport,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn open_reader(
        &self,
        media: &MediaDescription,
        transport: Arc<dyn PacketTransport>,
    ) -> Result<Box<dyn RtpReader>> {
        self.shared
            .readers
            .lock()
            .unwrap()
            .push(Arc::new(ReaderRecord {
                payload_type: media.payload_type,
                codec: media.codec,
                fmtp: media.fmtp.clone(),
            }));
        self.shared.open.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryReader {
            params: media.stream_params(),
            transport,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemoryWriter {
    record: Arc<WriterRecord>,
    transport: Arc<dyn PacketTransport>,
    shared: Arc<RtpShared>,
}

impl RtpWriter for MemoryWriter {
    fn payload_type(&self) -> u8 {
        self.record.payload_type
    }

    fn ssrc(&self) -> u32 {
        self.record.ssrc
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let mut message = Vec::with_capacity(packet.data.len() + 1);
        message.push(packet.keyframe as u8);
        message.extend_from_slice(&packet.data);
        if message.len() > self.transport.max_packet_size() {
            return Err(Error::Rtp("packet exceeds transport size".into()));
        }

        self.transport.send(&message)?;
        self.record.packets.lock().unwrap().push(packet.clone());
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.shared.open.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MemoryReader {
    params: StreamParams,
    transport: Arc<dyn PacketTransport>,
    shared: Arc<RtpShared>,
}

impl RtpReader for MemoryReader {
    fn params(&self) -> &StreamParams {
        &self.params
    }

    fn read_packet(&mut self) -> Result<Packet> {
        let mut buf = vec![0u8; self.transport.max_packet_size()];
        let n = self.transport.recv(&mut buf)?;
        let Some((&flag, payload)) = buf[..n].split_first() else {
            return Err(Error::Rtp("empty message".into()));
        };

        let mut packet = Packet::new(0, 0, Bytes::copy_from_slice(payload));
        packet.keyframe = flag == 1;
        Ok(packet)
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.shared.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_http_replays_in_order() {
        let http = ScriptedHttp::new();
        http.push(ScriptedHttp::status(204));

        let request = SignalingRequest {
            method: hyper::Method::DELETE,
            url: "http://localhost/r".into(),
            headers: Default::default(),
            body: Bytes::new(),
            max_response_size: 16,
        };

        let response = tokio_test::assert_ok!(tokio_test::block_on(http.execute(request.clone())));
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        tokio_test::assert_err!(tokio_test::block_on(http.execute(request)));
        assert_eq!(http.requests().len(), 2);
    }

    #[test]
    fn test_memory_peer_receive_semantics() {
        let engine = MemoryEngine::new();
        let peer = engine
            .create_peer_connection(&RtcConfiguration::default())
            .unwrap();
        let init = TrackInit {
            direction: Direction::RecvOnly,
            codec: RtcCodec::Opus,
            payload_type: 97,
            ssrc: 7,
            mid: "1".into(),
            name: "n".into(),
            msid: "m".into(),
            track_id: "m-audio".into(),
            profile: None,
        };
        let track = peer.add_track(&init).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(peer.receive(track, &mut buf), Err(EngineError::NotAvailable));
        engine.push_incoming(track, &[1, 2, 3]);
        assert_eq!(peer.receive(track, &mut buf), Err(EngineError::TooSmall));
        let mut buf = [0u8; 3];
        assert_eq!(peer.receive(track, &mut buf), Ok(3));

        let description = peer.track_description(track).unwrap();
        let media = MediaDescription::parse(&description).unwrap();
        assert_eq!(media.payload_type, 97);
        assert_eq!(media.codec, CodecId::Opus);
    }
}
