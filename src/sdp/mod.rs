//! Session description helpers
//!
//! Only the parts of SDP the session needs are handled here:
//! - size bounding of offer/answer text
//! - rendering a local media section for a caller stream (to derive fmtp)
//! - parsing a negotiated media section back into codec parameters
//!
//! Media section layout:
//! ```text
//! m=video 9 UDP/TLS/RTP/SAVPF 96
//! a=mid:0
//! a=sendonly
//! a=rtpmap:96 H264/90000
//! a=fmtp:96 packetization-mode=1;profile-level-id=42e01f
//! ```

use std::fmt::Write as _;

use crate::engine::Direction;
use crate::error::{Result, SignalingError};
use crate::media::{AudioSpecificConfig, AvcConfig, CodecId, MediaKind, StreamParams};

/// Maximum size of any session description handled by the session
pub const SDP_MAX_SIZE: usize = 16384;

/// Default transport profile for media lines rendered locally
const RTP_PROFILE: &str = "RTP/AVP";

/// Reject descriptions larger than [`SDP_MAX_SIZE`]. Never truncates.
pub fn check_size(len: usize) -> std::result::Result<(), SignalingError> {
    if len > SDP_MAX_SIZE {
        Err(SignalingError::DescriptionTooLarge {
            limit: SDP_MAX_SIZE,
        })
    } else {
        Ok(())
    }
}

/// Split a description into its media sections (each starting at `m=`)
pub fn media_sections(sdp: &str) -> Vec<&str> {
    let mut starts: Vec<usize> = Vec::new();
    let mut offset = 0;
    for line in sdp.split_inclusive('\n') {
        if line.starts_with("m=") {
            starts.push(offset);
        }
        offset += line.len();
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(sdp.len());
            &sdp[start..end]
        })
        .collect()
}

/// Extract the parameters of the first `a=fmtp:` line
pub fn extract_fmtp(sdp: &str) -> Option<String> {
    sdp.lines()
        .map(|line| line.trim_end_matches('\r'))
        .find_map(|line| line.strip_prefix("a=fmtp:"))
        .and_then(|rest| rest.split_once(' '))
        .map(|(_, params)| params.trim().to_owned())
        .filter(|params| !params.is_empty())
}

/// Render a media section for a caller stream.
///
/// Used on the ingest path to derive the format parameters the engine
/// should advertise for the track.
pub fn write_media(params: &StreamParams, payload_type: u8) -> Result<String> {
    let media = MediaDescription::for_stream(params, payload_type)?;
    Ok(media.render())
}

/// One negotiated media line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub kind: MediaKind,
    pub port: u16,
    pub protocol: String,
    pub payload_type: u8,
    pub codec: CodecId,
    pub clock_rate: u32,
    /// Audio channel count, if stated
    pub channels: Option<u8>,
    pub fmtp: Option<String>,
    pub mid: Option<String>,
    pub direction: Option<Direction>,
}

impl MediaDescription {
    /// Describe a caller stream
    pub fn for_stream(params: &StreamParams, payload_type: u8) -> Result<Self> {
        let channels = match params.kind {
            MediaKind::Audio => Some(match params.codec {
                CodecId::Opus => 2,
                CodecId::PcmAlaw | CodecId::PcmMulaw => 1,
                _ => params.channels,
            }),
            MediaKind::Video => None,
        };

        Ok(Self {
            kind: params.kind,
            port: 0,
            protocol: RTP_PROFILE.to_owned(),
            payload_type,
            codec: params.codec,
            clock_rate: params.codec.clock_rate(params.sample_rate),
            channels,
            fmtp: stream_fmtp(params)?,
            mid: None,
            direction: None,
        })
    }

    /// Parse the first media section of `sdp`
    pub fn parse(sdp: &str) -> std::result::Result<Self, SignalingError> {
        let section = media_sections(sdp)
            .into_iter()
            .next()
            .ok_or_else(|| SignalingError::Malformed("no media section".into()))?;

        let mut lines = section.lines().map(|l| l.trim_end_matches('\r'));
        let m_line = lines
            .next()
            .and_then(|l| l.strip_prefix("m="))
            .ok_or_else(|| SignalingError::Malformed("missing m= line".into()))?;

        let mut fields = m_line.split_whitespace();
        let kind = match fields.next() {
            Some("audio") => MediaKind::Audio,
            Some("video") => MediaKind::Video,
            other => {
                return Err(SignalingError::Malformed(format!(
                    "unsupported media type {:?}",
                    other
                )))
            }
        };
        let port = fields
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| SignalingError::Malformed("invalid port".into()))?;
        let protocol = fields
            .next()
            .ok_or_else(|| SignalingError::Malformed("missing protocol".into()))?
            .to_owned();
        let payload_type = fields
            .next()
            .and_then(|pt| pt.parse::<u8>().ok())
            .ok_or_else(|| SignalingError::Malformed("missing payload type".into()))?;

        let mut rtpmap: Option<(CodecId, u32, Option<u8>)> = None;
        let mut fmtp = None;
        let mut mid = None;
        let mut direction = None;

        for line in lines {
            let Some(attr) = line.strip_prefix("a=") else {
                continue;
            };
            let (name, value) = attr.split_once(':').unwrap_or((attr, ""));
            match name {
                "rtpmap" => {
                    if let Some(parsed) = parse_rtpmap(value, payload_type)? {
                        rtpmap = Some(parsed);
                    }
                }
                "fmtp" => {
                    if let Some((pt, params)) = value.split_once(' ') {
                        if pt.parse::<u8>().ok() == Some(payload_type) {
                            fmtp = Some(params.trim().to_owned());
                        }
                    }
                }
                "mid" => mid = Some(value.to_owned()),
                other => {
                    if let Some(dir) = Direction::from_attribute(other) {
                        direction = Some(dir);
                    }
                }
            }
        }

        let (codec, clock_rate, channels) = match rtpmap {
            Some(parsed) => parsed,
            None => static_payload(payload_type).ok_or_else(|| {
                SignalingError::Malformed(format!("no rtpmap for payload type {}", payload_type))
            })?,
        };

        Ok(Self {
            kind,
            port,
            protocol,
            payload_type,
            codec,
            clock_rate,
            channels,
            fmtp,
            mid,
            direction,
        })
    }

    /// Render as a media section with CRLF line endings
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "m={} {} {} {}\r\n",
            self.kind, self.port, self.protocol, self.payload_type
        );
        if let Some(ref mid) = self.mid {
            let _ = write!(out, "a=mid:{}\r\n", mid);
        }
        if let Some(direction) = self.direction {
            let _ = write!(out, "a={}\r\n", direction.as_str());
        }
        let _ = write!(
            out,
            "a=rtpmap:{} {}/{}",
            self.payload_type,
            self.codec.encoding_name(),
            self.clock_rate
        );
        if let Some(channels) = self.channels {
            let _ = write!(out, "/{}", channels);
        }
        out.push_str("\r\n");
        if let Some(ref fmtp) = self.fmtp {
            let _ = write!(out, "a=fmtp:{} {}\r\n", self.payload_type, fmtp);
        }
        out
    }

    /// Stream parameters implied by this media line
    pub fn stream_params(&self) -> StreamParams {
        match self.kind {
            MediaKind::Video => {
                let mut params = StreamParams::video(self.codec, 0, 0);
                params.time_base = crate::media::TimeBase::from_clock_rate(self.clock_rate);
                params
            }
            MediaKind::Audio => {
                let mut params =
                    StreamParams::audio(self.codec, self.clock_rate, self.channels.unwrap_or(1));
                params.time_base = crate::media::TimeBase::from_clock_rate(self.clock_rate);
                params
            }
        }
    }
}

/// Parse `<pt> <name>/<rate>[/<channels>]`; `None` if it maps another
/// payload type, however malformed
fn parse_rtpmap(
    value: &str,
    payload_type: u8,
) -> std::result::Result<Option<(CodecId, u32, Option<u8>)>, SignalingError> {
    let (pt, encoding) = value.split_once(' ').unwrap_or((value, ""));
    if pt.trim().parse::<u8>().ok() != Some(payload_type) {
        return Ok(None);
    }

    let mut parts = encoding.trim().split('/');
    let name = parts.next().unwrap_or_default();
    let codec = CodecId::from_encoding_name(name)
        .ok_or_else(|| SignalingError::Malformed(format!("unknown encoding {}", name)))?;
    let clock_rate = parts
        .next()
        .and_then(|r| r.parse::<u32>().ok())
        .ok_or_else(|| SignalingError::Malformed(format!("bad clock rate in rtpmap: {}", value)))?;
    let channels = parts.next().and_then(|c| c.parse::<u8>().ok());

    Ok(Some((codec, clock_rate, channels)))
}

/// Static RTP payload types (RFC 3551) that need no rtpmap
fn static_payload(payload_type: u8) -> Option<(CodecId, u32, Option<u8>)> {
    match payload_type {
        0 => Some((CodecId::PcmMulaw, 8000, Some(1))),
        8 => Some((CodecId::PcmAlaw, 8000, Some(1))),
        _ => None,
    }
}

/// Format parameters a local stream advertises
fn stream_fmtp(params: &StreamParams) -> Result<Option<String>> {
    match params.codec {
        CodecId::H264 => {
            let mut fmtp = String::from("packetization-mode=1");
            if !params.extradata.is_empty() {
                let config = AvcConfig::from_extradata(&params.extradata)?;
                let _ = write!(fmtp, ";profile-level-id={}", config.profile_level_id());
            }
            Ok(Some(fmtp))
        }
        CodecId::Opus if params.channels == 2 => Ok(Some("sprop-stereo=1".to_owned())),
        CodecId::Aac if !params.extradata.is_empty() => {
            let config = AudioSpecificConfig::parse(params.extradata.clone())?;
            Ok(Some(config.fmtp()))
        }
        _ => Ok(None),
    }
}
