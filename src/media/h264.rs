//! H.264/AVC helpers
//!
//! WebRTC carries H.264 as Annex B NAL units. The stream's global header
//! may arrive either as an AVCDecoderConfigurationRecord (avcC) or as raw
//! Annex B parameter sets; both are accepted. Access units of an avcC
//! stream are length-prefixed and are converted with [`avcc_to_annexb`].
//!
//! AVCDecoderConfigurationRecord:
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

/// Annex B start code
const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            _ => None,
        }
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// H.264 decoder configuration
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, etc.)
    pub profile: u8,
    /// Profile compatibility flags
    pub compatibility: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    /// Sequence Parameter Sets (without start codes)
    pub sps: Vec<Bytes>,
    /// Picture Parameter Sets (without start codes)
    pub pps: Vec<Bytes>,
    /// Size of the NALU length prefix in access units; `None` for Annex B
    pub nalu_length_size: Option<u8>,
}

impl AvcConfig {
    /// Parse a codec global header in either avcC or Annex B form
    pub fn from_extradata(extradata: &Bytes) -> Result<Self> {
        if extradata.first() == Some(&1) {
            Self::parse_avcc(extradata.clone())
        } else {
            Self::parse_annexb(extradata)
        }
    }

    /// Parse an AVCDecoderConfigurationRecord
    pub fn parse_avcc(mut data: Bytes) -> Result<Self> {
        if data.len() < 7 {
            return Err(MediaError::InvalidAvcConfig.into());
        }

        let version = data.get_u8();
        if version != 1 {
            return Err(MediaError::InvalidAvcConfig.into());
        }

        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = read_length_prefixed(&mut data, num_sps)?;

        if data.is_empty() {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        let num_pps = data.get_u8() as usize;
        let pps = read_length_prefixed(&mut data, num_pps)?;

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            sps,
            pps,
            nalu_length_size: Some(nalu_length_size),
        })
    }

    /// Collect SPS/PPS from Annex B data; profile comes from the first SPS
    pub fn parse_annexb(data: &Bytes) -> Result<Self> {
        let mut sps = Vec::new();
        let mut pps = Vec::new();

        for nalu in AnnexBNalus::new(data) {
            match nalu.first().copied().and_then(NaluType::from_byte) {
                Some(NaluType::Sps) => sps.push(data.slice_ref(nalu)),
                Some(NaluType::Pps) => pps.push(data.slice_ref(nalu)),
                _ => {}
            }
        }

        let first = sps.first().ok_or(MediaError::InvalidAvcConfig)?;
        if first.len() < 4 {
            return Err(MediaError::InvalidAvcConfig.into());
        }

        Ok(AvcConfig {
            profile: first[1],
            compatibility: first[2],
            level: first[3],
            sps,
            pps,
            nalu_length_size: None,
        })
    }

    /// `profile-level-id` fmtp value (6 hex digits)
    pub fn profile_level_id(&self) -> String {
        format!(
            "{:02x}{:02x}{:02x}",
            self.profile, self.compatibility, self.level
        )
    }

    /// Parameter sets as Annex B, SPS first
    pub fn annexb_parameter_sets(&self) -> Bytes {
        let len: usize = self
            .sps
            .iter()
            .chain(self.pps.iter())
            .map(|p| p.len() + START_CODE.len())
            .sum();

        let mut out = BytesMut::with_capacity(len);
        for nalu in self.sps.iter().chain(self.pps.iter()) {
            out.put_slice(&START_CODE);
            out.put_slice(nalu);
        }
        out.freeze()
    }
}

fn read_length_prefixed(data: &mut Bytes, count: usize) -> Result<Vec<Bytes>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        if data.len() < 2 {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        let len = data.get_u16() as usize;
        if data.len() < len {
            return Err(MediaError::InvalidAvcConfig.into());
        }
        out.push(data.copy_to_bytes(len));
    }
    Ok(out)
}

/// Rewrite a length-prefixed (AVCC) access unit as Annex B
pub fn avcc_to_annexb(access_unit: &[u8], length_size: u8) -> Result<Bytes> {
    let length_size = length_size as usize;
    if !(1..=4).contains(&length_size) {
        return Err(MediaError::InvalidAccessUnit.into());
    }

    let mut out = BytesMut::with_capacity(access_unit.len() + START_CODE.len());
    let mut rest = access_unit;
    while !rest.is_empty() {
        if rest.len() < length_size {
            return Err(MediaError::InvalidAccessUnit.into());
        }
        let (prefix, tail) = rest.split_at(length_size);
        let len = prefix.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        if len == 0 || tail.len() < len {
            return Err(MediaError::InvalidAccessUnit.into());
        }

        out.put_slice(&START_CODE);
        out.put_slice(&tail[..len]);
        rest = &tail[len..];
    }
    Ok(out.freeze())
}

/// Check whether an Annex B access unit already carries an SPS
pub fn contains_sps(data: &[u8]) -> bool {
    AnnexBNalus::new(data)
        .any(|nalu| nalu.first().copied().and_then(NaluType::from_byte) == Some(NaluType::Sps))
}

/// Prefix a keyframe with the stream's parameter sets.
///
/// Browsers only start decoding at a keyframe carrying SPS/PPS; access
/// units that already contain an SPS are returned unchanged.
pub fn insert_parameter_sets(access_unit: &Bytes, parameter_sets: &Bytes) -> Bytes {
    if parameter_sets.is_empty() || contains_sps(access_unit) {
        return access_unit.clone();
    }

    let mut out = BytesMut::with_capacity(parameter_sets.len() + access_unit.len());
    out.put_slice(parameter_sets);
    out.put_slice(access_unit);
    out.freeze()
}

/// Iterator over NAL units in Annex B byte stream format
pub struct AnnexBNalus<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> AnnexBNalus<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let offset = find_start_code(data, 0).map(|(_, end)| end).unwrap_or(data.len());
        Self { data, offset }
    }
}

impl<'a> Iterator for AnnexBNalus<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let start = self.offset;
        match find_start_code(self.data, start) {
            Some((code_start, code_end)) => {
                self.offset = code_end;
                Some(&self.data[start..code_start])
            }
            None => {
                self.offset = self.data.len();
                Some(&self.data[start..])
            }
        }
    }
}

/// Find the next 3- or 4-byte start code at or after `from`.
/// Returns (start of code, first byte after code).
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let start = if i > from && data[i - 1] == 0 { i - 1 } else { i };
            return Some((start, i + 3));
        }
        i += 1;
    }
    None
}
