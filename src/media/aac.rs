//! AAC AudioSpecificConfig parsing
//!
//! AAC over RTP uses the mpeg4-generic payload format, whose fmtp line
//! carries the AudioSpecificConfig as a hex string:
//!
//! ```text
//! a=fmtp:<pt> profile-level-id=1;mode=AAC-hbr;sizelength=13;indexlength=3;
//!             indexdeltalength=3;config=1190
//! ```

use std::fmt::Write as _;

use bytes::Bytes;

use crate::error::{MediaError, Result};

/// AudioSpecificConfig (codec global header)
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    /// Audio object type (profile)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, etc.)
    pub channel_configuration: u8,
    /// Raw config bytes
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    /// Standard sampling frequencies by index
    const SAMPLING_FREQUENCIES: [u32; 16] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0,
        0, 0,
    ];

    /// Parse from codec extradata
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacConfig.into());
        }

        // audioObjectType: 5 bits
        // samplingFrequencyIndex: 4 bits
        // if (samplingFrequencyIndex == 0xf) samplingFrequency: 24 bits
        // channelConfiguration: 4 bits
        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | ((b1 >> 7) & 0x01);

        let (sampling_frequency, channel_configuration) = if sampling_frequency_index == 0x0F {
            if data.len() < 5 {
                return Err(MediaError::InvalidAacConfig.into());
            }
            let f0 = (data[1] & 0x7F) as u32;
            let f1 = data[2] as u32;
            let f2 = data[3] as u32;
            let f3 = (data[4] >> 7) as u32;
            let frequency = (f0 << 17) | (f1 << 9) | (f2 << 1) | f3;
            (frequency, (data[4] >> 3) & 0x0F)
        } else {
            let frequency = Self::SAMPLING_FREQUENCIES[sampling_frequency_index as usize];
            if frequency == 0 {
                return Err(MediaError::InvalidAacConfig.into());
            }
            (frequency, (b1 >> 3) & 0x0F)
        };

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            raw: data,
        })
    }

    /// Get channel count
    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            1..=6 => self.channel_configuration,
            7 => 8, // 7.1
            _ => 0, // Defined in stream
        }
    }

    /// Raw config as lowercase hex
    pub fn config_hex(&self) -> String {
        let mut out = String::with_capacity(self.raw.len() * 2);
        for byte in self.raw.iter() {
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }

    /// mpeg4-generic fmtp parameters
    pub fn fmtp(&self) -> String {
        format!(
            "profile-level-id=1;mode=AAC-hbr;sizelength=13;indexlength=3;indexdeltalength=3;config={}",
            self.config_hex()
        )
    }
}
