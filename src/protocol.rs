//! Wire format between sender and receiver.
//!
//! There is no magic number, version or length prefix: both ends must agree on
//! the frame size, sample rate and wire variant out of band. PCM payloads are
//! little-endian i16, header fields are big-endian u32.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, BytesMut};

/// Size of the telemetry header: mode (u32 BE) + rms (u32 BE).
pub const HEADER_LEN: usize = 8;

/// Wire variant, selected per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Frames back to back, no delimiter.
    Raw,
    /// `header(8) || payload` per frame.
    Telemetry,
}

impl WireFormat {
    pub fn header_len(self) -> usize {
        match self {
            WireFormat::Raw => 0,
            WireFormat::Telemetry => HEADER_LEN,
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Raw => f.write_str("raw"),
            WireFormat::Telemetry => f.write_str("telemetry"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(WireFormat::Raw),
            "telemetry" | "framed" => Ok(WireFormat::Telemetry),
            other => Err(format!("unknown wire format: {}", other)),
        }
    }
}

/// Header of the telemetry variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub mode: u32,
    pub rms: u32,
}

impl PacketHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&self.mode.to_be_bytes());
        out[4..].copy_from_slice(&self.rms.to_be_bytes());
        out
    }

    pub fn decode(mut buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            mode: buf.get_u32(),
            rms: buf.get_u32(),
        })
    }
}

/// One unit taken off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Option<PacketHeader>,
    pub samples: Vec<i16>,
}

/// Serialize one frame for the wire, appending to `out`.
pub fn encode_packet(
    format: WireFormat,
    header: PacketHeader,
    samples: &[i16],
    out: &mut BytesMut,
) {
    out.reserve(format.header_len() + samples.len() * 2);
    if format == WireFormat::Telemetry {
        out.put_slice(&header.encode());
    }
    for &s in samples {
        out.put_i16_le(s);
    }
}

/// Rebuilds fixed-size frames from an arbitrarily fragmented byte stream.
///
/// Partial units stay in the accumulator until the rest arrives.
pub struct FrameAssembler {
    format: WireFormat,
    samples_per_frame: usize,
    buf: BytesMut,
}

impl FrameAssembler {
    pub fn new(format: WireFormat, samples_per_frame: usize) -> Self {
        let unit = format.header_len() + samples_per_frame * 2;
        Self {
            format,
            samples_per_frame,
            buf: BytesMut::with_capacity(unit * 4),
        }
    }

    /// Bytes per wire unit (header included).
    pub fn unit_len(&self) -> usize {
        self.format.header_len() + self.samples_per_frame * 2
    }

    /// Bytes waiting for the rest of their unit.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete unit, if one is buffered.
    pub fn next_packet(&mut self) -> Option<Packet> {
        let unit = self.unit_len();
        if unit == 0 || self.buf.len() < unit {
            return None;
        }
        let mut bytes = self.buf.split_to(unit);

        let header = match self.format {
            WireFormat::Raw => None,
            WireFormat::Telemetry => {
                let header = PacketHeader::decode(&bytes[..HEADER_LEN]);
                bytes.advance(HEADER_LEN);
                header
            }
        };

        let mut samples = Vec::with_capacity(self.samples_per_frame);
        while bytes.has_remaining() {
            samples.push(bytes.get_i16_le());
        }

        Some(Packet { header, samples })
    }

    /// Append `chunk` and return every unit it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Packet> {
        self.extend(chunk);
        std::iter::from_fn(|| self.next_packet()).collect()
    }
}
