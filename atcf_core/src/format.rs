use std::fmt;
use std::str::FromStr;

/// Magic bytes for ATCF version 1 blobs.
/// 8 bytes: "ATCF1\n" followed by 2 null bytes.
pub const MAGIC: &[u8; 8] = b"ATCF1\n\x00\x00";

/// SIMD lane width of the SOA track database.
///
/// Every segment's sample count is rounded up to a multiple of this so that
/// component sweeps never need a partial final iteration.
pub const SIMD_WIDTH: u32 = 4;

/// Sentinel parent index for root transforms.
pub const INVALID_TRANSFORM_INDEX: u16 = u16::MAX;

// ── Sample formats ─────────────────────────────────────────────────────────
//
// The numeric values of these enums are serialized in compressed clips and
// form a stable contract with the decompressor. Do not reassign them without
// a format version bump.

/// Storage format for rotation tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RotationFormat {
    /// Full precision quaternion, [x,y,z,w] stored with f32.
    Quat128 = 0,
    /// Full precision quaternion, [x,y,z] stored with f32 (w is dropped).
    QuatDropW96 = 1,
    /// Quantized quaternion, [x,y,z] stored with [16,16,16] bits (w is dropped).
    QuatDropW48 = 2,
    /// Quantized quaternion, [x,y,z] stored with [11,11,10] bits (w is dropped).
    QuatDropW32 = 3,
    /// Quantized quaternion, [x,y,z] stored with [N,N,N] bits (w is dropped,
    /// same number of bits per component, N chosen per track per segment).
    QuatDropWVariable = 4,
}

/// Storage format for translation and scale tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VectorFormat {
    /// Full precision vector3, [x,y,z] stored with f32.
    Vector96 = 0,
    /// Quantized vector3, [x,y,z] stored with [16,16,16] bits.
    Vector48 = 1,
    /// Quantized vector3, [x,y,z] stored with [11,11,10] bits.
    Vector32 = 2,
    /// Quantized vector3, [x,y,z] stored with [N,N,N] bits.
    VectorVariable = 3,
}

impl RotationFormat {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Quat128),
            1 => Some(Self::QuatDropW96),
            2 => Some(Self::QuatDropW48),
            3 => Some(Self::QuatDropW32),
            4 => Some(Self::QuatDropWVariable),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Whether the format drops the quaternion W component and reconstructs
    /// it on decode as `+sqrt(1 - x^2 - y^2 - z^2)`.
    pub fn drops_w(self) -> bool {
        !matches!(self, Self::Quat128)
    }

    /// Whether the bits per component are chosen per track per segment.
    pub fn is_variable(self) -> bool {
        matches!(self, Self::QuatDropWVariable)
    }
}

impl VectorFormat {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Vector96),
            1 => Some(Self::Vector48),
            2 => Some(Self::Vector32),
            3 => Some(Self::VectorVariable),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn is_variable(self) -> bool {
        matches!(self, Self::VectorVariable)
    }
}

impl fmt::Display for RotationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Quat128 => "quat128",
            Self::QuatDropW96 => "dropw96",
            Self::QuatDropW48 => "dropw48",
            Self::QuatDropW32 => "dropw32",
            Self::QuatDropWVariable => "dropw_variable",
        };
        f.write_str(name)
    }
}

impl FromStr for RotationFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quat128" => Ok(Self::Quat128),
            "dropw96" => Ok(Self::QuatDropW96),
            "dropw48" => Ok(Self::QuatDropW48),
            "dropw32" => Ok(Self::QuatDropW32),
            "dropw_variable" | "variable" => Ok(Self::QuatDropWVariable),
            other => Err(format!(
                "unknown rotation format '{other}'. Valid options: quat128, dropw96, dropw48, dropw32, dropw_variable"
            )),
        }
    }
}

impl fmt::Display for VectorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vector96 => "vec96",
            Self::Vector48 => "vec48",
            Self::Vector32 => "vec32",
            Self::VectorVariable => "vec_variable",
        };
        f.write_str(name)
    }
}

impl FromStr for VectorFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vec96" => Ok(Self::Vector96),
            "vec48" => Ok(Self::Vector48),
            "vec32" => Ok(Self::Vector32),
            "vec_variable" | "variable" => Ok(Self::VectorVariable),
            other => Err(format!(
                "unknown vector format '{other}'. Valid options: vec96, vec48, vec32, vec_variable"
            )),
        }
    }
}

// ── Bit rates ──────────────────────────────────────────────────────────────

/// Bits per component at each bit rate. Bit rate 0 is reserved for tracks
/// that are constant within a segment; the highest bit rate stores raw f32.
///
/// These indices are serialized in compressed clips; the table is a stable
/// contract with the decompressor.
pub const BIT_RATE_NUM_BITS: [u8; 19] = [
    0, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 32,
];

pub const INVALID_BIT_RATE: u8 = 0xFF;
pub const LOWEST_BIT_RATE: u8 = 1;
pub const HIGHEST_BIT_RATE: u8 = (BIT_RATE_NUM_BITS.len() - 1) as u8;
pub const NUM_BIT_RATES: u8 = BIT_RATE_NUM_BITS.len() as u8;

/// When variable and fixed formats are mixed within one pose, fixed-format
/// tracks are aligned to this many bits in the packed stream.
pub const MIXED_PACKING_ALIGNMENT_NUM_BITS: u32 = 16;

/// Bits per component for `bit_rate`.
///
/// An out-of-range bit rate is a programming error.
#[inline]
pub fn num_bits_at_bit_rate(bit_rate: u8) -> u32 {
    assert!(
        bit_rate <= HIGHEST_BIT_RATE,
        "invalid bit rate: {bit_rate}"
    );
    u32::from(BIT_RATE_NUM_BITS[bit_rate as usize])
}

/// Track is constant within the segment; its sample lives in the clip range
/// data and the segment carries no per-sample payload.
#[inline]
pub const fn is_constant_bit_rate(bit_rate: u8) -> bool {
    bit_rate == 0
}

/// Track is stored as raw f32 with no quantization loss.
#[inline]
pub const fn is_raw_bit_rate(bit_rate: u8) -> bool {
    bit_rate == HIGHEST_BIT_RATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_rate_table_is_the_stable_contract() {
        assert_eq!(NUM_BIT_RATES, 19);
        assert_eq!(num_bits_at_bit_rate(0), 0);
        assert_eq!(num_bits_at_bit_rate(1), 3);
        assert_eq!(num_bits_at_bit_rate(HIGHEST_BIT_RATE), 32);
        assert!(is_constant_bit_rate(0));
        assert!(is_raw_bit_rate(18));
        assert!(!is_raw_bit_rate(17));
    }

    #[test]
    fn format_tags_round_trip() {
        for tag in 0..5u8 {
            assert_eq!(RotationFormat::from_tag(tag).unwrap().tag(), tag);
        }
        for tag in 0..4u8 {
            assert_eq!(VectorFormat::from_tag(tag).unwrap().tag(), tag);
        }
        assert!(RotationFormat::from_tag(5).is_none());
        assert!(VectorFormat::from_tag(4).is_none());
    }

    #[test]
    fn format_names_parse_back() {
        for format in [
            RotationFormat::Quat128,
            RotationFormat::QuatDropW96,
            RotationFormat::QuatDropW48,
            RotationFormat::QuatDropW32,
            RotationFormat::QuatDropWVariable,
        ] {
            assert_eq!(format.to_string().parse::<RotationFormat>().unwrap(), format);
        }
        for format in [
            VectorFormat::Vector96,
            VectorFormat::Vector48,
            VectorFormat::Vector32,
            VectorFormat::VectorVariable,
        ] {
            assert_eq!(format.to_string().parse::<VectorFormat>().unwrap(), format);
        }
    }
}
