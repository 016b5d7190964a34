//! Per-track bit-rate bookkeeping for the external search driver.
//!
//! The search policy itself lives outside the core: the driver scores
//! candidates with the decayed samplers and records its decisions here.
//! Each channel of each track walks a small state machine:
//!
//! ```text
//! (range computation)  Default / Constant     set once, never leave
//! (initial)            Raw
//! (search)             Raw <-> FixedN         any number of times
//! (commit)             whatever state holds   frozen
//! ```

use crate::database::TrackChannel;
use crate::format::{
    is_constant_bit_rate, is_raw_bit_rate, num_bits_at_bit_rate, HIGHEST_BIT_RATE,
    INVALID_BIT_RATE, RotationFormat, VectorFormat,
};
use crate::ranges::TransformRanges;

/// Per-transform bit rates during the search, one per channel.
/// [`INVALID_BIT_RATE`] marks channels the search has not touched.
#[derive(Debug, Clone, Copy)]
pub struct TransformBitRates {
    pub rotation: u8,
    pub translation: u8,
    pub scale: u8,
}

impl Default for TransformBitRates {
    fn default() -> Self {
        Self {
            rotation: INVALID_BIT_RATE,
            translation: INVALID_BIT_RATE,
            scale: INVALID_BIT_RATE,
        }
    }
}

impl TransformBitRates {
    pub const RAW: Self = Self {
        rotation: HIGHEST_BIT_RATE,
        translation: HIGHEST_BIT_RATE,
        scale: HIGHEST_BIT_RATE,
    };

    #[inline]
    pub fn get(&self, channel: TrackChannel) -> u8 {
        match channel {
            TrackChannel::Rotation => self.rotation,
            TrackChannel::Translation => self.translation,
            TrackChannel::Scale => self.scale,
        }
    }

    #[inline]
    pub fn set(&mut self, channel: TrackChannel, bit_rate: u8) {
        match channel {
            TrackChannel::Rotation => self.rotation = bit_rate,
            TrackChannel::Translation => self.translation = bit_rate,
            TrackChannel::Scale => self.scale = bit_rate,
        }
    }
}

/// Resolved encoding state of one channel of one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Channel equals its type's default value clip-wide; nothing stored.
    Default,
    /// Channel is constant clip-wide; the value lives in the clip range's min.
    Constant,
    /// Full precision, no quantization loss.
    Raw,
    /// Quantized at the given bit rate index.
    Fixed(u8),
}

impl ChannelState {
    /// Resolve from the clip-range flags plus the searched bit rate. The
    /// range flags win: Default/Constant are set once by normalization and
    /// the search never overrides them.
    pub fn resolve(ranges: &TransformRanges, channel: TrackChannel, bit_rate: u8) -> Self {
        let (is_default, is_constant) = match channel {
            TrackChannel::Rotation => (ranges.is_rotation_default, ranges.is_rotation_constant),
            TrackChannel::Translation => {
                (ranges.is_translation_default, ranges.is_translation_constant)
            }
            TrackChannel::Scale => (ranges.is_scale_default, ranges.is_scale_constant),
        };

        if is_default {
            ChannelState::Default
        } else if is_constant {
            ChannelState::Constant
        } else if bit_rate == INVALID_BIT_RATE || is_raw_bit_rate(bit_rate) {
            ChannelState::Raw
        } else if is_constant_bit_rate(bit_rate) {
            // Constant within this segment only; the clip-wide state stays
            // animated, the segment stores no per-sample payload.
            ChannelState::Fixed(0)
        } else {
            ChannelState::Fixed(bit_rate)
        }
    }
}

/// The per-segment, per-transform bit-rate decisions of one compression run.
///
/// Every channel starts at the raw bit rate. The driver may rewrite rates
/// freely until [`commit`](Self::commit); writing afterwards is a
/// programming error.
#[derive(Debug, Clone)]
pub struct BitRateSelection {
    per_segment: Vec<Vec<TransformBitRates>>,
    committed: bool,
}

impl BitRateSelection {
    pub fn new(num_segments: usize, num_transforms: u32) -> Self {
        Self {
            per_segment: vec![
                vec![TransformBitRates::RAW; num_transforms as usize];
                num_segments
            ],
            committed: false,
        }
    }

    #[inline]
    pub fn segment(&self, segment_index: u32) -> &[TransformBitRates] {
        &self.per_segment[segment_index as usize]
    }

    #[inline]
    pub fn get(&self, segment_index: u32, transform_index: u32) -> TransformBitRates {
        self.per_segment[segment_index as usize][transform_index as usize]
    }

    /// Record a candidate bit rate for one channel of one track.
    pub fn set(
        &mut self,
        segment_index: u32,
        transform_index: u32,
        channel: TrackChannel,
        bit_rate: u8,
    ) {
        assert!(!self.committed, "bit rates are frozen after commit");
        assert!(bit_rate <= HIGHEST_BIT_RATE, "invalid bit rate: {bit_rate}");
        self.per_segment[segment_index as usize][transform_index as usize].set(channel, bit_rate);
    }

    /// Freeze the decisions. This fixes the encoding without mutating the
    /// working database; the blob writer packs from the databases using
    /// these rates.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

// ── Sample bit sizes ───────────────────────────────────────────────────────

/// Storage bits of one rotation sample under `format` (per-track `bit_rate`
/// for the variable format).
pub fn rotation_sample_bit_size(format: RotationFormat, bit_rate: u8) -> u32 {
    match format {
        RotationFormat::Quat128 => 128,
        RotationFormat::QuatDropW96 => 96,
        RotationFormat::QuatDropW48 => 48,
        RotationFormat::QuatDropW32 => 32,
        RotationFormat::QuatDropWVariable => {
            if is_constant_bit_rate(bit_rate) {
                0
            } else if is_raw_bit_rate(bit_rate) {
                96
            } else {
                num_bits_at_bit_rate(bit_rate) * 3
            }
        }
    }
}

/// Storage bits of one translation or scale sample under `format`.
pub fn vector_sample_bit_size(format: VectorFormat, bit_rate: u8) -> u32 {
    match format {
        VectorFormat::Vector96 => 96,
        VectorFormat::Vector48 => 48,
        VectorFormat::Vector32 => 32,
        VectorFormat::VectorVariable => {
            if is_constant_bit_rate(bit_rate) {
                0
            } else if is_raw_bit_rate(bit_rate) {
                96
            } else {
                num_bits_at_bit_rate(bit_rate) * 3
            }
        }
    }
}

/// Storage bits of one whole animated pose in a segment: the sum over every
/// animated channel of every transform, before mixed-packing alignment.
pub fn animated_pose_bit_size(
    clip_ranges: &[TransformRanges],
    rotation_format: RotationFormat,
    translation_format: VectorFormat,
    scale_format: VectorFormat,
    has_scale: bool,
    bit_rates: &[TransformBitRates],
) -> u32 {
    let mut bits = 0;
    for (ranges, rates) in clip_ranges.iter().zip(bit_rates) {
        if ranges.is_rotation_animated() {
            bits += rotation_sample_bit_size(rotation_format, rates.rotation);
        }
        if ranges.is_translation_animated() {
            bits += vector_sample_bit_size(translation_format, rates.translation);
        }
        if has_scale && ranges.is_scale_animated() {
            bits += vector_sample_bit_size(scale_format, rates.scale);
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_starts_raw_and_freezes_on_commit() {
        let mut selection = BitRateSelection::new(2, 3);
        assert_eq!(selection.get(0, 0).rotation, HIGHEST_BIT_RATE);

        selection.set(1, 2, TrackChannel::Translation, 7);
        assert_eq!(selection.get(1, 2).translation, 7);

        selection.commit();
        assert!(selection.is_committed());
    }

    #[test]
    #[should_panic(expected = "frozen after commit")]
    fn writing_after_commit_panics() {
        let mut selection = BitRateSelection::new(1, 1);
        selection.commit();
        selection.set(0, 0, TrackChannel::Rotation, 5);
    }

    #[test]
    #[should_panic(expected = "invalid bit rate")]
    fn out_of_range_bit_rate_panics() {
        let mut selection = BitRateSelection::new(1, 1);
        selection.set(0, 0, TrackChannel::Rotation, 19);
    }

    #[test]
    fn channel_state_resolution() {
        let mut ranges = TransformRanges::default();
        assert_eq!(
            ChannelState::resolve(&ranges, TrackChannel::Rotation, INVALID_BIT_RATE),
            ChannelState::Raw
        );
        assert_eq!(
            ChannelState::resolve(&ranges, TrackChannel::Rotation, 5),
            ChannelState::Fixed(5)
        );
        assert_eq!(
            ChannelState::resolve(&ranges, TrackChannel::Rotation, HIGHEST_BIT_RATE),
            ChannelState::Raw
        );

        ranges.is_translation_constant = true;
        assert_eq!(
            ChannelState::resolve(&ranges, TrackChannel::Translation, 5),
            ChannelState::Constant
        );

        ranges.is_scale_constant = true;
        ranges.is_scale_default = true;
        assert_eq!(
            ChannelState::resolve(&ranges, TrackChannel::Scale, 5),
            ChannelState::Default
        );
    }

    #[test]
    fn sample_bit_sizes() {
        assert_eq!(rotation_sample_bit_size(RotationFormat::Quat128, INVALID_BIT_RATE), 128);
        assert_eq!(rotation_sample_bit_size(RotationFormat::QuatDropW48, INVALID_BIT_RATE), 48);
        assert_eq!(
            rotation_sample_bit_size(RotationFormat::QuatDropWVariable, 8),
            num_bits_at_bit_rate(8) * 3
        );
        assert_eq!(rotation_sample_bit_size(RotationFormat::QuatDropWVariable, 0), 0);
        assert_eq!(
            rotation_sample_bit_size(RotationFormat::QuatDropWVariable, HIGHEST_BIT_RATE),
            96
        );
        assert_eq!(vector_sample_bit_size(VectorFormat::Vector32, INVALID_BIT_RATE), 32);
    }

    #[test]
    fn pose_bit_size_skips_non_animated_channels() {
        let mut animated = TransformRanges::default();
        animated.is_scale_constant = true;
        let mut constant = TransformRanges::default();
        constant.is_rotation_constant = true;
        constant.is_translation_default = true;
        constant.is_translation_constant = true;
        constant.is_scale_constant = true;

        let rates = [
            TransformBitRates {
                rotation: 5,
                translation: 10,
                scale: INVALID_BIT_RATE,
            },
            TransformBitRates::RAW,
        ];
        let bits = animated_pose_bit_size(
            &[animated, constant],
            RotationFormat::QuatDropWVariable,
            VectorFormat::VectorVariable,
            VectorFormat::VectorVariable,
            true,
            &rates,
        );
        // Transform 0 contributes rotation + translation; transform 1 nothing.
        assert_eq!(
            bits,
            num_bits_at_bit_rate(5) * 3 + num_bits_at_bit_rate(10) * 3
        );
    }
}
