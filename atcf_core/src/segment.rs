use crate::format::SIMD_WIDTH;
use crate::ranges::TransformRanges;
use crate::settings::CompressionSettings;

/// How sample times map onto stored keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleDistribution {
    /// All tracks share the clip's uniform sample grid; whole-pose sampling
    /// snaps to the nearest key.
    #[default]
    Uniform,
    /// Tracks carry their own sample placement; sampling interpolates.
    Variable,
}

/// One contiguous window of the clip timeline with independent
/// normalization ranges.
///
/// Addressing identity (must match the database layout exactly):
/// `component_size = 4 * num_simd_samples` bytes, a transform occupies
/// `component_size * C` bytes (C = 7 without scale, 10 with), and a segment
/// occupies `num_transforms * C * component_size` bytes starting at
/// `soa_start_offset` in the clip's contiguous buffer.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position of this segment in the clip's segment list.
    pub index: u32,
    /// Clip sample index of this segment's first sample.
    pub start_offset: u32,
    /// Valid samples per track in this window.
    pub num_samples: u32,
    /// `num_samples` rounded up to [`SIMD_WIDTH`]; the trailing slots
    /// replicate the last valid sample.
    pub num_simd_samples: u32,
    /// Size in bytes of this segment's slice of the SOA buffer.
    pub soa_size: u32,
    /// Byte offset of this segment's data in the clip's SOA buffer.
    pub soa_start_offset: u32,

    pub distribution: SampleDistribution,

    pub are_rotations_normalized: bool,
    pub are_translations_normalized: bool,
    pub are_scales_normalized: bool,

    /// Range state per transform, relative to the clip-normalized samples.
    pub ranges: Vec<TransformRanges>,

    // Stat tracking, filled in by the blob writer.
    pub animated_pose_bit_size: u32,
    pub animated_data_size: u32,
    pub range_data_size: u32,
}

impl Segment {
    #[inline]
    pub fn num_transforms(&self) -> u32 {
        self.ranges.len() as u32
    }
}

/// Components per transform in the SOA layout: rot(4) + trans(3) + scale(3)?
#[inline]
pub const fn num_components_per_transform(has_scale: bool) -> u32 {
    if has_scale {
        10
    } else {
        7
    }
}

#[inline]
pub const fn round_up_to_simd_width(num_samples: u32) -> u32 {
    num_samples.div_ceil(SIMD_WIDTH) * SIMD_WIDTH
}

/// Tile `[0, num_samples)` into segments of at most
/// `settings.segment_max_samples` samples, assigning each its SOA byte
/// window. Segments tile the timeline without gaps or overlap; only the last
/// may be shorter.
pub fn partition_clip(
    num_samples: u32,
    num_transforms: u32,
    has_scale: bool,
    settings: &CompressionSettings,
) -> Vec<Segment> {
    debug_assert!(num_samples > 0 && num_transforms > 0);
    let max_samples = settings.segment_max_samples.max(1);

    let num_components = num_components_per_transform(has_scale);
    let num_segments = num_samples.div_ceil(max_samples);

    let mut segments = Vec::with_capacity(num_segments as usize);
    let mut soa_start_offset = 0u32;

    for segment_index in 0..num_segments {
        let start_offset = segment_index * max_samples;
        let segment_samples = (num_samples - start_offset).min(max_samples);
        let num_simd_samples = round_up_to_simd_width(segment_samples);

        let component_size = 4 * num_simd_samples;
        let soa_size = num_transforms * num_components * component_size;

        segments.push(Segment {
            index: segment_index,
            start_offset,
            num_samples: segment_samples,
            num_simd_samples,
            soa_size,
            soa_start_offset,
            distribution: SampleDistribution::Uniform,
            are_rotations_normalized: false,
            are_translations_normalized: false,
            are_scales_normalized: false,
            ranges: vec![TransformRanges::default(); num_transforms as usize],
            animated_pose_bit_size: 0,
            animated_data_size: 0,
            range_data_size: 0,
        });

        soa_start_offset += soa_size;
    }

    segments
}

/// Total byte size of the SOA buffer covering `segments`.
#[inline]
pub fn total_soa_size(segments: &[Segment]) -> usize {
    segments.iter().map(|s| s.soa_size as usize).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_max(segment_max_samples: u32) -> CompressionSettings {
        CompressionSettings {
            segment_max_samples,
            ..CompressionSettings::default()
        }
    }

    #[test]
    fn segments_tile_the_timeline() {
        let segments = partition_clip(37, 3, false, &settings_with_max(16));
        assert_eq!(segments.len(), 3);

        assert_eq!(segments[0].start_offset, 0);
        assert_eq!(segments[0].num_samples, 16);
        assert_eq!(segments[1].start_offset, 16);
        assert_eq!(segments[1].num_samples, 16);
        assert_eq!(segments[2].start_offset, 32);
        assert_eq!(segments[2].num_samples, 5);

        // No gaps, no overlap.
        for pair in segments.windows(2) {
            assert_eq!(pair[0].start_offset + pair[0].num_samples, pair[1].start_offset);
        }
    }

    #[test]
    fn simd_rounding_and_soa_offsets() {
        let segments = partition_clip(5, 2, true, &settings_with_max(4));
        assert_eq!(segments.len(), 2);

        assert_eq!(segments[0].num_simd_samples, 4);
        assert_eq!(segments[1].num_samples, 1);
        assert_eq!(segments[1].num_simd_samples, 4);

        // 2 transforms * 10 components * 4 samples * 4 bytes.
        assert_eq!(segments[0].soa_size, 2 * 10 * 4 * 4);
        assert_eq!(segments[1].soa_start_offset, segments[0].soa_size);
        assert_eq!(total_soa_size(&segments), (segments[0].soa_size + segments[1].soa_size) as usize);
    }

    #[test]
    fn five_samples_round_up_to_eight() {
        let segments = partition_clip(5, 1, false, &settings_with_max(16));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].num_samples, 5);
        assert_eq!(segments[0].num_simd_samples, 8);
    }

    #[test]
    fn component_counts() {
        assert_eq!(num_components_per_transform(false), 7);
        assert_eq!(num_components_per_transform(true), 10);
    }
}
