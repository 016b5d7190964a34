//! Range extraction and in-place normalization.
//!
//! Two passes, in this order and never the reverse:
//! 1. clip pass — per-transform min/extent over the whole clip, rewrite the
//!    working database into clip-normalized [0,1] space;
//! 2. segment pass — per-segment min/extent of the *already clip-normalized*
//!    samples, rewrite into segment-normalized space.
//!
//! Rotation format conversion (drop-W hemisphere flip) must run before the
//! clip pass so ranges are computed on the values that will be stored.
//! After both passes the range descriptors are read-only for the rest of
//! compression; decoding a sample is `(v * seg.extent + seg.min) *
//! clip.extent + clip.min`.

use glam::Vec4;
use log::debug;

use crate::database::{TrackChannel, TrackDatabase};
use crate::ranges::{ChannelRange, RangeAccumulator};
use crate::segment::Segment;
use crate::settings::CompressionSettings;

/// Extent below which a rotation channel is considered constant.
pub const ROTATION_CONSTANT_THRESHOLD: f32 = 0.000001;

/// Extent below which a translation channel is considered constant.
pub const TRANSLATION_CONSTANT_THRESHOLD: f32 = 0.00001;

const ROTATION_IDENTITY: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

fn channel_components(channel: TrackChannel) -> usize {
    match channel {
        TrackChannel::Rotation => 4,
        TrackChannel::Translation | TrackChannel::Scale => 3,
    }
}

fn channel_sample(
    database: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    channel: TrackChannel,
    sample_index: u32,
) -> Vec4 {
    match channel {
        TrackChannel::Rotation => database.rotation(segment, transform_index, sample_index),
        TrackChannel::Translation => database.translation(segment, transform_index, sample_index),
        TrackChannel::Scale => database.scale(segment, transform_index, sample_index),
    }
}

/// Min/extent of one channel over the valid samples of `segments`.
fn compute_channel_range(
    database: &TrackDatabase,
    segments: &[Segment],
    transform_index: u32,
    channel: TrackChannel,
) -> ChannelRange {
    let mut accumulator = RangeAccumulator::new();
    for segment in segments {
        for sample_index in 0..segment.num_samples {
            accumulator.add(channel_sample(
                database,
                segment,
                transform_index,
                channel,
                sample_index,
            ));
        }
    }
    accumulator.finish()
}

/// Rewrite one channel of one track to `(x - min) / extent` across the full
/// SIMD-padded lane. Zero-extent components collapse to 0; padding slots are
/// rewritten too so they keep replicating the last valid sample.
fn normalize_channel_in_place(
    database: &mut TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    channel: TrackChannel,
    range: &ChannelRange,
) {
    for component in 0..channel_components(channel) {
        let min = range.min[component];
        let extent = range.extent[component];
        let lane = database.component_mut(segment, transform_index, channel, component);
        if extent > 0.0 {
            for value in lane.iter_mut() {
                *value = (*value - min) / extent;
            }
        } else {
            lane.fill(0.0);
        }
    }
}

/// Per-channel outcome of a range computation.
struct ChannelClass {
    is_constant: bool,
    is_default: bool,
}

fn classify(range: &ChannelRange, first_sample: Vec4, default_value: Vec4, threshold: f32) -> ChannelClass {
    let is_constant = range.max_extent() <= threshold;
    let is_default =
        is_constant && (first_sample - default_value).abs().max_element() <= threshold;
    ChannelClass {
        is_constant,
        is_default,
    }
}

// ── Clip pass ──────────────────────────────────────────────────────────────

/// Compute clip-wide ranges and rewrite the working database into
/// clip-normalized space.
///
/// Constant channels are left untouched in storage: their value is recorded
/// in the range's `min` and they are excluded from normalization (extent is
/// an in-band zero, not an error).
pub fn normalize_clip_ranges(
    database: &mut TrackDatabase,
    segments: &[Segment],
    settings: &CompressionSettings,
) {
    let num_transforms = database.num_transforms();
    let default_scale = database.default_scale();
    let has_scale = database.has_scale();

    let mut num_constant = 0u32;

    for transform_index in 0..num_transforms {
        // Rotation.
        let range = compute_channel_range(database, segments, transform_index, TrackChannel::Rotation);
        let first = database.rotation(&segments[0], transform_index, 0);
        let class = classify(&range, first, ROTATION_IDENTITY, ROTATION_CONSTANT_THRESHOLD);
        {
            let transform_range = database.range_mut(transform_index);
            transform_range.is_rotation_constant = class.is_constant;
            transform_range.is_rotation_default = class.is_default;
        }
        if class.is_constant {
            database.range_mut(transform_index).rotation = ChannelRange::new(first, Vec4::ZERO);
            num_constant += 1;
        } else {
            for segment in segments {
                normalize_channel_in_place(database, segment, transform_index, TrackChannel::Rotation, &range);
            }
            let transform_range = database.range_mut(transform_index);
            transform_range.rotation = range;
            transform_range.are_rotations_normalized = true;
        }

        // Translation.
        let range =
            compute_channel_range(database, segments, transform_index, TrackChannel::Translation);
        let first = database.translation(&segments[0], transform_index, 0);
        let class = classify(&range, first, Vec4::ZERO, TRANSLATION_CONSTANT_THRESHOLD);
        {
            let transform_range = database.range_mut(transform_index);
            transform_range.is_translation_constant = class.is_constant;
            transform_range.is_translation_default = class.is_default;
        }
        if class.is_constant {
            database.range_mut(transform_index).translation = ChannelRange::new(first, Vec4::ZERO);
            num_constant += 1;
        } else {
            for segment in segments {
                normalize_channel_in_place(
                    database,
                    segment,
                    transform_index,
                    TrackChannel::Translation,
                    &range,
                );
            }
            let transform_range = database.range_mut(transform_index);
            transform_range.translation = range;
            transform_range.are_translations_normalized = true;
        }

        // Scale. A clip without scale tracks marks every scale channel
        // default; nothing is stored or normalized.
        if has_scale {
            let range = compute_channel_range(database, segments, transform_index, TrackChannel::Scale);
            let first = database.scale(&segments[0], transform_index, 0);
            let class = classify(&range, first, default_scale, settings.constant_scale_threshold);
            {
                let transform_range = database.range_mut(transform_index);
                transform_range.is_scale_constant = class.is_constant;
                transform_range.is_scale_default = class.is_default;
            }
            if class.is_constant {
                database.range_mut(transform_index).scale = ChannelRange::new(first, Vec4::ZERO);
                num_constant += 1;
            } else {
                for segment in segments {
                    normalize_channel_in_place(database, segment, transform_index, TrackChannel::Scale, &range);
                }
                let transform_range = database.range_mut(transform_index);
                transform_range.scale = range;
                transform_range.are_scales_normalized = true;
            }
        } else {
            let transform_range = database.range_mut(transform_index);
            transform_range.is_scale_constant = true;
            transform_range.is_scale_default = true;
            transform_range.scale = ChannelRange::new(default_scale, Vec4::ZERO);
        }
    }

    debug!(
        "clip range pass: {} transforms, {} constant channels",
        num_transforms, num_constant
    );
}

// ── Segment pass ───────────────────────────────────────────────────────────

/// Compute per-segment ranges of the clip-normalized samples and rewrite
/// the working database into segment-normalized space.
///
/// Must run after [`normalize_clip_ranges`]. Channels that the clip pass
/// marked constant or default carry no per-sample data and are skipped.
pub fn normalize_segment_ranges(
    database: &mut TrackDatabase,
    segments: &mut [Segment],
    settings: &CompressionSettings,
) {
    let num_transforms = database.num_transforms();

    for segment in segments.iter_mut() {
        for transform_index in 0..num_transforms {
            let clip_range = *database.range(transform_index);

            if clip_range.is_rotation_animated() {
                let range = compute_channel_range(
                    database,
                    std::slice::from_ref(segment),
                    transform_index,
                    TrackChannel::Rotation,
                );
                let first = database.rotation(segment, transform_index, 0);
                normalize_channel_in_place(database, segment, transform_index, TrackChannel::Rotation, &range);

                let segment_range = &mut segment.ranges[transform_index as usize];
                segment_range.rotation = range;
                segment_range.is_rotation_constant = range.max_extent() <= ROTATION_CONSTANT_THRESHOLD;
                segment_range.is_rotation_default = false;
                segment_range.are_rotations_normalized = true;
                if segment_range.is_rotation_constant {
                    segment_range.rotation = ChannelRange::new(first, Vec4::ZERO);
                }
            }

            if clip_range.is_translation_animated() {
                let range = compute_channel_range(
                    database,
                    std::slice::from_ref(segment),
                    transform_index,
                    TrackChannel::Translation,
                );
                let first = database.translation(segment, transform_index, 0);
                normalize_channel_in_place(
                    database,
                    segment,
                    transform_index,
                    TrackChannel::Translation,
                    &range,
                );

                let segment_range = &mut segment.ranges[transform_index as usize];
                segment_range.translation = range;
                segment_range.is_translation_constant =
                    range.max_extent() <= TRANSLATION_CONSTANT_THRESHOLD;
                segment_range.is_translation_default = false;
                segment_range.are_translations_normalized = true;
                if segment_range.is_translation_constant {
                    segment_range.translation = ChannelRange::new(first, Vec4::ZERO);
                }
            }

            if clip_range.is_scale_animated() {
                let range = compute_channel_range(
                    database,
                    std::slice::from_ref(segment),
                    transform_index,
                    TrackChannel::Scale,
                );
                let first = database.scale(segment, transform_index, 0);
                normalize_channel_in_place(database, segment, transform_index, TrackChannel::Scale, &range);

                let segment_range = &mut segment.ranges[transform_index as usize];
                segment_range.scale = range;
                segment_range.is_scale_constant =
                    range.max_extent() <= settings.constant_scale_threshold;
                segment_range.is_scale_default = false;
                segment_range.are_scales_normalized = true;
                if segment_range.is_scale_constant {
                    segment_range.scale = ChannelRange::new(first, Vec4::ZERO);
                }
            }
        }

        segment.are_rotations_normalized = true;
        segment.are_translations_normalized = true;
        segment.are_scales_normalized = true;
    }

    debug!("segment range pass: {} segments normalized", segments.len());
}
