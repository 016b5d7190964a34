//! Reconstructs transforms from the databases under the current
//! quantization decision.
//!
//! Three evaluation modes per channel:
//! - *raw*: the ingested floats, straight from the raw database;
//! - *normalized*: the working database with segment and clip ranges
//!   un-applied — the quantization-free reference;
//! - *decayed*: the value a decoder would reconstruct for a candidate
//!   encoding, without mutating storage. This is the hot path of the
//!   bit-rate search.

use glam::{Quat, Vec4};

use crate::bitrate::TransformBitRates;
use crate::database::{convert_rotation, TrackDatabase, Transform};
use crate::format::{
    is_constant_bit_rate, is_raw_bit_rate, num_bits_at_bit_rate, HIGHEST_BIT_RATE,
    INVALID_TRANSFORM_INDEX, RotationFormat, VectorFormat,
};
use crate::packing::{
    decay_vector3_32, decay_vector3_s48, decay_vector3_sxx, decay_vector3_u48, decay_vector3_uxx,
    quat_from_positive_w,
};
use crate::segment::{SampleDistribution, Segment};

// ── Encoding selection ─────────────────────────────────────────────────────

/// The encoding a decayed evaluation simulates. One sum type instead of the
/// bit-rate/format overload pair: callers resolve their format or bit rate
/// once and the decayed samplers dispatch once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Bit rate 0: the track is constant within the segment. The sample is
    /// the segment's first raw sample, Vec48-decayed against the clip range;
    /// the segment range is never applied.
    ConstantInSegment,
    /// Highest bit rate or a full-precision format: the raw sample converted
    /// to the destination rotation convention, no quantization loss.
    Raw,
    /// [16,16,16] bits per sample.
    Fixed48,
    /// [11,11,10] bits per sample.
    Fixed32,
    /// [N,N,N] bits per sample; the payload is the *bit rate index*, not the
    /// bit count.
    FixedN(u8),
}

impl Encoding {
    /// Resolve a variable-format bit rate. Out-of-range rates are a
    /// programming error.
    pub fn from_bit_rate(bit_rate: u8) -> Self {
        assert!(bit_rate <= HIGHEST_BIT_RATE, "invalid bit rate: {bit_rate}");
        if is_constant_bit_rate(bit_rate) {
            Encoding::ConstantInSegment
        } else if is_raw_bit_rate(bit_rate) {
            Encoding::Raw
        } else {
            Encoding::FixedN(bit_rate)
        }
    }

    /// Resolve a fixed rotation format. Variable formats carry their rate
    /// per track and must resolve through [`from_bit_rate`](Self::from_bit_rate).
    pub fn from_rotation_format(format: RotationFormat) -> Self {
        match format {
            RotationFormat::Quat128 | RotationFormat::QuatDropW96 => Encoding::Raw,
            RotationFormat::QuatDropW48 => Encoding::Fixed48,
            RotationFormat::QuatDropW32 => Encoding::Fixed32,
            RotationFormat::QuatDropWVariable => {
                panic!("variable rotation format resolves through a bit rate")
            }
        }
    }

    pub fn from_vector_format(format: VectorFormat) -> Self {
        match format {
            VectorFormat::Vector96 => Encoding::Raw,
            VectorFormat::Vector48 => Encoding::Fixed48,
            VectorFormat::Vector32 => Encoding::Fixed32,
            VectorFormat::VectorVariable => {
                panic!("variable vector format resolves through a bit rate")
            }
        }
    }
}

/// Interpret a stored rotation vector under `format`'s convention.
#[inline]
pub fn rotation_to_quat(rotation: Vec4, format: RotationFormat) -> Quat {
    if format.drops_w() {
        quat_from_positive_w(rotation)
    } else {
        Quat::from_xyzw(rotation.x, rotation.y, rotation.z, rotation.w)
    }
}

// ── Raw and normalized evaluation ──────────────────────────────────────────

/// Rotation exactly as ingested, from the raw database.
#[inline]
pub fn raw_rotation_sample(
    raw: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
) -> Quat {
    rotation_to_quat(
        raw.rotation(segment, transform_index, sample_index),
        raw.rotation_format(),
    )
}

#[inline]
pub fn raw_translation_sample(
    raw: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
) -> Vec4 {
    raw.translation(segment, transform_index, sample_index)
}

#[inline]
pub fn raw_scale_sample(
    raw: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
) -> Vec4 {
    raw.scale(segment, transform_index, sample_index)
}

/// Quantization-free reference rotation from the working database:
/// un-applies the segment range, then the clip range, whichever are active.
pub fn rotation_sample(
    database: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
) -> Quat {
    let clip_range = database.range(transform_index);
    let segment_range = &segment.ranges[transform_index as usize];

    let mut rotation = database.rotation(segment, transform_index, sample_index);
    if segment_range.are_rotations_normalized {
        rotation = segment_range.rotation.unnormalize(rotation);
    }
    if clip_range.are_rotations_normalized {
        rotation = clip_range.rotation.unnormalize(rotation);
    }
    rotation_to_quat(rotation, database.rotation_format())
}

pub fn translation_sample(
    database: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
) -> Vec4 {
    let clip_range = database.range(transform_index);
    let segment_range = &segment.ranges[transform_index as usize];

    let mut translation = database.translation(segment, transform_index, sample_index);
    if segment_range.are_translations_normalized {
        translation = segment_range.translation.unnormalize(translation);
    }
    if clip_range.are_translations_normalized {
        translation = clip_range.translation.unnormalize(translation);
    }
    translation
}

pub fn scale_sample(
    database: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
) -> Vec4 {
    let clip_range = database.range(transform_index);
    let segment_range = &segment.ranges[transform_index as usize];

    let mut scale = database.scale(segment, transform_index, sample_index);
    if segment_range.are_scales_normalized {
        scale = segment_range.scale.unnormalize(scale);
    }
    if clip_range.are_scales_normalized {
        scale = clip_range.scale.unnormalize(scale);
    }
    scale
}

// ── Decayed evaluation ─────────────────────────────────────────────────────

/// Simulate the round trip of one rotation sample through `encoding`.
///
/// Reads the raw database for the constant and raw paths, the working
/// database for the quantized ones; mutates neither.
pub fn decayed_rotation_sample(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
    encoding: Encoding,
) -> Quat {
    let raw_format = raw.rotation_format();
    let working_format = working.rotation_format();

    let clip_range = working.range(transform_index);
    let segment_range = &segment.ranges[transform_index as usize];

    let is_clip_normalized;
    let is_segment_normalized;

    let mut packed = match encoding {
        Encoding::ConstantInSegment => {
            debug_assert!(
                clip_range.are_rotations_normalized && segment_range.are_rotations_normalized,
                "cannot drop a constant track if it isn't normalized"
            );
            let rotation = convert_rotation(
                raw.rotation(segment, transform_index, 0),
                raw_format,
                working_format,
            );
            let normalized = clip_range.rotation.normalize(rotation);

            is_clip_normalized = clip_range.are_rotations_normalized;
            is_segment_normalized = false;
            decay_vector3_u48(normalized)
        }
        Encoding::Raw => {
            is_clip_normalized = false;
            is_segment_normalized = false;
            convert_rotation(
                raw.rotation(segment, transform_index, sample_index),
                raw_format,
                working_format,
            )
        }
        Encoding::FixedN(bit_rate) => {
            let num_bits = num_bits_at_bit_rate(bit_rate);
            let rotation = working.rotation(segment, transform_index, sample_index);

            is_clip_normalized = clip_range.are_rotations_normalized;
            is_segment_normalized = segment_range.are_rotations_normalized;
            if is_clip_normalized {
                decay_vector3_uxx(rotation, num_bits)
            } else {
                decay_vector3_sxx(rotation, num_bits)
            }
        }
        Encoding::Fixed48 => {
            let rotation = working.rotation(segment, transform_index, sample_index);

            is_clip_normalized = clip_range.are_rotations_normalized;
            is_segment_normalized = segment_range.are_rotations_normalized;
            if is_clip_normalized {
                decay_vector3_u48(rotation)
            } else {
                decay_vector3_s48(rotation)
            }
        }
        Encoding::Fixed32 => {
            let rotation = working.rotation(segment, transform_index, sample_index);

            is_clip_normalized = clip_range.are_rotations_normalized;
            is_segment_normalized = segment_range.are_rotations_normalized;
            decay_vector3_32(rotation, is_clip_normalized)
        }
    };

    if is_segment_normalized {
        packed = segment_range.rotation.unnormalize(packed);
    }
    if is_clip_normalized {
        packed = clip_range.rotation.unnormalize(packed);
    }

    rotation_to_quat(packed, working_format)
}

/// Simulate the round trip of one translation sample through `encoding`.
pub fn decayed_translation_sample(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
    encoding: Encoding,
) -> Vec4 {
    let clip_range = working.range(transform_index);
    let segment_range = &segment.ranges[transform_index as usize];

    let is_clip_normalized;
    let is_segment_normalized;

    let mut packed = match encoding {
        Encoding::ConstantInSegment => {
            debug_assert!(
                clip_range.are_translations_normalized
                    && segment_range.are_translations_normalized,
                "cannot drop a constant track if it isn't normalized"
            );
            let translation = raw.translation(segment, transform_index, 0);
            let normalized = clip_range.translation.normalize(translation);

            is_clip_normalized = clip_range.are_translations_normalized;
            is_segment_normalized = false;
            decay_vector3_u48(normalized)
        }
        Encoding::Raw => {
            is_clip_normalized = false;
            is_segment_normalized = false;
            raw.translation(segment, transform_index, sample_index)
        }
        Encoding::FixedN(bit_rate) => {
            debug_assert!(
                clip_range.are_translations_normalized,
                "translations must be normalized to support variable bit rates"
            );
            let num_bits = num_bits_at_bit_rate(bit_rate);
            let translation = working.translation(segment, transform_index, sample_index);

            is_clip_normalized = clip_range.are_translations_normalized;
            is_segment_normalized = segment_range.are_translations_normalized;
            decay_vector3_uxx(translation, num_bits)
        }
        Encoding::Fixed48 => {
            debug_assert!(clip_range.are_translations_normalized);
            let translation = working.translation(segment, transform_index, sample_index);

            is_clip_normalized = clip_range.are_translations_normalized;
            is_segment_normalized = segment_range.are_translations_normalized;
            decay_vector3_u48(translation)
        }
        Encoding::Fixed32 => {
            debug_assert!(clip_range.are_translations_normalized);
            let translation = working.translation(segment, transform_index, sample_index);

            is_clip_normalized = clip_range.are_translations_normalized;
            is_segment_normalized = segment_range.are_translations_normalized;
            decay_vector3_32(translation, true)
        }
    };

    if is_segment_normalized {
        packed = segment_range.translation.unnormalize(packed);
    }
    if is_clip_normalized {
        packed = clip_range.translation.unnormalize(packed);
    }

    packed
}

/// Simulate the round trip of one scale sample through `encoding`.
pub fn decayed_scale_sample(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
    encoding: Encoding,
) -> Vec4 {
    let clip_range = working.range(transform_index);
    let segment_range = &segment.ranges[transform_index as usize];

    let is_clip_normalized;
    let is_segment_normalized;

    let mut packed = match encoding {
        Encoding::ConstantInSegment => {
            debug_assert!(
                clip_range.are_scales_normalized && segment_range.are_scales_normalized,
                "cannot drop a constant track if it isn't normalized"
            );
            let scale = raw.scale(segment, transform_index, 0);
            let normalized = clip_range.scale.normalize(scale);

            is_clip_normalized = clip_range.are_scales_normalized;
            is_segment_normalized = false;
            decay_vector3_u48(normalized)
        }
        Encoding::Raw => {
            is_clip_normalized = false;
            is_segment_normalized = false;
            raw.scale(segment, transform_index, sample_index)
        }
        Encoding::FixedN(bit_rate) => {
            debug_assert!(
                clip_range.are_scales_normalized,
                "scales must be normalized to support variable bit rates"
            );
            let num_bits = num_bits_at_bit_rate(bit_rate);
            let scale = working.scale(segment, transform_index, sample_index);

            is_clip_normalized = clip_range.are_scales_normalized;
            is_segment_normalized = segment_range.are_scales_normalized;
            decay_vector3_uxx(scale, num_bits)
        }
        Encoding::Fixed48 => {
            debug_assert!(clip_range.are_scales_normalized);
            let scale = working.scale(segment, transform_index, sample_index);

            is_clip_normalized = clip_range.are_scales_normalized;
            is_segment_normalized = segment_range.are_scales_normalized;
            decay_vector3_u48(scale)
        }
        Encoding::Fixed32 => {
            debug_assert!(clip_range.are_scales_normalized);
            let scale = working.scale(segment, transform_index, sample_index);

            is_clip_normalized = clip_range.are_scales_normalized;
            is_segment_normalized = segment_range.are_scales_normalized;
            decay_vector3_32(scale, true)
        }
    };

    if is_segment_normalized {
        packed = segment_range.scale.unnormalize(packed);
    }
    if is_clip_normalized {
        packed = clip_range.scale.unnormalize(packed);
    }

    packed
}

// ── Key location ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRoundingPolicy {
    /// Keep the fractional interpolation alpha.
    None,
    /// Snap the alpha to the nearest key.
    Nearest,
}

/// Locate the keys bracketing `sample_time`: `(k0, k1, alpha)` with
/// `k0 = floor(t * rate)` clamped to the track, `k1 = k0 + 1` clamped, and
/// `alpha` the fractional part (rounded under `Nearest`).
pub fn find_linear_interpolation_samples(
    num_samples: u32,
    sample_rate: f32,
    sample_time: f32,
    policy: SampleRoundingPolicy,
) -> (u32, u32, f32) {
    debug_assert!(num_samples > 0);
    let last = (num_samples - 1) as f32;
    let sample = (sample_time * sample_rate).clamp(0.0, last);

    let key0 = sample.floor() as u32;
    let key1 = (key0 + 1).min(num_samples - 1);
    let mut alpha = sample - key0 as f32;
    if policy == SampleRoundingPolicy::Nearest {
        alpha = alpha.round();
    }
    (key0, key1, alpha)
}

/// Resolve a clip time to the single segment-local key used under the
/// Uniform distribution.
///
/// Keys are found on the clip grid with nearest rounding, shifted into the
/// segment window and clamped; whichever of k0/k1 the rounded alpha lands on
/// is the answer. Uniform sampling never interpolates.
pub fn uniform_sample_key(
    num_samples_in_clip: u32,
    sample_rate: f32,
    num_samples_in_segment: u32,
    segment_start_offset: u32,
    sample_time: f32,
) -> u32 {
    let (mut key0, mut key1, mut alpha) = find_linear_interpolation_samples(
        num_samples_in_clip,
        sample_rate,
        sample_time,
        SampleRoundingPolicy::Nearest,
    );

    // Shift onto the segment window; out-of-window keys clamp and force the
    // alpha to the in-window neighbour. Underflow wraps to a huge value and
    // clamps the same way.
    key0 = key0.wrapping_sub(segment_start_offset);
    if key0 >= num_samples_in_segment {
        key0 = 0;
        alpha = 1.0;
    }
    key1 = key1.wrapping_sub(segment_start_offset);
    if key1 >= num_samples_in_segment {
        key1 = num_samples_in_segment - 1;
        alpha = 0.0;
    }

    if alpha == 0.0 {
        key0
    } else {
        key1
    }
}

// ── Pose sampling ──────────────────────────────────────────────────────────

/// Compile-time distribution selector; each pose walk is monomorphized per
/// distribution so the uniform path carries no interpolation code.
pub trait DistributionKind {
    const IS_VARIABLE: bool;
}

/// All tracks share the clip grid; sampling snaps to one key.
pub struct UniformKeys;

impl DistributionKind for UniformKeys {
    const IS_VARIABLE: bool = false;
}

/// Tracks are interpolated between their bracketing keys.
pub struct VariableKeys;

impl DistributionKind for VariableKeys {
    const IS_VARIABLE: bool = true;
}

#[derive(Debug, Clone, Copy)]
struct SampleContext {
    transform_index: u32,
    sample_key: u32,
    sample_time: f32,
}

fn segment_keys<D: DistributionKind>(
    context: &SampleContext,
    database: &TrackDatabase,
    segment: &Segment,
) -> (u32, u32, f32) {
    if D::IS_VARIABLE {
        find_linear_interpolation_samples(
            segment.num_samples,
            database.sample_rate(),
            context.sample_time,
            SampleRoundingPolicy::None,
        )
    } else {
        (context.sample_key, 0, 0.0)
    }
}

fn sample_rotation_channel<D: DistributionKind>(
    context: &SampleContext,
    database: &TrackDatabase,
    segment: &Segment,
) -> Quat {
    let transform_range = database.range(context.transform_index);

    if transform_range.is_rotation_default {
        Quat::IDENTITY
    } else if transform_range.is_rotation_constant {
        rotation_sample(database, segment, context.transform_index, 0).normalize()
    } else {
        let (key0, key1, alpha) = segment_keys::<D>(context, database, segment);
        let sample0 = rotation_sample(database, segment, context.transform_index, key0);
        if D::IS_VARIABLE {
            let sample1 = rotation_sample(database, segment, context.transform_index, key1);
            sample0.lerp(sample1, alpha)
        } else {
            sample0.normalize()
        }
    }
}

fn sample_translation_channel<D: DistributionKind>(
    context: &SampleContext,
    database: &TrackDatabase,
    segment: &Segment,
) -> Vec4 {
    let transform_range = database.range(context.transform_index);

    if transform_range.is_translation_default {
        Vec4::ZERO
    } else if transform_range.is_translation_constant {
        translation_sample(database, segment, context.transform_index, 0)
    } else {
        let (key0, key1, alpha) = segment_keys::<D>(context, database, segment);
        let sample0 = translation_sample(database, segment, context.transform_index, key0);
        if D::IS_VARIABLE {
            let sample1 = translation_sample(database, segment, context.transform_index, key1);
            sample0.lerp(sample1, alpha)
        } else {
            sample0
        }
    }
}

fn sample_scale_channel<D: DistributionKind>(
    context: &SampleContext,
    database: &TrackDatabase,
    segment: &Segment,
) -> Vec4 {
    let transform_range = database.range(context.transform_index);

    if transform_range.is_scale_default {
        database.default_scale()
    } else if transform_range.is_scale_constant {
        scale_sample(database, segment, context.transform_index, 0)
    } else {
        let (key0, key1, alpha) = segment_keys::<D>(context, database, segment);
        let sample0 = scale_sample(database, segment, context.transform_index, key0);
        if D::IS_VARIABLE {
            let sample1 = scale_sample(database, segment, context.transform_index, key1);
            sample0.lerp(sample1, alpha)
        } else {
            sample0
        }
    }
}

fn sample_transform_at<D: DistributionKind>(
    context: &SampleContext,
    database: &TrackDatabase,
    segment: &Segment,
) -> Transform {
    let rotation = sample_rotation_channel::<D>(context, database, segment);
    let translation = sample_translation_channel::<D>(context, database, segment);
    let scale = sample_scale_channel::<D>(context, database, segment);
    Transform {
        rotation,
        translation: translation.truncate(),
        scale: scale.truncate(),
    }
}

fn make_context(database: &TrackDatabase, segment: &Segment, sample_time: f32) -> SampleContext {
    let sample_key = match segment.distribution {
        SampleDistribution::Uniform => uniform_sample_key(
            database.num_samples_per_track(),
            database.sample_rate(),
            segment.num_samples,
            segment.start_offset,
            sample_time,
        ),
        SampleDistribution::Variable => 0,
    };
    SampleContext {
        transform_index: 0,
        sample_key,
        sample_time,
    }
}

/// Sample every transform of the pose at `sample_time`, in index order.
pub fn sample_pose(
    database: &TrackDatabase,
    segment: &Segment,
    sample_time: f32,
    out_pose: &mut [Transform],
) {
    let mut context = make_context(database, segment, sample_time);

    match segment.distribution {
        SampleDistribution::Uniform => {
            for transform_index in 0..database.num_transforms() {
                context.transform_index = transform_index;
                out_pose[transform_index as usize] =
                    sample_transform_at::<UniformKeys>(&context, database, segment);
            }
        }
        SampleDistribution::Variable => {
            for transform_index in 0..database.num_transforms() {
                context.transform_index = transform_index;
                out_pose[transform_index as usize] =
                    sample_transform_at::<VariableKeys>(&context, database, segment);
            }
        }
    }
}

/// Sample a single transform at `sample_time`, writing only its pose slot.
pub fn sample_transform(
    database: &TrackDatabase,
    segment: &Segment,
    sample_time: f32,
    transform_index: u32,
    out_pose: &mut [Transform],
) {
    let mut context = make_context(database, segment, sample_time);
    context.transform_index = transform_index;

    out_pose[transform_index as usize] = match segment.distribution {
        SampleDistribution::Uniform => sample_transform_at::<UniformKeys>(&context, database, segment),
        SampleDistribution::Variable => {
            sample_transform_at::<VariableKeys>(&context, database, segment)
        }
    };
}

/// Sample from `target_transform_index` up through its parent chain to the
/// root, writing each visited transform's pose slot and no others.
pub fn sample_pose_hierarchical(
    database: &TrackDatabase,
    segment: &Segment,
    sample_time: f32,
    target_transform_index: u32,
    out_pose: &mut [Transform],
) {
    let mut context = make_context(database, segment, sample_time);

    let mut current = target_transform_index;
    while current != u32::from(INVALID_TRANSFORM_INDEX) {
        context.transform_index = current;
        out_pose[current as usize] = match segment.distribution {
            SampleDistribution::Uniform => {
                sample_transform_at::<UniformKeys>(&context, database, segment)
            }
            SampleDistribution::Variable => {
                sample_transform_at::<VariableKeys>(&context, database, segment)
            }
        };
        current = u32::from(database.parent_index(current));
    }
}

// ── Decayed pose sampling ──────────────────────────────────────────────────

fn resolve_rotation_encoding(working: &TrackDatabase, bit_rates: &TransformBitRates) -> Encoding {
    if working.rotation_format().is_variable() {
        Encoding::from_bit_rate(bit_rates.rotation)
    } else {
        Encoding::from_rotation_format(working.rotation_format())
    }
}

fn resolve_translation_encoding(working: &TrackDatabase, bit_rates: &TransformBitRates) -> Encoding {
    if working.translation_format().is_variable() {
        Encoding::from_bit_rate(bit_rates.translation)
    } else {
        Encoding::from_vector_format(working.translation_format())
    }
}

fn resolve_scale_encoding(working: &TrackDatabase, bit_rates: &TransformBitRates) -> Encoding {
    if working.scale_format().is_variable() {
        Encoding::from_bit_rate(bit_rates.scale)
    } else {
        Encoding::from_vector_format(working.scale_format())
    }
}

fn sample_transform_decayed<D: DistributionKind>(
    context: &SampleContext,
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    bit_rates: &TransformBitRates,
) -> Transform {
    let transform_range = working.range(context.transform_index);
    let transform_index = context.transform_index;

    let rotation = if transform_range.is_rotation_default {
        Quat::IDENTITY
    } else if transform_range.is_rotation_constant {
        rotation_sample(working, segment, transform_index, 0).normalize()
    } else {
        let encoding = resolve_rotation_encoding(working, bit_rates);
        let (key0, key1, alpha) = segment_keys::<D>(context, working, segment);
        let sample0 = decayed_rotation_sample(raw, working, segment, transform_index, key0, encoding);
        if D::IS_VARIABLE {
            let sample1 =
                decayed_rotation_sample(raw, working, segment, transform_index, key1, encoding);
            sample0.lerp(sample1, alpha)
        } else {
            sample0.normalize()
        }
    };

    let translation = if transform_range.is_translation_default {
        Vec4::ZERO
    } else if transform_range.is_translation_constant {
        translation_sample(working, segment, transform_index, 0)
    } else {
        let encoding = resolve_translation_encoding(working, bit_rates);
        let (key0, key1, alpha) = segment_keys::<D>(context, working, segment);
        let sample0 =
            decayed_translation_sample(raw, working, segment, transform_index, key0, encoding);
        if D::IS_VARIABLE {
            let sample1 =
                decayed_translation_sample(raw, working, segment, transform_index, key1, encoding);
            sample0.lerp(sample1, alpha)
        } else {
            sample0
        }
    };

    let scale = if transform_range.is_scale_default {
        working.default_scale()
    } else if transform_range.is_scale_constant {
        scale_sample(working, segment, transform_index, 0)
    } else {
        let encoding = resolve_scale_encoding(working, bit_rates);
        let (key0, key1, alpha) = segment_keys::<D>(context, working, segment);
        let sample0 = decayed_scale_sample(raw, working, segment, transform_index, key0, encoding);
        if D::IS_VARIABLE {
            let sample1 =
                decayed_scale_sample(raw, working, segment, transform_index, key1, encoding);
            sample0.lerp(sample1, alpha)
        } else {
            sample0
        }
    };

    Transform {
        rotation,
        translation: translation.truncate(),
        scale: scale.truncate(),
    }
}

/// Sample the whole pose as a decoder would reconstruct it under the
/// candidate `bit_rates`, one entry per transform.
pub fn sample_pose_decayed(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    sample_time: f32,
    bit_rates: &[TransformBitRates],
    out_pose: &mut [Transform],
) {
    let mut context = make_context(working, segment, sample_time);

    match segment.distribution {
        SampleDistribution::Uniform => {
            for transform_index in 0..working.num_transforms() {
                context.transform_index = transform_index;
                out_pose[transform_index as usize] = sample_transform_decayed::<UniformKeys>(
                    &context,
                    raw,
                    working,
                    segment,
                    &bit_rates[transform_index as usize],
                );
            }
        }
        SampleDistribution::Variable => {
            for transform_index in 0..working.num_transforms() {
                context.transform_index = transform_index;
                out_pose[transform_index as usize] = sample_transform_decayed::<VariableKeys>(
                    &context,
                    raw,
                    working,
                    segment,
                    &bit_rates[transform_index as usize],
                );
            }
        }
    }
}

/// Decayed sampling along the parent chain of `target_transform_index`,
/// for hierarchical error metrics.
pub fn sample_pose_decayed_hierarchical(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    sample_time: f32,
    target_transform_index: u32,
    bit_rates: &[TransformBitRates],
    out_pose: &mut [Transform],
) {
    let mut context = make_context(working, segment, sample_time);

    let mut current = target_transform_index;
    while current != u32::from(INVALID_TRANSFORM_INDEX) {
        context.transform_index = current;
        let rates = &bit_rates[current as usize];
        out_pose[current as usize] = match segment.distribution {
            SampleDistribution::Uniform => {
                sample_transform_decayed::<UniformKeys>(&context, raw, working, segment, rates)
            }
            SampleDistribution::Variable => {
                sample_transform_decayed::<VariableKeys>(&context, raw, working, segment, rates)
            }
        };
        current = u32::from(working.parent_index(current));
    }
}
