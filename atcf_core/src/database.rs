//! The track database owns one contiguous, mutable SOA buffer holding all
//! track data for a clip.
//!
//! Layout within a segment (S = num_simd_samples of that segment):
//! ```text
//! transform 0
//!     rotation:    x0..xS-1 | y0..yS-1 | z0..zS-1 | w0..wS-1
//!     translation: x0..xS-1 | y0..yS-1 | z0..zS-1
//!     scale?:      x0..xS-1 | y0..yS-1 | z0..zS-1
//! transform 1
//! ...
//! ```
//! Each component occupies `4 * S` bytes, each transform `component_size * C`
//! bytes (C = 7 without scale, 10 with), each segment
//! `transform_size * num_transforms` bytes at its `soa_start_offset`. Sample
//! counts are rounded up to the SIMD width with the last valid sample
//! replicated into the padding, so component sweeps never read garbage.

use glam::{Quat, Vec3, Vec4};
use log::debug;

use crate::buffer::AlignedBuf;
use crate::clip::RawClip;
use crate::error::Result;
use crate::format::{RotationFormat, VectorFormat};
use crate::packing::quat_ensure_positive_w;
use crate::ranges::TransformRanges;
use crate::segment::{num_components_per_transform, total_soa_size, Segment};
use crate::settings::CompressionSettings;

/// Which channel of a transform a component address refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackChannel {
    Rotation,
    Translation,
    Scale,
}

/// Shared view of one rotation channel: four SOA component lanes, each
/// exactly `num_simd_samples` long.
pub struct SoaQuat<'a> {
    pub x: &'a [f32],
    pub y: &'a [f32],
    pub z: &'a [f32],
    pub w: &'a [f32],
}

/// Shared view of one translation or scale channel.
pub struct SoaVec3<'a> {
    pub x: &'a [f32],
    pub y: &'a [f32],
    pub z: &'a [f32],
}

pub struct TrackDatabase {
    num_transforms: u32,
    num_samples_per_track: u32,
    sample_rate: f32,
    duration: f32,

    has_scale: bool,
    default_scale: Vec4,

    rotation_format: RotationFormat,
    translation_format: VectorFormat,
    scale_format: VectorFormat,

    parent_indices: Vec<u16>,
    ranges: Vec<TransformRanges>,

    data: AlignedBuf,
}

impl TrackDatabase {
    /// Build the database from a validated clip: AoS→SoA transposition plus
    /// SIMD padding, one segment at a time.
    ///
    /// Rotations are re-normalized during the copy; the clip guarantees they
    /// are unit to within the ingest tolerance, this removes the residue.
    pub fn from_clip(
        clip: &RawClip,
        settings: &CompressionSettings,
        segments: &[Segment],
    ) -> Result<Self> {
        let has_scale = clip.has_scale(settings.constant_scale_threshold);
        let num_transforms = clip.num_transforms();

        let data_size = total_soa_size(segments);
        let mut data = AlignedBuf::zeroed(data_size)?;

        let parent_indices = (0..num_transforms).map(|t| clip.parent_index(t)).collect();
        let ranges = vec![TransformRanges::default(); num_transforms as usize];

        let default_scale = clip.default_scale().extend(0.0);

        let mut database = Self {
            num_transforms,
            num_samples_per_track: clip.num_samples_per_track(),
            sample_rate: clip.sample_rate(),
            duration: clip.duration(),
            has_scale,
            default_scale,
            rotation_format: RotationFormat::Quat128,
            translation_format: VectorFormat::Vector96,
            scale_format: VectorFormat::Vector96,
            parent_indices,
            ranges,
            data: AlignedBuf::zeroed(0)?,
        };

        for segment in segments {
            for transform_index in 0..num_transforms {
                let bone = clip.bone(transform_index);
                database.ingest_track(
                    data.as_f32_mut(),
                    segment,
                    transform_index,
                    bone,
                );
            }
        }

        database.data = data;

        debug!(
            "ingested clip: {} transforms, {} samples/track, {} segments, {} bytes SOA{}",
            num_transforms,
            database.num_samples_per_track,
            segments.len(),
            data_size,
            if has_scale { ", with scale" } else { "" },
        );

        Ok(database)
    }

    fn ingest_track(
        &self,
        data: &mut [f32],
        segment: &Segment,
        transform_index: u32,
        bone: &crate::clip::BoneTracks,
    ) {
        let num_samples = segment.num_samples as usize;
        let num_simd_samples = segment.num_simd_samples as usize;
        let clip_base = segment.start_offset as usize;

        for component in 0..4 {
            let span = self.component_span(segment, transform_index, TrackChannel::Rotation, component);
            let lane = &mut data[span];
            for sample_index in 0..num_samples {
                let rotation = bone.rotations[clip_base + sample_index].normalize();
                lane[sample_index] = match component {
                    0 => rotation.x,
                    1 => rotation.y,
                    2 => rotation.z,
                    _ => rotation.w,
                };
            }
            for sample_index in num_samples..num_simd_samples {
                lane[sample_index] = lane[num_samples - 1];
            }
        }

        for component in 0..3 {
            let span =
                self.component_span(segment, transform_index, TrackChannel::Translation, component);
            let lane = &mut data[span];
            for sample_index in 0..num_samples {
                lane[sample_index] = bone.translations[clip_base + sample_index][component];
            }
            for sample_index in num_samples..num_simd_samples {
                lane[sample_index] = lane[num_samples - 1];
            }
        }

        if self.has_scale {
            for component in 0..3 {
                let span =
                    self.component_span(segment, transform_index, TrackChannel::Scale, component);
                let lane = &mut data[span];
                for sample_index in 0..num_samples {
                    lane[sample_index] = bone.scales[clip_base + sample_index][component];
                }
                for sample_index in num_samples..num_simd_samples {
                    lane[sample_index] = lane[num_samples - 1];
                }
            }
        }
    }

    /// Duplicate this database into the working copy mutated by the
    /// normalization and format-conversion passes. The original stays
    /// immutable as the raw reference for decayed sampling.
    pub fn working_copy(&self) -> Result<Self> {
        Ok(Self {
            num_transforms: self.num_transforms,
            num_samples_per_track: self.num_samples_per_track,
            sample_rate: self.sample_rate,
            duration: self.duration,
            has_scale: self.has_scale,
            default_scale: self.default_scale,
            rotation_format: self.rotation_format,
            translation_format: self.translation_format,
            scale_format: self.scale_format,
            parent_indices: self.parent_indices.clone(),
            ranges: self.ranges.clone(),
            data: self.data.duplicate()?,
        })
    }

    // ── Metadata ───────────────────────────────────────────────────────────

    #[inline]
    pub fn num_transforms(&self) -> u32 {
        self.num_transforms
    }

    #[inline]
    pub fn num_samples_per_track(&self) -> u32 {
        self.num_samples_per_track
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.duration
    }

    #[inline]
    pub fn has_scale(&self) -> bool {
        self.has_scale
    }

    /// The scale used when the clip stores no scale tracks, as a Vec4 with
    /// zero w.
    #[inline]
    pub fn default_scale(&self) -> Vec4 {
        self.default_scale
    }

    #[inline]
    pub fn rotation_format(&self) -> RotationFormat {
        self.rotation_format
    }

    #[inline]
    pub fn translation_format(&self) -> VectorFormat {
        self.translation_format
    }

    #[inline]
    pub fn scale_format(&self) -> VectorFormat {
        self.scale_format
    }

    #[inline]
    pub fn parent_index(&self, transform_index: u32) -> u16 {
        self.parent_indices[transform_index as usize]
    }

    /// Clip-wide range state for one transform.
    #[inline]
    pub fn range(&self, transform_index: u32) -> &TransformRanges {
        &self.ranges[transform_index as usize]
    }

    #[inline]
    pub fn range_mut(&mut self, transform_index: u32) -> &mut TransformRanges {
        &mut self.ranges[transform_index as usize]
    }

    // ── Addressing ─────────────────────────────────────────────────────────

    /// Float-index range of one component lane within the SOA buffer.
    ///
    /// Addressing identity: rotation base = soa_start_offset +
    /// transform * transform_size; translation base = rotation base +
    /// 4 * component_size; scale base = translation base +
    /// 3 * component_size; component k at `k * component_size`.
    fn component_span(
        &self,
        segment: &Segment,
        transform_index: u32,
        channel: TrackChannel,
        component: usize,
    ) -> std::ops::Range<usize> {
        debug_assert!(transform_index < self.num_transforms, "transform index out of range");
        debug_assert!(!(channel == TrackChannel::Scale && !self.has_scale));
        debug_assert!(component < if channel == TrackChannel::Rotation { 4 } else { 3 });

        // In floats rather than bytes: component_size becomes S.
        let component_size = segment.num_simd_samples as usize;
        let transform_size = component_size * num_components_per_transform(self.has_scale) as usize;

        let segment_base = segment.soa_start_offset as usize / 4;
        let transform_base = segment_base + transform_index as usize * transform_size;
        let channel_base = match channel {
            TrackChannel::Rotation => transform_base,
            TrackChannel::Translation => transform_base + 4 * component_size,
            TrackChannel::Scale => transform_base + 7 * component_size,
        };

        let start = channel_base + component * component_size;
        start..start + component_size
    }

    /// One component lane of one track, `num_simd_samples` floats.
    #[inline]
    pub fn component(
        &self,
        segment: &Segment,
        transform_index: u32,
        channel: TrackChannel,
        component: usize,
    ) -> &[f32] {
        &self.data.as_f32()[self.component_span(segment, transform_index, channel, component)]
    }

    /// Mutable access to one component lane.
    #[inline]
    pub fn component_mut(
        &mut self,
        segment: &Segment,
        transform_index: u32,
        channel: TrackChannel,
        component: usize,
    ) -> &mut [f32] {
        let span = self.component_span(segment, transform_index, channel, component);
        &mut self.data.as_f32_mut()[span]
    }

    /// All four rotation lanes of one track. The w lane stays live even
    /// under drop-W formats until format conversion overwrites it.
    pub fn rotations<'a>(&'a self, segment: &Segment, transform_index: u32) -> SoaQuat<'a> {
        SoaQuat {
            x: self.component(segment, transform_index, TrackChannel::Rotation, 0),
            y: self.component(segment, transform_index, TrackChannel::Rotation, 1),
            z: self.component(segment, transform_index, TrackChannel::Rotation, 2),
            w: self.component(segment, transform_index, TrackChannel::Rotation, 3),
        }
    }

    pub fn translations<'a>(&'a self, segment: &Segment, transform_index: u32) -> SoaVec3<'a> {
        SoaVec3 {
            x: self.component(segment, transform_index, TrackChannel::Translation, 0),
            y: self.component(segment, transform_index, TrackChannel::Translation, 1),
            z: self.component(segment, transform_index, TrackChannel::Translation, 2),
        }
    }

    /// Scale lanes, or `None` when the clip has no scale; callers fall back
    /// to [`default_scale`](Self::default_scale) without touching storage.
    pub fn scales<'a>(&'a self, segment: &Segment, transform_index: u32) -> Option<SoaVec3<'a>> {
        if !self.has_scale {
            return None;
        }
        Some(SoaVec3 {
            x: self.component(segment, transform_index, TrackChannel::Scale, 0),
            y: self.component(segment, transform_index, TrackChannel::Scale, 1),
            z: self.component(segment, transform_index, TrackChannel::Scale, 2),
        })
    }

    // ── Scalar access ──────────────────────────────────────────────────────

    pub fn rotation(&self, segment: &Segment, transform_index: u32, sample_index: u32) -> Vec4 {
        let lanes = self.rotations(segment, transform_index);
        let i = sample_index as usize;
        Vec4::new(lanes.x[i], lanes.y[i], lanes.z[i], lanes.w[i])
    }

    pub fn translation(&self, segment: &Segment, transform_index: u32, sample_index: u32) -> Vec4 {
        let lanes = self.translations(segment, transform_index);
        let i = sample_index as usize;
        Vec4::new(lanes.x[i], lanes.y[i], lanes.z[i], 0.0)
    }

    pub fn scale(&self, segment: &Segment, transform_index: u32, sample_index: u32) -> Vec4 {
        match self.scales(segment, transform_index) {
            Some(lanes) => {
                let i = sample_index as usize;
                Vec4::new(lanes.x[i], lanes.y[i], lanes.z[i], 0.0)
            }
            None => self.default_scale,
        }
    }

    pub fn set_rotation(
        &mut self,
        rotation: Vec4,
        segment: &Segment,
        transform_index: u32,
        sample_index: u32,
    ) {
        let i = sample_index as usize;
        self.component_mut(segment, transform_index, TrackChannel::Rotation, 0)[i] = rotation.x;
        self.component_mut(segment, transform_index, TrackChannel::Rotation, 1)[i] = rotation.y;
        self.component_mut(segment, transform_index, TrackChannel::Rotation, 2)[i] = rotation.z;
        self.component_mut(segment, transform_index, TrackChannel::Rotation, 3)[i] = rotation.w;
    }

    pub fn set_translation(
        &mut self,
        translation: Vec4,
        segment: &Segment,
        transform_index: u32,
        sample_index: u32,
    ) {
        let i = sample_index as usize;
        self.component_mut(segment, transform_index, TrackChannel::Translation, 0)[i] = translation.x;
        self.component_mut(segment, transform_index, TrackChannel::Translation, 1)[i] = translation.y;
        self.component_mut(segment, transform_index, TrackChannel::Translation, 2)[i] = translation.z;
    }

    /// No-op when the clip stores no scale tracks.
    pub fn set_scale(
        &mut self,
        scale: Vec4,
        segment: &Segment,
        transform_index: u32,
        sample_index: u32,
    ) {
        if !self.has_scale {
            return;
        }
        let i = sample_index as usize;
        self.component_mut(segment, transform_index, TrackChannel::Scale, 0)[i] = scale.x;
        self.component_mut(segment, transform_index, TrackChannel::Scale, 1)[i] = scale.y;
        self.component_mut(segment, transform_index, TrackChannel::Scale, 2)[i] = scale.z;
    }

    // ── Format conversion ──────────────────────────────────────────────────

    /// Rewrite every rotation into the target format's storage convention.
    ///
    /// Drop-W targets flip quaternions into the w >= 0 hemisphere so the
    /// decoder's `+sqrt` reconstruction recovers the right rotation. The w
    /// lane keeps its (flipped) value; it simply stops being emitted.
    pub fn convert_rotations(&mut self, segments: &[Segment], target: RotationFormat) {
        if target.drops_w() {
            for segment in segments {
                for transform_index in 0..self.num_transforms {
                    for sample_index in 0..segment.num_simd_samples {
                        let rotation = self.rotation(segment, transform_index, sample_index);
                        let flipped = quat_ensure_positive_w(rotation);
                        self.set_rotation(flipped, segment, transform_index, sample_index);
                    }
                }
            }
        }
        self.rotation_format = target;
    }

    pub fn set_vector_formats(&mut self, translation: VectorFormat, scale: VectorFormat) {
        self.translation_format = translation;
        self.scale_format = scale;
    }
}

/// Convert a rotation sample between storage conventions.
///
/// Quat128 → drop-W flips into the positive-w hemisphere; drop-W → Quat128
/// reconstructs w. Within the same variant this is the identity.
pub fn convert_rotation(rotation: Vec4, from: RotationFormat, to: RotationFormat) -> Vec4 {
    match (from.drops_w(), to.drops_w()) {
        (false, true) => quat_ensure_positive_w(rotation),
        (true, false) => {
            let quat = crate::packing::quat_from_positive_w(rotation);
            Vec4::new(quat.x, quat.y, quat.z, quat.w)
        }
        _ => rotation,
    }
}

/// Pose-space transform produced by the samplers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub rotation: Quat,
    pub translation: Vec3,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
    };
}
