use glam::{Quat, Vec3};

use crate::error::{Error, Result};
use crate::format::INVALID_TRANSFORM_INDEX;

/// Maximum deviation from unit length tolerated for input rotations.
/// Keeping rotations unit is the keyframe provider's responsibility; this is
/// the enforcement threshold at ingest.
pub const UNIT_ROTATION_TOLERANCE: f32 = 1.0e-4;

/// Whether the clip stores absolute poses or an additive layer.
///
/// The distinction only matters for the default scale: an additive layer's
/// neutral scale contribution is zero, a standard clip's is identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipMode {
    #[default]
    Standard,
    Additive,
}

impl ClipMode {
    /// The scale a bone holds when its scale channel is absent or default.
    #[inline]
    pub fn default_scale(self) -> Vec3 {
        match self {
            ClipMode::Standard => Vec3::ONE,
            ClipMode::Additive => Vec3::ZERO,
        }
    }
}

/// Keyframes for one bone, array-of-structs as delivered by the provider.
/// All three tracks run at the clip's sample rate and length.
#[derive(Debug, Clone)]
pub struct BoneTracks {
    /// Index of the parent transform, or [`INVALID_TRANSFORM_INDEX`] for a
    /// root. Must be lower than the bone's own index.
    pub parent_index: u16,
    pub rotations: Vec<Quat>,
    pub translations: Vec<Vec3>,
    pub scales: Vec<Vec3>,
}

/// A validated, uncompressed animation clip: the keyframe provider contract.
///
/// Construction performs all input validation: non-unit rotations, zero
/// sample rate, empty clips, inconsistent track lengths, and bad hierarchy
/// are rejected here. A `RawClip` that exists is safe to ingest.
#[derive(Debug, Clone)]
pub struct RawClip {
    bones: Vec<BoneTracks>,
    num_samples: u32,
    sample_rate: f32,
    mode: ClipMode,
}

impl RawClip {
    pub fn new(bones: Vec<BoneTracks>, sample_rate: f32, mode: ClipMode) -> Result<Self> {
        if bones.is_empty() {
            return Err(Error::NoTransforms);
        }
        if !(sample_rate > 0.0) || !sample_rate.is_finite() {
            return Err(Error::InvalidSampleRate(sample_rate));
        }

        let num_samples = bones[0].rotations.len() as u32;
        if num_samples == 0 {
            return Err(Error::EmptyClip);
        }

        for (bone_index, bone) in bones.iter().enumerate() {
            let bone_index = bone_index as u16;

            if bone.parent_index != INVALID_TRANSFORM_INDEX && bone.parent_index >= bone_index {
                return Err(Error::InvalidParentIndex {
                    transform: bone_index,
                    parent: bone.parent_index,
                });
            }

            for (channel, actual) in [
                ("rotation", bone.rotations.len()),
                ("translation", bone.translations.len()),
                ("scale", bone.scales.len()),
            ] {
                if actual != num_samples as usize {
                    return Err(Error::TrackLengthMismatch {
                        transform: bone_index,
                        channel,
                        actual,
                        expected: num_samples,
                    });
                }
            }

            for (sample_index, rotation) in bone.rotations.iter().enumerate() {
                let length = rotation.length();
                if (length - 1.0).abs() > UNIT_ROTATION_TOLERANCE {
                    return Err(Error::NonUnitRotation {
                        transform: bone_index,
                        sample: sample_index as u32,
                        length,
                    });
                }
            }
        }

        Ok(Self {
            bones,
            num_samples,
            sample_rate,
            mode,
        })
    }

    #[inline]
    pub fn num_transforms(&self) -> u32 {
        self.bones.len() as u32
    }

    #[inline]
    pub fn num_samples_per_track(&self) -> u32 {
        self.num_samples
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Clip duration in seconds. A single-sample clip is a static pose with
    /// zero duration.
    #[inline]
    pub fn duration(&self) -> f32 {
        (self.num_samples.saturating_sub(1)) as f32 / self.sample_rate
    }

    #[inline]
    pub fn mode(&self) -> ClipMode {
        self.mode
    }

    #[inline]
    pub fn default_scale(&self) -> Vec3 {
        self.mode.default_scale()
    }

    #[inline]
    pub fn bone(&self, transform_index: u32) -> &BoneTracks {
        &self.bones[transform_index as usize]
    }

    #[inline]
    pub fn parent_index(&self, transform_index: u32) -> u16 {
        self.bones[transform_index as usize].parent_index
    }

    /// Whether any scale sample deviates from the default scale by more than
    /// `threshold`. Clips that never scale skip the scale tracks entirely.
    pub fn has_scale(&self, threshold: f32) -> bool {
        let default_scale = self.default_scale();
        self.bones.iter().any(|bone| {
            bone.scales
                .iter()
                .any(|scale| (*scale - default_scale).abs().max_element() > threshold)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_bone(parent_index: u16, num_samples: usize) -> BoneTracks {
        BoneTracks {
            parent_index,
            rotations: vec![Quat::IDENTITY; num_samples],
            translations: vec![Vec3::ZERO; num_samples],
            scales: vec![Vec3::ONE; num_samples],
        }
    }

    #[test]
    fn accepts_a_minimal_clip() {
        let clip = RawClip::new(
            vec![static_bone(INVALID_TRANSFORM_INDEX, 5)],
            30.0,
            ClipMode::Standard,
        )
        .unwrap();
        assert_eq!(clip.num_transforms(), 1);
        assert_eq!(clip.num_samples_per_track(), 5);
        assert!((clip.duration() - 4.0 / 30.0).abs() < 1.0e-6);
        assert!(!clip.has_scale(0.00001));
    }

    #[test]
    fn rejects_empty_and_bad_rate() {
        assert!(matches!(
            RawClip::new(vec![], 30.0, ClipMode::Standard),
            Err(Error::NoTransforms)
        ));
        assert!(matches!(
            RawClip::new(
                vec![static_bone(INVALID_TRANSFORM_INDEX, 0)],
                30.0,
                ClipMode::Standard
            ),
            Err(Error::EmptyClip)
        ));
        assert!(matches!(
            RawClip::new(
                vec![static_bone(INVALID_TRANSFORM_INDEX, 1)],
                0.0,
                ClipMode::Standard
            ),
            Err(Error::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn rejects_non_unit_rotation() {
        let mut bone = static_bone(INVALID_TRANSFORM_INDEX, 3);
        bone.rotations[1] = Quat::from_xyzw(0.5, 0.5, 0.5, 0.9);
        let err = RawClip::new(vec![bone], 30.0, ClipMode::Standard).unwrap_err();
        assert!(matches!(
            err,
            Error::NonUnitRotation {
                transform: 0,
                sample: 1,
                ..
            }
        ));
    }

    #[test]
    fn rejects_forward_parent_reference() {
        let bones = vec![static_bone(1, 2), static_bone(INVALID_TRANSFORM_INDEX, 2)];
        assert!(matches!(
            RawClip::new(bones, 30.0, ClipMode::Standard),
            Err(Error::InvalidParentIndex {
                transform: 0,
                parent: 1
            })
        ));
    }

    #[test]
    fn additive_clips_default_to_zero_scale() {
        assert_eq!(ClipMode::Additive.default_scale(), Vec3::ZERO);
        assert_eq!(ClipMode::Standard.default_scale(), Vec3::ONE);
    }
}
