use crate::format::{RotationFormat, VectorFormat};

/// Knobs for one compression run.
#[derive(Debug, Clone, Copy)]
pub struct CompressionSettings {
    pub rotation_format: RotationFormat,
    pub translation_format: VectorFormat,
    pub scale_format: VectorFormat,

    /// Target number of samples per segment. The clip timeline is tiled into
    /// windows of at most this many samples; the last window may be shorter.
    pub segment_max_samples: u32,

    /// A clip whose every scale sample is within this threshold of the
    /// default scale stores no scale tracks at all.
    pub constant_scale_threshold: f32,

    /// Error bound handed to the bit-rate search driver. The core itself
    /// only evaluates candidates; the driver decides what passes.
    pub target_error: f32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            rotation_format: RotationFormat::QuatDropWVariable,
            translation_format: VectorFormat::VectorVariable,
            scale_format: VectorFormat::VectorVariable,
            segment_max_samples: 16,
            constant_scale_threshold: 0.00001,
            target_error: 0.01,
        }
    }
}
