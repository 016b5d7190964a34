use glam::Vec4;

/// Min/extent pair for one channel of one transform, in whatever space the
/// owning database currently stores that channel (raw, or clip-normalized
/// for the per-segment ranges).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelRange {
    pub min: Vec4,
    pub extent: Vec4,
}

impl ChannelRange {
    pub const ZERO: Self = Self {
        min: Vec4::ZERO,
        extent: Vec4::ZERO,
    };

    #[inline]
    pub fn new(min: Vec4, extent: Vec4) -> Self {
        Self { min, extent }
    }

    /// Map a sample into [0,1] space: `(x - min) / extent`, with components
    /// of zero extent mapping to 0. Zero extent is the in-band encoding of a
    /// constant component, not an error.
    #[inline]
    pub fn normalize(&self, sample: Vec4) -> Vec4 {
        let normalized = (sample - self.min) / self.extent;
        Vec4::select(self.extent.cmpgt(Vec4::ZERO), normalized, Vec4::ZERO)
    }

    /// Inverse of [`normalize`]: `x * extent + min`.
    #[inline]
    pub fn unnormalize(&self, sample: Vec4) -> Vec4 {
        sample.mul_add(self.extent, self.min)
    }

    /// Largest per-component extent, used for constant-channel detection.
    #[inline]
    pub fn max_extent(&self) -> f32 {
        self.extent.max_element()
    }
}

/// Range state for the three channels of one transform, within one window
/// (the whole clip, or one segment).
///
/// Flag invariants: `is_*_default` implies `is_*_constant`; `is_*_constant`
/// implies the channel's extent is below the constant threshold and the
/// channel's value lives in `min`.
#[derive(Debug, Clone, Copy)]
pub struct TransformRanges {
    pub rotation: ChannelRange,
    pub translation: ChannelRange,
    pub scale: ChannelRange,

    pub is_rotation_constant: bool,
    pub is_rotation_default: bool,
    pub is_translation_constant: bool,
    pub is_translation_default: bool,
    pub is_scale_constant: bool,
    pub is_scale_default: bool,

    /// Whether the owning database's samples are currently stored in [0,1]
    /// space relative to this range.
    pub are_rotations_normalized: bool,
    pub are_translations_normalized: bool,
    pub are_scales_normalized: bool,
}

impl Default for TransformRanges {
    fn default() -> Self {
        Self {
            rotation: ChannelRange::ZERO,
            translation: ChannelRange::ZERO,
            scale: ChannelRange::ZERO,
            is_rotation_constant: false,
            is_rotation_default: false,
            is_translation_constant: false,
            is_translation_default: false,
            is_scale_constant: false,
            is_scale_default: false,
            are_rotations_normalized: false,
            are_translations_normalized: false,
            are_scales_normalized: false,
        }
    }
}

impl TransformRanges {
    /// An animated rotation is neither default nor constant.
    #[inline]
    pub fn is_rotation_animated(&self) -> bool {
        !self.is_rotation_constant && !self.is_rotation_default
    }

    #[inline]
    pub fn is_translation_animated(&self) -> bool {
        !self.is_translation_constant && !self.is_translation_default
    }

    #[inline]
    pub fn is_scale_animated(&self) -> bool {
        !self.is_scale_constant && !self.is_scale_default
    }
}

/// Accumulates a per-component min/max sweep over a run of samples and
/// resolves it into a [`ChannelRange`].
#[derive(Debug, Clone, Copy)]
pub struct RangeAccumulator {
    min: Vec4,
    max: Vec4,
}

impl RangeAccumulator {
    #[inline]
    pub fn new() -> Self {
        Self {
            min: Vec4::splat(f32::INFINITY),
            max: Vec4::splat(f32::NEG_INFINITY),
        }
    }

    #[inline]
    pub fn add(&mut self, sample: Vec4) {
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }

    #[inline]
    pub fn finish(self) -> ChannelRange {
        ChannelRange::new(self.min, self.max - self.min)
    }
}

impl Default for RangeAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
