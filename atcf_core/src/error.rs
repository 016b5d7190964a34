/// Errors reported while validating and ingesting a clip.
///
/// The compression core never exposes a partially constructed database: any
/// of these aborts construction before the SOA buffer becomes visible.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("clip has no samples")]
    EmptyClip,

    #[error("clip has no transforms")]
    NoTransforms,

    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f32),

    #[error("transform {transform}, sample {sample}: rotation is not a unit quaternion (length {length})")]
    NonUnitRotation {
        transform: u16,
        sample: u32,
        length: f32,
    },

    #[error("transform {transform}: parent index {parent} must be lower than the transform's own index")]
    InvalidParentIndex { transform: u16, parent: u16 },

    #[error("transform {transform}: {channel} track has {actual} samples, clip expects {expected}")]
    TrackLengthMismatch {
        transform: u16,
        channel: &'static str,
        actual: usize,
        expected: u32,
    },

    #[error("allocation of {size} bytes (alignment {align}) failed")]
    OutOfMemory { size: usize, align: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
