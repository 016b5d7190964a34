//! ATCF compression core: the mutable working state of the skeletal
//! animation compression pipeline.
//!
//! A clip flows through: ingest ([`TrackDatabase::from_clip`]) → rotation
//! format conversion → clip-range then segment-range normalization
//! ([`normalize`]) → decayed sampling during the external bit-rate search
//! ([`sampler`], [`bitrate`]) → bit-packed emission ([`writer`]).

pub mod bitrate;
pub mod buffer;
pub mod clip;
pub mod database;
pub mod error;
pub mod format;
pub mod normalize;
pub mod packing;
pub mod ranges;
pub mod sampler;
pub mod segment;
pub mod settings;
pub mod writer;

pub use bitrate::{BitRateSelection, ChannelState, TransformBitRates};
pub use clip::{BoneTracks, ClipMode, RawClip};
pub use database::{TrackChannel, TrackDatabase, Transform};
pub use error::{Error, Result};
pub use format::{RotationFormat, VectorFormat};
pub use ranges::{ChannelRange, TransformRanges};
pub use sampler::Encoding;
pub use segment::{partition_clip, SampleDistribution, Segment};
pub use settings::CompressionSettings;
pub use writer::{write_clip, BlobWriter, CompressionStats, SegmentSink};
