//! Blob emission: serialized range data plus the bit-packed sample stream,
//! one payload per segment.
//!
//! # Layout written
//! ```text
//! [CLIP HEADER: 40 bytes]
//! [CLIP RANGE BLOCK]                       ← per-transform flags + ranges
//! [SEGMENT 0] [SEGMENT 1] ...              ← independent segment payloads
//! [SEGMENT INDEX: 32 bytes × N]
//! [FOOTER: 8 bytes — u64 LE offset of segment index]
//! ```
//!
//! Each segment payload is `[range data][packed samples]`, checksummed with
//! xxhash3-64. Multi-byte lanes are little-endian; variable-rate fields are
//! packed MSB-first at their bit offsets. When a segment mixes variable and
//! fixed formats, fixed-format samples are aligned to
//! [`MIXED_PACKING_ALIGNMENT_NUM_BITS`].

use log::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::bitrate::{animated_pose_bit_size, BitRateSelection, TransformBitRates};
use crate::database::{convert_rotation, TrackDatabase};
use crate::format::{
    is_constant_bit_rate, is_raw_bit_rate, num_bits_at_bit_rate, RotationFormat, VectorFormat,
    MAGIC, MIXED_PACKING_ALIGNMENT_NUM_BITS,
};
use crate::packing::{pack_vector3_32, pack_vector3_u48, quantize_unsigned, write_bits};
use crate::ranges::ChannelRange;
use crate::segment::Segment;

pub const CLIP_HEADER_SIZE: usize = 40;
pub const SEGMENT_ENTRY_SIZE: usize = 32;
pub const FLAG_HAS_CHECKSUM: u64 = 1 << 0;

// ── Sink contract ──────────────────────────────────────────────────────────

/// Downstream consumer of the encoded clip.
///
/// The core pushes the serialized clip header once, then one payload per
/// segment in index order. Implementations may stream to disk, accumulate a
/// blob, or feed a network pipe; the core never sees the destination.
pub trait SegmentSink {
    fn clip_header(&mut self, header: &[u8]);

    /// `range_data` and `packed_samples` are the two halves of the segment
    /// payload; `checksum` is xxhash3-64 over both, in order.
    fn segment_payload(
        &mut self,
        segment_index: u32,
        range_data: &[u8],
        packed_samples: &[u8],
        checksum: u64,
    );
}

/// One entry in the segment index.
#[derive(Debug, Clone, Default)]
pub struct SegmentEntry {
    /// Byte offset of this segment's payload from the start of the blob.
    pub offset: u64,
    pub range_data_len: u32,
    pub packed_samples_len: u32,
    pub checksum: u64,
}

impl SegmentEntry {
    pub fn to_bytes(&self) -> [u8; SEGMENT_ENTRY_SIZE] {
        let mut buf = [0u8; SEGMENT_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.range_data_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.packed_samples_len.to_le_bytes());
        buf[16..24].copy_from_slice(&self.checksum.to_le_bytes());
        // buf[24..32] reserved, stays zero
        buf
    }
}

/// In-memory sink that assembles the final ATCF1 blob: header, payloads,
/// segment index, footer.
#[derive(Default)]
pub struct BlobWriter {
    buf: Vec<u8>,
    entries: Vec<SegmentEntry>,
}

impl BlobWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the segment index and footer and return the sealed blob.
    pub fn finish(mut self) -> Vec<u8> {
        let index_offset = self.buf.len() as u64;
        for entry in &self.entries {
            self.buf.extend_from_slice(&entry.to_bytes());
        }
        self.buf.extend_from_slice(&index_offset.to_le_bytes());
        self.buf
    }

    pub fn entries(&self) -> &[SegmentEntry] {
        &self.entries
    }
}

impl SegmentSink for BlobWriter {
    fn clip_header(&mut self, header: &[u8]) {
        self.buf.extend_from_slice(header);
    }

    fn segment_payload(
        &mut self,
        _segment_index: u32,
        range_data: &[u8],
        packed_samples: &[u8],
        checksum: u64,
    ) {
        self.entries.push(SegmentEntry {
            offset: self.buf.len() as u64,
            range_data_len: range_data.len() as u32,
            packed_samples_len: packed_samples.len() as u32,
            checksum,
        });
        self.buf.extend_from_slice(range_data);
        self.buf.extend_from_slice(packed_samples);
    }
}

// ── Bit stream ─────────────────────────────────────────────────────────────

/// Append-only bit cursor over a growable byte buffer, MSB-first within each
/// byte.
struct BitStreamWriter {
    bytes: Vec<u8>,
    bit_length: usize,
}

impl BitStreamWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            bit_length: 0,
        }
    }

    fn write(&mut self, value: u32, num_bits: u32) {
        let needed_bytes = (self.bit_length + num_bits as usize).div_ceil(8);
        if self.bytes.len() < needed_bytes {
            self.bytes.resize(needed_bytes, 0);
        }
        self.bit_length = write_bits(&mut self.bytes, self.bit_length, value, num_bits);
    }

    /// Little-endian f32, only legal at byte alignment (every fixed-format
    /// write is 16-bit aligned by construction).
    fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    fn write_bytes(&mut self, data: &[u8]) {
        debug_assert_eq!(self.bit_length % 8, 0, "byte writes require byte alignment");
        self.bytes.extend_from_slice(data);
        self.bit_length += data.len() * 8;
    }

    fn align_to(&mut self, num_bits: u32) {
        let num_bits = num_bits as usize;
        let rem = self.bit_length % num_bits;
        if rem != 0 {
            let pad = num_bits - rem;
            let mut remaining = pad;
            while remaining > 0 {
                let chunk = remaining.min(32);
                self.write(0, chunk as u32);
                remaining -= chunk;
            }
        }
    }

    fn bit_length(&self) -> usize {
        self.bit_length
    }

    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

// ── Stats ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SegmentStats {
    pub index: u32,
    pub num_samples: u32,
    pub range_data_size: u32,
    pub animated_data_size: u32,
    pub animated_pose_bit_size: u32,
    pub checksum: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CompressionStats {
    /// Size of the clip as uncompressed f32 tracks (no SIMD padding).
    pub raw_size: u64,
    /// Total bytes pushed to the sink, header and range data included.
    pub compressed_size: u64,
    pub segments: Vec<SegmentStats>,
}

impl CompressionStats {
    pub fn ratio(&self) -> f64 {
        if self.compressed_size == 0 {
            return 1.0;
        }
        self.raw_size as f64 / self.compressed_size as f64
    }
}

// ── Emission ───────────────────────────────────────────────────────────────

fn push_channel_components(out: &mut Vec<u8>, value: glam::Vec4, num_components: usize) {
    for component in 0..num_components {
        out.extend_from_slice(&value[component].to_le_bytes());
    }
}

fn push_channel_range(out: &mut Vec<u8>, range: &ChannelRange, num_components: usize) {
    push_channel_components(out, range.min, num_components);
    push_channel_components(out, range.extent, num_components);
}

/// Serialize the 40-byte clip header.
fn serialize_clip_header(working: &TrackDatabase, num_segments: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(CLIP_HEADER_SIZE);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&1u16.to_le_bytes()); // version
    header.push(working.rotation_format().tag());
    header.push(working.translation_format().tag());
    header.push(working.scale_format().tag());
    header.push(u8::from(working.has_scale()));
    header.extend_from_slice(&working.num_transforms().to_le_bytes());
    header.extend_from_slice(&working.num_samples_per_track().to_le_bytes());
    header.extend_from_slice(&num_segments.to_le_bytes());
    header.extend_from_slice(&working.sample_rate().to_le_bytes());
    header.extend_from_slice(&FLAG_HAS_CHECKSUM.to_le_bytes());
    header.extend_from_slice(&[0u8; 2]); // reserved
    debug_assert_eq!(header.len(), CLIP_HEADER_SIZE);
    header
}

/// Serialize the per-transform clip ranges: a flags byte, then per channel
/// either nothing (default), the constant value (constant), or min+extent
/// (animated).
fn serialize_clip_ranges(working: &TrackDatabase) -> Vec<u8> {
    let mut out = Vec::new();
    for transform_index in 0..working.num_transforms() {
        let ranges = working.range(transform_index);

        let mut flags = 0u8;
        flags |= u8::from(ranges.is_rotation_constant);
        flags |= u8::from(ranges.is_rotation_default) << 1;
        flags |= u8::from(ranges.is_translation_constant) << 2;
        flags |= u8::from(ranges.is_translation_default) << 3;
        flags |= u8::from(ranges.is_scale_constant) << 4;
        flags |= u8::from(ranges.is_scale_default) << 5;
        out.push(flags);

        if !ranges.is_rotation_default {
            if ranges.is_rotation_constant {
                push_channel_components(&mut out, ranges.rotation.min, 4);
            } else {
                push_channel_range(&mut out, &ranges.rotation, 4);
            }
        }
        if !ranges.is_translation_default {
            if ranges.is_translation_constant {
                push_channel_components(&mut out, ranges.translation.min, 3);
            } else {
                push_channel_range(&mut out, &ranges.translation, 3);
            }
        }
        if working.has_scale() && !ranges.is_scale_default {
            if ranges.is_scale_constant {
                push_channel_components(&mut out, ranges.scale.min, 3);
            } else {
                push_channel_range(&mut out, &ranges.scale, 3);
            }
        }
    }
    out
}

/// Serialize one segment's range data: per-transform bit rates, then per
/// animated channel either the u48 constant sample (constant bit rate) or
/// the segment min+extent (quantized rates). Raw channels need neither.
fn serialize_segment_ranges(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    bit_rates: &[TransformBitRates],
) -> Vec<u8> {
    let mut out = Vec::new();

    for transform_index in 0..working.num_transforms() {
        let rates = &bit_rates[transform_index as usize];
        out.push(rates.rotation);
        out.push(rates.translation);
        out.push(rates.scale);
    }

    for transform_index in 0..working.num_transforms() {
        let clip_ranges = working.range(transform_index);
        let segment_ranges = &segment.ranges[transform_index as usize];
        let rates = &bit_rates[transform_index as usize];

        if clip_ranges.is_rotation_animated() {
            let is_variable = working.rotation_format().is_variable();
            if is_variable && is_constant_bit_rate(rates.rotation) {
                // The decoder unpacks this u48 and applies the clip range;
                // the segment range is never applied to constant tracks.
                let rotation = convert_rotation(
                    raw.rotation(segment, transform_index, 0),
                    raw.rotation_format(),
                    working.rotation_format(),
                );
                let normalized = clip_ranges.rotation.normalize(rotation);
                let mut packed = [0u8; 6];
                pack_vector3_u48(normalized, &mut packed);
                out.extend_from_slice(&packed);
            } else if is_variable && !is_raw_bit_rate(rates.rotation) {
                push_channel_range(&mut out, &segment_ranges.rotation, 3);
            }
        }

        if clip_ranges.is_translation_animated() {
            let is_variable = working.translation_format().is_variable();
            if is_variable && is_constant_bit_rate(rates.translation) {
                let translation = raw.translation(segment, transform_index, 0);
                let normalized = clip_ranges.translation.normalize(translation);
                let mut packed = [0u8; 6];
                pack_vector3_u48(normalized, &mut packed);
                out.extend_from_slice(&packed);
            } else if is_variable && !is_raw_bit_rate(rates.translation) {
                push_channel_range(&mut out, &segment_ranges.translation, 3);
            }
        }

        if working.has_scale() && clip_ranges.is_scale_animated() {
            let is_variable = working.scale_format().is_variable();
            if is_variable && is_constant_bit_rate(rates.scale) {
                let scale = raw.scale(segment, transform_index, 0);
                let normalized = clip_ranges.scale.normalize(scale);
                let mut packed = [0u8; 6];
                pack_vector3_u48(normalized, &mut packed);
                out.extend_from_slice(&packed);
            } else if is_variable && !is_raw_bit_rate(rates.scale) {
                push_channel_range(&mut out, &segment_ranges.scale, 3);
            }
        }
    }

    out
}

/// What the packed stream stores for one channel of one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackedKind {
    /// Constant in segment: no per-sample payload.
    Skipped,
    /// Byte-aligned payload (raw floats or fixed 48/32 bits).
    Fixed,
    /// N-bit fields at arbitrary bit offsets.
    Variable(u8),
}

fn rotation_packed_kind(format: RotationFormat, bit_rate: u8) -> PackedKind {
    if !format.is_variable() {
        return PackedKind::Fixed;
    }
    if is_constant_bit_rate(bit_rate) {
        PackedKind::Skipped
    } else if is_raw_bit_rate(bit_rate) {
        PackedKind::Fixed
    } else {
        PackedKind::Variable(bit_rate)
    }
}

fn vector_packed_kind(format: VectorFormat, bit_rate: u8) -> PackedKind {
    if !format.is_variable() {
        return PackedKind::Fixed;
    }
    if is_constant_bit_rate(bit_rate) {
        PackedKind::Skipped
    } else if is_raw_bit_rate(bit_rate) {
        PackedKind::Fixed
    } else {
        PackedKind::Variable(bit_rate)
    }
}

/// Whether the segment mixes variable-rate and byte-aligned tracks, which
/// forces alignment padding in front of every byte-aligned sample.
fn has_mixed_packing(
    working: &TrackDatabase,
    bit_rates: &[TransformBitRates],
) -> bool {
    let mut has_variable = false;
    let mut has_fixed = false;
    for transform_index in 0..working.num_transforms() {
        let ranges = working.range(transform_index);
        let rates = &bit_rates[transform_index as usize];
        if ranges.is_rotation_animated() {
            match rotation_packed_kind(working.rotation_format(), rates.rotation) {
                PackedKind::Fixed => has_fixed = true,
                PackedKind::Variable(_) => has_variable = true,
                PackedKind::Skipped => {}
            }
        }
        if ranges.is_translation_animated() {
            match vector_packed_kind(working.translation_format(), rates.translation) {
                PackedKind::Fixed => has_fixed = true,
                PackedKind::Variable(_) => has_variable = true,
                PackedKind::Skipped => {}
            }
        }
        if working.has_scale() && ranges.is_scale_animated() {
            match vector_packed_kind(working.scale_format(), rates.scale) {
                PackedKind::Fixed => has_fixed = true,
                PackedKind::Variable(_) => has_variable = true,
                PackedKind::Skipped => {}
            }
        }
    }
    has_variable && has_fixed
}

fn write_rotation_sample(
    stream: &mut BitStreamWriter,
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    sample_index: u32,
    bit_rate: u8,
    mixed: bool,
) {
    let format = working.rotation_format();
    match rotation_packed_kind(format, bit_rate) {
        PackedKind::Skipped => {}
        PackedKind::Variable(rate) => {
            // Quantize through the same intermediates as the decayed path.
            let rotation = working.rotation(segment, transform_index, sample_index);
            let num_bits = num_bits_at_bit_rate(rate);
            stream.write(quantize_unsigned(rotation.x, num_bits), num_bits);
            stream.write(quantize_unsigned(rotation.y, num_bits), num_bits);
            stream.write(quantize_unsigned(rotation.z, num_bits), num_bits);
        }
        PackedKind::Fixed => {
            if mixed {
                stream.align_to(MIXED_PACKING_ALIGNMENT_NUM_BITS);
            }
            match format {
                RotationFormat::Quat128 => {
                    let rotation = raw.rotation(segment, transform_index, sample_index);
                    stream.write_f32(rotation.x);
                    stream.write_f32(rotation.y);
                    stream.write_f32(rotation.z);
                    stream.write_f32(rotation.w);
                }
                RotationFormat::QuatDropW96 => {
                    let rotation = convert_rotation(
                        raw.rotation(segment, transform_index, sample_index),
                        raw.rotation_format(),
                        format,
                    );
                    stream.write_f32(rotation.x);
                    stream.write_f32(rotation.y);
                    stream.write_f32(rotation.z);
                }
                RotationFormat::QuatDropW48 => {
                    let rotation = working.rotation(segment, transform_index, sample_index);
                    let mut packed = [0u8; 6];
                    pack_vector3_u48(rotation, &mut packed);
                    stream.write_bytes(&packed);
                }
                RotationFormat::QuatDropW32 => {
                    let rotation = working.rotation(segment, transform_index, sample_index);
                    let mut packed = [0u8; 4];
                    pack_vector3_32(rotation, true, &mut packed);
                    stream.write_bytes(&packed);
                }
                RotationFormat::QuatDropWVariable => {
                    // Raw bit rate under the variable format.
                    let rotation = convert_rotation(
                        raw.rotation(segment, transform_index, sample_index),
                        raw.rotation_format(),
                        format,
                    );
                    stream.write_f32(rotation.x);
                    stream.write_f32(rotation.y);
                    stream.write_f32(rotation.z);
                }
            }
        }
    }
}

fn write_vector_sample(
    stream: &mut BitStreamWriter,
    raw_value: glam::Vec4,
    working_value: glam::Vec4,
    format: VectorFormat,
    bit_rate: u8,
    mixed: bool,
) {
    match vector_packed_kind(format, bit_rate) {
        PackedKind::Skipped => {}
        PackedKind::Variable(rate) => {
            let num_bits = num_bits_at_bit_rate(rate);
            stream.write(quantize_unsigned(working_value.x, num_bits), num_bits);
            stream.write(quantize_unsigned(working_value.y, num_bits), num_bits);
            stream.write(quantize_unsigned(working_value.z, num_bits), num_bits);
        }
        PackedKind::Fixed => {
            if mixed {
                stream.align_to(MIXED_PACKING_ALIGNMENT_NUM_BITS);
            }
            match format {
                VectorFormat::Vector96 | VectorFormat::VectorVariable => {
                    stream.write_f32(raw_value.x);
                    stream.write_f32(raw_value.y);
                    stream.write_f32(raw_value.z);
                }
                VectorFormat::Vector48 => {
                    let mut packed = [0u8; 6];
                    pack_vector3_u48(working_value, &mut packed);
                    stream.write_bytes(&packed);
                }
                VectorFormat::Vector32 => {
                    let mut packed = [0u8; 4];
                    pack_vector3_32(working_value, true, &mut packed);
                    stream.write_bytes(&packed);
                }
            }
        }
    }
}

/// Serialize one segment's packed sample stream, sample-major then
/// transform-major, channels in rotation/translation/scale order.
fn serialize_packed_samples(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    bit_rates: &[TransformBitRates],
) -> Vec<u8> {
    let mixed = has_mixed_packing(working, bit_rates);
    let mut stream = BitStreamWriter::new();

    for sample_index in 0..segment.num_samples {
        for transform_index in 0..working.num_transforms() {
            let ranges = working.range(transform_index);
            let rates = &bit_rates[transform_index as usize];

            if ranges.is_rotation_animated() {
                write_rotation_sample(
                    &mut stream,
                    raw,
                    working,
                    segment,
                    transform_index,
                    sample_index,
                    rates.rotation,
                    mixed,
                );
            }
            if ranges.is_translation_animated() {
                write_vector_sample(
                    &mut stream,
                    raw.translation(segment, transform_index, sample_index),
                    working.translation(segment, transform_index, sample_index),
                    working.translation_format(),
                    rates.translation,
                    mixed,
                );
            }
            if working.has_scale() && ranges.is_scale_animated() {
                write_vector_sample(
                    &mut stream,
                    raw.scale(segment, transform_index, sample_index),
                    working.scale(segment, transform_index, sample_index),
                    working.scale_format(),
                    rates.scale,
                    mixed,
                );
            }
        }
    }

    stream.finish()
}

/// Emit the whole clip to `sink` and fill in per-segment stats.
///
/// The bit-rate selection must be committed; emission reads the databases
/// and never mutates them.
pub fn write_clip(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segments: &mut [Segment],
    selection: &BitRateSelection,
    sink: &mut dyn SegmentSink,
) -> CompressionStats {
    assert!(
        selection.is_committed(),
        "bit rates must be committed before emission"
    );

    let header = serialize_clip_header(working, segments.len() as u32);
    let clip_ranges = serialize_clip_ranges(working);
    let mut header_and_ranges = header;
    header_and_ranges.extend_from_slice(&clip_ranges);
    let mut compressed_size = header_and_ranges.len() as u64;
    sink.clip_header(&header_and_ranges);

    let num_components = 4 + 3 + if working.has_scale() { 3 } else { 0 };
    let raw_size = u64::from(working.num_samples_per_track())
        * u64::from(working.num_transforms())
        * num_components as u64
        * 4;

    let mut stats = CompressionStats {
        raw_size,
        compressed_size: 0,
        segments: Vec::with_capacity(segments.len()),
    };

    let clip_range_table: Vec<crate::ranges::TransformRanges> = (0..working.num_transforms())
        .map(|transform_index| *working.range(transform_index))
        .collect();

    for segment in segments.iter_mut() {
        let bit_rates = selection.segment(segment.index);

        let range_data = serialize_segment_ranges(raw, working, segment, bit_rates);
        let packed_samples = serialize_packed_samples(raw, working, segment, bit_rates);

        let mut payload = Vec::with_capacity(range_data.len() + packed_samples.len());
        payload.extend_from_slice(&range_data);
        payload.extend_from_slice(&packed_samples);
        let checksum = xxh3_64(&payload);

        segment.range_data_size = range_data.len() as u32;
        segment.animated_data_size = packed_samples.len() as u32;
        segment.animated_pose_bit_size = animated_pose_bit_size(
            &clip_range_table,
            working.rotation_format(),
            working.translation_format(),
            working.scale_format(),
            working.has_scale(),
            bit_rates,
        );

        stats.segments.push(SegmentStats {
            index: segment.index,
            num_samples: segment.num_samples,
            range_data_size: segment.range_data_size,
            animated_data_size: segment.animated_data_size,
            animated_pose_bit_size: segment.animated_pose_bit_size,
            checksum,
        });
        compressed_size += (range_data.len() + packed_samples.len()) as u64;

        sink.segment_payload(segment.index, &range_data, &packed_samples, checksum);
    }

    stats.compressed_size = compressed_size;

    debug!(
        "emitted clip: {} segments, {} -> {} bytes ({:.2}x)",
        segments.len(),
        stats.raw_size,
        stats.compressed_size,
        stats.ratio()
    );

    stats
}
