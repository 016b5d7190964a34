//! End-to-end scenarios over the whole pipeline: ingest → rotation format
//! conversion → clip/segment range normalization → decayed sampling →
//! blob emission.

use atcf_core::bitrate::BitRateSelection;
use atcf_core::clip::{BoneTracks, ClipMode, RawClip};
use atcf_core::database::{TrackDatabase, Transform};
use atcf_core::format::{HIGHEST_BIT_RATE, INVALID_TRANSFORM_INDEX, MAGIC};
use atcf_core::normalize::{normalize_clip_ranges, normalize_segment_ranges};
use atcf_core::sampler::{
    decayed_rotation_sample, decayed_translation_sample, raw_rotation_sample, sample_pose_decayed,
    sample_pose_hierarchical, Encoding,
};
use atcf_core::segment::{partition_clip, Segment};
use atcf_core::settings::CompressionSettings;
use atcf_core::writer::{write_clip, BlobWriter, CLIP_HEADER_SIZE};
use atcf_core::{RotationFormat, TransformBitRates, VectorFormat};
use glam::{Quat, Vec3, Vec4};

const EPSILON: f32 = 0.00000095; // 2^-20

// ── helpers ────────────────────────────────────────────────────────────────

/// Deterministic [0,1) floats from a simple LCG.
fn lcg(state: &mut u64) -> f32 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*state >> 40) as f32) / (1u64 << 24) as f32
}

fn random_unit_quat(state: &mut u64) -> Quat {
    loop {
        let q = Quat::from_xyzw(
            lcg(state) * 2.0 - 1.0,
            lcg(state) * 2.0 - 1.0,
            lcg(state) * 2.0 - 1.0,
            lcg(state) * 2.0 - 1.0,
        );
        if q.length() > 0.1 {
            return q.normalize();
        }
    }
}

struct Pipeline {
    raw: TrackDatabase,
    working: TrackDatabase,
    segments: Vec<Segment>,
}

/// Ingest, convert rotations to the variable drop-W format, and run both
/// normalization passes in order.
fn run_pipeline(clip: &RawClip, settings: &CompressionSettings) -> Pipeline {
    let mut segments = partition_clip(
        clip.num_samples_per_track(),
        clip.num_transforms(),
        clip.has_scale(settings.constant_scale_threshold),
        settings,
    );
    let raw = TrackDatabase::from_clip(clip, settings, &segments).unwrap();
    let mut working = raw.working_copy().unwrap();
    working.convert_rotations(&segments, settings.rotation_format);
    working.set_vector_formats(settings.translation_format, settings.scale_format);
    normalize_clip_ranges(&mut working, &segments, settings);
    normalize_segment_ranges(&mut working, &mut segments, settings);
    Pipeline {
        raw,
        working,
        segments,
    }
}

// ── Scenario A: identity clip ──────────────────────────────────────────────

#[test]
fn identity_clip_marks_every_channel_default() {
    let bones = (0..3)
        .map(|bone_index| BoneTracks {
            parent_index: if bone_index == 0 {
                INVALID_TRANSFORM_INDEX
            } else {
                bone_index as u16 - 1
            },
            rotations: vec![Quat::IDENTITY; 5],
            translations: vec![Vec3::ZERO; 5],
            scales: vec![Vec3::ONE; 5],
        })
        .collect();
    let clip = RawClip::new(bones, 30.0, ClipMode::Standard).unwrap();
    let settings = CompressionSettings::default();
    let pipeline = run_pipeline(&clip, &settings);

    let segment = &pipeline.segments[0];
    for transform_index in 0..3 {
        let ranges = pipeline.working.range(transform_index);
        assert!(ranges.is_rotation_default && ranges.is_rotation_constant);
        assert!(ranges.is_translation_default && ranges.is_translation_constant);
        assert!(ranges.is_scale_default && ranges.is_scale_constant);

        // Extent is zero: nothing was normalized.
        assert!(!ranges.are_rotations_normalized);
        assert!(!ranges.are_translations_normalized);

        // Database contents, padded slots included, hold the identity.
        for sample_index in 0..segment.num_simd_samples {
            assert_eq!(
                pipeline.working.rotation(segment, transform_index, sample_index),
                Vec4::new(0.0, 0.0, 0.0, 1.0)
            );
            assert_eq!(
                pipeline.working.translation(segment, transform_index, sample_index),
                Vec4::ZERO
            );
        }
    }
}

// ── Scenario B: constant translation ───────────────────────────────────────

#[test]
fn constant_translation_survives_every_bit_rate() {
    let num_samples = 8u32;
    let mut state = 0x0B5E55EDu64;
    let clip = RawClip::new(
        vec![BoneTracks {
            parent_index: INVALID_TRANSFORM_INDEX,
            rotations: (0..num_samples)
                .map(|_| random_unit_quat(&mut state))
                .collect(),
            translations: vec![Vec3::new(1.5, 0.0, -2.0); num_samples as usize],
            scales: vec![Vec3::ONE; num_samples as usize],
        }],
        30.0,
        ClipMode::Standard,
    )
    .unwrap();
    let settings = CompressionSettings::default();
    let pipeline = run_pipeline(&clip, &settings);

    let ranges = pipeline.working.range(0);
    assert!(!ranges.is_rotation_constant, "rotation varies");
    assert!(ranges.is_translation_constant);
    assert!(!ranges.is_translation_default);
    assert_eq!(ranges.translation.min.truncate(), Vec3::new(1.5, 0.0, -2.0));

    // The decayed pose holds the constant at every sample and bit rate.
    let segment = &pipeline.segments[0];
    for bit_rate in [1u8, 6, 10, HIGHEST_BIT_RATE] {
        let bit_rates = vec![TransformBitRates {
            rotation: bit_rate,
            translation: bit_rate,
            scale: bit_rate,
        }];
        for sample_index in 0..num_samples {
            let time = sample_index as f32 / 30.0;
            let mut pose = vec![Transform::IDENTITY; 1];
            sample_pose_decayed(
                &pipeline.raw,
                &pipeline.working,
                segment,
                time,
                &bit_rates,
                &mut pose,
            );
            assert_eq!(pose[0].translation, Vec3::new(1.5, 0.0, -2.0));
        }
    }
}

// ── Scenario C: normalized rotation round trip ─────────────────────────────

#[test]
fn raw_bit_rate_rotations_survive_both_normalization_passes() {
    let mut state = 0xC0FFEEu64;
    let bones = (0..5)
        .map(|bone_index| BoneTracks {
            parent_index: if bone_index == 0 {
                INVALID_TRANSFORM_INDEX
            } else {
                bone_index as u16 - 1
            },
            rotations: (0..16).map(|_| random_unit_quat(&mut state)).collect(),
            translations: (0..16)
                .map(|_| Vec3::new(lcg(&mut state), lcg(&mut state), lcg(&mut state)))
                .collect(),
            scales: vec![Vec3::ONE; 16],
        })
        .collect();
    let clip = RawClip::new(bones, 30.0, ClipMode::Standard).unwrap();
    let settings = CompressionSettings::default();
    let pipeline = run_pipeline(&clip, &settings);
    assert_eq!(pipeline.segments.len(), 1);

    let segment = &pipeline.segments[0];
    for transform_index in 0..5 {
        for sample_index in 0..16 {
            let decayed = decayed_rotation_sample(
                &pipeline.raw,
                &pipeline.working,
                segment,
                transform_index,
                sample_index,
                Encoding::Raw,
            );
            let reference = raw_rotation_sample(&pipeline.raw, segment, transform_index, sample_index);
            // q and -q encode the same rotation.
            let dot = decayed.dot(reference).abs();
            assert!(
                1.0 - dot <= EPSILON,
                "transform {transform_index} sample {sample_index}: 1-|dot| = {}",
                1.0 - dot
            );
        }
    }
}

// ── Scenario D: SIMD padding ───────────────────────────────────────────────

#[test]
fn five_samples_pad_to_eight_with_replicated_tail() {
    let mut state = 0xDADu64;
    let clip = RawClip::new(
        vec![BoneTracks {
            parent_index: INVALID_TRANSFORM_INDEX,
            rotations: (0..5).map(|_| random_unit_quat(&mut state)).collect(),
            translations: (0..5)
                .map(|i| Vec3::new(i as f32, -(i as f32), 0.5))
                .collect(),
            scales: vec![Vec3::ONE; 5],
        }],
        30.0,
        ClipMode::Standard,
    )
    .unwrap();
    let settings = CompressionSettings::default();
    let segments = partition_clip(5, 1, false, &settings);
    let database = TrackDatabase::from_clip(&clip, &settings, &segments).unwrap();

    let segment = &segments[0];
    assert_eq!(segment.num_samples, 5);
    assert_eq!(segment.num_simd_samples, 8);

    let last_rotation = database.rotation(segment, 0, 4);
    let last_translation = database.translation(segment, 0, 4);
    for pad_index in 5..8 {
        assert_eq!(database.rotation(segment, 0, pad_index), last_rotation);
        assert_eq!(database.translation(segment, 0, pad_index), last_translation);
    }
}

// ── Scenario E: hierarchical sampling ──────────────────────────────────────

#[test]
fn hierarchical_sampling_writes_exactly_the_parent_chain() {
    let mut state = 0xE11Eu64;
    let bones = vec![
        BoneTracks {
            parent_index: INVALID_TRANSFORM_INDEX,
            rotations: (0..4).map(|_| random_unit_quat(&mut state)).collect(),
            translations: (0..4).map(|i| Vec3::splat(i as f32)).collect(),
            scales: vec![Vec3::ONE; 4],
        },
        BoneTracks {
            parent_index: 0,
            rotations: (0..4).map(|_| random_unit_quat(&mut state)).collect(),
            translations: (0..4).map(|i| Vec3::splat(10.0 + i as f32)).collect(),
            scales: vec![Vec3::ONE; 4],
        },
        BoneTracks {
            parent_index: 1,
            rotations: (0..4).map(|_| random_unit_quat(&mut state)).collect(),
            translations: (0..4).map(|i| Vec3::splat(20.0 + i as f32)).collect(),
            scales: vec![Vec3::ONE; 4],
        },
    ];
    let clip = RawClip::new(bones, 30.0, ClipMode::Standard).unwrap();
    let settings = CompressionSettings::default();
    let pipeline = run_pipeline(&clip, &settings);

    let sentinel = Transform {
        rotation: Quat::from_xyzw(7.0, 7.0, 7.0, 7.0),
        translation: Vec3::splat(7.0),
        scale: Vec3::splat(7.0),
    };
    let mut pose = vec![sentinel; 3];
    sample_pose_hierarchical(&pipeline.working, &pipeline.segments[0], 0.05, 2, &mut pose);

    assert_ne!(pose[2], sentinel);
    assert_ne!(pose[1], sentinel);
    assert_ne!(pose[0], sentinel);
}

// ── Scenario F: variable bit-rate decay ────────────────────────────────────

#[test]
fn eight_bit_decay_lands_on_the_exact_grid_point() {
    // Translation range min (0,0,0), extent (2,2,2); the middle sample sits
    // at normalized 0.5 after clip normalization.
    let clip = RawClip::new(
        vec![BoneTracks {
            parent_index: INVALID_TRANSFORM_INDEX,
            rotations: vec![Quat::IDENTITY; 3],
            translations: vec![Vec3::ZERO, Vec3::splat(2.0), Vec3::splat(1.0)],
            scales: vec![Vec3::ONE; 3],
        }],
        30.0,
        ClipMode::Standard,
    )
    .unwrap();
    let settings = CompressionSettings::default();

    let segments = partition_clip(3, 1, false, &settings);
    let raw = TrackDatabase::from_clip(&clip, &settings, &segments).unwrap();
    let mut working = raw.working_copy().unwrap();
    working.convert_rotations(&segments, settings.rotation_format);
    working.set_vector_formats(settings.translation_format, settings.scale_format);
    // Clip pass only: the scenario measures the single-range decode.
    normalize_clip_ranges(&mut working, &segments, &settings);

    let range = working.range(0).translation;
    assert_eq!(range.min.truncate(), Vec3::ZERO);
    assert_eq!(range.extent.truncate(), Vec3::splat(2.0));
    assert_eq!(working.translation(&segments[0], 0, 2).truncate(), Vec3::splat(0.5));

    // Bit rate index 6 is 8 bits per component.
    let decayed =
        decayed_translation_sample(&raw, &working, &segments[0], 0, 2, Encoding::FixedN(6));
    let expected = 0.0 + (0.5f32 * 255.0).round() / 255.0 * 2.0;
    assert_eq!(decayed.truncate(), Vec3::splat(expected));
}

// ── Emission ───────────────────────────────────────────────────────────────

#[test]
fn emitted_blob_carries_header_index_and_checksums() {
    let mut state = 0xB10Bu64;
    let num_samples = 40u32;
    let bones = (0..4)
        .map(|bone_index| BoneTracks {
            parent_index: if bone_index == 0 {
                INVALID_TRANSFORM_INDEX
            } else {
                bone_index as u16 - 1
            },
            rotations: (0..num_samples)
                .map(|_| random_unit_quat(&mut state))
                .collect(),
            translations: (0..num_samples)
                .map(|_| Vec3::new(lcg(&mut state) * 8.0, lcg(&mut state), lcg(&mut state) - 0.5))
                .collect(),
            scales: vec![Vec3::ONE; num_samples as usize],
        })
        .collect();
    let clip = RawClip::new(bones, 30.0, ClipMode::Standard).unwrap();
    let settings = CompressionSettings::default();
    let mut pipeline = run_pipeline(&clip, &settings);

    // Commit a mid-precision rate everywhere.
    let mut selection = BitRateSelection::new(pipeline.segments.len(), 4);
    for segment_index in 0..pipeline.segments.len() as u32 {
        for transform_index in 0..4 {
            use atcf_core::TrackChannel;
            selection.set(segment_index, transform_index, TrackChannel::Rotation, 8);
            selection.set(segment_index, transform_index, TrackChannel::Translation, 8);
        }
    }
    selection.commit();

    let mut writer = BlobWriter::new();
    let stats = write_clip(
        &pipeline.raw,
        &pipeline.working,
        &mut pipeline.segments,
        &selection,
        &mut writer,
    );

    assert_eq!(stats.segments.len(), 3); // 40 samples / 16 per segment
    assert!(stats.compressed_size < stats.raw_size, "10-bit tracks must shrink the clip");
    eprintln!(
        "blob: {} -> {} bytes ({:.2}x)",
        stats.raw_size,
        stats.compressed_size,
        stats.ratio()
    );

    let entries: Vec<_> = writer.entries().to_vec();
    let blob = writer.finish();

    // Header starts with the magic and the format tags.
    assert_eq!(&blob[..MAGIC.len()], MAGIC);
    assert_eq!(blob[10], RotationFormat::QuatDropWVariable.tag());
    assert_eq!(blob[11], VectorFormat::VectorVariable.tag());
    assert!(blob.len() > CLIP_HEADER_SIZE);

    // Footer points at the segment index.
    let index_offset = u64::from_le_bytes(blob[blob.len() - 8..].try_into().unwrap()) as usize;
    assert_eq!(
        blob.len() - 8 - index_offset,
        entries.len() * atcf_core::writer::SEGMENT_ENTRY_SIZE
    );

    // Each payload matches its recorded checksum.
    for (entry, segment_stats) in entries.iter().zip(&stats.segments) {
        let start = entry.offset as usize;
        let end = start + (entry.range_data_len + entry.packed_samples_len) as usize;
        let payload = &blob[start..end];
        assert_eq!(xxhash_rust::xxh3::xxh3_64(payload), entry.checksum);
        assert_eq!(entry.checksum, segment_stats.checksum);
        assert!(entry.packed_samples_len > 0);
    }
}

#[test]
fn committed_raw_rates_round_the_stream_up_to_full_floats() {
    let clip = RawClip::new(
        vec![BoneTracks {
            parent_index: INVALID_TRANSFORM_INDEX,
            rotations: (0..6).map(|i| Quat::from_rotation_x(0.3 * i as f32)).collect(),
            translations: (0..6).map(|i| Vec3::new(i as f32, 0.0, 1.0)).collect(),
            scales: vec![Vec3::ONE; 6],
        }],
        30.0,
        ClipMode::Standard,
    )
    .unwrap();
    let settings = CompressionSettings::default();
    let mut pipeline = run_pipeline(&clip, &settings);

    // Default selection is all-raw; commit as-is.
    let mut selection = BitRateSelection::new(pipeline.segments.len(), 1);
    selection.commit();

    let mut writer = BlobWriter::new();
    let stats = write_clip(
        &pipeline.raw,
        &pipeline.working,
        &mut pipeline.segments,
        &selection,
        &mut writer,
    );

    // rotation xyz + translation xyz at raw rates: 24 bytes per sample.
    assert_eq!(stats.segments[0].animated_data_size, 6 * 24);
}
