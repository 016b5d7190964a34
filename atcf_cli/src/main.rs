use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{Quat, Vec3};
use log::info;

use atcf_core::bitrate::BitRateSelection;
use atcf_core::clip::{BoneTracks, ClipMode, RawClip};
use atcf_core::database::TrackDatabase;
use atcf_core::format::{HIGHEST_BIT_RATE, INVALID_TRANSFORM_INDEX, LOWEST_BIT_RATE, MAGIC};
use atcf_core::normalize::{normalize_clip_ranges, normalize_segment_ranges};
use atcf_core::sampler::{
    decayed_rotation_sample, decayed_scale_sample, decayed_translation_sample, raw_rotation_sample,
    raw_scale_sample, raw_translation_sample, Encoding,
};
use atcf_core::segment::{partition_clip, Segment};
use atcf_core::settings::CompressionSettings;
use atcf_core::writer::{write_clip, BlobWriter, CLIP_HEADER_SIZE, SEGMENT_ENTRY_SIZE};
use atcf_core::{RotationFormat, TrackChannel, VectorFormat};

mod clip_file;

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "atcf",
    about = "Animation Transform Compression Format — compress and inspect skeletal clips",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a clip into an ATCF1 blob
    Compress {
        /// Clip description file (JSON); omit with --synthetic
        #[arg(required_unless_present = "synthetic")]
        input: Option<PathBuf>,
        /// Destination ATCF1 file
        #[arg(short, long)]
        output: PathBuf,
        /// Generate a synthetic test clip instead of reading one: BONESxSAMPLES (e.g. 40x120)
        #[arg(long)]
        synthetic: Option<String>,
        /// Rotation format: quat128 | dropw96 | dropw48 | dropw32 | dropw_variable
        #[arg(long, default_value = "dropw_variable")]
        rotation_format: RotationFormat,
        /// Translation format: vec96 | vec48 | vec32 | vec_variable
        #[arg(long, default_value = "vec_variable")]
        translation_format: VectorFormat,
        /// Scale format: vec96 | vec48 | vec32 | vec_variable
        #[arg(long, default_value = "vec_variable")]
        scale_format: VectorFormat,
        /// Samples per segment
        #[arg(long, default_value_t = 16)]
        segment_samples: u32,
        /// Error tolerance driving the per-track bit-rate search
        #[arg(long, default_value_t = 0.0001)]
        target_error: f32,
    },
    /// Print header metadata and per-segment statistics of an ATCF1 file
    Info {
        file: PathBuf,
        /// Print per-segment details
        #[arg(long)]
        segments: bool,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Deterministic [0,1) floats from a simple LCG.
fn lcg(state: &mut u64) -> f32 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*state >> 40) as f32) / (1u64 << 24) as f32
}

/// Generate a plausible test skeleton: a bone chain with smoothly varying
/// rotations, a few constant and default channels mixed in.
fn synthetic_clip(num_bones: u32, num_samples: u32, seed: u64) -> RawClip {
    let mut state = seed;
    let bones = (0..num_bones)
        .map(|bone_index| {
            let parent_index = if bone_index == 0 {
                INVALID_TRANSFORM_INDEX
            } else {
                (bone_index - 1) as u16
            };

            let swing = lcg(&mut state) * 0.8 + 0.1;
            let rate = lcg(&mut state) * 4.0 + 0.5;
            let phase = lcg(&mut state) * 6.28;
            let frozen_rotation = bone_index % 7 == 3;
            let frozen_translation = bone_index % 5 == 2;

            let rotations = (0..num_samples)
                .map(|i| {
                    if frozen_rotation {
                        Quat::IDENTITY
                    } else {
                        let t = i as f32 / num_samples.max(1) as f32;
                        Quat::from_euler(
                            glam::EulerRot::XYZ,
                            (t * rate * 6.28 + phase).sin() * swing,
                            (t * rate * 3.14).cos() * swing * 0.5,
                            0.0,
                        )
                    }
                })
                .collect();

            let rest = Vec3::new(
                lcg(&mut state) * 2.0 - 1.0,
                lcg(&mut state) * 0.5 + 0.25,
                lcg(&mut state) * 2.0 - 1.0,
            );
            let translations = (0..num_samples)
                .map(|i| {
                    if frozen_translation {
                        rest
                    } else {
                        let t = i as f32 / num_samples.max(1) as f32;
                        rest + Vec3::new((t * 6.28).sin(), 0.0, (t * 6.28).cos()) * 0.1
                    }
                })
                .collect();

            BoneTracks {
                parent_index,
                rotations,
                translations,
                scales: vec![Vec3::ONE; num_samples as usize],
            }
        })
        .collect();

    RawClip::new(bones, 30.0, ClipMode::Standard).expect("synthetic clip is always valid")
}

// ── Bit-rate search driver ─────────────────────────────────────────────────
//
// The core exposes decayed evaluation; the search policy lives here. Greedy
// per track: lowest bit rate whose worst-sample error stays inside the
// target, falling back to raw.

fn rotation_error(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    encoding: Encoding,
) -> f32 {
    let mut worst: f32 = 0.0;
    for sample_index in 0..segment.num_samples {
        let decayed =
            decayed_rotation_sample(raw, working, segment, transform_index, sample_index, encoding);
        let reference = raw_rotation_sample(raw, segment, transform_index, sample_index);
        worst = worst.max(1.0 - decayed.dot(reference).abs());
    }
    worst
}

fn translation_error(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    encoding: Encoding,
) -> f32 {
    let mut worst: f32 = 0.0;
    for sample_index in 0..segment.num_samples {
        let decayed = decayed_translation_sample(
            raw,
            working,
            segment,
            transform_index,
            sample_index,
            encoding,
        );
        let reference = raw_translation_sample(raw, segment, transform_index, sample_index);
        worst = worst.max((decayed - reference).abs().max_element());
    }
    worst
}

fn scale_error(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segment: &Segment,
    transform_index: u32,
    encoding: Encoding,
) -> f32 {
    let mut worst: f32 = 0.0;
    for sample_index in 0..segment.num_samples {
        let decayed =
            decayed_scale_sample(raw, working, segment, transform_index, sample_index, encoding);
        let reference = raw_scale_sample(raw, segment, transform_index, sample_index);
        worst = worst.max((decayed - reference).abs().max_element());
    }
    worst
}

fn pick_bit_rate(
    error_at: impl Fn(Encoding) -> f32,
    segment_is_constant: bool,
    target_error: f32,
) -> u8 {
    // A track constant within the segment can drop its samples entirely if
    // the constant survives the Vec48 round trip.
    if segment_is_constant && error_at(Encoding::ConstantInSegment) <= target_error {
        return 0;
    }
    for bit_rate in LOWEST_BIT_RATE..HIGHEST_BIT_RATE {
        if error_at(Encoding::from_bit_rate(bit_rate)) <= target_error {
            return bit_rate;
        }
    }
    HIGHEST_BIT_RATE
}

fn select_bit_rates(
    raw: &TrackDatabase,
    working: &TrackDatabase,
    segments: &[Segment],
    settings: &CompressionSettings,
) -> BitRateSelection {
    let mut selection = BitRateSelection::new(segments.len(), working.num_transforms());

    for segment in segments {
        for transform_index in 0..working.num_transforms() {
            let clip_ranges = working.range(transform_index);
            let segment_ranges = &segment.ranges[transform_index as usize];

            if settings.rotation_format.is_variable() && clip_ranges.is_rotation_animated() {
                let bit_rate = pick_bit_rate(
                    |encoding| rotation_error(raw, working, segment, transform_index, encoding),
                    segment_ranges.is_rotation_constant,
                    settings.target_error,
                );
                selection.set(segment.index, transform_index, TrackChannel::Rotation, bit_rate);
            }
            if settings.translation_format.is_variable() && clip_ranges.is_translation_animated() {
                let bit_rate = pick_bit_rate(
                    |encoding| translation_error(raw, working, segment, transform_index, encoding),
                    segment_ranges.is_translation_constant,
                    settings.target_error,
                );
                selection.set(
                    segment.index,
                    transform_index,
                    TrackChannel::Translation,
                    bit_rate,
                );
            }
            if working.has_scale()
                && settings.scale_format.is_variable()
                && clip_ranges.is_scale_animated()
            {
                let bit_rate = pick_bit_rate(
                    |encoding| scale_error(raw, working, segment, transform_index, encoding),
                    segment_ranges.is_scale_constant,
                    settings.target_error,
                );
                selection.set(segment.index, transform_index, TrackChannel::Scale, bit_rate);
            }
        }
    }

    selection.commit();
    selection
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: Option<PathBuf>,
    output: PathBuf,
    synthetic: Option<String>,
    settings: CompressionSettings,
) -> anyhow::Result<()> {
    let clip = match (&input, &synthetic) {
        (_, Some(spec)) => {
            let (bones, samples) = spec
                .split_once('x')
                .and_then(|(b, s)| Some((b.parse::<u32>().ok()?, s.parse::<u32>().ok()?)))
                .with_context(|| format!("bad --synthetic spec '{spec}', expected BONESxSAMPLES"))?;
            info!("generating synthetic clip: {bones} bones, {samples} samples");
            synthetic_clip(bones, samples, 0x51_0C_A7_5E)
        }
        (Some(path), None) => clip_file::load(path)
            .with_context(|| format!("loading clip file {:?}", path))?,
        (None, None) => unreachable!("clap enforces input or --synthetic"),
    };

    let t0 = Instant::now();

    let mut segments = partition_clip(
        clip.num_samples_per_track(),
        clip.num_transforms(),
        clip.has_scale(settings.constant_scale_threshold),
        &settings,
    );
    let raw = TrackDatabase::from_clip(&clip, &settings, &segments)?;
    let mut working = raw.working_copy()?;
    working.convert_rotations(&segments, settings.rotation_format);
    working.set_vector_formats(settings.translation_format, settings.scale_format);
    normalize_clip_ranges(&mut working, &segments, &settings);
    normalize_segment_ranges(&mut working, &mut segments, &settings);

    let selection = select_bit_rates(&raw, &working, &segments, &settings);

    let mut writer = BlobWriter::new();
    let stats = write_clip(&raw, &working, &mut segments, &selection, &mut writer);
    let blob = writer.finish();
    let elapsed = t0.elapsed();

    fs::write(&output, &blob).with_context(|| format!("writing output file {:?}", output))?;

    eprintln!("  transforms  : {}", working.num_transforms());
    eprintln!(
        "  samples     : {} @ {} Hz ({:.2}s)",
        working.num_samples_per_track(),
        working.sample_rate(),
        working.duration()
    );
    eprintln!("  segments    : {}", segments.len());
    eprintln!(
        "  formats     : {} / {} / {}",
        settings.rotation_format, settings.translation_format, settings.scale_format
    );
    eprintln!("  raw size    : {}", human_bytes(stats.raw_size));
    eprintln!("  compressed  : {}", human_bytes(stats.compressed_size));
    eprintln!("  ratio       : {:.2}x", stats.ratio());
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_info(file: PathBuf, show_segments: bool) -> anyhow::Result<()> {
    let blob = fs::read(&file).with_context(|| format!("reading {:?}", file))?;
    if blob.len() < CLIP_HEADER_SIZE + 8 {
        anyhow::bail!("file too small to be an ATCF1 blob");
    }
    if &blob[..MAGIC.len()] != MAGIC {
        anyhow::bail!("invalid ATCF magic bytes — not an ATCF1 file");
    }

    let version = u16::from_le_bytes(blob[8..10].try_into()?);
    let rotation_format = RotationFormat::from_tag(blob[10])
        .with_context(|| format!("unknown rotation format tag {}", blob[10]))?;
    let translation_format = VectorFormat::from_tag(blob[11])
        .with_context(|| format!("unknown vector format tag {}", blob[11]))?;
    let scale_format = VectorFormat::from_tag(blob[12])
        .with_context(|| format!("unknown vector format tag {}", blob[12]))?;
    let has_scale = blob[13] != 0;
    let num_transforms = u32::from_le_bytes(blob[14..18].try_into()?);
    let num_samples = u32::from_le_bytes(blob[18..22].try_into()?);
    let num_segments = u32::from_le_bytes(blob[22..26].try_into()?);
    let sample_rate = f32::from_le_bytes(blob[26..30].try_into()?);

    println!("=== ATCF1 File: {:?} ===", file);
    println!();
    println!("  format version : {}", version);
    println!(
        "  formats        : {} / {} / {}",
        rotation_format, translation_format, scale_format
    );
    println!("  has scale      : {}", has_scale);
    println!("  transforms     : {}", num_transforms);
    println!("  samples/track  : {} @ {} Hz", num_samples, sample_rate);
    println!("  segments       : {}", num_segments);
    println!("  file on disk   : {}", human_bytes(blob.len() as u64));

    if show_segments {
        let index_offset = u64::from_le_bytes(blob[blob.len() - 8..].try_into()?) as usize;
        println!();
        println!(
            "  {:>8}  {:>12}  {:>12}  {:>12}  {:>16}",
            "segment", "offset", "range data", "samples", "checksum"
        );
        println!("  {}", "-".repeat(68));
        for segment_index in 0..num_segments as usize {
            let entry_start = index_offset + segment_index * SEGMENT_ENTRY_SIZE;
            let entry = &blob[entry_start..entry_start + SEGMENT_ENTRY_SIZE];
            let offset = u64::from_le_bytes(entry[0..8].try_into()?);
            let range_len = u32::from_le_bytes(entry[8..12].try_into()?);
            let packed_len = u32::from_le_bytes(entry[12..16].try_into()?);
            let checksum = u64::from_le_bytes(entry[16..24].try_into()?);
            println!(
                "  {:>8}  {:>12}  {:>12}  {:>12}  {:016x}",
                segment_index,
                offset,
                human_bytes(range_len as u64),
                human_bytes(packed_len as u64),
                checksum
            );
        }
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compress {
            input,
            output,
            synthetic,
            rotation_format,
            translation_format,
            scale_format,
            segment_samples,
            target_error,
        } => {
            let settings = CompressionSettings {
                rotation_format,
                translation_format,
                scale_format,
                segment_max_samples: segment_samples,
                target_error,
                ..CompressionSettings::default()
            };
            run_compress(input, output, synthetic, settings)
        }
        Commands::Info { file, segments } => run_info(file, segments),
    }
}
