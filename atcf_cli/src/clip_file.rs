//! JSON clip description files.
//!
//! ```json
//! {
//!   "sample_rate": 30.0,
//!   "additive": false,
//!   "bones": [
//!     {
//!       "parent": null,
//!       "rotations": [[0.0, 0.0, 0.0, 1.0], ...],
//!       "translations": [[0.0, 1.0, 0.0], ...],
//!       "scales": [[1.0, 1.0, 1.0], ...]
//!     }
//!   ]
//! }
//! ```
//!
//! `scales` may be omitted for bones that never scale.

use std::path::Path;

use anyhow::Context;
use glam::{Quat, Vec3};
use serde::Deserialize;

use atcf_core::clip::{BoneTracks, ClipMode, RawClip};
use atcf_core::format::INVALID_TRANSFORM_INDEX;

#[derive(Deserialize)]
struct ClipFile {
    sample_rate: f32,
    #[serde(default)]
    additive: bool,
    bones: Vec<BoneFile>,
}

#[derive(Deserialize)]
struct BoneFile {
    parent: Option<u16>,
    rotations: Vec<[f32; 4]>,
    translations: Vec<[f32; 3]>,
    #[serde(default)]
    scales: Option<Vec<[f32; 3]>>,
}

pub fn load(path: &Path) -> anyhow::Result<RawClip> {
    let text = std::fs::read_to_string(path)?;
    let file: ClipFile = serde_json::from_str(&text).context("parsing clip JSON")?;

    let mode = if file.additive {
        ClipMode::Additive
    } else {
        ClipMode::Standard
    };
    let default_scale = mode.default_scale();

    let bones = file
        .bones
        .into_iter()
        .map(|bone| {
            let num_samples = bone.rotations.len();
            BoneTracks {
                parent_index: bone.parent.unwrap_or(INVALID_TRANSFORM_INDEX),
                rotations: bone
                    .rotations
                    .into_iter()
                    .map(|[x, y, z, w]| Quat::from_xyzw(x, y, z, w))
                    .collect(),
                translations: bone.translations.into_iter().map(Vec3::from).collect(),
                scales: match bone.scales {
                    Some(scales) => scales.into_iter().map(Vec3::from).collect(),
                    None => vec![default_scale; num_samples],
                },
            }
        })
        .collect();

    Ok(RawClip::new(bones, file.sample_rate, mode)?)
}
