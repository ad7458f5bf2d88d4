//! Single-file model artifact.
//!
//! The artifact is a JSON object whose top level carries a format tag, the
//! artifact schema version and the extractor layout (version + CRC32) the model
//! was trained under, next to the model body. The header is checked before the
//! body is parsed, so a layout bump is reported as a version mismatch even when
//! the body shape changed too.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::layout::validate_layout,
    error::{DetectorError, Result},
    model::TrainedModel,
};

pub const MODEL_FORMAT: &str = "image-authenticity-model";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactHeader {
    format: String,
    schema_version: u32,
    extractor_version: u8,
    layout_hash: u32,
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    #[serde(flatten)]
    header: ArtifactHeader,
    model: &'a TrainedModel,
}

#[derive(Deserialize)]
struct Artifact {
    #[serde(flatten)]
    header: ArtifactHeader,
    model: TrainedModel,
}

pub fn to_bytes(model: &TrainedModel) -> Result<Vec<u8>> {
    let artifact = ArtifactRef {
        header: ArtifactHeader {
            format: MODEL_FORMAT.into(),
            schema_version: SCHEMA_VERSION,
            extractor_version: model.extractor_version(),
            layout_hash: model.layout_hash(),
        },
        model,
    };

    Ok(serde_json::to_vec_pretty(&artifact)?)
}

pub fn from_bytes(bytes: &[u8]) -> Result<TrainedModel> {
    let header: ArtifactHeader = serde_json::from_slice(bytes)?;

    if header.format != MODEL_FORMAT {
        return Err(DetectorError::MalformedModel(format!(
            "unknown artifact format {:?}",
            header.format
        )));
    }
    if header.schema_version != SCHEMA_VERSION {
        return Err(DetectorError::MalformedModel(format!(
            "unsupported artifact schema {} (expected {SCHEMA_VERSION})",
            header.schema_version
        )));
    }
    validate_layout(header.extractor_version, header.layout_hash)?;

    let artifact: Artifact = serde_json::from_slice(bytes)?;
    let model = artifact.model;

    if model.extractor_version() != artifact.header.extractor_version
        || model.layout_hash() != artifact.header.layout_hash
    {
        return Err(DetectorError::MalformedModel(
            "artifact header disagrees with model body".into(),
        ));
    }

    Ok(model)
}

/// Writes the artifact next to its destination, then renames it into place.
pub fn save_model<P: AsRef<Path>>(model: &TrainedModel, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let bytes = to_bytes(model)?;
    let staging = staging_path(path);
    fs::write(&staging, bytes)?;
    fs::rename(&staging, path)?;

    info!("saved trained model to {}", path.display());
    Ok(())
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<TrainedModel> {
    let bytes = fs::read(path.as_ref())?;
    from_bytes(&bytes)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
