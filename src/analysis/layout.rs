//! Feature layout shared by the extractor and every stored model.
//!
//! Adding, removing or reordering a feature, or changing how one is computed,
//! requires bumping [`FEATURE_VERSION`]. Stored models carry the version and
//! the layout hash and are refused when either differs.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};

pub const FEATURE_VERSION: u8 = 1;

/// Feature names in vector order.
pub const FEATURE_LAYOUT: &[&str] = &[
    "gradient_variance",  // 0
    "gradient_mean",      // 1
    "gradient_entropy",   // 2
    "edge_density",       // 3
    "direction_variance", // 4
    "high_freq_ratio",    // 5
    "entropy",            // 6
    "luminance_mean",     // 7
    "luminance_std",      // 8
    "luminance_skew",     // 9
    "gradient_cov_xx",    // 10
    "gradient_cov_xy",    // 11
    "gradient_cov_yy",    // 12
];

pub const FEATURE_COUNT: usize = 13;

/// CRC32 over the version byte and the NUL-terminated feature names.
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[FEATURE_VERSION]);

    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }

    hasher.finalize()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            hash: layout_hash(),
            feature_count: FEATURE_COUNT,
            feature_names: FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn validate_layout(version: u8, hash: u32) -> Result<()> {
    let current_hash = layout_hash();

    if version != FEATURE_VERSION || hash != current_hash {
        return Err(DetectorError::ModelVersionMismatch {
            expected_version: FEATURE_VERSION,
            expected_hash: current_hash,
            actual_version: version,
            actual_hash: hash,
        });
    }

    Ok(())
}

pub fn is_layout_compatible(version: u8, hash: u32) -> bool {
    validate_layout(version, hash).is_ok()
}

pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

pub fn feature_name(index: usize) -> Option<&'static str> {
    FEATURE_LAYOUT.get(index).copied()
}
