use std::{path::Path, sync::Arc};

use log::{info, warn};
use parking_lot::RwLock;

use crate::{
    error::Result,
    model::{TrainedModel, storage},
};

/// Slot holding the model classification currently uses.
///
/// Readers take an `Arc` snapshot, so a model swapped in mid-batch never mixes
/// with the one the batch started on. Writers replace the whole model.
#[derive(Debug, Default)]
pub struct ActiveModel {
    slot: RwLock<Option<Arc<TrainedModel>>>,
}

impl ActiveModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Arc<TrainedModel>> {
        self.slot.read().clone()
    }

    /// Swaps in `model` if it is consistent and fits the running extractor.
    /// A rejected model leaves the slot unchanged.
    pub fn install(&self, model: TrainedModel) -> Result<Arc<TrainedModel>> {
        model.check_installable()?;

        let model = Arc::new(model);
        *self.slot.write() = Some(Arc::clone(&model));
        info!(
            "installed model with {} component(s) from {} real / {} ai samples",
            model.components(),
            model.metadata().real_samples,
            model.metadata().ai_samples
        );
        Ok(model)
    }

    pub fn clear(&self) {
        if self.slot.write().take().is_some() {
            info!("cleared trained model; baseline scoring in effect");
        }
    }

    /// Loads an artifact and installs it. On failure the current model stays.
    pub fn load_from<P: AsRef<Path>>(&self, path: P) -> Result<Arc<TrainedModel>> {
        let path = path.as_ref();
        match storage::load_model(path).and_then(|model| self.install(model)) {
            Ok(model) => Ok(model),
            Err(e) => {
                warn!("rejected model at {}: {e}", path.display());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::layout::{FEATURE_COUNT, FEATURE_VERSION, layout_hash},
        error::DetectorError,
        model::{DistanceMetric, ModelMetadata, ModelParts, ReductionTransform},
    };

    #[test]
    fn test_empty_slot() {
        let active = ActiveModel::new();
        assert!(active.snapshot().is_none());
        active.clear();
        assert!(active.snapshot().is_none());
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"{\"format\": \"something-else\"}").unwrap();

        let active = ActiveModel::new();
        let err = active.load_from(&path).unwrap_err();
        assert!(matches!(err, DetectorError::Serialization(_) | DetectorError::MalformedModel(_)));
        assert!(active.snapshot().is_none());
    }

    fn model(extractor_version: u8) -> TrainedModel {
        let mut first = vec![0.0; FEATURE_COUNT];
        first[0] = 1.0;
        TrainedModel::from_parts(ModelParts {
            extractor_version,
            layout_hash: layout_hash(),
            transform: ReductionTransform::new(vec![0.0; FEATURE_COUNT], vec![1.0; FEATURE_COUNT], vec![first])
                .unwrap(),
            real_embeddings: vec![vec![0.5]],
            ai_embeddings: vec![vec![-0.5]],
            metric: DistanceMetric::Euclidean,
            metadata: ModelMetadata {
                real_samples: 1,
                ai_samples: 1,
                skipped: Vec::new(),
                requested_components: 2,
                explained_variance: vec![0.5],
                explained_variance_ratio: vec![1.0],
                standardized: true,
            },
        })
        .unwrap()
    }

    #[test]
    fn test_install_rejects_stale_layout() {
        let active = ActiveModel::new();
        let err = active.install(model(FEATURE_VERSION + 1)).unwrap_err();
        assert!(matches!(err, DetectorError::ModelVersionMismatch { .. }));
        assert!(active.snapshot().is_none());

        let current = active.install(model(FEATURE_VERSION)).unwrap();
        assert!(active.install(model(0)).is_err());
        assert!(Arc::ptr_eq(&current, &active.snapshot().unwrap()));
    }

    #[test]
    fn test_concurrent_readers() {
        let active = Arc::new(ActiveModel::new());
        let handles = (0..8)
            .map(|_| {
                let active = Arc::clone(&active);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert!(active.snapshot().is_none());
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
