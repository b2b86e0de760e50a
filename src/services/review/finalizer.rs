use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use thiserror::Error;

use super::locks::KeyedLocks;
use super::ports::{ExtractedRecord, MaterialStore, RecordExtractor, RecordStore, StoreError};
use crate::core::time::primitive_now_utc;
use crate::db::models::Material;
use crate::db::types::MaterialStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeOutcome {
    Created,
    AlreadyFinalized,
    /// The material was rejected before the attempt ran.
    SkippedRejected,
    /// Extraction is held in memory until the material reaches quorum.
    Prefetched,
}

impl FinalizeOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyFinalized => "already_finalized",
            Self::SkippedRejected => "skipped_rejected",
            Self::Prefetched => "prefetched",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum FinalizeError {
    #[error("material {0} not found")]
    MaterialNotFound(String),
    #[error("failed to load data for material {material_id}: {source}")]
    Load {
        material_id: String,
        #[source]
        source: StoreError,
    },
    #[error("record extraction failed for material {material_id}: {message}")]
    Extraction { material_id: String, message: String },
    #[error("failed to persist record for material {material_id}: {source}")]
    Persist {
        material_id: String,
        #[source]
        source: StoreError,
    },
}

/// Produces the bonus record of a material at most once.
///
/// Speculative attempts (`prefetch`) only run the extraction and keep its
/// result in memory. The record is written by `finalize_if_absent`, which the
/// review engine calls once the material has reached quorum.
pub(crate) struct RecordFinalizer {
    materials: Arc<dyn MaterialStore>,
    records: Arc<dyn RecordStore>,
    extractor: Arc<dyn RecordExtractor>,
    locks: KeyedLocks,
    prefetched: Mutex<HashMap<String, ExtractedRecord>>,
}

impl RecordFinalizer {
    pub(crate) fn new(
        materials: Arc<dyn MaterialStore>,
        records: Arc<dyn RecordStore>,
        extractor: Arc<dyn RecordExtractor>,
    ) -> Self {
        Self {
            materials,
            records,
            extractor,
            locks: KeyedLocks::default(),
            prefetched: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn finalize_if_absent(
        &self,
        material_id: &str,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        observe(self.finalize_locked(material_id)).await
    }

    /// Runs the extraction ahead of quorum without writing a record.
    pub(crate) async fn prefetch(
        &self,
        material_id: &str,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        observe(self.prefetch_locked(material_id)).await
    }

    /// Drops a held extraction, e.g. after the material was rejected.
    pub(crate) fn discard_prefetched(&self, material_id: &str) {
        self.prefetched_map().remove(material_id);
    }

    #[cfg(test)]
    pub(crate) fn is_prefetched(&self, material_id: &str) -> bool {
        self.prefetched_map().contains_key(material_id)
    }

    fn prefetched_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, ExtractedRecord>> {
        self.prefetched.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the material unless a record already exists or it was rejected.
    async fn load_open(
        &self,
        material_id: &str,
    ) -> Result<Result<Material, FinalizeOutcome>, FinalizeError> {
        let exists = self.records.exists(material_id).await.map_err(|source| {
            FinalizeError::Load { material_id: material_id.to_string(), source }
        })?;
        if exists {
            self.discard_prefetched(material_id);
            return Ok(Err(FinalizeOutcome::AlreadyFinalized));
        }

        let material = self
            .materials
            .get(material_id)
            .await
            .map_err(|source| FinalizeError::Load { material_id: material_id.to_string(), source })?
            .ok_or_else(|| FinalizeError::MaterialNotFound(material_id.to_string()))?;

        if material.status == MaterialStatus::Rejected {
            tracing::info!(material_id, "Skipping record extraction for rejected material");
            self.discard_prefetched(material_id);
            return Ok(Err(FinalizeOutcome::SkippedRejected));
        }

        Ok(Ok(material))
    }

    async fn extract(&self, material: &Material) -> Result<ExtractedRecord, FinalizeError> {
        self.extractor.extract(material).await.map_err(|err| FinalizeError::Extraction {
            material_id: material.id.clone(),
            message: format!("{err:#}"),
        })
    }

    async fn prefetch_locked(&self, material_id: &str) -> Result<FinalizeOutcome, FinalizeError> {
        let _guard = self.locks.lock(material_id).await;

        let material = match self.load_open(material_id).await? {
            Ok(material) => material,
            Err(outcome) => return Ok(outcome),
        };
        if self.prefetched_map().contains_key(material_id) {
            return Ok(FinalizeOutcome::Prefetched);
        }

        let extracted = self.extract(&material).await?;

        // A rejection may have landed while the model was answering.
        if let Ok(Some(current)) = self.materials.get(material_id).await {
            if current.status == MaterialStatus::Rejected {
                return Ok(FinalizeOutcome::SkippedRejected);
            }
        }

        self.prefetched_map().insert(material_id.to_string(), extracted);
        tracing::debug!(material_id, "Record extraction prefetched");
        Ok(FinalizeOutcome::Prefetched)
    }

    async fn finalize_locked(&self, material_id: &str) -> Result<FinalizeOutcome, FinalizeError> {
        // One extraction per material inside this process; the unique insert
        // covers other processes.
        let _guard = self.locks.lock(material_id).await;

        let material = match self.load_open(material_id).await? {
            Ok(material) => material,
            Err(outcome) => return Ok(outcome),
        };

        let held = self.prefetched_map().remove(material_id);
        let extracted = match held {
            Some(extracted) => extracted,
            None => self.extract(&material).await?,
        };

        let record = extracted.into_record(&material, primitive_now_utc());
        let inserted = self.records.insert(&record).await.map_err(|source| {
            FinalizeError::Persist { material_id: material_id.to_string(), source }
        })?;

        if inserted {
            tracing::info!(
                material_id,
                record_type = %record.record_type,
                college_score = record.college_score,
                "Bonus record created"
            );
            Ok(FinalizeOutcome::Created)
        } else {
            Ok(FinalizeOutcome::AlreadyFinalized)
        }
    }
}

async fn observe(
    attempt: impl std::future::Future<Output = Result<FinalizeOutcome, FinalizeError>>,
) -> Result<FinalizeOutcome, FinalizeError> {
    let timer = Instant::now();
    let result = attempt.await;

    let outcome = match &result {
        Ok(outcome) => outcome.label(),
        Err(_) => "failed",
    };
    metrics::counter!("material_finalize_total", "outcome" => outcome).increment(1);
    metrics::histogram!("material_finalize_duration_seconds")
        .record(timer.elapsed().as_secs_f64());

    result
}
