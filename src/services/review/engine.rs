use std::sync::Arc;

use thiserror::Error;

use super::decision::ReviewDecision;
use super::finalizer::{FinalizeError, RecordFinalizer};
use super::locks::KeyedLocks;
use super::ports::{FinalizeSpawner, MaterialStore, ReviewUpdate, ReviewWrite, StoreError};
use super::reviewers::ReviewerSet;
use crate::core::time::primitive_now_utc;
use crate::db::models::Material;
use crate::db::types::MaterialStatus;

/// Distinct approvals needed before a material is approved.
pub(crate) const APPROVAL_QUORUM: usize = 3;

/// Read-modify-write rounds before giving up on a contended material.
const MAX_WRITE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub(crate) struct ReviewOutcome {
    pub(crate) material_id: String,
    pub(crate) status: MaterialStatus,
    pub(crate) reviewers: Vec<String>,
    pub(crate) comment: String,
}

#[derive(Debug, Error)]
pub(crate) enum ReviewError {
    #[error("material id is required")]
    MissingMaterialId,
    #[error("invalid reviewer identity")]
    InvalidReviewer,
    #[error("material {0} not found")]
    NotFound(String),
    #[error("material {0} kept changing under concurrent reviews")]
    Conflict(String),
    #[error("failed to load material {material_id}: {source}")]
    Load {
        material_id: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to persist review for material {material_id}: {source}")]
    Persist {
        material_id: String,
        #[source]
        source: StoreError,
    },
    #[error("{finalize}; recording the vote also failed: {source}")]
    FinalizeAndPersist {
        finalize: FinalizeError,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
}

/// Quorum state machine over a material's reviewer set.
pub(crate) struct ReviewEngine {
    materials: Arc<dyn MaterialStore>,
    finalizer: Arc<RecordFinalizer>,
    spawner: Arc<dyn FinalizeSpawner>,
    locks: KeyedLocks,
}

impl ReviewEngine {
    pub(crate) fn new(
        materials: Arc<dyn MaterialStore>,
        finalizer: Arc<RecordFinalizer>,
        spawner: Arc<dyn FinalizeSpawner>,
    ) -> Self {
        Self { materials, finalizer, spawner, locks: KeyedLocks::default() }
    }

    pub(crate) async fn submit_review(
        &self,
        material_id: &str,
        decision: &ReviewDecision,
        comment: &str,
        reviewer: &str,
    ) -> Result<ReviewOutcome, ReviewError> {
        let material_id = material_id.trim();
        if material_id.is_empty() {
            return Err(ReviewError::MissingMaterialId);
        }
        let reviewer = reviewer.trim();
        if reviewer.is_empty() || reviewer.contains(',') {
            return Err(ReviewError::InvalidReviewer);
        }

        // Serializes callers in this process; the conditional write in the
        // store catches other replicas.
        let _guard = self.locks.lock(material_id).await;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let material = self
                .materials
                .get(material_id)
                .await
                .map_err(|source| ReviewError::Load {
                    material_id: material_id.to_string(),
                    source,
                })?
                .ok_or_else(|| ReviewError::NotFound(material_id.to_string()))?;

            if let Some(outcome) = self.apply(&material, decision, comment, reviewer).await? {
                return Ok(outcome);
            }
            tracing::debug!(
                material_id,
                reviewer,
                attempt,
                "Material changed concurrently; retrying"
            );
        }

        Err(ReviewError::Conflict(material_id.to_string()))
    }

    /// One read-modify-write round. `None` means the row changed since it was
    /// read and nothing was written.
    async fn apply(
        &self,
        material: &Material,
        decision: &ReviewDecision,
        comment: &str,
        reviewer: &str,
    ) -> Result<Option<ReviewOutcome>, ReviewError> {
        let material_id = material.id.as_str();
        let current = material.status;
        let mut reviewers = ReviewerSet::parse(&material.reviewers);

        let next_status = match decision {
            ReviewDecision::Rejected => {
                reviewers.insert(reviewer);
                match current {
                    MaterialStatus::Approved => None,
                    _ => Some(MaterialStatus::Rejected),
                }
            }
            ReviewDecision::Approved => {
                if !reviewers.contains(reviewer) {
                    self.spawner.spawn_finalize(material_id);
                    reviewers.insert(reviewer);
                }

                let quorum_reached =
                    reviewers.len() >= APPROVAL_QUORUM || current == MaterialStatus::Approved;

                if current == MaterialStatus::Rejected || !quorum_reached {
                    None
                } else if let Err(err) = self.finalizer.finalize_if_absent(material_id).await {
                    tracing::error!(
                        material_id,
                        reviewer,
                        error = %err,
                        "Record finalization failed at quorum; status left unchanged"
                    );
                    // The vote is still recorded.
                    return match self.persist(material, None, &reviewers, comment).await {
                        Ok(true) => Err(err.into()),
                        Ok(false) => Ok(None),
                        Err(ReviewError::Persist { source, .. }) => {
                            Err(ReviewError::FinalizeAndPersist { finalize: err, source })
                        }
                        Err(other) => Err(other),
                    };
                } else {
                    Some(MaterialStatus::Approved)
                }
            }
            ReviewDecision::Other(_) => {
                reviewers.insert(reviewer);
                None
            }
        };

        if !self.persist(material, next_status, &reviewers, comment).await? {
            return Ok(None);
        }

        if next_status == Some(MaterialStatus::Rejected) {
            self.finalizer.discard_prefetched(material_id);
        }

        metrics::counter!("material_reviews_total", "decision" => decision.label()).increment(1);

        let status = next_status.unwrap_or(current);
        if status != current {
            tracing::info!(
                material_id,
                reviewer,
                from = current.as_str(),
                to = status.as_str(),
                "Material status changed"
            );
        }

        Ok(Some(ReviewOutcome {
            material_id: material_id.to_string(),
            status,
            reviewers: reviewers.into_vec(),
            comment: comment.to_string(),
        }))
    }

    /// Returns `false` when the row no longer matches what was read.
    async fn persist(
        &self,
        material: &Material,
        status: Option<MaterialStatus>,
        reviewers: &ReviewerSet,
        comment: &str,
    ) -> Result<bool, ReviewError> {
        let update = ReviewUpdate {
            material_id: material.id.clone(),
            expected_status: material.status,
            expected_reviewers: material.reviewers.clone(),
            status,
            reviewers: reviewers.joined(),
            comment: comment.to_string(),
            reviewed_at: primitive_now_utc(),
        };

        let written = self
            .materials
            .update_review(update)
            .await
            .map_err(|source| ReviewError::Persist { material_id: material.id.clone(), source })?;

        match written {
            ReviewWrite::Applied => Ok(true),
            ReviewWrite::Stale => Ok(false),
            ReviewWrite::Missing => Err(ReviewError::NotFound(material.id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::watch;

    use super::{ReviewEngine, ReviewError, APPROVAL_QUORUM, MAX_WRITE_ATTEMPTS};
    use crate::db::types::MaterialStatus;
    use crate::services::review::decision::ReviewDecision;
    use crate::services::review::finalizer::FinalizeError;
    use crate::tasks::finalize_queue::FinalizeQueue;
    use crate::test_support::{self, ReviewHarness};

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Engine over the harness stores, fed by real background workers.
    fn queued_engine(
        harness: &ReviewHarness,
    ) -> (ReviewEngine, watch::Sender<bool>, Vec<tokio::task::JoinHandle<()>>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, handles) = FinalizeQueue::start(harness.finalizer.clone(), 8, 1, shutdown_rx);
        let engine = ReviewEngine::new(
            harness.materials.clone(),
            harness.finalizer.clone(),
            Arc::new(queue),
        );
        (engine, shutdown_tx, handles)
    }

    async fn stop_workers(
        shutdown_tx: watch::Sender<bool>,
        handles: Vec<tokio::task::JoinHandle<()>>,
    ) {
        shutdown_tx.send(true).expect("shutdown");
        for handle in handles {
            handle.await.expect("join");
        }
    }

    async fn approve(harness: &ReviewHarness, material_id: &str, reviewer: &str) {
        harness
            .engine
            .submit_review(material_id, &ReviewDecision::Approved, "ok", reviewer)
            .await
            .expect("approve");
    }

    #[tokio::test]
    async fn three_distinct_approvals_approve_and_finalize() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));

        let first = harness
            .engine
            .submit_review("m1", &ReviewDecision::Approved, "ok", "A")
            .await
            .expect("A");
        assert_eq!(first.status, MaterialStatus::Pending);
        assert_eq!(first.reviewers, vec!["A"]);

        let second = harness
            .engine
            .submit_review("m1", &ReviewDecision::Approved, "ok", "B")
            .await
            .expect("B");
        assert_eq!(second.status, MaterialStatus::Pending);
        assert_eq!(second.reviewers, vec!["A", "B"]);

        let third = harness
            .engine
            .submit_review("m1", &ReviewDecision::Approved, "ok", "C")
            .await
            .expect("C");
        assert_eq!(third.status, MaterialStatus::Approved);
        assert_eq!(third.reviewers, vec!["A", "B", "C"]);

        let stored = harness.materials.get_cloned("m1").expect("material");
        assert_eq!(stored.status, MaterialStatus::Approved);
        assert_eq!(stored.reviewers, "A,B,C");
        assert_eq!(stored.review_comment.as_deref(), Some("ok"));
        assert!(stored.review_time.is_some());
        assert!(harness.records.get("m1").is_some());
        assert_eq!(harness.spawner.pending(), vec!["m1", "m1", "m1"]);
    }

    #[tokio::test]
    async fn rejection_is_immediate_and_blocks_record() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m2", "uploader-1"));

        approve(&harness, "m2", "A").await;
        let outcome = harness
            .engine
            .submit_review("m2", &ReviewDecision::Rejected, "bad scan", "B")
            .await
            .expect("reject");

        assert_eq!(outcome.status, MaterialStatus::Rejected);
        assert_eq!(outcome.reviewers, vec!["A", "B"]);

        harness.run_deferred().await;
        assert!(harness.records.get("m2").is_none());
        assert_eq!(harness.extractor.calls(), 0);
    }

    #[tokio::test]
    async fn rejected_material_never_returns_to_approved() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));

        approve(&harness, "m1", "A").await;
        approve(&harness, "m1", "B").await;
        harness
            .engine
            .submit_review("m1", &ReviewDecision::Rejected, "no", "C")
            .await
            .expect("reject");

        let outcome = harness
            .engine
            .submit_review("m1", &ReviewDecision::Approved, "changed my mind", "D")
            .await
            .expect("late approval");

        assert_eq!(outcome.status, MaterialStatus::Rejected);
        assert_eq!(outcome.reviewers.len(), 4);
        let stored = harness.materials.get_cloned("m1").expect("material");
        assert_eq!(stored.status, MaterialStatus::Rejected);
        assert_eq!(stored.review_comment.as_deref(), Some("changed my mind"));
        assert!(harness.records.get("m1").is_none());
    }

    #[tokio::test]
    async fn failed_quorum_finalization_keeps_vote_but_not_status() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m3", "uploader-1"));

        approve(&harness, "m3", "A").await;
        approve(&harness, "m3", "B").await;
        harness.extractor.set_failing(true);

        let result =
            harness.engine.submit_review("m3", &ReviewDecision::Approved, "ok", "C").await;

        assert!(matches!(result, Err(ReviewError::Finalize(FinalizeError::Extraction { .. }))));
        let stored = harness.materials.get_cloned("m3").expect("material");
        assert_eq!(stored.status, MaterialStatus::Pending);
        assert_eq!(stored.reviewers, "A,B,C");
        assert!(harness.records.get("m3").is_none());
    }

    #[tokio::test]
    async fn quorum_retry_succeeds_once_extraction_recovers() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m3", "uploader-1"));

        approve(&harness, "m3", "A").await;
        approve(&harness, "m3", "B").await;
        harness.extractor.set_failing(true);
        let _ = harness.engine.submit_review("m3", &ReviewDecision::Approved, "ok", "C").await;

        harness.extractor.set_failing(false);
        let retried = harness
            .engine
            .submit_review("m3", &ReviewDecision::Approved, "retry", "C")
            .await
            .expect("retry");

        assert_eq!(retried.status, MaterialStatus::Approved);
        assert_eq!(retried.reviewers, vec!["A", "B", "C"]);
        assert!(harness.records.get("m3").is_some());
    }

    #[tokio::test]
    async fn repeated_vote_does_not_duplicate_reviewer() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));

        approve(&harness, "m1", "A").await;
        let outcome = harness
            .engine
            .submit_review("m1", &ReviewDecision::Approved, "again", " A ")
            .await
            .expect("repeat");

        assert_eq!(outcome.reviewers, vec!["A"]);
        assert_eq!(outcome.status, MaterialStatus::Pending);
        assert_eq!(harness.spawner.pending().len(), 1);
        let stored = harness.materials.get_cloned("m1").expect("material");
        assert_eq!(stored.review_comment.as_deref(), Some("again"));
    }

    #[tokio::test]
    async fn neutral_decision_records_reviewer_without_status_change() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));

        let outcome = harness
            .engine
            .submit_review("m1", &ReviewDecision::parse("needs-info"), "missing page", "A")
            .await
            .expect("comment");

        assert_eq!(outcome.status, MaterialStatus::Pending);
        assert_eq!(outcome.reviewers, vec!["A"]);
        assert!(harness.spawner.pending().is_empty());
    }

    #[tokio::test]
    async fn rejection_after_approval_keeps_approved() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));
        for reviewer in ["A", "B", "C"] {
            approve(&harness, "m1", reviewer).await;
        }

        let outcome = harness
            .engine
            .submit_review("m1", &ReviewDecision::Rejected, "too late", "D")
            .await
            .expect("reject");

        assert_eq!(outcome.status, MaterialStatus::Approved);
        assert_eq!(outcome.reviewers.len(), APPROVAL_QUORUM + 1);
    }

    #[tokio::test]
    async fn concurrent_approvals_reach_quorum_with_single_record() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));

        let engine = harness.engine.clone();
        let tasks = ["A", "B", "C", "D", "E"]
            .into_iter()
            .map(|reviewer| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine.submit_review("m1", &ReviewDecision::Approved, "ok", reviewer).await
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            task.await.expect("join").expect("approve");
        }
        harness.run_deferred().await;

        let stored = harness.materials.get_cloned("m1").expect("material");
        assert_eq!(stored.status, MaterialStatus::Approved);
        assert_eq!(stored.reviewers.split(',').count(), 5);
        assert_eq!(harness.records.len(), 1);
        assert_eq!(harness.extractor.calls(), 1);
    }

    #[tokio::test]
    async fn input_errors_do_not_touch_store() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));

        let missing = harness.engine.submit_review("  ", &ReviewDecision::Approved, "", "A").await;
        let bad_reviewer =
            harness.engine.submit_review("m1", &ReviewDecision::Approved, "", "A,B").await;
        let unknown =
            harness.engine.submit_review("ghost", &ReviewDecision::Approved, "", "A").await;

        assert!(matches!(missing, Err(ReviewError::MissingMaterialId)));
        assert!(matches!(bad_reviewer, Err(ReviewError::InvalidReviewer)));
        assert!(matches!(unknown, Err(ReviewError::NotFound(id)) if id == "ghost"));
        assert_eq!(harness.materials.get_cloned("m1").expect("material").reviewers, "");
    }

    #[tokio::test]
    async fn persistence_failure_is_reported() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));
        harness.materials.fail_updates(true);

        let result = harness.engine.submit_review("m1", &ReviewDecision::Rejected, "", "A").await;

        assert!(matches!(result, Err(ReviewError::Persist { .. })));
        assert_eq!(
            harness.materials.get_cloned("m1").expect("material").status,
            MaterialStatus::Pending
        );
    }

    #[tokio::test]
    async fn rejection_after_background_extraction_leaves_no_record() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m2", "uploader-1"));
        let (engine, shutdown_tx, handles) = queued_engine(&harness);

        engine.submit_review("m2", &ReviewDecision::Approved, "ok", "A").await.expect("A");
        wait_until(|| harness.finalizer.is_prefetched("m2")).await;
        assert!(harness.finalizer.is_prefetched("m2"));

        let outcome = engine
            .submit_review("m2", &ReviewDecision::Rejected, "bad scan", "B")
            .await
            .expect("reject");
        stop_workers(shutdown_tx, handles).await;

        assert_eq!(outcome.status, MaterialStatus::Rejected);
        assert_eq!(outcome.reviewers, vec!["A", "B"]);
        assert!(harness.records.get("m2").is_none());
        assert!(!harness.finalizer.is_prefetched("m2"));
        assert_eq!(harness.extractor.calls(), 1);
    }

    #[tokio::test]
    async fn quorum_reuses_background_extraction() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));
        let (engine, shutdown_tx, handles) = queued_engine(&harness);

        engine.submit_review("m1", &ReviewDecision::Approved, "ok", "A").await.expect("A");
        wait_until(|| harness.finalizer.is_prefetched("m1")).await;
        assert!(harness.records.get("m1").is_none());

        engine.submit_review("m1", &ReviewDecision::Approved, "ok", "B").await.expect("B");
        let third =
            engine.submit_review("m1", &ReviewDecision::Approved, "ok", "C").await.expect("C");
        stop_workers(shutdown_tx, handles).await;

        assert_eq!(third.status, MaterialStatus::Approved);
        assert!(harness.records.get("m1").is_some());
        assert_eq!(harness.records.len(), 1);
        assert_eq!(harness.extractor.calls(), 1);
    }

    #[tokio::test]
    async fn vote_written_by_another_replica_is_kept() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));
        harness.materials.sneak_vote_before_next_update("Z");

        let outcome = harness
            .engine
            .submit_review("m1", &ReviewDecision::Approved, "ok", "A")
            .await
            .expect("approve");

        assert_eq!(outcome.reviewers, vec!["Z", "A"]);
        assert_eq!(harness.materials.get_cloned("m1").expect("material").reviewers, "Z,A");
    }

    #[tokio::test]
    async fn endless_contention_is_reported_as_conflict() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m1", "uploader-1"));
        for n in 0..MAX_WRITE_ATTEMPTS {
            harness.materials.sneak_vote_before_next_update(&format!("Z{n}"));
        }

        let result =
            harness.engine.submit_review("m1", &ReviewDecision::Rejected, "no", "A").await;

        assert!(matches!(result, Err(ReviewError::Conflict(id)) if id == "m1"));
        let stored = harness.materials.get_cloned("m1").expect("material");
        assert_eq!(stored.status, MaterialStatus::Pending);
        assert!(!stored.reviewers.split(',').any(|reviewer| reviewer == "A"));
    }

    #[tokio::test]
    async fn failed_vote_write_keeps_finalization_cause() {
        let harness = test_support::build_harness();
        harness.materials.put(test_support::sample_material("m3", "uploader-1"));
        approve(&harness, "m3", "A").await;
        approve(&harness, "m3", "B").await;
        harness.extractor.set_failing(true);
        harness.materials.fail_updates(true);

        let result =
            harness.engine.submit_review("m3", &ReviewDecision::Approved, "ok", "C").await;

        let err = result.expect_err("both steps failed");
        assert!(matches!(
            &err,
            ReviewError::FinalizeAndPersist { finalize: FinalizeError::Extraction { .. }, .. }
        ));
        assert!(err.to_string().contains("record extraction failed for material m3"));
        assert_eq!(harness.materials.get_cloned("m3").expect("material").reviewers, "A,B");
    }
}
