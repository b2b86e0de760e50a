use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::services::review::ports::FinalizeSpawner;
use crate::services::review::RecordFinalizer;

/// Bounded queue of speculative finalization jobs drained by a fixed pool of
/// workers. Workers only prefetch the extraction; the record is written at
/// quorum. Enqueueing never waits: a full queue drops the job.
#[derive(Clone)]
pub(crate) struct FinalizeQueue {
    sender: mpsc::Sender<String>,
}

impl FinalizeQueue {
    pub(crate) fn start(
        finalizer: Arc<RecordFinalizer>,
        capacity: usize,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(finalize_worker(
                    worker_id,
                    finalizer.clone(),
                    receiver.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        (Self { sender }, handles)
    }
}

impl FinalizeSpawner for FinalizeQueue {
    fn spawn_finalize(&self, material_id: &str) {
        match self.sender.try_send(material_id.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(material_id)) => {
                metrics::counter!("finalize_queue_dropped_total").increment(1);
                tracing::warn!(
                    material_id = %material_id,
                    "Finalize queue full; dropping speculative job"
                );
            }
            Err(mpsc::error::TrySendError::Closed(material_id)) => {
                tracing::warn!(
                    material_id = %material_id,
                    "Finalize queue closed; dropping speculative job"
                );
            }
        }
    }
}

async fn finalize_worker(
    worker_id: usize,
    finalizer: Arc<RecordFinalizer>,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                _ = shutdown.changed() => break,
                next = receiver.recv() => next,
            }
        };

        let Some(material_id) = next else {
            break;
        };

        match finalizer.prefetch(&material_id).await {
            Ok(outcome) => {
                tracing::debug!(
                    worker_id,
                    material_id = %material_id,
                    ?outcome,
                    "Speculative extraction done"
                );
            }
            Err(err) => {
                tracing::warn!(
                    worker_id,
                    material_id = %material_id,
                    error = %err,
                    "Speculative extraction failed"
                );
            }
        }
    }

    tracing::debug!(worker_id, "Finalize worker stopped");
}
