use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};

use super::content_generator::ContentGenerator;

/// What the generator works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationSource {
    Transcript(String),
    Document { file_url: String, title: String },
}

/// One unit of generation work for a study pack.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub study_pack_id: String,
    pub material_id: String,
    pub source: GenerationSource,
}

/// Bounded job queue served by a fixed pool of worker tasks. Submitting never
/// waits for generation to finish; the outcome lands on the study pack.
#[derive(Clone)]
pub struct GenerationQueue {
    sender: mpsc::Sender<GenerationJob>,
}

impl GenerationQueue {
    pub fn start(generator: Arc<ContentGenerator>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = workers.max(1);

        for worker_id in 0..workers {
            let receiver = receiver.clone();
            let generator = generator.clone();
            tokio::spawn(async move {
                loop {
                    // Hold the receiver only while waiting, not while generating.
                    let job = { receiver.lock().await.recv().await };
                    let Some(job) = job else {
                        break;
                    };
                    generator.process(&job).await;
                }
                tracing::info!(worker_id, "Generation worker stopped");
            });
        }

        tracing::info!(workers, capacity, "Generation queue started");
        Self { sender }
    }

    /// Waits for queue capacity when the pool is saturated.
    pub async fn submit(&self, job: GenerationJob) -> Result<()> {
        let study_pack_id = job.study_pack_id.clone();
        self.sender
            .send(job)
            .await
            .map_err(|_| anyhow!("generation queue is closed"))?;
        tracing::debug!(study_pack_id = %study_pack_id, "Generation job queued");
        Ok(())
    }
}
