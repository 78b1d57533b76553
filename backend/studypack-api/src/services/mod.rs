use std::sync::Arc;
use std::time::Duration;

use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

use crate::config::{Config, StorageBackend};
use crate::repository::{InMemoryRepository, MongoRepository, StudyRepository};

pub mod content_generator;
pub mod gemini_client;
pub mod generation_queue;
pub mod ingestion_service;
pub mod material_lock;
pub mod quiz_scoring;
pub mod review_service;
pub mod study_pack_service;
pub mod tutor_service;

use content_generator::{ContentGenerator, Summarizer, TemplateSummarizer};
use gemini_client::{GeminiClient, TextGenerator};
use generation_queue::GenerationQueue;
use material_lock::{LocalMaterialLocks, MaterialLocks, RedisMaterialLocks};

pub struct AppState {
    pub config: Config,
    pub repo: Arc<dyn StudyRepository>,
    pub locks: Arc<dyn MaterialLocks>,
    pub generation_queue: GenerationQueue,
    pub text_generator: Option<Arc<dyn TextGenerator>>,
    /// Present only with the Mongo backend; used by the health check.
    pub mongo: Option<Database>,
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let (repo, mongo): (Arc<dyn StudyRepository>, Option<Database>) =
            match config.storage_backend {
                StorageBackend::Mongo => {
                    let client = MongoClient::with_uri_str(&config.mongo_uri).await?;
                    let repo = MongoRepository::new(client, &config.mongo_database);
                    repo.ensure_indexes().await?;
                    tracing::info!("MongoDB connected");
                    let db = repo.database().clone();
                    (Arc::new(repo), Some(db))
                }
                StorageBackend::Memory => {
                    tracing::warn!("Using in-memory storage, data is lost on restart");
                    (Arc::new(InMemoryRepository::new()), None)
                }
            };

        let redis = match config.redis_uri.as_deref() {
            Some(uri) => Some(connect_redis(uri).await?),
            None => None,
        };
        let locks: Arc<dyn MaterialLocks> = match redis.clone() {
            Some(conn) => Arc::new(RedisMaterialLocks::new(conn, config.lock_ttl_ms)),
            None => {
                tracing::info!("REDIS_URI not set, material locks are process-local");
                Arc::new(LocalMaterialLocks::new())
            }
        };

        let text_generator: Option<Arc<dyn TextGenerator>> = match config.gemini_api_key.clone() {
            Some(key) => Some(Arc::new(GeminiClient::new(key, config.gemini_model.clone()))),
            None => {
                tracing::warn!("GEMINI_API_KEY not set, tutor chat is disabled");
                None
            }
        };

        let mut state = Self::from_parts(
            config,
            repo,
            locks,
            Arc::new(TemplateSummarizer),
            text_generator,
        );
        state.mongo = mongo;
        state.redis = redis;
        Ok(state)
    }

    /// Wires the state from ready-made parts and starts the generation workers.
    /// Must run inside a Tokio runtime.
    pub fn from_parts(
        config: Config,
        repo: Arc<dyn StudyRepository>,
        locks: Arc<dyn MaterialLocks>,
        summarizer: Arc<dyn Summarizer>,
        text_generator: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        let generator = Arc::new(ContentGenerator::new(
            repo.clone(),
            locks.clone(),
            summarizer,
            Duration::from_secs(config.generation_timeout_secs),
        ));
        let generation_queue = GenerationQueue::start(
            generator,
            config.generation_workers,
            config.generation_queue_capacity,
        );

        Self {
            config,
            repo,
            locks,
            generation_queue,
            text_generator,
            mongo: None,
            redis: None,
        }
    }

    pub fn tutor_timeout(&self) -> Duration {
        Duration::from_secs(self.config.tutor_timeout_secs)
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");
    let client = redis::Client::open(uri)?;

    let redis = tokio::time::timeout(Duration::from_secs(30), ConnectionManager::new(client))
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
