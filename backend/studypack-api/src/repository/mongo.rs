use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use uuid::Uuid;

use super::{GenerationCommit, StudyRepository};
use crate::metrics::track_db_operation;
use crate::models::material::{RESOURCES_MODULE_ORDER, RESOURCES_MODULE_TITLE};
use crate::models::{
    Flashcard, FlashcardSession, Material, Module, ProgressEvent, Quiz, QuizAttempt,
    QuizQuestion, StudyPack, StudyPackStatus, Summary, SummaryContent,
};
use crate::utils::time::chrono_to_bson;

const MODULES: &str = "modules";
const MATERIALS: &str = "materials";
const STUDY_PACKS: &str = "study_packs";
const SUMMARIES: &str = "summaries";
const QUIZZES: &str = "quizzes";
const QUIZ_QUESTIONS: &str = "quiz_questions";
const FLASHCARDS: &str = "flashcards";
const QUIZ_ATTEMPTS: &str = "quiz_attempts";
const FLASHCARD_SESSIONS: &str = "flashcard_sessions";
const PROGRESS_EVENTS: &str = "progress_events";

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed store. Multi-document writes run inside a session
/// transaction, so the deployment must be a replica set.
#[derive(Clone)]
pub struct MongoRepository {
    client: Client,
    db: Database,
}

impl MongoRepository {
    pub fn new(client: Client, database: &str) -> Self {
        let db = client.database(database);
        Self { client, db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = IndexOptions::builder().unique(true).build();

        self.db
            .collection::<Document>(MODULES)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "courseId": 1, "title": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await
            .context("Failed to create modules index")?;

        self.db
            .collection::<Document>(STUDY_PACKS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "materialId": 1, "createdAt": -1 })
                    .build(),
            )
            .await
            .context("Failed to create study_packs index")?;

        self.db
            .collection::<Document>(SUMMARIES)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "studyPackId": 1 })
                    .options(unique)
                    .build(),
            )
            .await
            .context("Failed to create summaries index")?;

        self.db
            .collection::<Document>(FLASHCARD_SESSIONS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "userId": 1, "createdAt": -1 })
                    .build(),
            )
            .await
            .context("Failed to create flashcard_sessions index")?;

        for (collection, field) in [
            (QUIZZES, "studyPackId"),
            (QUIZ_QUESTIONS, "quizId"),
            (FLASHCARDS, "studyPackId"),
        ] {
            self.db
                .collection::<Document>(collection)
                .create_index(IndexModel::builder().keys(doc! { field: 1 }).build())
                .await
                .with_context(|| format!("Failed to create {} index", collection))?;
        }

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    fn modules(&self) -> Collection<Module> {
        self.db.collection(MODULES)
    }

    fn materials(&self) -> Collection<Material> {
        self.db.collection(MATERIALS)
    }

    fn study_packs(&self) -> Collection<StudyPack> {
        self.db.collection(STUDY_PACKS)
    }

    fn summaries(&self) -> Collection<Document> {
        self.db.collection(SUMMARIES)
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.db.collection(QUIZZES)
    }

    fn questions(&self) -> Collection<QuizQuestion> {
        self.db.collection(QUIZ_QUESTIONS)
    }

    fn flashcards(&self) -> Collection<Flashcard> {
        self.db.collection(FLASHCARDS)
    }

    async fn start_transaction(&self) -> Result<ClientSession> {
        let mut session = self
            .client
            .start_session()
            .await
            .context("Failed to start MongoDB session")?;
        session
            .start_transaction()
            .await
            .context("Failed to start MongoDB transaction")?;
        Ok(session)
    }

    /// Commits on success, aborts on error and returns the original error.
    async fn finish(session: &mut ClientSession, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => session
                .commit_transaction()
                .await
                .context("Failed to commit MongoDB transaction"),
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    tracing::warn!(error = %abort_err, "Failed to abort MongoDB transaction");
                }
                Err(err)
            }
        }
    }

    async fn upsert_summary(
        &self,
        session: &mut ClientSession,
        study_pack_id: &str,
        content: &SummaryContent,
    ) -> Result<()> {
        let content = bson::to_bson(content).context("Failed to encode summary content")?;
        self.summaries()
            .update_one(
                doc! { "studyPackId": study_pack_id },
                doc! {
                    "$set": { "content": content, "updatedAt": chrono_to_bson(Utc::now()) },
                    "$setOnInsert": { "_id": Uuid::new_v4().to_string() },
                },
            )
            .upsert(true)
            .session(&mut *session)
            .await
            .context("Failed to upsert summary")?;
        Ok(())
    }

    async fn upsert_pack(&self, session: &mut ClientSession, pack: &StudyPack) -> Result<()> {
        self.study_packs()
            .replace_one(doc! { "_id": &pack.id }, pack)
            .upsert(true)
            .session(&mut *session)
            .await
            .context("Failed to save study pack")?;
        Ok(())
    }

    async fn write_generation(
        &self,
        session: &mut ClientSession,
        commit: &GenerationCommit,
    ) -> Result<()> {
        let pack_id = commit.study_pack.id.as_str();

        self.upsert_summary(session, pack_id, &commit.summary)
            .await?;
        self.quizzes()
            .insert_one(&commit.quiz)
            .session(&mut *session)
            .await
            .context("Failed to insert quiz")?;
        if !commit.questions.is_empty() {
            self.questions()
                .insert_many(&commit.questions)
                .session(&mut *session)
                .await
                .context("Failed to insert quiz questions")?;
        }
        if !commit.flashcards.is_empty() {
            self.flashcards()
                .insert_many(&commit.flashcards)
                .session(&mut *session)
                .await
                .context("Failed to insert flashcards")?;
        }

        // Status goes last and only if nobody moved the pack on meanwhile.
        let result = self
            .study_packs()
            .replace_one(
                doc! { "_id": pack_id, "status": StudyPackStatus::Processing.as_str() },
                &commit.study_pack,
            )
            .session(&mut *session)
            .await
            .context("Failed to update study pack status")?;
        if result.matched_count == 0 {
            return Err(anyhow!(
                "study pack {} is no longer PROCESSING",
                pack_id
            ));
        }
        Ok(())
    }

    async fn latest_pack_matching(&self, filter: Document) -> Result<Option<StudyPack>> {
        track_db_operation("find_one", STUDY_PACKS, async {
            self.study_packs()
                .find_one(filter)
                .sort(doc! { "createdAt": -1 })
                .await
                .context("Failed to query latest study pack")
        })
        .await
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == DUPLICATE_KEY
    ) || matches!(
        *err.kind,
        mongodb::error::ErrorKind::Command(ref ce) if ce.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl StudyRepository for MongoRepository {
    async fn find_module(&self, module_id: &str) -> Result<Option<Module>> {
        self.modules()
            .find_one(doc! { "_id": module_id })
            .await
            .context("Failed to query module")
    }

    async fn find_or_create_resources_module(&self, course_id: &str) -> Result<Module> {
        let filter = doc! { "courseId": course_id, "title": RESOURCES_MODULE_TITLE };
        let candidate = Module::new(course_id, RESOURCES_MODULE_TITLE, RESOURCES_MODULE_ORDER);

        let upserted = self
            .modules()
            .find_one_and_update(
                filter.clone(),
                doc! {
                    "$setOnInsert": {
                        "_id": &candidate.id,
                        "order": candidate.order,
                        "createdAt": chrono_to_bson(candidate.created_at),
                    }
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await;

        match upserted {
            Ok(Some(module)) => Ok(module),
            Ok(None) => Err(anyhow!("Resources module upsert returned nothing")),
            // Two concurrent upserts: the loser sees the unique index and reads the winner.
            Err(err) if is_duplicate_key(&err) => self
                .modules()
                .find_one(filter)
                .await
                .context("Failed to re-read Resources module")?
                .ok_or_else(|| anyhow!("Resources module vanished after duplicate key")),
            Err(err) => Err(err).context("Failed to upsert Resources module"),
        }
    }

    async fn find_material(&self, material_id: &str) -> Result<Option<Material>> {
        track_db_operation("find_one", MATERIALS, async {
            self.materials()
                .find_one(doc! { "_id": material_id })
                .await
                .context("Failed to query material")
        })
        .await
    }

    async fn create_material_with_pack(
        &self,
        material: &Material,
        pack: &StudyPack,
    ) -> Result<()> {
        let mut session = self.start_transaction().await?;
        let outcome = async {
            self.materials()
                .insert_one(material)
                .session(&mut session)
                .await
                .context("Failed to insert material")?;
            self.study_packs()
                .insert_one(pack)
                .session(&mut session)
                .await
                .context("Failed to insert study pack")?;
            Ok(())
        }
        .await;
        Self::finish(&mut session, outcome).await
    }

    async fn attach_transcript(
        &self,
        material_id: &str,
        transcript: &str,
        pack: &StudyPack,
    ) -> Result<()> {
        let mut session = self.start_transaction().await?;
        let outcome = async {
            let result = self
                .materials()
                .update_one(
                    doc! { "_id": material_id },
                    doc! { "$set": { "transcriptText": transcript } },
                )
                .session(&mut session)
                .await
                .context("Failed to store transcript")?;
            if result.matched_count == 0 {
                return Err(anyhow!("material {} not found", material_id));
            }
            self.upsert_pack(&mut session, pack).await
        }
        .await;
        Self::finish(&mut session, outcome).await
    }

    async fn find_study_pack(&self, study_pack_id: &str) -> Result<Option<StudyPack>> {
        self.study_packs()
            .find_one(doc! { "_id": study_pack_id })
            .await
            .context("Failed to query study pack")
    }

    async fn latest_study_pack(&self, material_id: &str) -> Result<Option<StudyPack>> {
        self.latest_pack_matching(doc! { "materialId": material_id })
            .await
    }

    async fn latest_ready_study_pack(&self, material_id: &str) -> Result<Option<StudyPack>> {
        self.latest_pack_matching(doc! {
            "materialId": material_id,
            "status": StudyPackStatus::Ready.as_str(),
        })
        .await
    }

    async fn commit_generation(&self, commit: &GenerationCommit) -> Result<()> {
        let mut session = self.start_transaction().await?;
        let outcome = self.write_generation(&mut session, commit).await;
        Self::finish(&mut session, outcome).await
    }

    async fn record_generation_failure(&self, study_pack_id: &str, error: &str) -> Result<()> {
        self.study_packs()
            .update_one(
                doc! { "_id": study_pack_id },
                doc! { "$set": { "lastError": error } },
            )
            .await
            .context("Failed to record generation failure")?;
        Ok(())
    }

    async fn save_draft(&self, pack: &StudyPack, summary: &SummaryContent) -> Result<()> {
        let mut session = self.start_transaction().await?;
        let outcome = async {
            self.upsert_summary(&mut session, &pack.id, summary).await?;
            self.upsert_pack(&mut session, pack).await
        }
        .await;
        Self::finish(&mut session, outcome).await
    }

    async fn find_summary(&self, study_pack_id: &str) -> Result<Option<Summary>> {
        let raw = track_db_operation("find_one", SUMMARIES, async {
            self.summaries()
                .find_one(doc! { "studyPackId": study_pack_id })
                .await
                .context("Failed to query summary")
        })
        .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        match bson::from_document::<Summary>(raw) {
            Ok(summary) => Ok(Some(summary)),
            Err(err) => {
                tracing::warn!(
                    study_pack_id = %study_pack_id,
                    error = %err,
                    "Stored summary could not be decoded, treating as absent"
                );
                Ok(None)
            }
        }
    }

    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>> {
        self.quizzes()
            .find_one(doc! { "_id": quiz_id })
            .await
            .context("Failed to query quiz")
    }

    async fn list_quizzes(&self, study_pack_id: &str) -> Result<Vec<Quiz>> {
        self.quizzes()
            .find(doc! { "studyPackId": study_pack_id })
            .sort(doc! { "createdAt": 1 })
            .await
            .context("Failed to query quizzes")?
            .try_collect()
            .await
            .context("Failed to read quizzes")
    }

    async fn list_questions(&self, quiz_id: &str) -> Result<Vec<QuizQuestion>> {
        self.questions()
            .find(doc! { "quizId": quiz_id })
            .sort(doc! { "position": 1 })
            .await
            .context("Failed to query quiz questions")?
            .try_collect()
            .await
            .context("Failed to read quiz questions")
    }

    async fn list_flashcards(&self, study_pack_id: &str) -> Result<Vec<Flashcard>> {
        self.flashcards()
            .find(doc! { "studyPackId": study_pack_id })
            .sort(doc! { "position": 1 })
            .await
            .context("Failed to query flashcards")?
            .try_collect()
            .await
            .context("Failed to read flashcards")
    }

    async fn record_quiz_attempt(
        &self,
        attempt: &QuizAttempt,
        event: &ProgressEvent,
    ) -> Result<()> {
        let mut session = self.start_transaction().await?;
        let outcome = async {
            self.db
                .collection::<QuizAttempt>(QUIZ_ATTEMPTS)
                .insert_one(attempt)
                .session(&mut session)
                .await
                .context("Failed to insert quiz attempt")?;
            self.db
                .collection::<ProgressEvent>(PROGRESS_EVENTS)
                .insert_one(event)
                .session(&mut session)
                .await
                .context("Failed to insert progress event")?;
            Ok(())
        }
        .await;
        Self::finish(&mut session, outcome).await
    }

    async fn record_flashcard_session(
        &self,
        flashcard_session: &FlashcardSession,
        event: &ProgressEvent,
    ) -> Result<()> {
        let mut session = self.start_transaction().await?;
        let outcome = async {
            self.db
                .collection::<FlashcardSession>(FLASHCARD_SESSIONS)
                .insert_one(flashcard_session)
                .session(&mut session)
                .await
                .context("Failed to insert flashcard session")?;
            self.db
                .collection::<ProgressEvent>(PROGRESS_EVENTS)
                .insert_one(event)
                .session(&mut session)
                .await
                .context("Failed to insert progress event")?;
            Ok(())
        }
        .await;
        Self::finish(&mut session, outcome).await
    }

    async fn list_flashcard_sessions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<FlashcardSession>> {
        self.db
            .collection::<FlashcardSession>(FLASHCARD_SESSIONS)
            .find(doc! { "userId": user_id })
            .sort(doc! { "createdAt": -1 })
            .limit(limit)
            .await
            .context("Failed to query flashcard sessions")?
            .try_collect()
            .await
            .context("Failed to read flashcard sessions")
    }
}
