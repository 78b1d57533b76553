//! Record store for materials, study packs and everything derived from them.
//!
//! Every method that touches more than one record is all-or-nothing: either all
//! writes become visible or none do.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Flashcard, FlashcardSession, Material, Module, ProgressEvent, Quiz, QuizAttempt,
    QuizQuestion, StudyPack, Summary, SummaryContent,
};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryRepository;
pub use mongo::MongoRepository;

/// Output of one generation run, committed as a unit.
#[derive(Debug, Clone)]
pub struct GenerationCommit {
    /// Pack with its final status already applied. Only written if the stored
    /// pack is still `PROCESSING`.
    pub study_pack: StudyPack,
    pub summary: SummaryContent,
    pub quiz: Quiz,
    pub questions: Vec<QuizQuestion>,
    pub flashcards: Vec<Flashcard>,
}

#[async_trait]
pub trait StudyRepository: Send + Sync {
    async fn find_module(&self, module_id: &str) -> Result<Option<Module>>;

    /// Returns the course's "Resources" module, creating it if needed. Safe under
    /// concurrent callers: exactly one module exists per course afterwards.
    async fn find_or_create_resources_module(&self, course_id: &str) -> Result<Module>;

    async fn find_material(&self, material_id: &str) -> Result<Option<Material>>;

    async fn create_material_with_pack(&self, material: &Material, pack: &StudyPack)
        -> Result<()>;

    /// Stores the transcript and replaces the pack in one write.
    async fn attach_transcript(
        &self,
        material_id: &str,
        transcript: &str,
        pack: &StudyPack,
    ) -> Result<()>;

    async fn find_study_pack(&self, study_pack_id: &str) -> Result<Option<StudyPack>>;

    /// Pack with the greatest `createdAt` for the material.
    async fn latest_study_pack(&self, material_id: &str) -> Result<Option<StudyPack>>;

    /// Latest pack that is `READY`.
    async fn latest_ready_study_pack(&self, material_id: &str) -> Result<Option<StudyPack>>;

    /// Writes content and status of a finished generation. Fails without writing
    /// anything if the stored pack left `PROCESSING` in the meantime.
    async fn commit_generation(&self, commit: &GenerationCommit) -> Result<()>;

    async fn record_generation_failure(&self, study_pack_id: &str, error: &str) -> Result<()>;

    /// Upserts the pack and its summary together (approve, regenerate).
    async fn save_draft(&self, pack: &StudyPack, summary: &SummaryContent) -> Result<()>;

    /// `None` when missing or when the stored content cannot be decoded.
    async fn find_summary(&self, study_pack_id: &str) -> Result<Option<Summary>>;

    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>>;

    async fn list_quizzes(&self, study_pack_id: &str) -> Result<Vec<Quiz>>;

    /// Questions ordered by position.
    async fn list_questions(&self, quiz_id: &str) -> Result<Vec<QuizQuestion>>;

    /// Flashcards ordered by position.
    async fn list_flashcards(&self, study_pack_id: &str) -> Result<Vec<Flashcard>>;

    async fn record_quiz_attempt(&self, attempt: &QuizAttempt, event: &ProgressEvent)
        -> Result<()>;

    async fn record_flashcard_session(
        &self,
        session: &FlashcardSession,
        event: &ProgressEvent,
    ) -> Result<()>;

    /// The user's sessions, newest first, at most `limit`.
    async fn list_flashcard_sessions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<FlashcardSession>>;
}
