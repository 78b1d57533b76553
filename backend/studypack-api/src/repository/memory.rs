use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{GenerationCommit, StudyRepository};
use crate::models::material::{RESOURCES_MODULE_ORDER, RESOURCES_MODULE_TITLE};
use crate::models::{
    Flashcard, FlashcardSession, Material, Module, ProgressEvent, Quiz, QuizAttempt,
    QuizQuestion, StudyPack, StudyPackStatus, Summary, SummaryContent,
};

#[derive(Default)]
struct Store {
    modules: HashMap<String, Module>,
    materials: HashMap<String, Material>,
    /// Insertion order, so equal `createdAt` values resolve to the later insert.
    study_packs: Vec<StudyPack>,
    summaries: HashMap<String, Summary>,
    quizzes: Vec<Quiz>,
    questions: Vec<QuizQuestion>,
    flashcards: Vec<Flashcard>,
    quiz_attempts: Vec<QuizAttempt>,
    flashcard_sessions: Vec<FlashcardSession>,
    progress_events: Vec<ProgressEvent>,
}

impl Store {
    fn pack_mut(&mut self, study_pack_id: &str) -> Option<&mut StudyPack> {
        self.study_packs.iter_mut().find(|p| p.id == study_pack_id)
    }

    fn upsert_pack(&mut self, pack: &StudyPack) {
        match self.pack_mut(&pack.id) {
            Some(existing) => *existing = pack.clone(),
            None => self.study_packs.push(pack.clone()),
        }
    }

    fn upsert_summary(&mut self, study_pack_id: &str, content: &SummaryContent) {
        match self.summaries.get_mut(study_pack_id) {
            Some(existing) => {
                existing.content = content.clone();
                existing.updated_at = Utc::now();
            }
            None => {
                self.summaries.insert(
                    study_pack_id.to_string(),
                    Summary::new(study_pack_id, content.clone()),
                );
            }
        }
    }

    fn latest_pack_where(
        &self,
        material_id: &str,
        predicate: impl Fn(&StudyPack) -> bool,
    ) -> Option<StudyPack> {
        self.study_packs
            .iter()
            .filter(|p| p.material_id == material_id && predicate(p))
            .max_by_key(|p| p.created_at)
            .cloned()
    }
}

/// Process-local repository used by tests and single-node development runs.
/// A single write lock makes every multi-record write atomic.
#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_module(&self, module: Module) {
        self.store
            .write()
            .await
            .modules
            .insert(module.id.clone(), module);
    }

    pub async fn insert_quiz(&self, quiz: Quiz, questions: Vec<QuizQuestion>) {
        let mut store = self.store.write().await;
        store.quizzes.push(quiz);
        store.questions.extend(questions);
    }

    pub async fn quiz_attempts(&self) -> Vec<QuizAttempt> {
        self.store.read().await.quiz_attempts.clone()
    }

    pub async fn progress_events(&self) -> Vec<ProgressEvent> {
        self.store.read().await.progress_events.clone()
    }

    pub async fn modules_for_course(&self, course_id: &str) -> Vec<Module> {
        self.store
            .read()
            .await
            .modules
            .values()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StudyRepository for InMemoryRepository {
    async fn find_module(&self, module_id: &str) -> Result<Option<Module>> {
        Ok(self.store.read().await.modules.get(module_id).cloned())
    }

    async fn find_or_create_resources_module(&self, course_id: &str) -> Result<Module> {
        let mut store = self.store.write().await;
        if let Some(existing) = store
            .modules
            .values()
            .find(|m| m.course_id == course_id && m.title == RESOURCES_MODULE_TITLE)
        {
            return Ok(existing.clone());
        }

        let module = Module::new(course_id, RESOURCES_MODULE_TITLE, RESOURCES_MODULE_ORDER);
        store.modules.insert(module.id.clone(), module.clone());
        Ok(module)
    }

    async fn find_material(&self, material_id: &str) -> Result<Option<Material>> {
        Ok(self.store.read().await.materials.get(material_id).cloned())
    }

    async fn create_material_with_pack(
        &self,
        material: &Material,
        pack: &StudyPack,
    ) -> Result<()> {
        let mut store = self.store.write().await;
        store
            .materials
            .insert(material.id.clone(), material.clone());
        store.study_packs.push(pack.clone());
        Ok(())
    }

    async fn attach_transcript(
        &self,
        material_id: &str,
        transcript: &str,
        pack: &StudyPack,
    ) -> Result<()> {
        let mut store = self.store.write().await;
        let Some(material) = store.materials.get_mut(material_id) else {
            bail!("material {} not found", material_id);
        };
        material.transcript_text = Some(transcript.to_string());
        store.upsert_pack(pack);
        Ok(())
    }

    async fn find_study_pack(&self, study_pack_id: &str) -> Result<Option<StudyPack>> {
        Ok(self
            .store
            .read()
            .await
            .study_packs
            .iter()
            .find(|p| p.id == study_pack_id)
            .cloned())
    }

    async fn latest_study_pack(&self, material_id: &str) -> Result<Option<StudyPack>> {
        Ok(self.store.read().await.latest_pack_where(material_id, |_| true))
    }

    async fn latest_ready_study_pack(&self, material_id: &str) -> Result<Option<StudyPack>> {
        Ok(self
            .store
            .read()
            .await
            .latest_pack_where(material_id, StudyPack::is_visible_to_learners))
    }

    async fn commit_generation(&self, commit: &GenerationCommit) -> Result<()> {
        let mut store = self.store.write().await;
        let pack_id = commit.study_pack.id.as_str();

        match store.pack_mut(pack_id) {
            Some(stored) if stored.status == StudyPackStatus::Processing => {}
            Some(stored) => bail!(
                "study pack {} is {} and no longer accepts generated content",
                pack_id,
                stored.status
            ),
            None => bail!("study pack {} not found", pack_id),
        }

        store.upsert_summary(pack_id, &commit.summary);
        store.quizzes.push(commit.quiz.clone());
        store.questions.extend(commit.questions.iter().cloned());
        store.flashcards.extend(commit.flashcards.iter().cloned());
        store.upsert_pack(&commit.study_pack);
        Ok(())
    }

    async fn record_generation_failure(&self, study_pack_id: &str, error: &str) -> Result<()> {
        let mut store = self.store.write().await;
        if let Some(pack) = store.pack_mut(study_pack_id) {
            pack.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn save_draft(&self, pack: &StudyPack, summary: &SummaryContent) -> Result<()> {
        let mut store = self.store.write().await;
        store.upsert_summary(&pack.id, summary);
        store.upsert_pack(pack);
        Ok(())
    }

    async fn find_summary(&self, study_pack_id: &str) -> Result<Option<Summary>> {
        Ok(self.store.read().await.summaries.get(study_pack_id).cloned())
    }

    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>> {
        Ok(self
            .store
            .read()
            .await
            .quizzes
            .iter()
            .find(|q| q.id == quiz_id)
            .cloned())
    }

    async fn list_quizzes(&self, study_pack_id: &str) -> Result<Vec<Quiz>> {
        Ok(self
            .store
            .read()
            .await
            .quizzes
            .iter()
            .filter(|q| q.study_pack_id == study_pack_id)
            .cloned()
            .collect())
    }

    async fn list_questions(&self, quiz_id: &str) -> Result<Vec<QuizQuestion>> {
        let mut questions: Vec<QuizQuestion> = self
            .store
            .read()
            .await
            .questions
            .iter()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.position);
        Ok(questions)
    }

    async fn list_flashcards(&self, study_pack_id: &str) -> Result<Vec<Flashcard>> {
        let mut cards: Vec<Flashcard> = self
            .store
            .read()
            .await
            .flashcards
            .iter()
            .filter(|c| c.study_pack_id == study_pack_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| c.position);
        Ok(cards)
    }

    async fn record_quiz_attempt(
        &self,
        attempt: &QuizAttempt,
        event: &ProgressEvent,
    ) -> Result<()> {
        let mut store = self.store.write().await;
        store.quiz_attempts.push(attempt.clone());
        store.progress_events.push(event.clone());
        Ok(())
    }

    async fn record_flashcard_session(
        &self,
        session: &FlashcardSession,
        event: &ProgressEvent,
    ) -> Result<()> {
        let mut store = self.store.write().await;
        store.flashcard_sessions.push(session.clone());
        store.progress_events.push(event.clone());
        Ok(())
    }

    async fn list_flashcard_sessions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<FlashcardSession>> {
        let mut sessions: Vec<FlashcardSession> = self
            .store
            .read()
            .await
            .flashcard_sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(sessions)
    }
}
