use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::quiz_scoring::resolve_course_id;
use crate::error::{parse_uuid, ServiceError, ServiceResult};
use crate::metrics::FLASHCARD_SESSIONS_TOTAL;
use crate::models::material::MaterialResponse;
use crate::models::progress::FlashcardSessionRequest;
use crate::models::study_pack::{FlashcardView, QuestionView, QuizView, StudyPackView, SummaryView};
use crate::models::{
    Caller, Flashcard, FlashcardSession, ProgressEvent, ProgressEventType, StudyPack,
    SummaryContent,
};
use crate::repository::StudyRepository;

const KNOWN: &str = "known";
const SESSION_HISTORY_LIMIT: i64 = 20;

/// Learner-facing reads of published study packs plus flashcard practice.
pub struct StudyPackService {
    repo: Arc<dyn StudyRepository>,
}

impl StudyPackService {
    pub fn new(repo: Arc<dyn StudyRepository>) -> Self {
        Self { repo }
    }

    /// Instructors get the latest pack in any state; learners only the latest
    /// published one. Answer keys and explanations are withheld from learners.
    pub async fn get_study_pack(
        &self,
        caller: &Caller,
        material_id: &str,
    ) -> ServiceResult<StudyPackView> {
        let material_id = parse_uuid(material_id, "materialId")?;
        let instructor = caller.role.is_instructor();

        let material = self
            .repo
            .find_material(&material_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Material not found"))?;

        let pack = if instructor {
            self.repo.latest_study_pack(&material_id).await?
        } else {
            self.repo.latest_ready_study_pack(&material_id).await?
        }
        .ok_or_else(|| ServiceError::not_found("Study pack not found"))?;

        let summary = self.repo.find_summary(&pack.id).await?.map(|s| {
            let (summary_text, key_points) = SummaryContent::display_parts(Some(&s.content));
            SummaryView {
                summary_text,
                key_points,
            }
        });

        let mut quizzes = Vec::new();
        for quiz in self.repo.list_quizzes(&pack.id).await? {
            let questions = self
                .repo
                .list_questions(&quiz.id)
                .await?
                .into_iter()
                .map(|q| QuestionView {
                    id: q.id,
                    question_type: q.question_type,
                    prompt: q.prompt,
                    options: q.options,
                    answer_key: instructor.then(|| q.answer_key.as_str().to_string()),
                    explanation: if instructor { q.explanation } else { None },
                })
                .collect();
            quizzes.push(QuizView {
                id: quiz.id,
                version: quiz.version,
                metadata: quiz.metadata,
                questions,
            });
        }

        let flashcards = self
            .repo
            .list_flashcards(&pack.id)
            .await?
            .into_iter()
            .map(flashcard_view)
            .collect();

        Ok(StudyPackView {
            id: pack.id,
            material_id: pack.material_id,
            status: pack.status,
            requires_approval: pack.requires_approval,
            published_at: pack.published_at,
            summary,
            quizzes,
            flashcards,
            material: MaterialResponse::from(material),
        })
    }

    pub async fn list_flashcards(
        &self,
        caller: &Caller,
        study_pack_id: &str,
    ) -> ServiceResult<Vec<FlashcardView>> {
        let study_pack_id = parse_uuid(study_pack_id, "studyPackId")?;
        let pack = self.visible_pack(caller, &study_pack_id).await?;

        Ok(self
            .repo
            .list_flashcards(&pack.id)
            .await?
            .into_iter()
            .map(flashcard_view)
            .collect())
    }

    pub async fn record_flashcard_session(
        &self,
        caller: &Caller,
        req: FlashcardSessionRequest,
    ) -> ServiceResult<FlashcardSession> {
        req.validate()?;
        let study_pack_id = parse_uuid(&req.study_pack_id, "studyPackId")?;
        let pack = self.visible_pack(caller, &study_pack_id).await?;

        let known_count = req.responses.values().filter(|r| *r == KNOWN).count() as i32;
        let unknown_count = req.responses.len() as i32 - known_count;

        let session = FlashcardSession {
            id: Uuid::new_v4().to_string(),
            study_pack_id: pack.id.clone(),
            user_id: caller.user_id.clone(),
            known_count,
            unknown_count,
            duration_sec: req.duration_sec,
            created_at: Utc::now(),
        };

        let course_id = resolve_course_id(self.repo.as_ref(), &pack.id).await;
        let payload = serde_json::to_string(&req.responses)
            .map_err(|e| ServiceError::Internal(e.into()))?;
        let event = ProgressEvent::new(
            &caller.user_id,
            course_id,
            ProgressEventType::FlashcardSession,
            payload,
        );

        self.repo.record_flashcard_session(&session, &event).await?;

        FLASHCARD_SESSIONS_TOTAL.inc();
        tracing::info!(
            study_pack_id = %session.study_pack_id,
            user_id = %session.user_id,
            known = known_count,
            unknown = unknown_count,
            "Flashcard session recorded"
        );

        Ok(session)
    }

    /// The caller's most recent flashcard sessions, newest first.
    pub async fn list_flashcard_sessions(
        &self,
        caller: &Caller,
    ) -> ServiceResult<Vec<FlashcardSession>> {
        Ok(self
            .repo
            .list_flashcard_sessions(&caller.user_id, SESSION_HISTORY_LIMIT)
            .await?)
    }

    /// Packs awaiting approval do not exist as far as learners are concerned.
    async fn visible_pack(&self, caller: &Caller, study_pack_id: &str) -> ServiceResult<StudyPack> {
        self.repo
            .find_study_pack(study_pack_id)
            .await?
            .filter(|pack| caller.role.is_instructor() || pack.is_visible_to_learners())
            .ok_or_else(|| ServiceError::not_found("Study pack not found"))
    }
}

fn flashcard_view(card: Flashcard) -> FlashcardView {
    FlashcardView {
        id: card.id,
        front: card.front,
        back: card.back,
    }
}
