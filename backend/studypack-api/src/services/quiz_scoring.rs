use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{parse_uuid, ServiceError, ServiceResult};
use crate::metrics::{QUIZ_ATTEMPTS_TOTAL, QUIZ_SCORES};
use crate::models::progress::RecordQuizAttemptRequest;
use crate::models::{Caller, ProgressEvent, ProgressEventType, QuizAttempt, QuizQuestion};
use crate::repository::StudyRepository;

pub struct QuizScoringService {
    repo: Arc<dyn StudyRepository>,
}

impl QuizScoringService {
    pub fn new(repo: Arc<dyn StudyRepository>) -> Self {
        Self { repo }
    }

    pub async fn record_quiz_attempt(
        &self,
        caller: &Caller,
        req: RecordQuizAttemptRequest,
    ) -> ServiceResult<QuizAttempt> {
        req.validate()?;
        let quiz_id = parse_uuid(&req.quiz_id, "quizId")?;

        let quiz = self
            .repo
            .find_quiz(&quiz_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Quiz not found"))?;
        if !caller.role.is_instructor() {
            // Learners only see quizzes of published packs.
            let published = self
                .repo
                .find_study_pack(&quiz.study_pack_id)
                .await?
                .is_some_and(|pack| pack.is_visible_to_learners());
            if !published {
                return Err(ServiceError::not_found("Quiz not found"));
            }
        }
        let questions = self.repo.list_questions(&quiz.id).await?;

        let score = score_answers(&questions, &req.answers);
        let attempt = QuizAttempt {
            id: Uuid::new_v4().to_string(),
            quiz_id: quiz.id.clone(),
            user_id: caller.user_id.clone(),
            score,
            answers: req.answers,
            created_at: Utc::now(),
        };

        let course_id = resolve_course_id(self.repo.as_ref(), &quiz.study_pack_id).await;
        let payload = serde_json::to_string(&attempt.answers)
            .map_err(|e| ServiceError::Internal(e.into()))?;
        let event = ProgressEvent::new(
            &caller.user_id,
            course_id,
            ProgressEventType::QuizAttempt,
            payload,
        );

        self.repo.record_quiz_attempt(&attempt, &event).await?;

        QUIZ_ATTEMPTS_TOTAL.inc();
        QUIZ_SCORES.observe(f64::from(score));
        tracing::info!(
            quiz_id = %attempt.quiz_id,
            user_id = %attempt.user_id,
            score,
            "Quiz attempt recorded"
        );

        Ok(attempt)
    }
}

/// Percentage of questions answered exactly right, rounded to the nearest integer.
/// Unanswered questions count as wrong; a quiz without questions scores 0.
pub fn score_answers(questions: &[QuizQuestion], answers: &BTreeMap<String, String>) -> i32 {
    if questions.is_empty() {
        return 0;
    }

    let correct = questions
        .iter()
        .filter(|q| {
            answers
                .get(&q.id)
                .is_some_and(|submitted| q.answer_key.matches(submitted))
        })
        .count();

    ((correct as f64 / questions.len() as f64) * 100.0).round() as i32
}

/// Course of the pack's material via its module. `None` when any link is missing;
/// lookups errors are logged and treated the same way.
pub(crate) async fn resolve_course_id(
    repo: &dyn StudyRepository,
    study_pack_id: &str,
) -> Option<String> {
    let lookup = async {
        let Some(pack) = repo.find_study_pack(study_pack_id).await? else {
            return Ok(None);
        };
        let Some(material) = repo.find_material(&pack.material_id).await? else {
            return Ok(None);
        };
        let module = repo.find_module(&material.module_id).await?;
        Ok::<_, anyhow::Error>(module.map(|m| m.course_id))
    };

    match lookup.await {
        Ok(course_id) => course_id,
        Err(err) => {
            tracing::warn!(
                study_pack_id = %study_pack_id,
                error = %err,
                "Failed to resolve course for progress event"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerKey, QuestionType};

    fn question(id: &str, stored_key: &str) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            quiz_id: "quiz".to_string(),
            position: 0,
            question_type: QuestionType::Mcq,
            prompt: "?".to_string(),
            options: vec![],
            answer_key: AnswerKey::decode(stored_key),
            explanation: None,
        }
    }

    fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn two_of_three_rounds_to_67() {
        let questions = vec![
            question("q1", "\"A\""),
            question("q2", "\"B\""),
            question("q3", "\"C\""),
        ];
        let submitted = answers(&[("q1", "A"), ("q2", "B"), ("q3", "x")]);
        assert_eq!(score_answers(&questions, &submitted), 67);
    }

    #[test]
    fn bare_and_quoted_keys_both_score() {
        let questions = vec![question("q1", "Paris"), question("q2", "\"Rome\"")];
        let submitted = answers(&[("q1", "Paris"), ("q2", "Rome")]);
        assert_eq!(score_answers(&questions, &submitted), 100);
    }

    #[test]
    fn comparison_is_exact_and_case_sensitive() {
        let questions = vec![question("q1", "\"Paris\"")];
        assert_eq!(score_answers(&questions, &answers(&[("q1", "paris")])), 0);
        assert_eq!(score_answers(&questions, &answers(&[("q1", "Paris ")])), 0);
    }

    #[test]
    fn unanswered_and_unknown_ids_count_as_wrong() {
        let questions = vec![question("q1", "\"A\""), question("q2", "\"B\"")];
        let submitted = answers(&[("q1", "A"), ("other", "B")]);
        assert_eq!(score_answers(&questions, &submitted), 50);
    }

    #[test]
    fn empty_quiz_scores_zero() {
        assert_eq!(score_answers(&[], &answers(&[("q1", "A")])), 0);
    }
}
