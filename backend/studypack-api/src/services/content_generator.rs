use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::generation_queue::{GenerationJob, GenerationSource};
use super::material_lock::MaterialLocks;
use crate::metrics::{GENERATION_DURATION_SECONDS, GENERATION_JOBS_TOTAL};
use crate::models::{
    AnswerKey, Flashcard, QuestionType, Quiz, QuizMetadata, QuizQuestion, StudyPackStatus,
    SummaryContent,
};
use crate::repository::{GenerationCommit, StudyRepository};

const MAX_SUMMARY_SENTENCES: usize = 3;
const MAX_SUMMARY_CHARS: usize = 480;
const FALLBACK_SUMMARY: &str = "This is a generated summary of the material.";

#[derive(Debug, Clone)]
pub struct GeneratedQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer_key: AnswerKey,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratedFlashcard {
    pub front: String,
    pub back: String,
}

/// Everything a summarizer produces for one study pack.
#[derive(Debug, Clone)]
pub struct GeneratedStudyContent {
    pub summary: SummaryContent,
    pub questions: Vec<GeneratedQuestion>,
    pub flashcards: Vec<GeneratedFlashcard>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, source: &GenerationSource) -> Result<GeneratedStudyContent>;
}

/// Deterministic summarizer: the leading sentences of the transcript plus a
/// fixed set of key points, one question and one flashcard.
#[derive(Debug, Clone, Default)]
pub struct TemplateSummarizer;

impl TemplateSummarizer {
    fn summary_text(source: &GenerationSource) -> String {
        match source {
            GenerationSource::Transcript(text) => {
                let lead = lead_sentences(text, MAX_SUMMARY_SENTENCES, MAX_SUMMARY_CHARS);
                if lead.is_empty() {
                    FALLBACK_SUMMARY.to_string()
                } else {
                    lead
                }
            }
            // Text extraction from uploaded files is not wired in yet.
            GenerationSource::Document { title, .. } => {
                format!("This is a generated summary of \"{}\".", title.trim())
            }
        }
    }
}

#[async_trait]
impl Summarizer for TemplateSummarizer {
    async fn summarize(&self, source: &GenerationSource) -> Result<GeneratedStudyContent> {
        let summary = SummaryContent::new(
            Self::summary_text(source),
            vec![
                "Key Concept 1: Foundation".to_string(),
                "Key Concept 2: Implementation".to_string(),
                "Key Concept 3: Verification".to_string(),
            ],
        );

        let question = GeneratedQuestion {
            prompt: "What is the primary purpose of this topic?".to_string(),
            options: vec![
                "To confuse students".to_string(),
                "To solve a specific problem".to_string(),
                "To waste time".to_string(),
                "None of the above".to_string(),
            ],
            answer_key: AnswerKey::new("To solve a specific problem"),
            explanation: Some("Every educational topic aims to solve problems.".to_string()),
        };

        let flashcard = GeneratedFlashcard {
            front: "Define 'Abstraction'".to_string(),
            back: "Hiding complex reality while exposing only necessary parts.".to_string(),
        };

        Ok(GeneratedStudyContent {
            summary,
            questions: vec![question],
            flashcards: vec![flashcard],
        })
    }
}

/// Up to `max_sentences` leading sentences, cut at a word boundary once
/// `max_chars` is exceeded. Whitespace is collapsed.
fn lead_sentences(text: &str, max_sentences: usize, max_chars: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::new();
    let mut sentences = 0;

    for ch in normalized.chars() {
        out.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            sentences += 1;
            if sentences >= max_sentences {
                break;
            }
        }
    }

    if out.chars().count() > max_chars {
        let cut: String = out.chars().take(max_chars).collect();
        let cut = match cut.rfind(' ') {
            Some(idx) => &cut[..idx],
            None => cut.as_str(),
        };
        return format!("{}...", cut.trim_end());
    }

    out.trim().to_string()
}

/// Result of one generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Committed(StudyPackStatus),
    /// Pack vanished or is no longer `PROCESSING`.
    Skipped,
    Failed(String),
}

impl GenerationOutcome {
    fn label(&self) -> &'static str {
        match self {
            GenerationOutcome::Committed(_) => "committed",
            GenerationOutcome::Skipped => "skipped",
            GenerationOutcome::Failed(_) => "failed",
        }
    }
}

/// Runs generation jobs: lock the material, summarize, commit everything at once.
pub struct ContentGenerator {
    repo: Arc<dyn StudyRepository>,
    locks: Arc<dyn MaterialLocks>,
    summarizer: Arc<dyn Summarizer>,
    timeout: Duration,
}

impl ContentGenerator {
    pub fn new(
        repo: Arc<dyn StudyRepository>,
        locks: Arc<dyn MaterialLocks>,
        summarizer: Arc<dyn Summarizer>,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            locks,
            summarizer,
            timeout,
        }
    }

    pub async fn process(&self, job: &GenerationJob) -> GenerationOutcome {
        let start = Instant::now();

        let outcome = match self.locks.acquire(&job.material_id).await {
            Ok(guard) => {
                let result = self.generate(job).await;
                self.locks.release(guard).await;
                match result {
                    Ok(Some(status)) => GenerationOutcome::Committed(status),
                    Ok(None) => GenerationOutcome::Skipped,
                    Err(err) => GenerationOutcome::Failed(format!("{:#}", err)),
                }
            }
            Err(err) => GenerationOutcome::Failed(format!("{:#}", err)),
        };

        GENERATION_JOBS_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();
        GENERATION_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

        match &outcome {
            GenerationOutcome::Committed(status) => tracing::info!(
                study_pack_id = %job.study_pack_id,
                status = %status,
                "Study pack generated"
            ),
            GenerationOutcome::Skipped => tracing::info!(
                study_pack_id = %job.study_pack_id,
                "Study pack no longer processing, generation skipped"
            ),
            GenerationOutcome::Failed(message) => {
                tracing::error!(
                    study_pack_id = %job.study_pack_id,
                    error = %message,
                    "Study pack generation failed"
                );
                if let Err(e) = self
                    .repo
                    .record_generation_failure(&job.study_pack_id, message)
                    .await
                {
                    tracing::error!(
                        study_pack_id = %job.study_pack_id,
                        error = %e,
                        "Failed to record generation failure"
                    );
                }
            }
        }

        outcome
    }

    async fn generate(&self, job: &GenerationJob) -> Result<Option<StudyPackStatus>> {
        let Some(mut pack) = self.repo.find_study_pack(&job.study_pack_id).await? else {
            return Ok(None);
        };
        if pack.status != StudyPackStatus::Processing {
            return Ok(None);
        }

        let content = tokio::time::timeout(self.timeout, self.summarizer.summarize(&job.source))
            .await
            .map_err(|_| anyhow!("generation timed out after {}s", self.timeout.as_secs()))??;

        let quiz = Quiz::new(&pack.id, QuizMetadata::default());
        let questions = content
            .questions
            .into_iter()
            .enumerate()
            .map(|(idx, q)| QuizQuestion {
                id: Uuid::new_v4().to_string(),
                quiz_id: quiz.id.clone(),
                position: idx as i32 + 1,
                question_type: QuestionType::Mcq,
                prompt: q.prompt,
                options: q.options,
                answer_key: q.answer_key,
                explanation: q.explanation,
            })
            .collect();
        let flashcards = content
            .flashcards
            .into_iter()
            .enumerate()
            .map(|(idx, card)| Flashcard {
                id: Uuid::new_v4().to_string(),
                study_pack_id: pack.id.clone(),
                position: idx as i32 + 1,
                front: card.front,
                back: card.back,
            })
            .collect();

        let next = if pack.requires_approval {
            StudyPackStatus::Generated
        } else {
            StudyPackStatus::Ready
        };
        debug_assert!(pack.status.can_advance_to(next));
        pack.status = next;
        pack.published_at = (next == StudyPackStatus::Ready).then(Utc::now);
        pack.last_error = None;

        self.repo
            .commit_generation(&GenerationCommit {
                study_pack: pack,
                summary: content.summary,
                quiz,
                questions,
                flashcards,
            })
            .await?;

        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Material, StudyPack};
    use crate::repository::InMemoryRepository;
    use crate::services::material_lock::LocalMaterialLocks;

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _source: &GenerationSource) -> Result<GeneratedStudyContent> {
            Err(anyhow!("model unavailable"))
        }
    }

    struct SlowSummarizer;

    #[async_trait]
    impl Summarizer for SlowSummarizer {
        async fn summarize(&self, source: &GenerationSource) -> Result<GeneratedStudyContent> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            TemplateSummarizer.summarize(source).await
        }
    }

    async fn setup(
        status: StudyPackStatus,
        requires_approval: bool,
    ) -> (Arc<InMemoryRepository>, GenerationJob) {
        let repo = Arc::new(InMemoryRepository::new());
        let material = Material::video("module-1", "https://youtu.be/dQw4w9WgXcQ", None);
        let pack = StudyPack::new(&material.id, "teacher-1", status, requires_approval);
        repo.create_material_with_pack(&material, &pack)
            .await
            .unwrap();
        let job = GenerationJob {
            study_pack_id: pack.id.clone(),
            material_id: material.id.clone(),
            source: GenerationSource::Transcript(
                "Photosynthesis converts light into chemical energy. It happens in chloroplasts."
                    .to_string(),
            ),
        };
        (repo, job)
    }

    fn generator(repo: Arc<InMemoryRepository>, summarizer: Arc<dyn Summarizer>) -> ContentGenerator {
        ContentGenerator::new(
            repo,
            Arc::new(LocalMaterialLocks::new()),
            summarizer,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn publishes_immediately_without_approval() {
        let (repo, job) = setup(StudyPackStatus::Processing, false).await;
        let outcome = generator(repo.clone(), Arc::new(TemplateSummarizer))
            .process(&job)
            .await;

        assert_eq!(outcome, GenerationOutcome::Committed(StudyPackStatus::Ready));
        let pack = repo.find_study_pack(&job.study_pack_id).await.unwrap().unwrap();
        assert_eq!(pack.status, StudyPackStatus::Ready);
        assert!(pack.published_at.is_some());

        let summary = repo.find_summary(&pack.id).await.unwrap().unwrap();
        assert!(summary.content.summary_text().starts_with("Photosynthesis"));
        assert_eq!(summary.content.bullets().len(), 3);

        let quizzes = repo.list_quizzes(&pack.id).await.unwrap();
        assert_eq!(quizzes.len(), 1);
        let questions = repo.list_questions(&quizzes[0].id).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].answer_key.as_str(), "To solve a specific problem");
        assert_eq!(repo.list_flashcards(&pack.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn holds_draft_when_approval_required() {
        let (repo, job) = setup(StudyPackStatus::Processing, true).await;
        let outcome = generator(repo.clone(), Arc::new(TemplateSummarizer))
            .process(&job)
            .await;

        assert_eq!(
            outcome,
            GenerationOutcome::Committed(StudyPackStatus::Generated)
        );
        let pack = repo.find_study_pack(&job.study_pack_id).await.unwrap().unwrap();
        assert_eq!(pack.status, StudyPackStatus::Generated);
        assert!(pack.published_at.is_none());
    }

    #[tokio::test]
    async fn failure_is_recorded_and_status_kept() {
        let (repo, job) = setup(StudyPackStatus::Processing, false).await;
        let outcome = generator(repo.clone(), Arc::new(FailingSummarizer))
            .process(&job)
            .await;

        assert!(matches!(outcome, GenerationOutcome::Failed(_)));
        let pack = repo.find_study_pack(&job.study_pack_id).await.unwrap().unwrap();
        assert_eq!(pack.status, StudyPackStatus::Processing);
        assert_eq!(pack.last_error.as_deref(), Some("model unavailable"));
        assert!(repo.find_summary(&pack.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timeout_commits_nothing() {
        let (repo, job) = setup(StudyPackStatus::Processing, false).await;
        let outcome = generator(repo.clone(), Arc::new(SlowSummarizer))
            .process(&job)
            .await;

        assert!(matches!(outcome, GenerationOutcome::Failed(ref m) if m.contains("timed out")));
        let pack = repo.find_study_pack(&job.study_pack_id).await.unwrap().unwrap();
        assert_eq!(pack.status, StudyPackStatus::Processing);
        assert!(repo.list_quizzes(&pack.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skips_packs_that_left_processing() {
        let (repo, job) = setup(StudyPackStatus::Ready, false).await;
        let outcome = generator(repo.clone(), Arc::new(TemplateSummarizer))
            .process(&job)
            .await;

        assert_eq!(outcome, GenerationOutcome::Skipped);
        assert!(repo.find_summary(&job.study_pack_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn document_summary_names_the_title() {
        let content = TemplateSummarizer
            .summarize(&GenerationSource::Document {
                file_url: "https://cdn.example.com/notes.pdf".to_string(),
                title: "Week 3 Notes".to_string(),
            })
            .await
            .unwrap();
        assert!(content.summary.summary_text().contains("Week 3 Notes"));
    }

    #[test]
    fn lead_sentences_stops_after_limit() {
        let text = "One.  Two!\nThree? Four. Five.";
        assert_eq!(lead_sentences(text, 3, 480), "One. Two! Three?");
        assert_eq!(lead_sentences("   ", 3, 480), "");
        assert_eq!(lead_sentences("no terminator here", 3, 480), "no terminator here");
    }

    #[test]
    fn lead_sentences_truncates_long_text() {
        let text = "word ".repeat(200);
        let lead = lead_sentences(&text, 3, 40);
        assert!(lead.ends_with("..."));
        assert!(lead.chars().count() <= 43);
    }
}
