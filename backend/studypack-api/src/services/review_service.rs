use std::sync::Arc;

use super::material_lock::MaterialLocks;
use crate::error::{parse_uuid, ServiceError, ServiceResult};
use crate::metrics::REVIEW_ACTIONS_TOTAL;
use crate::models::study_pack::{ApproveStudyPackRequest, RegenerateStudyPackRequest, ReviewDraft};
use crate::models::{Caller, Material, StudyPack, StudyPackStatus, SummaryContent};
use crate::repository::StudyRepository;

pub const APPROVED_MESSAGE: &str = "Study pack approved and published";
pub const REGENERATED_MESSAGE: &str = "AI draft regenerated";

const REGENERATED_SUMMARY: &str = "This regenerated draft condenses the lecture into actionable \
concepts, emphasizing practical understanding and review checkpoints.";

const REGENERATED_KEY_POINTS: [&str; 4] = [
    "00:45 - Problem framing and learning objective",
    "03:10 - Core concept explained with real-world example",
    "06:25 - Common mistakes and how to avoid them",
    "09:40 - Practical takeaway and next step",
];

const BULLET_MARKERS: [&str; 3] = ["- ", "• ", "* "];

/// Instructor gate between generation and publication.
pub struct ReviewService {
    repo: Arc<dyn StudyRepository>,
    locks: Arc<dyn MaterialLocks>,
}

impl ReviewService {
    pub fn new(repo: Arc<dyn StudyRepository>, locks: Arc<dyn MaterialLocks>) -> Self {
        Self { repo, locks }
    }

    pub async fn get_review_draft(
        &self,
        caller: &Caller,
        material_id: &str,
    ) -> ServiceResult<ReviewDraft> {
        require_instructor(caller)?;
        let material_id = parse_uuid(material_id, "materialId")?;

        let pack = self
            .repo
            .latest_study_pack(&material_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Study pack not found"))?;
        let material = self.repo.find_material(&material_id).await?;

        self.build_draft(&material_id, material.as_ref(), pack).await
    }

    pub async fn approve_study_pack(
        &self,
        caller: &Caller,
        material_id: &str,
        req: ApproveStudyPackRequest,
    ) -> ServiceResult<ReviewDraft> {
        require_instructor(caller)?;
        let material_id = parse_uuid(material_id, "materialId")?;

        let summary = req.summary.trim();
        if summary.is_empty() {
            return Err(ServiceError::invalid("summary is required"));
        }
        let key_points = resolve_key_points(&req.key_points, req.key_points_text.as_deref());
        if key_points.is_empty() {
            return Err(ServiceError::invalid("at least one key point is required"));
        }
        let content = SummaryContent::new(summary, key_points);

        let guard = self.locks.acquire(&material_id).await?;
        let result = self.publish(caller, &material_id, &content).await;
        self.locks.release(guard).await;
        let pack = result?;

        REVIEW_ACTIONS_TOTAL.with_label_values(&["approve"]).inc();
        tracing::info!(
            material_id = %material_id,
            study_pack_id = %pack.id,
            approved_by = %caller.user_id,
            "Study pack approved"
        );

        let material = self.repo.find_material(&material_id).await?;
        self.build_draft(&material_id, material.as_ref(), pack).await
    }

    pub async fn regenerate_study_pack(
        &self,
        caller: &Caller,
        material_id: &str,
        req: RegenerateStudyPackRequest,
    ) -> ServiceResult<ReviewDraft> {
        require_instructor(caller)?;
        let material_id = parse_uuid(material_id, "materialId")?;

        let guard = self.locks.acquire(&material_id).await?;
        let result = self
            .write_regenerated_draft(caller, &material_id, req.notes.as_deref())
            .await;
        self.locks.release(guard).await;
        let (material, pack) = result?;

        REVIEW_ACTIONS_TOTAL.with_label_values(&["regenerate"]).inc();
        tracing::info!(
            material_id = %material_id,
            study_pack_id = %pack.id,
            "Study pack draft regenerated"
        );

        self.build_draft(&material_id, Some(&material), pack).await
    }

    async fn publish(
        &self,
        caller: &Caller,
        material_id: &str,
        content: &SummaryContent,
    ) -> ServiceResult<StudyPack> {
        let mut pack = self
            .repo
            .latest_study_pack(material_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Study pack not found"))?;

        pack.status = StudyPackStatus::Ready;
        pack.published_at = Some(chrono::Utc::now());
        pack.requires_approval = false;
        pack.approved_by = Some(caller.user_id.clone());
        self.repo.save_draft(&pack, content).await?;
        Ok(pack)
    }

    async fn write_regenerated_draft(
        &self,
        caller: &Caller,
        material_id: &str,
        notes: Option<&str>,
    ) -> ServiceResult<(Material, StudyPack)> {
        let material = self
            .repo
            .find_material(material_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Material not found"))?;

        let mut pack = match self.repo.latest_study_pack(material_id).await? {
            Some(pack) => pack,
            None => StudyPack::new(
                material_id,
                &caller.user_id,
                StudyPackStatus::Processing,
                true,
            ),
        };

        pack.status = StudyPackStatus::Generated;
        pack.requires_approval = true;
        pack.approved_by = None;
        pack.published_at = None;
        pack.last_error = None;
        self.repo
            .save_draft(&pack, &regenerated_content(notes))
            .await?;

        Ok((material, pack))
    }

    async fn build_draft(
        &self,
        material_id: &str,
        material: Option<&Material>,
        pack: StudyPack,
    ) -> ServiceResult<ReviewDraft> {
        let summary = self.repo.find_summary(&pack.id).await?;
        let (summary, key_points) = SummaryContent::display_parts(summary.as_ref().map(|s| &s.content));

        Ok(ReviewDraft {
            material_id: material_id.to_string(),
            study_pack_id: pack.id,
            status: pack.status,
            video_url: material.and_then(|m| m.source_url.clone()),
            summary,
            key_points,
        })
    }
}

fn require_instructor(caller: &Caller) -> ServiceResult<()> {
    if caller.role.is_instructor() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "Only teachers and organizers can review study packs".to_string(),
        ))
    }
}

/// The explicit list wins; free text is only parsed when the list has no usable entry.
fn resolve_key_points(list: &[String], text: Option<&str>) -> Vec<String> {
    let from_list: Vec<String> = list
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if !from_list.is_empty() {
        return from_list;
    }
    text.map(parse_key_points_text).unwrap_or_default()
}

fn parse_key_points_text(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line.trim();
            let line = BULLET_MARKERS
                .iter()
                .find_map(|marker| line.strip_prefix(marker))
                .unwrap_or(line)
                .trim();
            // A lone marker is an empty bullet.
            if matches!(line, "-" | "•" | "*") {
                String::new()
            } else {
                line.to_string()
            }
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn regenerated_content(notes: Option<&str>) -> SummaryContent {
    let mut summary = REGENERATED_SUMMARY.to_string();
    if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
        summary.push_str(" Instructor note: ");
        summary.push_str(notes);
    }
    SummaryContent::new(
        summary,
        REGENERATED_KEY_POINTS.iter().map(|p| p.to_string()).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_points_text_strips_markers_and_blanks() {
        let text = "- first\n\n• second\n  * third  \nfourth\n   \n";
        assert_eq!(
            parse_key_points_text(text),
            vec!["first", "second", "third", "fourth"]
        );
    }

    #[test]
    fn key_point_list_takes_precedence_over_text() {
        let list = vec!["  a ".to_string(), "".to_string()];
        assert_eq!(resolve_key_points(&list, Some("- b")), vec!["a"]);

        let blank_list = vec!["   ".to_string()];
        assert_eq!(resolve_key_points(&blank_list, Some("- b")), vec!["b"]);
        assert!(resolve_key_points(&[], None).is_empty());
        assert!(resolve_key_points(&[], Some("-  \n\n")).is_empty());
    }

    #[test]
    fn regenerated_summary_appends_notes() {
        let plain = regenerated_content(None);
        assert_eq!(plain.summary_text(), REGENERATED_SUMMARY);
        assert_eq!(plain.bullets().len(), 4);

        let noted = regenerated_content(Some("  Focus on examples "));
        assert!(noted
            .summary_text()
            .ends_with(" Instructor note: Focus on examples"));

        let blank = regenerated_content(Some("   "));
        assert_eq!(blank.summary_text(), REGENERATED_SUMMARY);
    }
}
