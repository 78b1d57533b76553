use std::sync::Arc;

use validator::Validate;

use super::generation_queue::{GenerationJob, GenerationQueue, GenerationSource};
use super::material_lock::MaterialLocks;
use crate::error::{parse_uuid, ServiceError, ServiceResult};
use crate::metrics::IMPORTS_TOTAL;
use crate::models::material::{
    AttachTranscriptRequest, ImportDocumentRequest, ImportResponse, ImportStatusResponse,
    ImportVideoRequest, MaterialResponse, StudyPackRef,
};
use crate::models::{Caller, Material, Module, StudyPack, StudyPackStatus};
use crate::repository::StudyRepository;
use crate::utils::video_url::is_supported_video_url;

pub struct IngestionService {
    repo: Arc<dyn StudyRepository>,
    locks: Arc<dyn MaterialLocks>,
    queue: GenerationQueue,
}

impl IngestionService {
    pub fn new(
        repo: Arc<dyn StudyRepository>,
        locks: Arc<dyn MaterialLocks>,
        queue: GenerationQueue,
    ) -> Self {
        Self { repo, locks, queue }
    }

    pub async fn import_video(
        &self,
        caller: &Caller,
        req: ImportVideoRequest,
    ) -> ServiceResult<ImportResponse> {
        req.validate()?;

        let youtube_url = req.youtube_url.trim();
        if !is_supported_video_url(youtube_url) {
            return Err(ServiceError::invalid("Invalid YouTube URL"));
        }
        let module = self
            .resolve_module(&req.course_id, req.module_id.as_deref())
            .await?;

        let transcript = req
            .transcript
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let status = if transcript.is_some() {
            StudyPackStatus::Processing
        } else {
            StudyPackStatus::Queued
        };

        let material = Material::video(&module.id, youtube_url, transcript.clone());
        let pack = StudyPack::new(&material.id, &caller.user_id, status, req.requires_approval);
        self.repo.create_material_with_pack(&material, &pack).await?;

        IMPORTS_TOTAL.with_label_values(&["video"]).inc();
        tracing::info!(
            material_id = %material.id,
            study_pack_id = %pack.id,
            status = %pack.status,
            "Video imported"
        );

        if let Some(transcript) = transcript {
            self.enqueue(GenerationJob {
                study_pack_id: pack.id.clone(),
                material_id: material.id.clone(),
                source: GenerationSource::Transcript(transcript),
            })
            .await;
        }

        Ok(ImportResponse {
            material: MaterialResponse::from(material),
            study_pack: StudyPackRef {
                id: pack.id,
                status: pack.status,
            },
        })
    }

    pub async fn import_document(
        &self,
        caller: &Caller,
        req: ImportDocumentRequest,
    ) -> ServiceResult<ImportResponse> {
        req.validate()?;

        let file_url = req.file_url.trim();
        let title = req.title.trim();
        if file_url.is_empty() || title.is_empty() {
            return Err(ServiceError::invalid("fileUrl and title are required"));
        }
        let module = self
            .resolve_module(&req.course_id, req.module_id.as_deref())
            .await?;

        let material = Material::document(&module.id, file_url, title);
        let pack = StudyPack::new(
            &material.id,
            &caller.user_id,
            StudyPackStatus::Processing,
            req.requires_approval,
        );
        self.repo.create_material_with_pack(&material, &pack).await?;

        IMPORTS_TOTAL
            .with_label_values(&[material.material_type.as_str()])
            .inc();
        tracing::info!(
            material_id = %material.id,
            study_pack_id = %pack.id,
            material_type = %material.material_type.as_str(),
            "Document imported"
        );

        self.enqueue(GenerationJob {
            study_pack_id: pack.id.clone(),
            material_id: material.id.clone(),
            source: GenerationSource::Document {
                file_url: file_url.to_string(),
                title: title.to_string(),
            },
        })
        .await;

        Ok(ImportResponse {
            material: MaterialResponse::from(material),
            study_pack: StudyPackRef {
                id: pack.id,
                status: pack.status,
            },
        })
    }

    pub async fn get_import_status(&self, material_id: &str) -> ServiceResult<ImportStatusResponse> {
        let material_id = parse_uuid(material_id, "materialId")?;
        let pack = self
            .repo
            .latest_study_pack(&material_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Study pack not found"))?;

        Ok(status_response(pack))
    }

    /// Callback for the external transcript extraction job: stores the transcript
    /// and starts generation for a queued import.
    pub async fn attach_transcript(
        &self,
        material_id: &str,
        req: AttachTranscriptRequest,
    ) -> ServiceResult<ImportStatusResponse> {
        req.validate()?;
        let transcript = req.transcript.trim().to_string();
        if transcript.is_empty() {
            return Err(ServiceError::invalid("transcript is required"));
        }
        let material_id = parse_uuid(material_id, "materialId")?;

        let guard = self.locks.acquire(&material_id).await?;
        let result = self.queue_with_transcript(&material_id, &transcript).await;
        self.locks.release(guard).await;
        let pack = result?;

        self.enqueue(GenerationJob {
            study_pack_id: pack.id.clone(),
            material_id: material_id.clone(),
            source: GenerationSource::Transcript(transcript),
        })
        .await;

        Ok(status_response(pack))
    }

    async fn queue_with_transcript(
        &self,
        material_id: &str,
        transcript: &str,
    ) -> ServiceResult<StudyPack> {
        if self.repo.find_material(material_id).await?.is_none() {
            return Err(ServiceError::not_found("Material not found"));
        }
        let mut pack = self
            .repo
            .latest_study_pack(material_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Study pack not found"))?;

        if pack.status != StudyPackStatus::Queued {
            return Err(ServiceError::invalid(format!(
                "Study pack is {} and not waiting for a transcript",
                pack.status
            )));
        }

        pack.status = StudyPackStatus::Processing;
        pack.last_error = None;
        self.repo
            .attach_transcript(material_id, transcript, &pack)
            .await?;
        Ok(pack)
    }

    /// Explicit module when given, otherwise the course's "Resources" module.
    async fn resolve_module(
        &self,
        course_id: &str,
        module_id: Option<&str>,
    ) -> ServiceResult<Module> {
        let course_id = parse_uuid(course_id, "courseId")?;

        match module_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(module_id) => {
                let module_id = parse_uuid(module_id, "moduleId")?;
                let module = self
                    .repo
                    .find_module(&module_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Module not found"))?;
                if module.course_id != course_id {
                    return Err(ServiceError::invalid(
                        "Module does not belong to the given course",
                    ));
                }
                Ok(module)
            }
            None => Ok(self
                .repo
                .find_or_create_resources_module(&course_id)
                .await?),
        }
    }

    /// Queue failures are recorded on the pack; the import itself already succeeded.
    async fn enqueue(&self, job: GenerationJob) {
        let study_pack_id = job.study_pack_id.clone();
        if let Err(err) = self.queue.submit(job).await {
            tracing::error!(study_pack_id = %study_pack_id, error = %err, "Failed to queue generation");
            if let Err(e) = self
                .repo
                .record_generation_failure(&study_pack_id, &err.to_string())
                .await
            {
                tracing::error!(study_pack_id = %study_pack_id, error = %e, "Failed to record queue failure");
            }
        }
    }
}

fn status_response(pack: StudyPack) -> ImportStatusResponse {
    ImportStatusResponse {
        status: pack.status,
        study_pack_id: pack.id,
        created_at: pack.created_at,
        published_at: pack.published_at,
        last_error: pack.last_error,
    }
}
