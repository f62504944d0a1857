pub mod diagrams;
pub mod generation;
pub mod requirements;

use actix_web::error::{ErrorConflict, ErrorInternalServerError, ErrorNotFound};
use actix_web::web;
use sea_orm::DbErr;

use crate::services::generation_orchestrator::GenerationError;
use crate::services::generation_status::TrackerError;

/// Register every API route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/requirements")
            .route("", web::post().to(requirements::create_requirement))
            .route("", web::get().to(requirements::list_requirements))
            .route("/{id}", web::get().to(requirements::get_requirement))
            .route("/{id}", web::patch().to(requirements::update_requirement))
            .route("/{id}", web::delete().to(requirements::delete_requirement)),
    )
    .service(
        web::scope("/generation")
            .route("/status/init", web::post().to(generation::init_status))
            .route("/status", web::get().to(generation::get_status))
            .route("/generate", web::post().to(generation::generate))
            .route("/retry", web::post().to(generation::retry)),
    )
    .service(
        web::scope("/diagrams").route(
            "/{requirement_id}/{filename}",
            web::get().to(diagrams::serve_diagram),
        ),
    );
}

pub(crate) fn db_error(e: DbErr) -> actix_web::Error {
    log::error!("Database error: {}", e);
    ErrorInternalServerError("Database error")
}

pub(crate) fn tracker_error(e: TrackerError) -> actix_web::Error {
    match e {
        TrackerError::NotFound => ErrorNotFound("Generation status not found"),
        TrackerError::InvalidTransition { .. } => ErrorConflict(e.to_string()),
        TrackerError::Database(e) => db_error(e),
    }
}

pub(crate) fn generation_error(e: GenerationError) -> actix_web::Error {
    match e {
        GenerationError::NotFoundOrUnauthorized => ErrorNotFound("Requirement not found"),
        GenerationError::AlreadyGenerating => ErrorConflict(e.to_string()),
        GenerationError::Database(e) => db_error(e),
        other => {
            log::error!("Generation error: {}", other);
            ErrorInternalServerError(other.to_string())
        }
    }
}
