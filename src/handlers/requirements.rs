use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::db_error;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::generation_status;
use crate::models::requirement::{
    self, AppType, Diagram, DiagramList, NonFunctionalRequirements, RequirementStatus,
    StringList, TechPreferences,
};
use crate::services::diagram_files::DiagramFiles;
use crate::utils::validators::{validate_functional_requirements, validate_requirement_name};

// ============ Request/Response DTOs ============

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementResponse {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub app_type: AppType,
    pub functional_requirements: Vec<String>,
    pub non_functional_requirements: NonFunctionalRequirements,
    pub tech_preferences: TechPreferences,
    pub additional_context: String,
    pub status: RequirementStatus,
    pub diagrams: Vec<Diagram>,
    pub design_document: Option<String>,
    pub diagram_urls: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<requirement::Model> for RequirementResponse {
    fn from(model: requirement::Model) -> Self {
        Self {
            id: model.id.to_string(),
            user_id: model.user_id.to_string(),
            name: model.name,
            description: model.description,
            app_type: model.app_type,
            functional_requirements: model.functional_requirements.0,
            non_functional_requirements: model.non_functional_requirements,
            tech_preferences: model.tech_preferences,
            additional_context: model.additional_context,
            status: model.status,
            diagrams: model.diagrams.0,
            design_document: model.design_document,
            diagram_urls: model.diagram_urls.0,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequirementRequest {
    pub name: String,
    pub description: Option<String>,
    pub app_type: Option<AppType>,
    pub functional_requirements: Option<Vec<String>>,
    pub non_functional_requirements: Option<NonFunctionalRequirements>,
    pub tech_preferences: Option<TechPreferences>,
    pub additional_context: Option<String>,
}

/// Autosave payload from the form wizard; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequirementRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub app_type: Option<AppType>,
    pub functional_requirements: Option<Vec<String>>,
    pub non_functional_requirements: Option<NonFunctionalRequirements>,
    pub tech_preferences: Option<TechPreferences>,
    pub additional_context: Option<String>,
}

async fn find_owned(
    db: &DatabaseConnection,
    id: Uuid,
    user_id: Uuid,
) -> Result<requirement::Model, actix_web::Error> {
    requirement::Entity::find_by_id(id)
        .filter(requirement::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("Requirement not found"))
}

fn bad_request(e: anyhow::Error) -> actix_web::Error {
    actix_web::error::ErrorBadRequest(e.to_string())
}

// ============ Requirement Handlers ============

/// POST /requirements
/// Create a draft requirement
pub async fn create_requirement(
    db: web::Data<DatabaseConnection>,
    user: AuthenticatedUser,
    payload: web::Json<CreateRequirementRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let payload = payload.into_inner();
    validate_requirement_name(&payload.name).map_err(bad_request)?;

    let functional_requirements = payload.functional_requirements.unwrap_or_default();
    validate_functional_requirements(&functional_requirements).map_err(bad_request)?;

    let now = Utc::now();
    let new_requirement = requirement::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        name: Set(payload.name.trim().to_string()),
        description: Set(payload.description.unwrap_or_default()),
        app_type: Set(payload.app_type.unwrap_or(AppType::Web)),
        functional_requirements: Set(StringList(functional_requirements)),
        non_functional_requirements: Set(payload.non_functional_requirements.unwrap_or_default()),
        tech_preferences: Set(payload.tech_preferences.unwrap_or_default()),
        additional_context: Set(payload.additional_context.unwrap_or_default()),
        status: Set(RequirementStatus::Draft),
        diagrams: Set(DiagramList::default()),
        design_document: Set(None),
        diagram_urls: Set(StringList::default()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_requirement.insert(db.get_ref()).await.map_err(|e| {
        log::error!("Failed to create requirement: {}", e);
        actix_web::error::ErrorInternalServerError("Failed to create requirement")
    })?;

    log::info!("Requirement {} created by user {}", created.id, user.user_id);

    Ok(HttpResponse::Created().json(RequirementResponse::from(created)))
}

/// GET /requirements
/// List the caller's requirements, newest first
pub async fn list_requirements(
    db: web::Data<DatabaseConnection>,
    user: AuthenticatedUser,
) -> Result<impl Responder, actix_web::Error> {
    let requirements = requirement::Entity::find()
        .filter(requirement::Column::UserId.eq(user.user_id))
        .order_by_desc(requirement::Column::CreatedAt)
        .all(db.get_ref())
        .await
        .map_err(db_error)?;

    let response: Vec<RequirementResponse> = requirements
        .into_iter()
        .map(RequirementResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

/// GET /requirements/:id
pub async fn get_requirement(
    db: web::Data<DatabaseConnection>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let requirement = find_owned(db.get_ref(), path.into_inner(), user.user_id).await?;
    Ok(HttpResponse::Ok().json(RequirementResponse::from(requirement)))
}

/// PATCH /requirements/:id
/// Autosave wizard fields
pub async fn update_requirement(
    db: web::Data<DatabaseConnection>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateRequirementRequest>,
) -> Result<impl Responder, actix_web::Error> {
    let existing = find_owned(db.get_ref(), path.into_inner(), user.user_id).await?;

    if existing.status == RequirementStatus::Generating {
        return Err(actix_web::error::ErrorConflict(
            "Requirement cannot be edited while diagrams are being generated",
        ));
    }

    let payload = payload.into_inner();
    let mut active: requirement::ActiveModel = existing.into();

    if let Some(name) = payload.name {
        validate_requirement_name(&name).map_err(bad_request)?;
        active.name = Set(name.trim().to_string());
    }

    if let Some(description) = payload.description {
        active.description = Set(description);
    }

    if let Some(app_type) = payload.app_type {
        active.app_type = Set(app_type);
    }

    if let Some(items) = payload.functional_requirements {
        validate_functional_requirements(&items).map_err(bad_request)?;
        active.functional_requirements = Set(StringList(items));
    }

    if let Some(nfr) = payload.non_functional_requirements {
        active.non_functional_requirements = Set(nfr);
    }

    if let Some(tech) = payload.tech_preferences {
        active.tech_preferences = Set(tech);
    }

    if let Some(context) = payload.additional_context {
        active.additional_context = Set(context);
    }

    active.updated_at = Set(Utc::now());

    let updated = active.update(db.get_ref()).await.map_err(|e| {
        log::error!("Failed to update requirement: {}", e);
        actix_web::error::ErrorInternalServerError("Failed to update requirement")
    })?;

    Ok(HttpResponse::Ok().json(RequirementResponse::from(updated)))
}

/// DELETE /requirements/:id
/// Delete a requirement with its status record and cached diagram files
pub async fn delete_requirement(
    db: web::Data<DatabaseConnection>,
    files: web::Data<DiagramFiles>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, actix_web::Error> {
    let existing = find_owned(db.get_ref(), path.into_inner(), user.user_id).await?;

    if existing.status == RequirementStatus::Generating {
        return Err(actix_web::error::ErrorConflict(
            "Requirement cannot be deleted while diagrams are being generated",
        ));
    }

    let txn = db.begin().await.map_err(db_error)?;

    generation_status::Entity::delete_many()
        .filter(generation_status::Column::RequirementId.eq(existing.id))
        .exec(&txn)
        .await
        .map_err(db_error)?;

    requirement::Entity::delete_by_id(existing.id)
        .exec(&txn)
        .await
        .map_err(db_error)?;

    txn.commit().await.map_err(db_error)?;

    files.remove_requirement(existing.id).await;
    log::info!("Requirement {} deleted by user {}", existing.id, user.user_id);

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::configure;
    use crate::services::test_support::reload;
    use crate::utils::auth::create_jwt;
    use crate::utils::config::Config;
    use crate::utils::db::test_connection;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::json;

    fn test_config() -> Config {
        Config::from_lookup(|name| match name {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "JWT_SECRET" => Some("test-secret".to_string()),
            "AI_API_KEY" => Some("k".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn bearer(user_id: Uuid) -> (&'static str, String) {
        let token = create_jwt(user_id, "test-secret", 1).unwrap();
        ("Authorization", format!("Bearer {}", token))
    }

    macro_rules! app {
        ($db:expr, $dir:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($db.clone()))
                    .app_data(web::Data::new(test_config()))
                    .app_data(web::Data::new(DiagramFiles::new($dir.path())))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_create_and_get_requirement() {
        let db = test_connection().await;
        let dir = tempfile::tempdir().unwrap();
        let app = app!(db, dir);
        let user = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/requirements")
            .insert_header(bearer(user))
            .set_json(json!({
                "name": "  Chat app ",
                "appType": "mobile",
                "functionalRequirements": ["Send messages", "Group chats"],
                "nonFunctionalRequirements": {
                    "scalability": "high",
                    "availability": "high",
                    "security": "high",
                    "performance": "standard"
                }
            }))
            .to_request();
        let created: RequirementResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(created.name, "Chat app");
        assert_eq!(created.app_type, AppType::Mobile);
        assert_eq!(created.status, RequirementStatus::Draft);
        assert_eq!(created.functional_requirements.len(), 2);
        assert_eq!(created.user_id, user.to_string());

        let req = test::TestRequest::get()
            .uri(&format!("/requirements/{}", created.id))
            .insert_header(bearer(user))
            .to_request();
        let fetched: RequirementResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched.id, created.id);
    }

    #[actix_web::test]
    async fn test_requires_authentication() {
        let db = test_connection().await;
        let dir = tempfile::tempdir().unwrap();
        let app = app!(db, dir);

        let req = test::TestRequest::get().uri("/requirements").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_rejects_blank_name() {
        let db = test_connection().await;
        let dir = tempfile::tempdir().unwrap();
        let app = app!(db, dir);

        let req = test::TestRequest::post()
            .uri("/requirements")
            .insert_header(bearer(Uuid::new_v4()))
            .set_json(json!({ "name": "   " }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_autosave_updates_only_given_fields() {
        let db = test_connection().await;
        let dir = tempfile::tempdir().unwrap();
        let app = app!(db, dir);
        let user = Uuid::new_v4();
        let existing = crate::services::test_support::insert_requirement(&db, user).await;

        let req = test::TestRequest::patch()
            .uri(&format!("/requirements/{}", existing.id))
            .insert_header(bearer(user))
            .set_json(json!({ "additionalContext": "GDPR applies" }))
            .to_request();
        let updated: RequirementResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(updated.additional_context, "GDPR applies");
        assert_eq!(updated.name, existing.name);
        assert_eq!(updated.functional_requirements, existing.functional_requirements.0);
    }

    #[actix_web::test]
    async fn test_other_users_cannot_see_or_edit() {
        let db = test_connection().await;
        let dir = tempfile::tempdir().unwrap();
        let app = app!(db, dir);
        let existing =
            crate::services::test_support::insert_requirement(&db, Uuid::new_v4()).await;
        let stranger = Uuid::new_v4();

        let req = test::TestRequest::get()
            .uri(&format!("/requirements/{}", existing.id))
            .insert_header(bearer(stranger))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::patch()
            .uri(&format!("/requirements/{}", existing.id))
            .insert_header(bearer(stranger))
            .set_json(json!({ "name": "hijacked" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/requirements")
            .insert_header(bearer(stranger))
            .to_request();
        let listed: Vec<RequirementResponse> = test::call_and_read_body_json(&app, req).await;
        assert!(listed.is_empty());
    }

    #[actix_web::test]
    async fn test_generating_requirement_is_locked() {
        let db = test_connection().await;
        let dir = tempfile::tempdir().unwrap();
        let app = app!(db, dir);
        let user = Uuid::new_v4();
        let existing = crate::services::test_support::insert_requirement(&db, user).await;

        let mut active: requirement::ActiveModel = existing.clone().into();
        active.status = Set(RequirementStatus::Generating);
        active.update(&db).await.unwrap();

        let req = test::TestRequest::patch()
            .uri(&format!("/requirements/{}", existing.id))
            .insert_header(bearer(user))
            .set_json(json!({ "name": "renamed" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::delete()
            .uri(&format!("/requirements/{}", existing.id))
            .insert_header(bearer(user))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
        assert_eq!(reload(&db, existing.id).await.name, existing.name);
    }

    #[actix_web::test]
    async fn test_delete_removes_status_and_files() {
        let db = test_connection().await;
        let dir = tempfile::tempdir().unwrap();
        let app = app!(db, dir);
        let user = Uuid::new_v4();
        let existing = crate::services::test_support::insert_requirement(&db, user).await;
        crate::services::generation_status::init_generation(&db, existing.id, user)
            .await
            .unwrap();

        let files = DiagramFiles::new(dir.path());
        let url = DiagramFiles::url_for(existing.id, 0);
        assert!(files.write(&url, "# cached").await);

        let req = test::TestRequest::delete()
            .uri(&format!("/requirements/{}", existing.id))
            .insert_header(bearer(user))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        assert!(requirement::Entity::find_by_id(existing.id)
            .one(&db)
            .await
            .unwrap()
            .is_none());
        assert!(crate::services::generation_status::find(&db, existing.id, user)
            .await
            .unwrap()
            .is_none());
        assert!(!files.resolve(&url).unwrap().exists());
    }
}
