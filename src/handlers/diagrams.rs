use actix_files::NamedFile;
use actix_web::{web, HttpRequest, HttpResponse};
use sea_orm::*;
use uuid::Uuid;

use crate::handlers::db_error;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::requirement::{self, Diagram};
use crate::services::diagram_files::{DiagramFiles, URL_PREFIX};

/// Markdown view of a stored diagram, used when no cached file exists.
fn render_markdown(diagram: &Diagram) -> String {
    let title = diagram.title.trim_start_matches('#').trim();
    let mut out = format!("# {}\n\n{}\n", title, diagram.description);
    // Stored diagram text already carries its fence lines
    if !diagram.diagram_text.is_empty() {
        out.push_str(&format!("\n{}\n", diagram.diagram_text));
    }
    out.push_str(&format!("\n## Explicación\n\n{}\n", diagram.explanation));
    out
}

/// GET /diagrams/:requirement_id/:filename
/// Serve a diagram's Markdown to the requirement owner
pub async fn serve_diagram(
    req: HttpRequest,
    db: web::Data<DatabaseConnection>,
    files: web::Data<DiagramFiles>,
    user: AuthenticatedUser,
    path: web::Path<(Uuid, String)>,
) -> Result<HttpResponse, actix_web::Error> {
    let (requirement_id, filename) = path.into_inner();

    let owned = requirement::Entity::find_by_id(requirement_id)
        .filter(requirement::Column::UserId.eq(user.user_id))
        .one(db.get_ref())
        .await
        .map_err(db_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("Diagram not found"))?;

    let url = format!("{}/{}/{}", URL_PREFIX, requirement_id, filename);

    // Only diagrams of the current record are served
    let diagram = owned
        .diagrams
        .0
        .iter()
        .find(|d| d.url == url)
        .ok_or_else(|| actix_web::error::ErrorNotFound("Diagram not found"))?;

    if let Some(path) = files.resolve(&url) {
        if let Ok(file) = NamedFile::open_async(&path).await {
            return Ok(file.into_response(&req));
        }
    }

    // Cached copy missing; the stored record is authoritative
    Ok(HttpResponse::Ok()
        .content_type("text/markdown; charset=utf-8")
        .body(render_markdown(diagram)))
}
