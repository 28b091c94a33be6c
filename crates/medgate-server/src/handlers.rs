use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use medgate_core::HealthFailure;
use serde_json::{Value, json};

use crate::server::AppState;

/// `GET /health`: gateway status plus one state per backend.
#[tracing::instrument(skip_all)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.health.check().await {
        Ok(report) => {
            if !report.all_up() {
                tracing::warn!(services = ?report.services, "One or more backends are down");
            }
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthFailure::new(e.to_string())),
            )
                .into_response()
        }
    }
}

/// `GET /api-docs`: static description of the exposed resource families.
pub async fn api_docs() -> impl IntoResponse {
    (StatusCode::OK, Json(api_docs_document()))
}

fn api_docs_document() -> Value {
    let services = [
        ("Patient Service", "/api/patients", "patient", "a"),
        ("Appointments Service", "/api/appointments", "appointment", "an"),
        ("Medications Service", "/api/medications", "medication", "a"),
        ("Medical Records Service", "/api/medical-records", "medical record", "a"),
    ]
    .into_iter()
    .map(|(name, base, noun, article)| crud_service(name, base, noun, article))
    .collect::<Vec<_>>();

    json!({
        "apiName": "Healthcare Management System API",
        "version": "1.0.0",
        "services": services,
    })
}

fn crud_service(name: &str, base_path: &str, noun: &str, article: &str) -> Value {
    let item = format!("{base_path}/:id");
    json!({
        "name": name,
        "basePath": base_path,
        "endpoints": [
            { "method": "GET", "path": base_path, "description": format!("Get all {noun}s") },
            { "method": "GET", "path": item, "description": format!("Get {noun} by ID") },
            { "method": "POST", "path": base_path, "description": format!("Create a new {noun}") },
            { "method": "PUT", "path": item, "description": format!("Update {article} {noun}") },
            { "method": "DELETE", "path": item, "description": format!("Delete {article} {noun}") },
        ],
    })
}
