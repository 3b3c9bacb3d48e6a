//! Fake auth and record services over real HTTP, built on axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use patient_dash_core::models::{LoginRequest, PatientDraft, RemotePatient};

pub const SERVER_TOKEN: &str = "srv-token";

#[derive(Clone, Default)]
pub struct ServerState {
    pub rows: Arc<Mutex<Vec<RemotePatient>>>,
    next_id: Arc<AtomicUsize>,
    /// Tokens `validate` and the record routes accept.
    pub accepted: Arc<Mutex<Vec<String>>>,
}

impl ServerState {
    pub fn revoke_all(&self) {
        self.accepted.lock().unwrap().clear();
    }

    fn check(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;
        if self.accepted.lock().unwrap().iter().any(|t| t == bearer) {
            Ok(())
        } else {
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

async fn login(
    State(state): State<ServerState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, StatusCode> {
    if request.password != super::PASSWORD {
        return Err(StatusCode::UNAUTHORIZED);
    }
    state.accepted.lock().unwrap().push(SERVER_TOKEN.to_string());
    Ok(Json(json!({ "token": SERVER_TOKEN })))
}

async fn validate(State(state): State<ServerState>, headers: HeaderMap) -> StatusCode {
    match state.check(&headers) {
        Ok(()) => StatusCode::OK,
        Err(status) => status,
    }
}

async fn list(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RemotePatient>>, StatusCode> {
    state.check(&headers)?;
    Ok(Json(state.rows.lock().unwrap().clone()))
}

async fn create(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(draft): Json<PatientDraft>,
) -> Result<(StatusCode, Json<RemotePatient>), StatusCode> {
    state.check(&headers)?;
    let n = state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let row = RemotePatient {
        id: format!("p{}", n),
        name: draft.name,
        email: draft.email,
        address: draft.address,
        date_of_birth: draft.date_of_birth,
        registered_date: "2024-03-01".to_string(),
    };
    state.rows.lock().unwrap().push(row.clone());
    Ok((StatusCode::CREATED, Json(row)))
}

async fn update(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<PatientDraft>,
) -> Result<Json<RemotePatient>, StatusCode> {
    state.check(&headers)?;
    let mut rows = state.rows.lock().unwrap();
    let row = rows
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    row.name = draft.name;
    row.email = draft.email;
    row.address = draft.address;
    row.date_of_birth = draft.date_of_birth;
    Ok(Json(row.clone()))
}

async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if let Err(status) = state.check(&headers) {
        return status;
    }
    let mut rows = state.rows.lock().unwrap();
    let before = rows.len();
    rows.retain(|r| r.id != id);
    if rows.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn garbage() -> (StatusCode, &'static str) {
    (StatusCode::OK, "{\"not\": \"a list\"")
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/validate", get(validate))
        .route("/api/patients", get(list).post(create))
        .route("/api/patients/{id}", put(update).delete(delete))
        .route("/broken/patients", get(garbage))
        .with_state(state)
}

/// Serve on an ephemeral local port. Returns `http://127.0.0.1:PORT`.
pub async fn spawn(state: ServerState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}
