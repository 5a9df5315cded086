//! Session-management endpoints over the history store.
//!
//! Lets the app list a user's past conversation sessions, open a fresh
//! one, switch which session is active, and read a session's turns.

use crate::error::AppError;
use crate::history::store::HistoryStore;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SwitchSessionRequest {
    pub session_id: String,
}

/// GET /api/v1/sessions/{user_id}: list a user's sessions.
pub async fn list_sessions(
    store: web::Data<Arc<dyn HistoryStore>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let sessions = store.sessions(&user_id);

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "sessions": sessions
    })))
}

/// POST /api/v1/sessions/{user_id}: create a new session and make it active.
pub async fn create_session(
    store: web::Data<Arc<dyn HistoryStore>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let session_id = store.create_session(&user_id);

    Ok(HttpResponse::Created().json(json!({
        "user_id": user_id,
        "session_id": session_id
    })))
}

/// GET /api/v1/sessions/{user_id}/active: the active session, creating one
/// if the user has none.
pub async fn active_session(
    store: web::Data<Arc<dyn HistoryStore>>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let session_id = store.get_or_create_active_session(&user_id);

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "session_id": session_id
    })))
}

/// POST /api/v1/sessions/{user_id}/switch: change the active session.
pub async fn switch_session(
    store: web::Data<Arc<dyn HistoryStore>>,
    path: web::Path<String>,
    body: web::Json<SwitchSessionRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let session_id = body.into_inner().session_id;

    if store.switch_active_session(&user_id, &session_id) {
        Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "user_id": user_id,
            "session_id": session_id
        })))
    } else {
        Err(AppError::NotFound(format!(
            "Session '{}' not found for user '{}'",
            session_id, user_id
        )))
    }
}

/// GET /api/v1/sessions/{user_id}/{session_id}/turns: a session's turns in
/// append order.
pub async fn session_turns(
    store: web::Data<Arc<dyn HistoryStore>>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, session_id) = path.into_inner();

    if !store
        .sessions(&user_id)
        .iter()
        .any(|record| record.session_id == session_id)
    {
        return Err(AppError::NotFound(format!(
            "Session '{}' not found for user '{}'",
            session_id, user_id
        )));
    }

    let turns = store.turns(&session_id);
    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "session_id": session_id,
        "turns": turns
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::store::InMemoryHistoryStore;
    use actix_web::{test, App};

    fn store() -> web::Data<Arc<dyn HistoryStore>> {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        web::Data::new(store)
    }

    #[actix_web::test]
    async fn test_create_then_list_sessions() {
        let data = store();
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .route("/sessions/{user_id}", web::post().to(create_session))
                .route("/sessions/{user_id}", web::get().to(list_sessions)),
        )
        .await;

        let req = test::TestRequest::post().uri("/sessions/farmer-1").to_request();
        let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let session_id = created["session_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get().uri("/sessions/farmer-1").to_request();
        let listed: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let sessions = listed["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["session_id"], session_id.as_str());
        assert_eq!(sessions[0]["is_active"], true);
    }

    #[actix_web::test]
    async fn test_switch_unknown_session_is_404() {
        let data = store();
        let app = test::init_service(
            App::new()
                .app_data(data)
                .route("/sessions/{user_id}/switch", web::post().to(switch_session)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/sessions/farmer-1/switch")
            .set_json(serde_json::json!({"session_id": "nope"}))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 404);
    }

    #[actix_web::test]
    async fn test_session_turns_requires_ownership() {
        let data = store();
        let session_id = data.create_session("farmer-1");

        let app = test::init_service(
            App::new()
                .app_data(data)
                .route(
                    "/sessions/{user_id}/{session_id}/turns",
                    web::get().to(session_turns),
                ),
        )
        .await;

        // Another user cannot read farmer-1's session
        let req = test::TestRequest::get()
            .uri(&format!("/sessions/farmer-2/{}/turns", session_id))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 404);

        let req = test::TestRequest::get()
            .uri(&format!("/sessions/farmer-1/{}/turns", session_id))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["turns"].as_array().unwrap().len(), 1); // system prompt
    }
}
