use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "pipeline": {
                "working_language": config.pipeline.working_language,
                "sample_rate": config.pipeline.sample_rate,
                "fallback_intent": config.pipeline.fallback_intent,
                "max_audio_bytes": config.pipeline.max_audio_bytes,
                "llm_history_window": config.pipeline.llm_history_window
            },
            // Endpoint URLs and credentials stay server-side; expose only
            // whether each adapter is usable.
            "services": {
                "stt_configured": config.services.stt.is_configured(),
                "chat_configured": config.services.chat.is_configured(),
                "translate_configured": config.services.translate.is_configured(),
                "tts_configured": config.services.tts.is_configured()
            },
            "history": {
                "queue_depth": config.history.queue_depth
            },
            "performance": {
                "max_concurrent_sessions": config.performance.max_concurrent_sessions
            }
        }
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": {
            "server": {
                "host": current_config.server.host,
                "port": current_config.server.port
            },
            "pipeline": {
                "working_language": current_config.pipeline.working_language,
                "fallback_intent": current_config.pipeline.fallback_intent,
                "max_audio_bytes": current_config.pipeline.max_audio_bytes,
                "llm_history_window": current_config.pipeline.llm_history_window
            },
            "performance": {
                "max_concurrent_sessions": current_config.performance.max_concurrent_sessions
            }
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_get_config_hides_credentials() {
        let mut config = AppConfig::default();
        config.services.stt.url = "https://stt.example.com/v1".to_string();
        config.services.stt.api_key = "secret-key".to_string();

        let state = AppState::new(config);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["services"]["stt_configured"], true);
        assert_eq!(body["config"]["services"]["chat_configured"], false);
        assert!(!body.to_string().contains("secret-key"));
    }

    #[actix_web::test]
    async fn test_update_config_roundtrip() {
        let state = AppState::new(AppConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(serde_json::json!({"pipeline": {"working_language": "hi"}}))
            .to_request();
        let response = test::call_service(&app, req).await;

        assert!(response.status().is_success());
        assert_eq!(state.get_config().pipeline.working_language, "hi");
    }
}
