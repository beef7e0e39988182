//! Daemon mode: the deadline callback endpoint plus the reconciliation loop.

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use lifequest_core::{CallbackAuth, CoreError, Engine};

use crate::app::App;

#[derive(Clone)]
struct ServeState {
    engine: Arc<Engine>,
    auth: Arc<CallbackAuth>,
}

pub fn router(engine: Arc<Engine>, auth: CallbackAuth) -> Router {
    Router::new()
        .route("/todos/check_validity/:todo_id", post(check_validity))
        .with_state(ServeState {
            engine,
            auth: Arc::new(auth),
        })
}

async fn check_validity(
    State(state): State<ServeState>,
    Path(todo_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if state.auth.verify(header).is_err() {
        warn!(todo_id = %todo_id, "rejected deadline callback");
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response();
    }

    match state.engine.deadline_callback(&todo_id).await {
        Ok(verdict) => (StatusCode::OK, Json(json!({ "message": verdict.message() }))).into_response(),
        Err(CoreError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": "Todo not found" }))).into_response()
        }
        Err(e) => {
            error!(todo_id = %todo_id, error = %e, "deadline callback failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Sweep now, then every `period`.
async fn sweep_loop(engine: Arc<Engine>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match engine.run_sweep().await {
            Ok(report) if !report.failures.is_empty() => {
                warn!(failures = report.failures.len(), "sweep finished with failures");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

pub async fn run(app: App, listen: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let token = app
        .config
        .callback
        .token
        .clone()
        .ok_or("callback token not configured (set LIFEQUEST_CALLBACK_TOKEN)")?;
    let auth = CallbackAuth::new(token)?;
    let addr = listen.unwrap_or_else(|| app.config.callback.listen_addr.clone());
    let period = Duration::from_secs(app.config.game.sweep_interval_secs);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, sweep_every_secs = period.as_secs(), "lifequest daemon listening");

    let sweeper = tokio::spawn(sweep_loop(app.engine.clone(), period));
    axum::serve(listener, router(app.engine, auth))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    sweeper.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::{Duration as ChronoDuration, Utc};
    use lifequest_core::{
        Clock, Difficulty, GameConfig, InMemoryScheduler, ManualClock, MemoryStore, NewLoan,
    };
    use tower::ServiceExt; // for `oneshot`

    async fn setup() -> (Router, Arc<Engine>, Arc<ManualClock>, String) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = Arc::new(
            Engine::new(
                GameConfig::default(),
                Arc::new(MemoryStore::new()),
                Arc::new(InMemoryScheduler::new()),
                clock.clone(),
            )
            .unwrap(),
        );
        engine.register_character("u1").await.unwrap();
        let created = engine
            .create_loan(
                "u1",
                NewLoan {
                    title: "Submit form".into(),
                    description: None,
                    difficulty: Difficulty::Easy,
                    deadline: Some(clock.now() + ChronoDuration::hours(1)),
                },
            )
            .await
            .unwrap();
        let id = created.task.unwrap().id;
        let app = router(engine.clone(), CallbackAuth::new("cb-secret").unwrap());
        (app, engine, clock, id)
    }

    fn callback(id: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/todos/check_validity/{id}"));
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_callback_penalizes_then_ignores() {
        let (app, engine, clock, id) = setup().await;
        clock.advance(ChronoDuration::hours(1));

        let response = app
            .clone()
            .oneshot(callback(&id, Some("Bearer cb-secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": "Checked" }));
        assert_eq!(engine.character("u1").unwrap().gold, 0.0);

        let response = app
            .oneshot(callback(&id, Some("Bearer cb-secret")))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({ "message": "Ignored" }));
    }

    #[tokio::test]
    async fn test_callback_requires_bearer_token() {
        let (app, engine, clock, id) = setup().await;
        clock.advance(ChronoDuration::hours(1));

        for auth in [None, Some("Bearer wrong"), Some("cb-secret")] {
            let response = app.clone().oneshot(callback(&id, auth)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(engine.character("u1").unwrap().gold, 10.0);
    }

    #[tokio::test]
    async fn test_callback_unknown_todo_is_404() {
        let (app, _, _, _) = setup().await;
        let response = app
            .oneshot(callback("missing", Some("Bearer cb-secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_early_callback_is_ignored() {
        let (app, engine, _, id) = setup().await;
        let response = app
            .oneshot(callback(&id, Some("Bearer cb-secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": "Ignored" }));
        assert_eq!(engine.character("u1").unwrap().gold, 10.0);
    }
}
