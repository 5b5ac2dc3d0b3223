//! HTTP API server.
//!
//! Exposes the bridge's REST surface: `GET /info` reports device
//! identity, `POST /roborock-command` dispatches a table command to the
//! device. Responses are JSON envelopes carrying an `ok` flag; failures
//! map to 400 (unknown command, with the accepted names) or 500
//! (connection or device errors). Error bodies carry only the error
//! message, never the device token.

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::Command;
use crate::device::{DeviceHolder, DeviceInfo};
use crate::error::Result;
use crate::miio::Token;
use crate::tracing::prelude::*;

/// Shared state injected into request handlers.
#[derive(Clone)]
pub struct AppState {
    holder: Arc<DeviceHolder>,
    token: Token,
}

impl AppState {
    pub fn new(holder: Arc<DeviceHolder>, token: Token) -> Self {
        Self { holder, token }
    }
}

/// Success body for `GET /info`. All four fields are always present; a
/// field the device did not report serializes as null.
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub ok: bool,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub mac: Option<String>,
    pub token: String,
}

/// Request body for `POST /roborock-command`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Success body for `POST /roborock-command`.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub ok: bool,
    pub result: Value,
}

/// Generic failure body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

/// Rejection body for unknown commands, enumerating the accepted names.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidCommandResponse {
    pub ok: bool,
    pub error: &'static str,
    pub allowed: Vec<&'static str>,
}

/// Device identity endpoint handler.
async fn info(State(state): State<AppState>) -> Response {
    match fetch_info(&state).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to fetch device info");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}

async fn fetch_info(state: &AppState) -> Result<InfoResponse> {
    let device = state.holder.get().await?;
    let raw = device.call("miIO.info", Value::Array(Vec::new())).await?;
    let report: DeviceInfo = serde_json::from_value(raw).unwrap_or_default();

    Ok(InfoResponse {
        ok: true,
        // The handle's own model wins over the report's.
        model: device.model().map(str::to_owned).or(report.model),
        firmware: report.fw_ver,
        mac: report.mac,
        token: state.token.to_hex(),
    })
}

/// Command endpoint handler.
///
/// Resolves the command name against the fixed table before anything
/// touches the device; unknown names are rejected with the allowed list.
async fn run_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let Ok(command) = req.command.parse::<Command>() else {
        warn!(command = %req.command, "rejected unknown command");
        return (
            StatusCode::BAD_REQUEST,
            Json(InvalidCommandResponse {
                ok: false,
                error: "Invalid command",
                allowed: Command::allowed_names(),
            }),
        )
            .into_response();
    };

    match dispatch(&state, command, req.params).await {
        Ok(result) => {
            (StatusCode::OK, Json(CommandResponse { ok: true, result }))
                .into_response()
        }
        Err(e) => {
            error!(command = command.name(), error = %e, "command failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Perform a resolved command. Caller params are forwarded verbatim only
/// when the table marks the command as parameter-forwarding; otherwise
/// the device is called with an empty parameter list.
async fn dispatch(
    state: &AppState,
    command: Command,
    params: Option<Value>,
) -> Result<Value> {
    let device = state.holder.get().await?;
    let params = if command.forwards_params() {
        params.unwrap_or_else(|| Value::Array(Vec::new()))
    } else {
        Value::Array(Vec::new())
    };
    debug!(
        command = command.name(),
        method = command.remote_method(),
        "dispatching"
    );
    device.call(command.remote_method(), params).await
}

/// Build the bridge's router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/info", get(info))
        .route("/roborock-command", post(run_command))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Connector, Vacuum};
    use crate::error::Error;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const TEST_TOKEN: &str = "00112233445566778899aabbccddeeff";

    #[derive(Default)]
    struct MockVacuum {
        model: Option<String>,
        reply: Value,
        fail_with: Option<String>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Vacuum for MockVacuum {
        fn model(&self) -> Option<&str> {
            self.model.as_deref()
        }

        async fn call(&self, method: &str, params: Value) -> Result<Value> {
            self.calls.lock().await.push((method.to_string(), params));
            match &self.fail_with {
                Some(message) => Err(Error::Protocol(message.clone())),
                None => Ok(self.reply.clone()),
            }
        }
    }

    struct MockConnector(Arc<MockVacuum>);

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self) -> Result<Arc<dyn Vacuum>> {
            Ok(self.0.clone())
        }
    }

    fn app(device: Arc<MockVacuum>) -> Router {
        let holder = DeviceHolder::new(Box::new(MockConnector(device)));
        router(AppState::new(
            Arc::new(holder),
            TEST_TOKEN.parse().unwrap(),
        ))
    }

    async fn send(router: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes =
            response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_command(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/roborock-command")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_info() -> Request<Body> {
        Request::builder()
            .uri("/info")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_command_is_rejected_without_a_device_call() {
        let device = Arc::new(MockVacuum::default());
        let (status, body) = send(
            app(device.clone()),
            post_command(json!({ "command": "fly_to_moon" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["error"], json!("Invalid command"));
        assert_eq!(
            body["allowed"],
            json!([
                "start_cleaning",
                "pause_cleaning",
                "stop_cleaning",
                "dock",
                "spot",
                "goto"
            ])
        );
        assert!(device.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn spot_calls_app_spot_with_no_params() {
        let device = Arc::new(MockVacuum {
            reply: json!(["ok"]),
            ..Default::default()
        });
        let (status, body) = send(
            app(device.clone()),
            post_command(json!({ "command": "spot" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "result": ["ok"] }));
        assert_eq!(
            *device.calls.lock().await,
            vec![("app_spot".to_string(), json!([]))]
        );
    }

    #[tokio::test]
    async fn dock_ignores_supplied_params() {
        let device = Arc::new(MockVacuum {
            reply: json!(["ok"]),
            ..Default::default()
        });
        let (status, _) = send(
            app(device.clone()),
            post_command(
                json!({ "command": "dock", "params": { "x": 1, "y": 2 } }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            *device.calls.lock().await,
            vec![("app_charge".to_string(), json!([]))]
        );
    }

    #[tokio::test]
    async fn goto_forwards_params_verbatim() {
        let device = Arc::new(MockVacuum {
            reply: json!(["ok"]),
            ..Default::default()
        });
        let (status, _) = send(
            app(device.clone()),
            post_command(
                json!({ "command": "goto", "params": { "x": 1, "y": 2 } }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            *device.calls.lock().await,
            vec![("app_goto_target".to_string(), json!({ "x": 1, "y": 2 }))]
        );
    }

    #[tokio::test]
    async fn goto_without_params_sends_an_empty_list() {
        let device = Arc::new(MockVacuum {
            reply: json!(["ok"]),
            ..Default::default()
        });
        send(
            app(device.clone()),
            post_command(json!({ "command": "goto" })),
        )
        .await;

        assert_eq!(
            *device.calls.lock().await,
            vec![("app_goto_target".to_string(), json!([]))]
        );
    }

    #[tokio::test]
    async fn device_failure_maps_to_500_with_a_message() {
        let device = Arc::new(MockVacuum {
            fail_with: Some("device unplugged".into()),
            ..Default::default()
        });
        let (status, body) = send(
            app(device),
            post_command(json!({ "command": "spot" })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["ok"], json!(false));
        let message = body["error"].as_str().unwrap();
        assert!(!message.is_empty());
        assert!(message.contains("device unplugged"));
    }

    #[tokio::test]
    async fn info_prefers_the_handle_model_over_the_report() {
        let device = Arc::new(MockVacuum {
            model: Some("rockrobo.vacuum.v1".into()),
            reply: json!({
                "model": "some.other.model",
                "fw_ver": "3.3.9_001886",
                "mac": "34:CE:00:00:00:01",
            }),
            ..Default::default()
        });
        let (status, body) = send(app(device.clone()), get_info()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "ok": true,
                "model": "rockrobo.vacuum.v1",
                "firmware": "3.3.9_001886",
                "mac": "34:CE:00:00:00:01",
                "token": TEST_TOKEN,
            })
        );
        assert_eq!(
            *device.calls.lock().await,
            vec![("miIO.info".to_string(), json!([]))]
        );
    }

    #[tokio::test]
    async fn info_always_carries_all_four_fields() {
        let device = Arc::new(MockVacuum {
            reply: json!({}),
            ..Default::default()
        });
        let (status, body) = send(app(device), get_info()).await;

        assert_eq!(status, StatusCode::OK);
        for field in ["model", "firmware", "mac", "token"] {
            assert!(body.as_object().unwrap().contains_key(field));
        }
        assert_eq!(body["model"], Value::Null);
        assert_eq!(body["token"], json!(TEST_TOKEN));
    }

    #[tokio::test]
    async fn info_failure_never_leaks_the_token() {
        let device = Arc::new(MockVacuum {
            fail_with: Some("no route to device".into()),
            ..Default::default()
        });
        let (status, body) = send(app(device), get_info()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["ok"], json!(false));
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert!(!body.to_string().contains(TEST_TOKEN));
    }
}
