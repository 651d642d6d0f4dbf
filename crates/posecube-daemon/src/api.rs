//! REST API handlers

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use posecube_core::{Snapshot, Tab, TransformField, UiEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::component::{ComponentError, ComponentHandle};
use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Value typed into a numeric input; the page sends text, scripts may send numbers
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Text(String),
    Number(f64),
}

impl InputValue {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(value) => value.to_string(),
        }
    }
}

/// User actions accepted from the page, over REST or the WebSocket
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetBroker {
        url: Option<String>,
        topic: Option<String>,
    },
    Connect {
        url: Option<String>,
        topic: Option<String>,
    },
    SetField {
        field: TransformField,
        value: InputValue,
    },
    Apply,
    Reset,
    ShowTabs,
    CloseTabs,
    SelectTab {
        tab: Tab,
    },
    Hotspot,
}

impl Command {
    /// Component events for this command, in order
    pub fn into_events(self) -> Vec<UiEvent> {
        match self {
            Self::SetBroker { url, topic } => broker_fields(url, topic),
            Self::Connect { url, topic } => {
                let mut events = broker_fields(url, topic);
                events.push(UiEvent::Connect);
                events
            }
            Self::SetField { field, value } => vec![UiEvent::FieldInput {
                field,
                text: value.into_text(),
            }],
            Self::Apply => vec![UiEvent::Apply],
            Self::Reset => vec![UiEvent::Reset],
            Self::ShowTabs => vec![UiEvent::ShowTabs],
            Self::CloseTabs => vec![UiEvent::CloseTabs],
            Self::SelectTab { tab } => vec![UiEvent::SelectTab(tab)],
            Self::Hotspot => vec![UiEvent::HotspotClicked],
        }
    }
}

fn broker_fields(url: Option<String>, topic: Option<String>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    if let Some(url) = url {
        events.push(UiEvent::SetBrokerUrl(url));
    }
    if let Some(topic) = topic {
        events.push(UiEvent::SetTopic(topic));
    }
    events
}

/// Run a command against the component and return the resulting snapshot
pub async fn run_command(
    component: &ComponentHandle,
    command: Command,
) -> Result<Snapshot, ComponentError> {
    debug!(?command, "Running command");
    let mut snapshot = None;
    for event in command.into_events() {
        snapshot = Some(component.dispatch(event).await?);
    }
    match snapshot {
        Some(snapshot) => Ok(snapshot),
        None => Ok(component.snapshot()),
    }
}

async fn respond(state: &AppState, command: Command) -> Response {
    match run_command(&state.component, command).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(e.to_string())),
        )
            .into_response(),
    }
}

/// Every malformed body is a 400, whether the JSON is broken or has the wrong shape
fn bad_request(rejection: JsonRejection) -> Response {
    debug!(status = %rejection.status(), "Rejected request body");
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(rejection.body_text())),
    )
        .into_response()
}

/// Get the current component snapshot
pub async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.component.snapshot())
}

/// Get the daemon configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.clone())
}

/// Broker URL / topic fields
#[derive(Debug, Default, Deserialize)]
pub struct BrokerFields {
    pub url: Option<String>,
    pub topic: Option<String>,
}

/// Edit the broker URL and topic fields
pub async fn update_broker(
    State(state): State<Arc<AppState>>,
    req: Result<Json<BrokerFields>, JsonRejection>,
) -> Response {
    let Json(req) = match req {
        Ok(req) => req,
        Err(rejection) => return bad_request(rejection),
    };
    respond(
        &state,
        Command::SetBroker {
            url: req.url,
            topic: req.topic,
        },
    )
    .await
}

/// Connect to the broker, optionally updating the fields first
///
/// The body is optional; when present it has the same shape as `PUT /api/broker`.
pub async fn connect(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let fields = if body.iter().all(u8::is_ascii_whitespace) {
        BrokerFields::default()
    } else {
        match serde_json::from_slice::<BrokerFields>(&body) {
            Ok(fields) => fields,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiError::new(format!("Invalid request body: {}", e))),
                )
                    .into_response()
            }
        }
    };

    info!(url = ?fields.url, topic = ?fields.topic, "Connect requested");
    respond(
        &state,
        Command::Connect {
            url: fields.url,
            topic: fields.topic,
        },
    )
    .await
}

/// Direct input request body
#[derive(Debug, Deserialize)]
pub struct FieldInput {
    pub value: InputValue,
}

/// Type a value into one of the nine transform inputs
pub async fn set_field(
    State(state): State<Arc<AppState>>,
    Path(field): Path<String>,
    req: Result<Json<FieldInput>, JsonRejection>,
) -> Response {
    let field: TransformField = match field.parse() {
        Ok(field) => field,
        Err(e) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiError::new(format!("{}", e))),
            )
                .into_response()
        }
    };
    let Json(req) = match req {
        Ok(req) => req,
        Err(rejection) => return bad_request(rejection),
    };
    respond(
        &state,
        Command::SetField {
            field,
            value: req.value,
        },
    )
    .await
}

/// Apply transformations: show the cube and start the animation loop
pub async fn apply(State(state): State<Arc<AppState>>) -> Response {
    respond(&state, Command::Apply).await
}

/// Reset transformations and stop the animation loop
pub async fn reset(State(state): State<Arc<AppState>>) -> Response {
    respond(&state, Command::Reset).await
}

/// Pointer entered the cube
pub async fn show_tabs(State(state): State<Arc<AppState>>) -> Response {
    respond(&state, Command::ShowTabs).await
}

pub async fn close_tabs(State(state): State<Arc<AppState>>) -> Response {
    respond(&state, Command::CloseTabs).await
}

#[derive(Debug, Deserialize)]
pub struct SelectTabRequest {
    pub tab: Tab,
}

pub async fn select_tab(
    State(state): State<Arc<AppState>>,
    req: Result<Json<SelectTabRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match req {
        Ok(req) => req,
        Err(rejection) => return bad_request(rejection),
    };
    respond(&state, Command::SelectTab { tab: req.tab }).await
}

/// Hotspot pin clicked; the message shows up in a later snapshot
pub async fn hotspot(State(state): State<Arc<AppState>>) -> Response {
    respond(&state, Command::Hotspot).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        let command: Command =
            serde_json::from_str(r#"{"command":"set_field","field":"scaleX","value":"abc"}"#)
                .unwrap();
        assert_eq!(
            command.into_events(),
            vec![UiEvent::FieldInput {
                field: TransformField::ScaleX,
                text: "abc".to_string(),
            }]
        );

        let command: Command =
            serde_json::from_str(r#"{"command":"set_field","field":"roll","value":12.5}"#).unwrap();
        assert_eq!(
            command.into_events(),
            vec![UiEvent::FieldInput {
                field: TransformField::Roll,
                text: "12.5".to_string(),
            }]
        );

        let command: Command =
            serde_json::from_str(r#"{"command":"select_tab","tab":"hotspot"}"#).unwrap();
        assert_eq!(command.into_events(), vec![UiEvent::SelectTab(Tab::Hotspot)]);
    }

    #[test]
    fn test_connect_sets_fields_first() {
        let command: Command =
            serde_json::from_str(r#"{"command":"connect","topic":"pose"}"#).unwrap();
        assert_eq!(
            command.into_events(),
            vec![UiEvent::SetTopic("pose".to_string()), UiEvent::Connect]
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"command":"tick"}"#).is_err());
        assert!(serde_json::from_str::<Command>(
            r#"{"command":"set_field","field":"w","value":"1"}"#
        )
        .is_err());
    }
}
