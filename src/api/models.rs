use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::ChannelState;
use crate::error::BridgeError;
use crate::registry::MessageSnapshot;

/// API error response
#[derive(Serialize)]
pub struct ApiError {
    pub detail: String,
    pub code: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (
            self.status_code(),
            Json(ApiError {
                detail: self.to_string(),
                code: self.to_error_code().to_string(),
            }),
        )
            .into_response()
    }
}

/// One row of `GET /messages`
#[derive(Debug, Serialize)]
pub struct MessageEntry {
    pub id: String,
    pub topic: String,
    #[serde(rename = "mensaje")]
    pub message: Vec<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    #[serde(rename = "desbloquear")]
    pub unlock_requested: bool,
}

impl From<MessageSnapshot> for MessageEntry {
    fn from(snapshot: MessageSnapshot) -> Self {
        Self {
            id: snapshot.id,
            topic: snapshot.topic,
            message: snapshot.message,
            lat: snapshot.lat,
            lng: snapshot.lng,
            unlock_requested: snapshot.unlock_requested,
        }
    }
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageEntry>,
}

#[derive(Serialize)]
pub struct LocatorsResponse {
    #[serde(rename = "localizadores")]
    pub locators: Vec<String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub message: String,
    pub channel: ChannelState,
    pub channel_since: DateTime<Utc>,
    pub time: String,
}

/// Body of `POST /destino/{id}`
///
/// `destino` is kept loose so shape problems surface as validation errors
/// rather than extractor rejections.
#[derive(Debug, Deserialize)]
pub struct DestinationRequest {
    #[serde(rename = "destino", default)]
    pub destination: Option<Value>,
    #[serde(rename = "codigo", default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DestinationResponse {
    pub message: String,
    pub published: bool,
    pub topic: String,
    pub payload: String,
}

/// Body of `GET /destino/{id}`
#[derive(Debug, Serialize)]
pub struct DestinationView {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(rename = "codigo")]
    pub code: String,
}
