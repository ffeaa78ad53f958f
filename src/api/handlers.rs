use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::{IntoResponse, Json},
};
use serde_json::Value;

use super::models::*;
use super::server::AppState;
use crate::command::{encode_destination, Destination};
use crate::error::{BridgeError, Result};
use crate::locator::Coordinates;

/// Last raw message of every locator that has reported
pub async fn list_messages(State(state): State<AppState>) -> Json<MessagesResponse> {
    let messages = state
        .registry
        .snapshot_for_query()
        .await
        .into_iter()
        .map(MessageEntry::from)
        .collect();
    Json(MessagesResponse { messages })
}

/// Last known coordinates of one locator
pub async fn get_coordinates(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Coordinates>> {
    let entry = state
        .registry
        .find_by_id(&id)
        .ok_or_else(|| BridgeError::LocatorNotFound(id.clone()))?;

    let coordinates = entry.coordinates().await;
    // Telemetry never stores empty halves, but `set_coordinates` accepts anything
    if coordinates.lat.is_empty() || coordinates.lng.is_empty() {
        return Err(BridgeError::CoordinatesUnavailable(id));
    }
    tracing::debug!(locator_id = %id, lat = %coordinates.lat, lng = %coordinates.lng, "Coordinates served");
    Ok(Json(coordinates))
}

pub async fn list_locators(State(state): State<AppState>) -> Json<LocatorsResponse> {
    Json(LocatorsResponse {
        locators: state.registry.list_ids(),
    })
}

/// Liveness marker
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let channel = state.channel.status().await;
    Json(StatusResponse {
        message: "API running".to_string(),
        channel: channel.state,
        channel_since: channel.since,
        time: chrono::Utc::now().to_rfc3339(),
    })
}

/// Current destination and display code of one locator
pub async fn get_destination(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DestinationView>> {
    let entry = state
        .registry
        .find_by_id(&id)
        .ok_or_else(|| BridgeError::LocatorNotFound(id.clone()))?;

    let view = entry.view().await;
    Ok(Json(DestinationView {
        lat: view.state.destination.lat,
        lng: view.state.destination.lng,
        code: view.state.display_code,
    }))
}

/// Set a locator's destination and push the command frame to the device
///
/// Input is validated before the locator is looked up, so a bad body answers
/// 400 even for unknown ids.
pub async fn set_destination(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<DestinationRequest>, JsonRejection>,
) -> Result<Json<DestinationResponse>> {
    let Json(request) =
        body.map_err(|e| BridgeError::Validation(format!("Invalid request body: {}", e.body_text())))?;
    let (destination, code) = validate_destination_request(&request)?;

    let entry = state
        .registry
        .find_by_id(&id)
        .ok_or_else(|| BridgeError::LocatorNotFound(id.clone()))?;

    entry
        .assign_destination(&code, destination.lat, destination.lng)
        .await;

    let payload = encode_destination(&code, &destination);
    let published = state.channel.publish(&state.command_topic, &payload).await;
    crate::log_locator_operation!("set_destination", id, payload);

    Ok(Json(DestinationResponse {
        message: format!("Destination updated for locator {}", id),
        published,
        topic: state.command_topic.to_string(),
        payload,
    }))
}

fn validate_destination_request(request: &DestinationRequest) -> Result<(Destination, String)> {
    let Some(Value::Object(destination)) = &request.destination else {
        return Err(BridgeError::Validation("Invalid destination".into()));
    };

    let (Some(lat), Some(lng)) = (
        parse_coordinate(destination.get("lat")),
        parse_coordinate(destination.get("lng")),
    ) else {
        return Err(BridgeError::Validation("lat/lng must be numeric".into()));
    };

    let destination = Destination::new(lat, lng)?;

    let code = request.code.as_deref().unwrap_or("").trim();
    if code.is_empty() {
        return Err(BridgeError::Validation("codigo must not be empty".into()));
    }

    Ok((destination, code.to_string()))
}

/// Accept JSON numbers and numeric strings
fn parse_coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 404 Not Found handler
pub async fn not_found_handler() -> impl IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(ApiError {
            detail: "Not found".to_string(),
            code: "NOT_FOUND".to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> DestinationRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_accepts_numbers_and_strings() {
        let (destination, code) = validate_destination_request(&request(json!({
            "destino": {"lat": "10.5", "lng": -79.25},
            "codigo": "  42 "
        })))
        .unwrap();
        assert_eq!(destination, Destination::new(10.5, -79.25).unwrap());
        assert_eq!(code, "42");
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let cases = [
            json!({"codigo": "42"}),
            json!({"destino": [1, 2], "codigo": "42"}),
            json!({"destino": {"lat": "x", "lng": 1}, "codigo": "42"}),
            json!({"destino": {"lat": true, "lng": 1}, "codigo": "42"}),
            json!({"destino": {"lat": 1}, "codigo": "42"}),
            json!({"destino": {"lat": 91, "lng": 1}, "codigo": "42"}),
            json!({"destino": {"lat": 1, "lng": -181}, "codigo": "42"}),
            json!({"destino": {"lat": 1, "lng": 1}, "codigo": "   "}),
            json!({"destino": {"lat": 1, "lng": 1}}),
        ];
        for case in cases {
            let err = validate_destination_request(&request(case.clone())).unwrap_err();
            assert!(
                matches!(err, BridgeError::Validation(_)),
                "expected validation error for {case}"
            );
        }
    }
}
