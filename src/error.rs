use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{0}")]
    Validation(String),

    #[error("Locator not found: {0}")]
    LocatorNotFound(String),

    #[error("Coordinates not available for locator {0}")]
    CoordinatesUnavailable(String),

    #[error("Duplicate locator id: {0}")]
    DuplicateLocator(String),

    #[error("Inbound channel {0} is assigned to more than one locator")]
    DuplicateChannel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl BridgeError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            BridgeError::Validation(_) => "INVALID_INPUT",
            BridgeError::LocatorNotFound(_) => "LOCATOR_NOT_FOUND",
            BridgeError::CoordinatesUnavailable(_) => "COORDINATES_UNAVAILABLE",
            BridgeError::DuplicateLocator(_) => "DUPLICATE_LOCATOR",
            BridgeError::DuplicateChannel(_) => "DUPLICATE_CHANNEL",
            BridgeError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// HTTP status the API answers with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Validation(_) => StatusCode::BAD_REQUEST,
            BridgeError::LocatorNotFound(_) | BridgeError::CoordinatesUnavailable(_) => {
                StatusCode::NOT_FOUND
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
