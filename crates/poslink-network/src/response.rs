//! JSON envelopes returned by the control surface.
//!
//! Every command endpoint answers with either a success envelope
//! (`{"status":"success","message":..,"data":..}`) or an error envelope
//! (`{"status":"error","message":..,"error_code":..}`). The HTTP status of an
//! error is derived from the bridge error taxonomy by [`status_for`].

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use poslink_core::Error;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// Error code for failed explicit connect/reconnect requests.
pub const RECONNECT_ERROR: &str = "RECONNECT_ERROR";

/// Success envelope for command endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Success<T> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
}

/// Build a `200 OK` success envelope.
pub fn success<T: Serialize>(message: impl Into<String>, data: T) -> Json<Success<T>> {
    Json(Success {
        status: STATUS_SUCCESS,
        message: message.into(),
        data,
    })
}

/// Error envelope body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,
}

/// HTTP status for a bridge error.
#[must_use]
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::DeviceBusy { .. } => StatusCode::CONFLICT,
        Error::DeviceUnavailable { .. } | Error::ConnectionLost(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Error::Driver { .. } => StatusCode::BAD_GATEWAY,
        Error::ShutdownTimeout { .. }
        | Error::Fatal(_)
        | Error::InvalidStateTransition { .. }
        | Error::Config(_)
        | Error::MissingConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An error answer from a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                status: STATUS_ERROR.to_string(),
                message: message.into(),
                error_code: code.into(),
                response_code: None,
            },
        }
    }

    /// Failed explicit connect or reconnect.
    pub fn reconnect(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, RECONNECT_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = status_for(&error);
        let mut api = Self::new(status, error.code(), error.to_string());
        api.body.response_code = error.response_code().map(str::to_string);
        api
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Error::invalid_input(rejection.body_text()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = %self.body.error_code, message = %self.body.message, "Request failed");
        } else {
            warn!(code = %self.body.error_code, message = %self.body.message, "Request rejected");
        }
        (self.status, Json(self.body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
