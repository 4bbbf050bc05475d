use serde::Serialize;
use std::convert::Infallible;

use warp::{reject, Filter, Rejection, Reply};

use crate::cover_orchestrator::{CoverError, CoverOrchestrator};
use crate::image_store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub timestamp: String,
}

#[derive(Debug)]
pub struct ValidationError {
    pub message: String,
}

impl reject::Reject for ValidationError {}

#[derive(Debug)]
pub struct UnauthorizedError;
impl reject::Reject for UnauthorizedError {}

/// Image store or blob uploader failed while serving the request.
#[derive(Debug)]
pub struct UpstreamError {
    pub message: String,
}

impl reject::Reject for UpstreamError {}

#[derive(Debug)]
pub struct InternalError {
    pub message: String,
}

impl reject::Reject for InternalError {}

/// Maps orchestration failures onto the matching rejection.
pub fn cover_rejection(error: CoverError) -> Rejection {
    match error {
        CoverError::Store(StoreError::Unauthorized) => reject::custom(UnauthorizedError),
        CoverError::Store(e) => reject::custom(UpstreamError {
            message: format!("Image store error: {}", e),
        }),
        CoverError::Upload(e) => reject::custom(UpstreamError {
            message: format!("Upload failed: {}", e),
        }),
        CoverError::Collage(e) => reject::custom(InternalError {
            message: format!("Collage generation failed: {}", e),
        }),
    }
}

pub fn with_orchestrator(
    orchestrator: CoverOrchestrator,
) -> impl Filter<Extract = (CoverOrchestrator,), Error = Infallible> + Clone {
    warp::any().map(move || orchestrator.clone())
}

/// Extracts the bearer credential, rejecting requests without one.
pub fn with_credential() -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(
        |header: Option<String>| async move {
            header
                .as_deref()
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .ok_or_else(|| reject::custom(UnauthorizedError))
        },
    )
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;
    let timestamp = chrono::Utc::now().to_rfc3339();

    if err.is_not_found() {
        code = warp::http::StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(validation_error) = err.find::<ValidationError>() {
        code = warp::http::StatusCode::BAD_REQUEST;
        message = validation_error.message.clone();
    } else if err.find::<UnauthorizedError>().is_some() {
        code = warp::http::StatusCode::UNAUTHORIZED;
        message = "Missing or rejected bearer credential".to_string();
    } else if let Some(upstream_error) = err.find::<UpstreamError>() {
        code = warp::http::StatusCode::BAD_GATEWAY;
        message = upstream_error.message.clone();
    } else if let Some(internal_error) = err.find::<InternalError>() {
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = internal_error.message.clone();
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        code = warp::http::StatusCode::PAYLOAD_TOO_LARGE;
        message = "Payload too large".to_string();
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        code = warp::http::StatusCode::UNSUPPORTED_MEDIA_TYPE;
        message = "Unsupported media type".to_string();
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        code = warp::http::StatusCode::BAD_REQUEST;
        message = "Invalid JSON body".to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = warp::http::StatusCode::METHOD_NOT_ALLOWED;
        message = "Method not allowed".to_string();
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        code = warp::http::StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal server error".to_string();
    }

    let error_response = ErrorResponse {
        error: message,
        code: code.as_u16(),
        timestamp,
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&error_response),
        code,
    ))
}

pub fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
}
