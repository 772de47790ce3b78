//! HTTP publish adapters
//!
//! Each route shape is a thin translator into a [`PublishRequest`]; all of
//! them share [`respond`] for the outcome.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use herald_core::{ErrorKind, Payload, PublishRequest};
use tracing::debug;

use crate::auth::header_str;
use crate::server::GatewayState;

pub const CHANNEL_NAME_HEADER: &str = "x-channelname";
pub const CHANNEL_TOKEN_HEADER: &str = "x-channeltoken";

/// `GET /send/{name}/{token}/{data}`: data may be base64
pub fn from_path(name: String, token: String, data: String) -> PublishRequest {
    PublishRequest {
        channel: name,
        token,
        payload: Payload::Encoded(data),
    }
}

/// `POST /send/{name}/{token}`: body is the literal message
pub fn from_path_and_body(name: String, token: String, body: &[u8]) -> PublishRequest {
    PublishRequest {
        channel: name,
        token,
        payload: Payload::Raw(String::from_utf8_lossy(body).into_owned()),
    }
}

/// `POST /send`: name and token in headers, body is the literal message
pub fn from_headers(headers: &HeaderMap, body: &[u8]) -> PublishRequest {
    PublishRequest {
        channel: header_str(headers, CHANNEL_NAME_HEADER).unwrap_or_default().to_string(),
        token: header_str(headers, CHANNEL_TOKEN_HEADER).unwrap_or_default().to_string(),
        payload: Payload::Raw(String::from_utf8_lossy(body).into_owned()),
    }
}

pub(crate) async fn publish_path_handler(
    State(state): State<GatewayState>,
    Path((name, token, data)): Path<(String, String, String)>,
) -> Response {
    respond(&state, from_path(name, token, data)).await
}

pub(crate) async fn publish_body_handler(
    State(state): State<GatewayState>,
    Path((name, token)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    respond(&state, from_path_and_body(name, token, &body)).await
}

pub(crate) async fn publish_header_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(&state, from_headers(&headers, &body)).await
}

/// Run the publish and map the outcome onto a plain-text response
async fn respond(state: &GatewayState, req: PublishRequest) -> Response {
    debug!("Publish request for channel {:?}", req.channel);
    match state.publisher.publish(req).await {
        Ok(receipt) => (StatusCode::OK, receipt.to_string()).into_response(),
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Validation | ErrorKind::Authorization | ErrorKind::StateConflict => {
                    StatusCode::BAD_REQUEST
                }
            };
            (status, e.to_string()).into_response()
        }
    }
}
