// src/server/handlers.rs

//! The axum request handler: URL parsing, S3-style bucket endpoints,
//! dispatch and response conversion.

use crate::core::Response as CoreResponse;
use crate::core::coordinator::{GatewayRequest, ListQuery};
use crate::core::deadline::Deadline;
use crate::core::response::Body as CoreBody;
use crate::parser;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response as AxumResponse;
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderValue, Method, StatusCode, header};
use std::sync::Arc;
use tracing::warn;

/// Upper bound on PUT bodies read into memory.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// The literal S3 `GET /?location` answer.
const LOCATION_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
    <LocationConstraint xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">EU</LocationConstraint>";

/// Handles every route: object GET/HEAD/PUT/DELETE plus the bucket-level
/// S3 endpoints.
pub async fn handle(State(state): State<Arc<AppState>>, request: Request) -> AxumResponse {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let raw_query = parts.uri.query().unwrap_or("").to_string();

    for hook in &state.hooks {
        hook.pre_process(&parts);
    }

    let object = match parser::parse_request(&state.config, &parts.method, &path, &raw_query) {
        Ok(object) => object,
        Err(e) => return finish(&state, &parts, CoreResponse::from_error(e)),
    };

    // `GET /bucket?location` answers without touching the coordinator.
    if object.is_bucket_root() && parts.method == Method::GET && has_param(&raw_query, "location")
    {
        let response = CoreResponse::buffered(200, Bytes::from_static(LOCATION_XML.as_bytes()))
            .with_content_type("application/xml");
        return finish(&state, &parts, response);
    }

    let body_bytes = if parts.method == Method::PUT {
        match axum::body::to_bytes(body, MAX_UPLOAD_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read PUT body for '{path}': {e}");
                return finish(
                    &state,
                    &parts,
                    CoreResponse::from_error(crate::GatewayError::InvalidRequest(
                        "unreadable request body".to_string(),
                    )),
                );
            }
        }
    } else {
        Bytes::new()
    };

    let list = object.is_bucket_root().then(|| parse_list_query(&raw_query));
    let gateway_request = GatewayRequest {
        method: parts.method.clone(),
        object,
        headers: parts.headers.clone(),
        body: body_bytes,
        list,
    };

    let deadline = Deadline::after(state.config.server.request_timeout);
    let mut response = state.dispatcher.submit(gateway_request, deadline).await;

    response = revalidate(&parts, response);
    finish(&state, &parts, response)
}

/// Serves a 304 when the client's `If-None-Match` matches the response ETag.
fn revalidate(parts: &Parts, response: CoreResponse) -> CoreResponse {
    if parts.method != Method::GET && parts.method != Method::HEAD {
        return response;
    }
    if response.status != 200 {
        return response;
    }
    let matches = match (
        parts
            .headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok()),
        response.etag(),
    ) {
        (Some(candidate), Some(etag)) => candidate
            .split(',')
            .any(|part| part.trim() == etag || part.trim() == "*"),
        _ => false,
    };
    if !matches {
        return response;
    }
    let mut not_modified = CoreResponse::empty(304);
    not_modified.headers = response.headers.clone();
    not_modified.headers.remove(header::CONTENT_LENGTH);
    not_modified
}

/// Runs post-process hooks and converts to the framework response.
fn finish(state: &AppState, parts: &Parts, mut response: CoreResponse) -> AxumResponse {
    for hook in &state.hooks {
        hook.post_process(&mut response);
    }
    into_axum(response, parts.method == Method::HEAD)
}

fn into_axum(response: CoreResponse, is_head: bool) -> AxumResponse {
    let content_length = response.content_length();
    let (status, headers, _error, body) = response.into_parts();

    let status =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let axum_body = if is_head || status == StatusCode::NOT_MODIFIED {
        Body::empty()
    } else {
        match body {
            CoreBody::Buffered(bytes) => Body::from(bytes),
            CoreBody::Stream(stream) => Body::from_stream(stream),
        }
    };

    let mut out = AxumResponse::new(axum_body);
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    // HEAD responses from storage already advertise the object size; only
    // fill in the length when no backend provided one.
    if status != StatusCode::NOT_MODIFIED && !out.headers().contains_key(header::CONTENT_LENGTH) {
        if let Some(length) = content_length {
            out.headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }
    }
    out
}

fn has_param(raw_query: &str, name: &str) -> bool {
    url::form_urlencoded::parse(raw_query.as_bytes()).any(|(key, _)| key == name)
}

/// Extracts S3 listing parameters from the query string.
fn parse_list_query(raw_query: &str) -> ListQuery {
    let mut query = ListQuery::default();
    for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
        match key.as_ref() {
            "prefix" => query.prefix = value.to_string(),
            "delimiter" if !value.is_empty() => query.delimiter = Some(value.to_string()),
            "marker" => query.marker = value.to_string(),
            "max-keys" => {
                if let Ok(max_keys) = value.parse() {
                    query.max_keys = max_keys;
                }
            }
            _ => {}
        }
    }
    query
}
