// src/parser/query.rs

//! Query strategy: transforms described by URL query parameters.

use crate::core::errors::GatewayError;
use crate::core::object::{Gravity, ImageFormat, ImageObject, Transform, TransformChain};
use std::collections::HashMap;
use std::str::FromStr;

/// Parameters that select behavior rather than describe a transform.
const CONTROL_PARAMS: [&str; 2] = ["checkParent", "debug"];

/// Parses the query string into a derived object, or `None` when it
/// describes no transform.
///
/// `operation` may appear multiple times and applies in order of
/// appearance; the remaining parameters are shared between operations. A
/// `width`/`height` pair without an explicit operation is an implicit
/// resize, and `format` always appends a final format conversion.
pub fn parse(
    bucket_name: &str,
    rest: &str,
    raw_query: &str,
) -> Result<Option<ImageObject>, GatewayError> {
    let mut params: HashMap<String, String> = HashMap::new();
    let mut operations: Vec<String> = Vec::new();

    for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
        if key == "operation" {
            operations.push(value.to_string());
        } else if !CONTROL_PARAMS.contains(&key.as_ref()) {
            params.insert(key.to_string(), value.to_string());
        }
    }

    let mut chain = TransformChain::default();
    for operation in &operations {
        chain.push(build_transform(operation, &params)?);
    }

    // No explicit operation, but dimensions given: an implicit resize.
    if operations.is_empty() && (params.contains_key("width") || params.contains_key("height")) {
        chain.push(Transform::Resize {
            width: parse_optional(&params, "width")?,
            height: parse_optional(&params, "height")?,
        });
    }

    if let Some(format) = params.get("format") {
        let format = ImageFormat::from_str(format)
            .map_err(|_| GatewayError::InvalidRequest(format!("unknown format '{format}'")))?;
        chain.push(Transform::Format { format });
    }

    if chain.is_empty() {
        return Ok(None);
    }

    let fingerprint = chain.fingerprint_hex();
    let parent = ImageObject::plain(bucket_name, rest);
    let derived_path = format!("{rest}#{fingerprint}");
    let key = format!("/{bucket_name}{derived_path}");
    Ok(Some(ImageObject::derived(key, derived_path, chain, parent)))
}

fn build_transform(
    operation: &str,
    params: &HashMap<String, String>,
) -> Result<Transform, GatewayError> {
    match operation {
        "rotate" => Ok(Transform::Rotate {
            angle: parse_required(params, "angle")?,
        }),
        "blur" => Ok(Transform::Blur {
            sigma: parse_required(params, "sigma")?,
        }),
        "grayscale" => Ok(Transform::Grayscale),
        "resize" => {
            let width = parse_optional(params, "width")?;
            let height = parse_optional(params, "height")?;
            if width.is_none() && height.is_none() {
                return Err(GatewayError::InvalidRequest(
                    "resize requires width or height".to_string(),
                ));
            }
            Ok(Transform::Resize { width, height })
        }
        "crop" => Ok(Transform::Crop {
            width: parse_required(params, "width")?,
            height: parse_required(params, "height")?,
            gravity: match params.get("gravity") {
                Some(gravity) => Gravity::from_str(gravity).map_err(|_| {
                    GatewayError::InvalidRequest(format!("unknown gravity '{gravity}'"))
                })?,
                None => Gravity::default(),
            },
        }),
        "extract" => Ok(Transform::Extract {
            x: parse_required(params, "x")?,
            y: parse_required(params, "y")?,
            width: parse_required(params, "width")?,
            height: parse_required(params, "height")?,
        }),
        "resizeCropAuto" | "resize-crop-auto" => Ok(Transform::ResizeCropAuto {
            width: parse_required(params, "width")?,
            height: parse_required(params, "height")?,
        }),
        "watermark" => Ok(Transform::Watermark {
            image: params
                .get("image")
                .cloned()
                .ok_or_else(|| missing_param("watermark", "image"))?,
            position: params
                .get("position")
                .cloned()
                .unwrap_or_else(|| "center-center".to_string()),
            opacity: match params.get("opacity") {
                Some(raw) => parse_value("opacity", raw)?,
                None => 1.0,
            },
        }),
        other => Err(GatewayError::InvalidRequest(format!(
            "unknown operation '{other}'"
        ))),
    }
}

fn parse_required<T: FromStr>(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<T, GatewayError> {
    let raw = params
        .get(name)
        .ok_or_else(|| missing_param("operation", name))?;
    parse_value(name, raw)
}

fn parse_optional<T: FromStr>(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, GatewayError> {
    match params.get(name) {
        Some(raw) => parse_value(name, raw).map(Some),
        None => Ok(None),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, GatewayError> {
    raw.parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("invalid value '{raw}' for '{name}'")))
}

fn missing_param(operation: &str, name: &str) -> GatewayError {
    GatewayError::InvalidRequest(format!("{operation} requires parameter '{name}'"))
}
