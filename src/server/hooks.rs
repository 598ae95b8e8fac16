// src/server/hooks.rs

//! Pre/post-processing hooks run by the request handler around coordination.

use crate::config::HeaderOverride;
use crate::core::Response;
use http::request::Parts;
use http::{HeaderName, HeaderValue};
use tracing::warn;

/// A plugin hook invoked before parsing and after coordination.
pub trait RequestHook: Send + Sync {
    fn pre_process(&self, _parts: &Parts) {}
    fn post_process(&self, _response: &mut Response) {}
}

/// Applies the configured per-status response header overrides.
pub struct HeaderOverrideHook {
    overrides: Vec<(Vec<u16>, Vec<(HeaderName, HeaderValue)>)>,
}

impl HeaderOverrideHook {
    /// Compiles the config table once; malformed names or values are
    /// dropped with a warning instead of failing startup.
    pub fn from_config(config: &[HeaderOverride]) -> Self {
        let mut overrides = Vec::new();
        for entry in config {
            let mut values = Vec::new();
            for (name, value) in &entry.values {
                match (
                    name.parse::<HeaderName>(),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => values.push((name, value)),
                    _ => warn!("Ignoring invalid header override '{name}: {value}'"),
                }
            }
            if !values.is_empty() {
                overrides.push((entry.status_codes.clone(), values));
            }
        }
        Self { overrides }
    }
}

impl RequestHook for HeaderOverrideHook {
    fn post_process(&self, response: &mut Response) {
        for (status_codes, values) in &self.overrides {
            if status_codes.contains(&response.status) {
                for (name, value) in values {
                    response.headers.insert(name.clone(), value.clone());
                }
            }
        }
    }
}
