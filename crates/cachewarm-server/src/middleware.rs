use std::{net::IpAddr, sync::Arc};

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use cachewarm_core::AppConfig;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Who may see run reports.
///
/// A caller is trusted when remote debug is enabled, when its address is on
/// the allowlist, or when it presents the configured bearer token.
#[derive(Debug, Clone)]
pub struct DebugAccess {
    remote: bool,
    allowlist: Arc<Vec<IpAddr>>,
    token: Option<Arc<str>>,
}

impl DebugAccess {
    #[must_use]
    pub fn new(remote: bool, allowlist: Vec<IpAddr>, token: Option<String>) -> Self {
        Self {
            remote,
            allowlist: Arc::new(allowlist),
            token: token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.debug_remote,
            config.debug_allowlist.clone(),
            config.debug_token.clone(),
        )
    }

    pub fn is_trusted(&self, peer: IpAddr, headers: &HeaderMap) -> bool {
        if self.remote {
            return true;
        }
        let peer = peer.to_canonical();
        if self.allowlist.iter().any(|ip| ip.to_canonical() == peer) {
            return true;
        }
        match (&self.token, extract_bearer_token(headers.get(AUTHORIZATION))) {
            (Some(expected), Some(given)) => given.as_bytes().ct_eq(expected.as_bytes()).into(),
            _ => false,
        }
    }
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}
