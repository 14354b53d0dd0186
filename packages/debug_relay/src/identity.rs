use axum::extract::{ConnectInfo, Query};
use axum::http::{HeaderMap, request::Parts};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::protocol::Origin;
use crate::registry::SessionRegistry;
use crate::session::Session;

const UNKNOWN: &str = "unknown";

#[derive(Deserialize)]
struct TargetQuery {
    #[serde(rename = "targetId")]
    target_id: Option<String>,
}

/// The parts of a request that identity resolution looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub target_id: Option<String>,
    pub client_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestIdentity {
    pub fn from_parts(parts: &Parts) -> Self {
        let target_id = Query::<TargetQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.target_id)
            .filter(|id| !id.is_empty());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        Self {
            target_id,
            client_addr: client_addr(&parts.headers, peer),
            user_agent: parts
                .headers
                .get(axum::http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    /// `<address>-<user agent>`, whitespace in the user agent replaced by `-`.
    pub fn fingerprint(&self) -> String {
        fingerprint(
            self.client_addr.as_deref().unwrap_or(UNKNOWN),
            self.user_agent.as_deref().unwrap_or(UNKNOWN),
        )
    }
}

pub fn fingerprint(client_addr: &str, user_agent: &str) -> String {
    let normalized: String = user_agent
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    format!("{client_addr}-{normalized}")
}

fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Pick the session a request belongs to:
///
/// 1. an explicit `targetId` that is already known,
/// 2. for mobile-origin requests, the address/user-agent fingerprint
///    (creating the session on first contact),
/// 3. otherwise the shared default session.
pub async fn resolve(
    registry: &SessionRegistry,
    identity: &RequestIdentity,
    origin: Origin,
) -> Arc<Session> {
    if let Some(target_id) = identity.target_id.as_deref() {
        if let Some(session) = registry.get(target_id).await {
            return session;
        }
    }

    match origin {
        Origin::Mobile => registry.get_or_create(&identity.fingerprint()).await,
        Origin::Desktop => registry.default_session(),
    }
}
