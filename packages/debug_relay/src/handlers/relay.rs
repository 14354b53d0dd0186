use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::debug;

use crate::AppState;
use crate::dispatcher::{Delivery, Payload, PendingResponse};
use crate::error::RelayError;
use crate::identity::{self, RequestIdentity};
use crate::protocol::{Operation, Reply};
use crate::session::{Peer, Session};

/// Serves the six relay endpoints under `/mobile/` and `/desktop/`.
///
/// The body is parsed before identity resolution, so a malformed request
/// neither creates a session nor touches a dispatcher.
pub async fn relay_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, RelayError> {
    let (parts, body) = request.into_parts();
    let operation = Operation::from_path(parts.uri.path()).ok_or(RelayError::NotFound)?;

    let mut payload = read_payload(&parts.method, body, state.config.max_body_bytes).await?;

    let identity = RequestIdentity::from_parts(&parts);
    loop {
        let session = identity::resolve(&state.registry, &identity, operation.origin()).await;
        debug!(
            target_id = session.target_id(),
            path = parts.uri.path(),
            "Relay request"
        );

        match operation.apply(&session, payload).await {
            Reply::Ack => return Ok(Json(serde_json::json!({})).into_response()),
            Reply::Hold(peer, pending) => {
                return Ok(hold(&session, peer, pending, state.config.long_poll_timeout).await);
            }
            Reply::Retired(returned) => {
                debug!(
                    target_id = session.target_id(),
                    "Session evicted mid-request, resolving again"
                );
                payload = returned;
            }
        }
    }
}

async fn read_payload(method: &Method, body: Body, limit: usize) -> Result<Payload, RelayError> {
    if method != Method::POST {
        return Ok(None);
    }
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| RelayError::BodyUnreadable(e.to_string()))?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Wait for the dispatcher to complete a held request. With a timeout, an
/// expired poll withdraws itself and answers empty, unless a message raced
/// in before the withdrawal.
async fn hold(
    session: &Session,
    peer: Peer,
    mut pending: PendingResponse,
    timeout: Option<Duration>,
) -> Response {
    let delivery = match timeout {
        None => pending.recv().await,
        Some(limit) => {
            let outcome = tokio::time::timeout(limit, pending.recv()).await;
            match outcome {
                Ok(delivery) => delivery,
                Err(_) => {
                    let withdrawn = session
                        .channels()
                        .await
                        .for_peer(peer)
                        .cancel(pending.id());
                    debug!(
                        target_id = session.target_id(),
                        ?peer,
                        withdrawn,
                        "Long poll timed out"
                    );
                    pending.try_recv().unwrap_or(Delivery::Closed)
                }
            }
        }
    };
    delivery_response(delivery)
}

fn delivery_response(delivery: Delivery) -> Response {
    match delivery {
        Delivery::Message(Some(value)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            value.to_string(),
        )
            .into_response(),
        Delivery::Message(None) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
        )
            .into_response(),
        Delivery::Closed => StatusCode::OK.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::long_poll;
    use crate::test_helpers::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn target_uri(path: &str) -> String {
        format!("{}?targetId={}", path, MOBILE_TARGET)
    }

    #[tokio::test]
    async fn test_console_then_desktop_incoming() {
        let (state, _tmp) = test_app_state();
        let app = crate::app(state.clone());

        let resp = app
            .clone()
            .oneshot(mobile_request("POST", "/mobile/console", Some(r#"{"msg":"hi"}"#)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, json!({}));

        let session = state.registry.get(MOBILE_TARGET).await.unwrap();
        assert_eq!(session.snapshot().await.desktop_queued, 1);

        let resp = app
            .oneshot(request("GET", &target_uri("/desktop/incoming"), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, json!({"msg": "hi"}));
        assert_eq!(session.snapshot().await.desktop_queued, 0);
    }

    #[tokio::test]
    async fn test_held_mobile_poll_receives_command() {
        let (state, _tmp) = test_app_state();
        let app = crate::app(state.clone());

        let held = tokio::spawn(
            app.clone()
                .oneshot(mobile_request("GET", "/mobile/incoming", None)),
        );
        wait_for_target(&state, MOBILE_TARGET, |s| s.mobile_waiting).await;

        let resp = app
            .oneshot(request(
                "POST",
                &target_uri("/desktop/outgoing"),
                Some(r#"{"cmd":"step"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = held.await.unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, json!({"cmd": "step"}));
    }

    #[tokio::test]
    async fn test_init_closes_previous_poll_and_drops_backlog() {
        let (state, _tmp) = test_app_state();
        let app = crate::app(state.clone());

        let old_poll = tokio::spawn(
            app.clone()
                .oneshot(mobile_request("GET", "/mobile/incoming", None)),
        );
        wait_for_target(&state, MOBILE_TARGET, |s| s.mobile_waiting).await;
        app.clone()
            .oneshot(mobile_request("POST", "/mobile/console", Some(r#""stale""#)))
            .await
            .unwrap();

        let init_poll = tokio::spawn(app.clone().oneshot(mobile_request(
            "POST",
            "/mobile/init",
            Some(r#"{"generation":2}"#),
        )));

        // The superseded poll completes empty.
        let resp = old_poll.await.unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_bytes(resp).await.is_empty());

        wait_for_target(&state, MOBILE_TARGET, |s| s.mobile_waiting).await;

        // Desktop only sees the init notification.
        let resp = app
            .clone()
            .oneshot(request("GET", &target_uri("/desktop/incoming"), None))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, json!({"generation": 2}));

        // First command of the new generation reaches the init poll.
        app.oneshot(request(
            "POST",
            &target_uri("/desktop/outgoing"),
            Some(r#"{"cmd":"resume"}"#),
        ))
        .await
        .unwrap();
        let resp = init_poll.await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, json!({"cmd": "resume"}));
    }

    #[tokio::test]
    async fn test_breakpoint_holds_until_command() {
        let (state, _tmp) = test_app_state();
        let app = crate::app(state.clone());

        let held = tokio::spawn(app.clone().oneshot(mobile_request(
            "POST",
            "/mobile/breakpoint",
            Some(r#"{"file":"app.js","line":3}"#),
        )));
        wait_for_target(&state, MOBILE_TARGET, |s| {
            s.mobile_waiting && s.desktop_queued == 1
        })
        .await;

        app.oneshot(request(
            "POST",
            &target_uri("/desktop/outgoing"),
            Some(r#"{"cmd":"continue"}"#),
        ))
        .await
        .unwrap();
        let resp = held.await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, json!({"cmd": "continue"}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected_without_side_effects() {
        let (state, _tmp) = test_app_state();
        let app = crate::app(state.clone());

        let resp = app
            .clone()
            .oneshot(mobile_request("POST", "/mobile/console", Some("{not json")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.registry.is_empty().await);

        let resp = app
            .oneshot(mobile_request("POST", "/mobile/console", Some("")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unidentified_desktop_traffic_uses_default_session() {
        let (state, _tmp) = test_app_state();
        let app = crate::app(state.clone());

        app.oneshot(request(
            "POST",
            "/desktop/outgoing",
            Some(r#"{"cmd":"pause"}"#),
        ))
        .await
        .unwrap();

        assert!(state.registry.is_empty().await);
        let default = state.registry.default_session().snapshot().await;
        assert_eq!(default.mobile_queued, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_times_out_empty() {
        let (state, _tmp) = test_app_state_with(|fc| fc.relay.long_poll_timeout_secs = 5);
        let app = crate::app(state.clone());

        let resp = app
            .oneshot(request("GET", "/desktop/incoming", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_bytes(resp).await.is_empty());

        let default = state.registry.default_session().snapshot().await;
        assert!(!default.desktop_waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_poll_leaves_later_messages_queued() {
        let (state, _tmp) = test_app_state_with(|fc| fc.relay.long_poll_timeout_secs = 5);
        let app = crate::app(state.clone());

        let resp = app
            .clone()
            .oneshot(mobile_request("GET", "/mobile/incoming", None))
            .await
            .unwrap();
        assert!(body_bytes(resp).await.is_empty());

        app.clone()
            .oneshot(request(
                "POST",
                &target_uri("/desktop/outgoing"),
                Some(r#"{"cmd":"step"}"#),
            ))
            .await
            .unwrap();
        let session = state.registry.get(MOBILE_TARGET).await.unwrap();
        let snap = session.snapshot().await;
        assert_eq!(snap.mobile_queued, 1);
        assert!(!snap.mobile_waiting);

        let resp = app
            .oneshot(mobile_request("GET", "/mobile/incoming", None))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, json!({"cmd": "step"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_racing_the_timeout_is_delivered() {
        let session = Arc::new(Session::new("racy", Utc::now()));
        let (client, pending) = long_poll();
        session.channels().await.desktop.set_client(client);

        // Hold the channels so the expired poll cannot withdraw itself yet.
        let mut channels = session.channels().await;
        let held = tokio::spawn({
            let session = session.clone();
            async move {
                hold(&session, Peer::Desktop, pending, Some(Duration::from_secs(5))).await
            }
        });
        tokio::time::sleep(Duration::from_secs(10)).await;

        channels.desktop.add_message(Some(json!({"event": "late"})));
        drop(channels);

        let resp = held.await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json, json!({"event": "late"}));

        let snap = session.snapshot().await;
        assert_eq!(snap.desktop_queued, 0);
        assert!(!snap.desktop_waiting);
    }

    #[tokio::test]
    async fn test_evicted_target_is_recreated_on_next_request() {
        let (state, _tmp) = test_app_state();
        let app = crate::app(state.clone());

        app.clone()
            .oneshot(mobile_request("POST", "/mobile/console", Some(r#""before""#)))
            .await
            .unwrap();
        let before = state.registry.get(MOBILE_TARGET).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let evicted = state.registry.evict_idle(Duration::ZERO).await;
        assert_eq!(evicted, vec![MOBILE_TARGET]);
        assert!(before.channels().await.is_retired());

        app.oneshot(mobile_request("POST", "/mobile/console", Some(r#""after""#)))
            .await
            .unwrap();
        let after = state.registry.get(MOBILE_TARGET).await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.snapshot().await.desktop_queued, 1);
    }

    #[test]
    fn test_delivery_response_shapes() {
        let resp = delivery_response(Delivery::Closed);
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(header::CONTENT_TYPE).is_none());

        let resp = delivery_response(Delivery::Message(None));
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    }
}
