use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::extract::{credential, credential_fingerprint, model_name, wants_stream};
use crate::audit::{AuditOutcome, BlockReason, decide, extract_audit_text, is_greeting, should_audit};
use crate::ban::{BanStatus, ViolationOutcome};
use crate::config::SiteConfig;
use crate::error::ProxyError;
use crate::forward::ForwardBody;
use crate::metrics::{AUDIT_BLOCKED, AUDIT_DEGRADED, BANNED, GREETING_TOTAL, RATE_LIMITED, REQUEST_TOTAL};
use crate::notify::{NoticeContext, ViolationNotice};
use crate::greeting::greeting_response;
use crate::router::{ResolvedRoute, parse_proxy_path, resolve};
use crate::state::AppState;

// Fallback handler: everything that is not "/" or "/metrics" lands here
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ProxyError> {
    let parsed = parse_proxy_path(uri.path(), &state.prefix)
        .ok_or_else(|| ProxyError::RouteNotFound(uri.path().to_string()))?;
    let route = resolve(parsed, &state.routes)?;

    REQUEST_TOTAL.inc();

    if !state.store.try_admit(&route.origin, &route.site) {
        RATE_LIMITED.inc();
        info!(origin = %route.origin, limit = route.site.rate_limit, "rate limited");
        return Err(ProxyError::RateLimited {
            origin: route.origin.clone(),
        });
    }

    let caller = credential(&headers);
    if let BanStatus::Banned { remaining_minutes } =
        state.store.check_ban(&route.origin, &caller, &route.site)
    {
        BANNED.inc();
        info!(
            origin = %route.origin,
            caller = %credential_fingerprint(&caller),
            remaining_minutes,
            "rejected banned caller"
        );
        return Err(ProxyError::Banned { remaining_minutes });
    }

    let target = route.target_url(uri.query());

    if !should_audit(&route.sub_path, &method, &route.site) {
        return state
            .forwarder
            .forward(method, &target, &headers, ForwardBody::Streaming(body))
            .await;
    }

    // audited: the body is read once and replayed upstream from memory
    let bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| ProxyError::Internal(format!("reading request body: {}", e)))?;
    let payload: Value = serde_json::from_slice(&bytes)
        .map_err(|e| ProxyError::Internal(format!("request body is not JSON: {}", e)))?;

    if is_greeting(&payload, &route.site.audit_parameter) {
        GREETING_TOTAL.inc();
        debug!(origin = %route.origin, "answered greeting locally");
        return Ok(greeting_response(model_name(&payload), wants_stream(&payload)));
    }

    let text = extract_audit_text(&payload, &route.site.audit_parameter);
    if text.is_empty() {
        debug!(origin = %route.origin, "nothing to audit");
        return forward_buffered(&state, method, &target, &headers, bytes).await;
    }

    let verdict = match &state.classifier {
        Some(classifier) => classifier.classify(&text).await,
        None => None,
    };

    match decide(verdict.as_ref()) {
        AuditOutcome::Allow => forward_buffered(&state, method, &target, &headers, bytes).await,
        AuditOutcome::Degraded { cause } => {
            AUDIT_DEGRADED.inc();
            warn!(origin = %route.origin, ?cause, "audit inconclusive, forwarding");
            forward_buffered(&state, method, &target, &headers, bytes).await
        }
        AuditOutcome::Block { reason } => {
            AUDIT_BLOCKED.inc();
            let outcome = state
                .store
                .record_violation(&route.origin, &caller, &route.site);

            warn!(
                origin = %route.origin,
                caller = %credential_fingerprint(&caller),
                rule_id = %reason.rule_id,
                violations = outcome.violation_count,
                banned = outcome.banned,
                "request blocked by audit"
            );

            send_notice(&state, &route, &caller, &payload, &text, &reason, outcome).await;

            Err(ProxyError::AuditBlocked {
                message: block_message(&reason, outcome, &route.site),
                rule_id: reason.rule_id,
                param: route.site.audit_parameter.clone(),
            })
        }
    }
}

async fn forward_buffered(
    state: &AppState,
    method: Method,
    target: &str,
    headers: &HeaderMap,
    bytes: Bytes,
) -> Result<Response, ProxyError> {
    state
        .forwarder
        .forward(method, target, headers, ForwardBody::Buffered(bytes))
        .await
}

async fn send_notice(
    state: &AppState,
    route: &ResolvedRoute,
    caller: &str,
    payload: &Value,
    transcript: &str,
    reason: &BlockReason,
    outcome: ViolationOutcome,
) {
    let Some(cipher) = &state.cipher else {
        debug!("no notice secret configured, skipping notice");
        return;
    };

    let ctx = NoticeContext {
        upstream: &route.origin,
        credential: caller,
        model: model_name(payload).unwrap_or("unknown"),
        verdict: "malicious",
        rule_id: &reason.rule_id,
        transcript,
        banned: outcome.banned,
        violation_count: outcome.violation_count,
    };

    match ViolationNotice::seal(&ctx, cipher) {
        Ok(notice) => state.notifier.notify(&notice).await,
        Err(e) => warn!(error = %e, "failed to seal violation notice"),
    }
}

pub fn block_message(reason: &BlockReason, outcome: ViolationOutcome, site: &SiteConfig) -> String {
    let mut message = format!("Request blocked by content audit: {}.", reason.description);
    if !reason.matched.is_empty() {
        message.push_str(&format!(" Matched: \"{}\".", reason.matched));
    }

    if site.max_violations == 0 {
        return message;
    }

    if outcome.banned {
        message.push_str(&format!(
            " Access suspended for {} minute(s) after {} violations.",
            site.ban_duration_minutes, outcome.violation_count
        ));
    } else {
        message.push_str(&format!(
            " Violation {} of {}; access is suspended when the limit is reached.",
            outcome.violation_count, site.max_violations
        ));
    }
    message
}
