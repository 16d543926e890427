//! Status dashboard HTTP server.
//!
//! Serves the engine's latest [`StatusSnapshot`] read-only:
//!
//! | Path | Response |
//! |------|----------|
//! | `GET /` | HTML table of managed containers |
//! | `GET /api/status` | JSON snapshot |
//! | `GET /healthz` | pipeline health, `503` when unhealthy |

use std::fmt::Write as _;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use labelsync_core::pipeline::HealthStatus;
use labelsync_docker::RuntimeStatus;
use labelsync_reconciler::{StatusHandle, StatusSnapshot, evaluate_health};

/// Shared router state. Both fields are cheap clones of read-only handles.
#[derive(Clone)]
pub struct StatusState {
    /// 엔진이 게시하는 최신 스냅샷
    pub status: StatusHandle,
    /// 런타임 이벤트 스트림 연결 상태
    pub runtime: RuntimeStatus,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    managed: usize,
    failed: usize,
}

/// Builds the dashboard router.
pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/api/status", get(status_json))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serves on an already bound listener until `cancel` fires.
pub async fn serve_on(
    listener: TcpListener,
    state: StatusState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(listen_addr = %addr, "status dashboard listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    tracing::info!("status dashboard shut down");
    Ok(())
}

async fn status_json(State(state): State<StatusState>) -> Json<StatusSnapshot> {
    Json(StatusSnapshot::clone(&state.status.current()))
}

async fn healthz(State(state): State<StatusState>) -> Response {
    let health = evaluate_health(!state.status.is_closed(), state.runtime.is_connected());
    let snapshot = state.status.current();
    let code = if health.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let (status, reason) = match health {
        HealthStatus::Healthy => ("healthy", None),
        HealthStatus::Degraded(reason) => ("degraded", Some(reason)),
        HealthStatus::Unhealthy(reason) => ("unhealthy", Some(reason)),
    };
    let body = HealthBody {
        status,
        reason,
        managed: snapshot.managed,
        failed: snapshot.failed,
    };
    (code, Json(body)).into_response()
}

async fn dashboard(State(state): State<StatusState>) -> Html<String> {
    Html(render_dashboard(&state.status.current()))
}

fn render_dashboard(snapshot: &StatusSnapshot) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>labelsync</title></head><body>\n",
    );
    let _ = writeln!(
        page,
        "<h1>labelsync</h1>\n<p>{} managed, {} synced, {} failed (as of {})</p>",
        snapshot.managed,
        snapshot.synced,
        snapshot.failed,
        snapshot.generated_at.to_rfc3339()
    );
    page.push_str(
        "<table border=\"1\">\n<tr><th>Container</th><th>Domains</th><th>Upstream</th><th>SSL</th><th>Proxy host</th><th>State</th><th>Last error</th></tr>\n",
    );
    for c in &snapshot.containers {
        let remote = c.remote_id.map(|id| id.to_string()).unwrap_or_default();
        let state = serde_json::to_value(c.state)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&c.name),
            escape_html(&c.domains.join(", ")),
            escape_html(&c.upstream),
            if c.ssl { "yes" } else { "no" },
            remote,
            state,
            escape_html(c.last_error.as_deref().unwrap_or("")),
        );
    }
    page.push_str("</table>\n</body></html>\n");
    page
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
