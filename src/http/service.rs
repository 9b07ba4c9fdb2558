//! Admission check endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{debug, error, instrument};

use crate::ratelimit::Admission;

/// Header carrying an explicit caller identity.
pub const CALLER_ID_HEADER: &str = "x-caller-id";
/// Caller key used when neither the header nor the peer address is known.
pub const ANONYMOUS_CALLER: &str = "anonymous";

struct ServiceState<A> {
    admission: Arc<A>,
    trust_caller_header: bool,
}

impl<A> Clone for ServiceState<A> {
    fn clone(&self) -> Self {
        Self {
            admission: Arc::clone(&self.admission),
            trust_caller_header: self.trust_caller_header,
        }
    }
}

/// Build the router exposing `GET /svc`.
///
/// `trust_caller_header` lets clients name themselves through `x-caller-id`;
/// only enable it behind a proxy that sets the header.
pub fn router<A: Admission + 'static>(admission: Arc<A>, trust_caller_header: bool) -> Router {
    Router::new()
        .route("/svc", get(check_service::<A>))
        .with_state(ServiceState {
            admission,
            trust_caller_header,
        })
}

/// Resolve the caller key for a request.
///
/// Uses the peer IP address, unless `trust_caller_header` is set and the
/// request carries a non-empty `x-caller-id` header.
pub fn caller_key(request: &Request, trust_caller_header: bool) -> String {
    let header_id = request
        .headers()
        .get(CALLER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| trust_caller_header && !id.is_empty());
    if let Some(id) = header_id {
        return id.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS_CALLER.to_string())
}

#[instrument(skip_all, fields(caller))]
async fn check_service<A: Admission + 'static>(
    State(state): State<ServiceState<A>>,
    request: Request,
) -> Response {
    let caller = caller_key(&request, state.trust_caller_header);
    tracing::Span::current().record("caller", caller.as_str());

    match state.admission.check_admission(&caller) {
        Ok(true) => (StatusCode::OK, "Allowed").into_response(),
        Ok(false) => {
            debug!("Caller over quota");
            (StatusCode::TOO_MANY_REQUESTS, "Not Allowed").into_response()
        }
        Err(e) => {
            error!(error = %e, "Admission check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error").into_response()
        }
    }
}
