//! RequestRouter: strips the workspace slug and hands the rest of the
//! path to that workspace's dispatcher.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mksht_protocol::{Scope, merge, urlpath};
use mksht_services::DocError;
use tower_http::trace::TraceLayer;

use crate::registry::WorkspaceRegistry;
use crate::workspace::slug_for;

/// Body of the response for `/`.
pub const INDEX_BODY: &str = "Makeshiftd";

/// Top-level HTTP entry point.
#[derive(Clone)]
pub struct RequestRouter {
    registry: Arc<WorkspaceRegistry>,
    in_flight: Scope,
}

impl RequestRouter {
    /// `in_flight` ends every request still running when the server gives
    /// up on draining.
    pub fn new(registry: Arc<WorkspaceRegistry>, in_flight: Scope) -> Self {
        Self {
            registry,
            in_flight,
        }
    }

    /// Every path and method lands in the fallback; routing is by slug.
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(route)
            .with_state(self)
            .layer(TraceLayer::new_for_http())
    }
}

async fn route(State(router): State<RequestRouter>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let (slug, remainder) = urlpath::pop_left(&path);

    if slug.is_empty() {
        return (StatusCode::OK, INDEX_BODY).into_response();
    }

    let Some(workspace) = router.registry.lookup(&slug_for(slug)) else {
        return DocError::not_found(path.clone()).into_response();
    };

    let (scope, _guard) = merge(workspace.scope(), &router.in_flight);
    workspace
        .dispatcher()
        .handle(remainder, request, &scope)
        .await
}
