//! # REST Surface
//!
//! A small axum router for browsing the ledger:
//!
//! - `GET /block/` — the principal chain as a JSON array, newest first.
//! - `GET /block/{hash}/` — one block by hex hash; 400 for malformed hex,
//!   404 for an unknown block.
//! - `GET /metrics` — prometheus text, gauges refreshed on scrape.
//!
//! Both block routes are registered with and without the trailing slash.
//! The surface is read-only; transactions enter through the terminal and
//! the gossip network, not HTTP.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use tarjeta_protocol::crypto::Hash;
use tarjeta_protocol::network::Node;

use crate::metrics::NodeMetrics;

#[derive(Clone)]
pub struct AppState {
    pub node: Arc<Node>,
    pub metrics: Arc<NodeMetrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/block", get(principal_chain))
        .route("/block/", get(principal_chain))
        .route("/block/:hash", get(block_by_hash))
        .route("/block/:hash/", get(block_by_hash))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// The principal chain, leaf first, down to the root.
async fn principal_chain(State(state): State<AppState>) -> Response {
    let chain = state.node.chain();
    let chain = chain.read();

    let mut blocks = Vec::new();
    let mut cursor = chain.principal().cloned();
    while let Some(block) = cursor {
        blocks.push(block.to_json());
        cursor = block.parent().cloned();
    }
    Json(serde_json::Value::Array(blocks)).into_response()
}

/// One block by hash. 400 when the parameter is not 64 hex characters,
/// 404 when no such block exists.
async fn block_by_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Response {
    if !is_valid_hash(&hash) {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let Ok(hash) = Hash::from_hex(&hash) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let chain = state.node.chain();
    let block = chain.read().block(&hash);
    match block {
        Some(block) => Json(block.to_json()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Prometheus scrape: refresh the gauges from live state, then render.
async fn metrics(State(state): State<AppState>) -> Response {
    let height = state.node.chain().read().height();
    state.metrics.principal_height.set(i64::from(height));
    state
        .metrics
        .peer_count
        .set(state.node.network().peer_count() as i64);
    state.metrics.pool_size.set(state.node.pool().len() as i64);

    state.metrics.render().into_response()
}

/// A block-hash URL parameter: exactly 64 hex digits.
fn is_valid_hash(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarjeta_protocol::crypto::Keypair;
    use tarjeta_protocol::network::{Network, NodeConfig};

    fn test_state() -> AppState {
        let (network, _events) = Network::new();
        AppState {
            node: Arc::new(Node::new(
                Keypair::generate(),
                NodeConfig::default(),
                network,
            )),
            metrics: Arc::new(NodeMetrics::new().expect("metrics")),
        }
    }

    #[test]
    fn hash_parameter_validation() {
        assert!(is_valid_hash(&"ab".repeat(32)));
        assert!(!is_valid_hash("abc"));
        assert!(!is_valid_hash(&"zz".repeat(32)));
        assert!(!is_valid_hash(&"ab".repeat(33)));
    }

    #[tokio::test]
    async fn malformed_hash_is_bad_request() {
        let state = test_state();
        let resp = block_by_hash(State(state), Path("not-hex".to_string())).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_hash_is_not_found() {
        let state = test_state();
        let resp = block_by_hash(State(state), Path("ab".repeat(32))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_chain_lists_empty_array() {
        let state = test_state();
        let resp = principal_chain(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let state = test_state();
        let resp = metrics(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn router_builds() {
        let _ = router(test_state());
    }
}
