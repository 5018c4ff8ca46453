// src/services/api_server.rs
//! HTTP resolution surface.
//!
//! Read-only endpoints over a [`DocumentResolver`]:
//! - `GET /resolve/:did` returns the DID Document
//! - `GET /dereference/:did_url` returns one verification method's type and
//!   key material; the `#` of the URL must be percent-encoded as `%23`

use crate::error::ResolveError;
use crate::ledger::LedgerQuery;
use crate::services::resolver::DocumentResolver;
use crate::utils::serialization::encode_hex_prefixed;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Response for a dereferenced verification method
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct DereferenceResponse {
    #[serde(rename = "type")]
    pub method_type: String,
    #[serde(rename = "publicKeyHex")]
    pub public_key_hex: String,
}

/// HTTP status for a resolution failure.
fn status_for(err: &ResolveError) -> StatusCode {
    match err {
        ResolveError::Parse(_) => StatusCode::BAD_REQUEST,
        ResolveError::MethodDeactivated(_) | ResolveError::MethodNotFound(_) => StatusCode::NOT_FOUND,
        ResolveError::Ledger { .. }
        | ResolveError::MalformedEvent { .. }
        | ResolveError::Inconsistent { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: ResolveError) -> Response {
    let status = status_for(&err);
    if status == StatusCode::BAD_GATEWAY {
        warn!("resolution failed: {}", err);
    } else {
        debug!("rejected request: {}", err);
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// HTTP server state, shared between requests.
pub struct ApiServer<Q: ?Sized> {
    resolver: DocumentResolver<Q>,
}

impl<Q> ApiServer<Q>
where
    Q: LedgerQuery + ?Sized + 'static,
{
    pub fn new(resolver: DocumentResolver<Q>) -> Self {
        ApiServer { resolver }
    }

    /// Routes of the resolution API.
    pub fn router(self) -> Router {
        Router::new()
            .route("/resolve/:did", get(Self::resolve_handler))
            .route("/dereference/:did_url", get(Self::dereference_handler))
            .with_state(Arc::new(self))
    }

    /// Binds `addr` and serves until the process is stopped.
    ///
    /// # Errors
    /// Returns the I/O error if binding or serving fails.
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("resolver listening on http://{}", addr);
        axum::serve(listener, app).await
    }

    /// Resolves a DID to its document.
    ///
    /// # Endpoint
    /// GET /resolve/:did
    ///
    /// # Responses
    /// - 200 OK: DID Document (empty for a deactivated DID)
    /// - 400 Bad Request: malformed DID
    /// - 502 Bad Gateway: ledger failure
    async fn resolve_handler(
        Path(did): Path<String>,
        State(state): State<Arc<ApiServer<Q>>>,
    ) -> Response {
        match state.resolver.resolve(&did).await {
            Ok(document) => (StatusCode::OK, Json(document)).into_response(),
            Err(e) => error_response(e),
        }
    }

    /// Dereferences a DID URL to its verification method.
    ///
    /// # Endpoint
    /// GET /dereference/:did_url
    ///
    /// # Responses
    /// - 200 OK: `{type, publicKeyHex}`
    /// - 400 Bad Request: malformed DID URL
    /// - 404 Not Found: method missing or deactivated
    /// - 502 Bad Gateway: ledger failure
    async fn dereference_handler(
        Path(did_url): Path<String>,
        State(state): State<Arc<ApiServer<Q>>>,
    ) -> Response {
        match state.resolver.dereference(&did_url).await {
            Ok((method_type, public_key)) => (
                StatusCode::OK,
                Json(DereferenceResponse {
                    method_type,
                    public_key_hex: encode_hex_prefixed(&public_key),
                }),
            )
                .into_response(),
            Err(e) => error_response(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;
    use crate::ledger::{LedgerCall, LedgerMutation};
    use crate::models::did::Identifier;
    use crate::models::document::{Document, SECP256K1_METHOD_TYPE};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use ethers::types::Address;
    use tower::ServiceExt;

    async fn setup() -> (Arc<InMemoryLedger>, Identifier, Router) {
        let ledger = Arc::new(InMemoryLedger::new());
        let did = Identifier::derive(&Address::repeat_byte(1), 0);
        ledger
            .submit(LedgerCall::CreateDid {
                did: did.identifier().to_string(),
                method_type: SECP256K1_METHOD_TYPE.to_string(),
                public_key: vec![0x02, 0xab],
            })
            .await
            .unwrap();
        let router = ApiServer::new(DocumentResolver::new(Arc::clone(&ledger))).router();
        (ledger, did, router)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_resolve_endpoint() {
        let (_, did, router) = setup().await;
        let (status, body) = get(router, &format!("/resolve/{}", did)).await;
        assert_eq!(status, StatusCode::OK);

        let document: Document = serde_json::from_slice(&body).unwrap();
        assert_eq!(document.id, Some(did.clone()));
        assert_eq!(document.verification_methods[0].id, did.url(0));
    }

    #[tokio::test]
    async fn test_dereference_endpoint() {
        let (_, did, router) = setup().await;
        let uri = format!("/dereference/{}%23masterKey", did);
        let (status, body) = get(router, &uri).await;
        assert_eq!(status, StatusCode::OK);

        let response: DereferenceResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            response,
            DereferenceResponse {
                method_type: SECP256K1_METHOD_TYPE.to_string(),
                public_key_hex: "0x02ab".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (ledger, did, router) = setup().await;

        let (status, body) = get(router.clone(), "/resolve/did:web:example.com").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(error["error"].is_string());

        let (status, _) = get(router.clone(), &format!("/dereference/{}%23key-7", did)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        ledger.fail_reads(true);
        let (status, _) = get(router, &format!("/resolve/{}", did)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
