//! Pushes indexing progress to the transactor.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::errors::IndexerError;
use fulltext_indexer_pipeline::IndexingNotifier;
use fulltext_indexer_shared::classes;
use fulltext_indexer_shared::tx::TxWorkspaceEvent;
use fulltext_indexer_shared::{
    Claims, ClassRef, IndexingUpdateEvent, TenantKey, Tx, TxMeta, WorkspaceEvent,
};

/// Tells the transactor which classes finished indexing, so live clients
/// can refresh their searches.
///
/// Every update is sent from a detached task; at most `concurrency` pushes
/// are in flight. Failed pushes are logged and not retried.
pub struct BroadcastNotifier {
    tenant: TenantKey,
    endpoint: String,
    token: String,
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl BroadcastNotifier {
    /// # Arguments
    ///
    /// * `transactor_url` - Transactor base URL; `ws(s)://` is sent as `http(s)://`
    /// * `secret` - Secret the system-account token is signed with
    /// * `concurrency` - Maximum number of pushes in flight
    pub fn new(
        transactor_url: &str,
        tenant: TenantKey,
        secret: &str,
        concurrency: usize,
    ) -> Result<Self, IndexerError> {
        let token = Claims::new(classes::SYSTEM_ACCOUNT, tenant.clone()).encode(secret)?;
        let base = http_base_url(transactor_url)?;

        Ok(Self {
            tenant,
            endpoint: format!("{}/api/v1/broadcast", base),
            token,
            client: reqwest::Client::new(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Base URL of the transactor's HTTP API.
pub fn http_base_url(transactor_url: &str) -> Result<String, IndexerError> {
    let mut url = Url::parse(transactor_url)
        .map_err(|e| IndexerError::config(format!("Invalid transactor URL {}: {}", transactor_url, e)))?;
    let scheme = match url.scheme() {
        "ws" => Some("http"),
        "wss" => Some("https"),
        _ => None,
    };
    if let Some(scheme) = scheme {
        url.set_scheme(scheme)
            .map_err(|_| IndexerError::config(format!("Cannot convert {} to HTTP", transactor_url)))?;
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[async_trait]
impl IndexingNotifier for BroadcastNotifier {
    async fn indexing_updated(&self, classes: Vec<ClassRef>) {
        if classes.is_empty() {
            return;
        }

        let params = match serde_json::to_value(IndexingUpdateEvent { classes }) {
            Ok(params) => params,
            Err(e) => {
                warn!(tenant = %self.tenant, error = %e, "Failed to encode indexing update");
                return;
            }
        };
        let event = Tx::WorkspaceEvent(TxWorkspaceEvent {
            meta: TxMeta::new(classes::SYSTEM_ACCOUNT, classes::DERIVED_TX_SPACE),
            event: WorkspaceEvent::IndexingUpdate,
            params,
        });
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let token = self.token.clone();
        let tenant = self.tenant.clone();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let result = client
                .put(&endpoint)
                .query(&[("token", token.as_str()), ("tenant", tenant.as_str())])
                .json(&event)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(tenant = %tenant, "Broadcast indexing update");
                }
                Ok(response) => {
                    warn!(tenant = %tenant, status = %response.status(), "Broadcast rejected");
                }
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "Broadcast failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::put;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    const SECRET: &str = "broadcast-secret";

    #[test]
    fn test_websocket_urls_become_http() {
        assert_eq!(http_base_url("ws://transactor:3333").unwrap(), "http://transactor:3333");
        assert_eq!(http_base_url("wss://tx.example.com/").unwrap(), "https://tx.example.com");
        assert_eq!(http_base_url("http://localhost:3333").unwrap(), "http://localhost:3333");
        assert!(http_base_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_update_is_pushed_with_signed_token() {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(HashMap<String, String>, Value)>();
        let router = Router::new().route(
            "/api/v1/broadcast",
            put(
                move |Query(params): Query<HashMap<String, String>>, Json(body): Json<Value>| {
                    let sender = sender.clone();
                    async move {
                        let _ = sender.send((params, body));
                        Json(json!({}))
                    }
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let notifier =
            BroadcastNotifier::new(&format!("ws://{}", addr), TenantKey::new("w1"), SECRET, 2).unwrap();
        notifier
            .indexing_updated(vec![ClassRef::new("tracker:class:Issue")])
            .await;

        let (params, body) = receiver.recv().await.unwrap();
        assert_eq!(params["tenant"], "w1");
        let claims = Claims::decode(&params["token"], SECRET).unwrap();
        assert_eq!(claims.workspace, TenantKey::new("w1"));
        assert_eq!(body["_class"], classes::TX_WORKSPACE_EVENT);
        assert_eq!(body["event"], "indexingUpdate");
        assert_eq!(body["params"]["_class"], json!(["tracker:class:Issue"]));
    }

    #[tokio::test]
    async fn test_unreachable_transactor_is_tolerated() {
        let notifier =
            BroadcastNotifier::new("http://127.0.0.1:9", TenantKey::new("w1"), SECRET, 1).unwrap();
        notifier
            .indexing_updated(vec![ClassRef::new("tracker:class:Issue")])
            .await;
        notifier.indexing_updated(Vec::new()).await;
    }
}
