pub mod convert;
pub mod registry;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::models::k8s::{ClusterOperator, List, Namespace, NamespacedObject, Node, Pod};
use crate::models::snapshot::ClusterSnapshot;

use convert::{build_snapshot, RawCluster};

/// Produces point-in-time snapshots of one cluster.
#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<ClusterSnapshot, FetchError>;
}

/// Bearer-token client for a Kubernetes or OpenShift API server.
pub struct ApiClient {
    pub name: String,
    pub address: String,
    token: Option<String>,
    timeout: Duration,
    http: Client,
}

impl ApiClient {
    pub fn new(
        name: String,
        address: String,
        token: Option<String>,
        timeout: Duration,
        insecure: bool,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| FetchError::Unreachable(format!("building http client: {}", e)))?;

        Ok(Self {
            name,
            address: address.trim_end_matches('/').to_string(),
            token,
            timeout,
            http,
        })
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<List<T>, FetchError> {
        self.get_list(path, false).await
    }

    /// Like [`list`](Self::list) but treats 404 as an empty list, for API
    /// groups that only exist on some distributions.
    async fn list_optional<T: DeserializeOwned>(&self, path: &str) -> Result<List<T>, FetchError> {
        self.get_list(path, true).await
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        optional: bool,
    ) -> Result<List<T>, FetchError> {
        let mut req = self
            .http
            .get(format!("{}{}", self.address, path))
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| self.classify(e))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND && optional {
            debug!(cluster = %self.name, path, "api group not served");
            return Ok(List::default());
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized(format!("GET {} returned {}", path, status)));
        }
        if status.is_server_error() {
            return Err(FetchError::Unreachable(format!("GET {} returned {}", path, status)));
        }
        if !status.is_success() {
            return Err(FetchError::Malformed(format!("GET {} returned {}", path, status)));
        }
        resp.json()
            .await
            .map_err(|e| FetchError::Malformed(format!("decoding {}: {}", path, e)))
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Unreachable(e.without_url().to_string())
        }
    }
}

#[async_trait]
impl HealthSource for ApiClient {
    async fn fetch_snapshot(&self) -> Result<ClusterSnapshot, FetchError> {
        let (operators, nodes, namespaces, pods, services, deployments) = tokio::try_join!(
            self.list_optional::<ClusterOperator>("/apis/config.openshift.io/v1/clusteroperators"),
            self.list::<Node>("/api/v1/nodes"),
            self.list::<Namespace>("/api/v1/namespaces"),
            self.list::<Pod>("/api/v1/pods"),
            self.list::<NamespacedObject>("/api/v1/services"),
            self.list::<NamespacedObject>("/apis/apps/v1/deployments"),
        )?;

        let raw = RawCluster {
            operators: operators.items,
            nodes: nodes.items,
            namespaces: namespaces.items,
            pods: pods.items,
            services: services.items,
            deployments: deployments.items,
        };
        Ok(build_snapshot(&self.name, Utc::now(), raw))
    }
}
