//! # Kubernetes Lease Store
//!
//! [`LeaseStore`] over the Kubernetes REST API:
//!
//! | Operation | Request | Special statuses |
//! |-----------|---------|------------------|
//! | get | `GET .../namespaces/{ns}/leases/{name}` | 404 -> `None` |
//! | create | `POST .../namespaces/{ns}/leases` | 409 -> `Conflict` |
//! | update | `PUT .../namespaces/{ns}/leases/{name}` | 409 -> `Conflict` |
//!
//! In-cluster, the API server address comes from `KUBERNETES_SERVICE_HOST`
//! and `KUBERNETES_SERVICE_PORT`, and the service-account token and CA
//! bundle from the standard mount. The token file is re-read on every
//! request since projected tokens rotate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::error::ElectionError;
use crate::lease::Lease;
use crate::store::LeaseStore;

/// Standard service-account mount.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Longest response body excerpt carried into an error.
const BODY_EXCERPT: usize = 300;

#[derive(Debug, Clone)]
enum Token {
    None,
    Static(String),
    File(PathBuf),
}

/// Lease store backed by the Kubernetes API server.
#[derive(Debug, Clone)]
pub struct KubeLeaseStore {
    client: reqwest::Client,
    api_base: Url,
    namespace: String,
    name: String,
    token: Token,
}

impl KubeLeaseStore {
    /// Store talking to `api_base` (e.g. `https://10.0.0.1:443`), optionally
    /// with a bearer token.
    pub fn new(
        api_base: &str,
        namespace: impl Into<String>,
        name: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, ElectionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ElectionError::Transport(e.to_string()))?;
        Self::with_client(client, api_base, namespace, name, token.map_or(Token::None, Token::Static))
    }

    /// Store configured from the pod's service account.
    pub fn in_cluster(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, ElectionError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            ElectionError::InClusterConfig("KUBERNETES_SERVICE_HOST is not set".into())
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        // IPv6 service hosts need brackets.
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let ca_pem = std::fs::read(dir.join("ca.crt")).map_err(|e| {
            ElectionError::InClusterConfig(format!("reading {}: {e}", dir.join("ca.crt").display()))
        })?;
        let ca = reqwest::Certificate::from_pem(&ca_pem)
            .map_err(|e| ElectionError::InClusterConfig(format!("invalid CA bundle: {e}")))?;

        let token_path = dir.join("token");
        if !token_path.exists() {
            return Err(ElectionError::InClusterConfig(format!(
                "{} does not exist",
                token_path.display()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .add_root_certificate(ca)
            .build()
            .map_err(|e| ElectionError::Transport(e.to_string()))?;

        Self::with_client(
            client,
            &format!("https://{host}:{port}"),
            namespace,
            name,
            Token::File(token_path),
        )
    }

    fn with_client(
        client: reqwest::Client,
        api_base: &str,
        namespace: impl Into<String>,
        name: impl Into<String>,
        token: Token,
    ) -> Result<Self, ElectionError> {
        let api_base = Url::parse(api_base).map_err(|e| {
            ElectionError::InClusterConfig(format!("invalid API server URL {api_base:?}: {e}"))
        })?;
        Ok(Self {
            client,
            api_base,
            namespace: namespace.into(),
            name: name.into(),
            token,
        })
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/apis/coordination.k8s.io/v1/namespaces/{}/leases",
            self.api_base.as_str().trim_end_matches('/'),
            self.namespace
        )
    }

    fn object_url(&self) -> String {
        format!("{}/{}", self.collection_url(), self.name)
    }

    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ElectionError> {
        let token = match &self.token {
            Token::None => return Ok(request),
            Token::Static(t) => t.clone(),
            Token::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                ElectionError::InClusterConfig(format!("reading {}: {e}", path.display()))
            })?,
        };
        Ok(request.bearer_auth(token.trim()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ElectionError> {
        self.authorize(request)
            .await?
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ElectionError::Transport(e.to_string()))
    }
}

async fn decode(resp: reqwest::Response) -> Result<Lease, ElectionError> {
    let status = resp.status();
    if status == StatusCode::CONFLICT {
        return Err(ElectionError::Conflict);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ElectionError::Api {
            status: status.as_u16(),
            body: body.chars().take(BODY_EXCERPT).collect(),
        });
    }
    resp.json::<Lease>()
        .await
        .map_err(|e| ElectionError::Decode(e.to_string()))
}

#[async_trait]
impl LeaseStore for KubeLeaseStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn lease_name(&self) -> &str {
        &self.name
    }

    async fn get(&self) -> Result<Option<Lease>, ElectionError> {
        let resp = self.send(self.client.get(self.object_url())).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(resp).await.map(Some)
    }

    async fn create(&self, lease: &Lease) -> Result<Lease, ElectionError> {
        let resp = self
            .send(self.client.post(self.collection_url()).json(lease))
            .await?;
        decode(resp).await
    }

    async fn update(&self, lease: &Lease) -> Result<Lease, ElectionError> {
        let resp = self
            .send(self.client.put(self.object_url()).json(lease))
            .await?;
        decode(resp).await
    }
}
