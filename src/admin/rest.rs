//! Admin client for the broker's `/admin/v2` REST API.

use crate::admin::auth::TokenSource;
use crate::admin::{Admin, AdminError, AuthAction, TopicListing};
use crate::config::OAuthSettings;
use crate::topic::{NamespaceName, TopicDomain, TopicName};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TenantInfo<'a> {
    admin_roles: Vec<String>,
    allowed_clusters: &'a [String],
}

#[derive(Deserialize)]
struct ErrorBody {
    reason: String,
}

pub struct RestAdmin {
    base_url: Url,
    http: reqwest::Client,
    auth: Option<TokenSource>,
}

impl RestAdmin {
    pub fn new(base_url: &str, oauth: Option<OAuthSettings>) -> Result<Self, AdminError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AdminError::Request(format!("admin url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AdminError::Request(format!("admin url {} cannot carry a path", base_url)));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AdminError::Request(e.to_string()))?;
        Ok(Self {
            base_url,
            auth: oauth.map(|o| TokenSource::new(o, http.clone())),
            http,
        })
    }

    /// `{base}/admin/v2/{segments..}`, each segment percent-encoded on its own.
    fn url(&self, segments: &[&str]) -> Result<Url, AdminError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AdminError::Request(format!("admin url {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(["admin", "v2"])
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<RequestBuilder, AdminError> {
        let mut req = self.http.request(method, self.url(segments)?);
        if let Some(auth) = &self.auth {
            req = req.bearer_auth(auth.token().await?);
        }
        Ok(req)
    }

    async fn execute(&self, req: RequestBuilder) -> Result<Response, AdminError> {
        let resp = req.send().await.map_err(|e| AdminError::Request(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.reason)
            .unwrap_or(text);
        if status == StatusCode::CONFLICT {
            return Err(AdminError::AlreadyExists(reason));
        }
        Err(AdminError::Status {
            status: status.as_u16(),
            reason,
        })
    }

    async fn get_names(&self, segments: &[&str]) -> Result<Vec<String>, AdminError> {
        let req = self.request(Method::GET, segments).await?;
        self.execute(req)
            .await?
            .json()
            .await
            .map_err(|e| AdminError::Request(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Admin for RestAdmin {
    async fn create_tenant(
        &self,
        tenant: &str,
        allowed_clusters: &[String],
    ) -> Result<(), AdminError> {
        let body = TenantInfo {
            admin_roles: Vec::new(),
            allowed_clusters,
        };
        let req = self.request(Method::PUT, &["tenants", tenant]).await?;
        self.execute(req.json(&body)).await.map(|_| ())
    }

    async fn create_namespace(&self, namespace: &NamespaceName) -> Result<(), AdminError> {
        let segments = [
            "namespaces",
            namespace.tenant.as_str(),
            namespace.namespace.as_str(),
        ];
        let req = self.request(Method::PUT, &segments).await?;
        self.execute(req).await.map(|_| ())
    }

    async fn grant_namespace_permission(
        &self,
        namespace: &NamespaceName,
        role: &str,
        actions: &[AuthAction],
    ) -> Result<(), AdminError> {
        let actions: Vec<&str> = actions.iter().map(AuthAction::as_str).collect();
        let segments = [
            "namespaces",
            namespace.tenant.as_str(),
            namespace.namespace.as_str(),
            "permissions",
            role,
        ];
        let req = self.request(Method::POST, &segments).await?;
        self.execute(req.json(&actions)).await.map(|_| ())
    }

    /// Lists both the persistent and the non-persistent domain.
    async fn list_topics(&self, namespace: &NamespaceName) -> Result<TopicListing, AdminError> {
        let mut listing = TopicListing::default();
        for domain in [TopicDomain::Persistent, TopicDomain::NonPersistent] {
            let (tenant, ns) = (namespace.tenant.as_str(), namespace.namespace.as_str());
            let partitioned = self
                .get_names(&[domain.as_str(), tenant, ns, "partitioned"])
                .await?;
            let all = self.get_names(&[domain.as_str(), tenant, ns]).await?;
            listing.partitioned.extend(partitioned);
            // The flat listing includes the partitions of partitioned topics.
            listing.non_partitioned.extend(
                all.into_iter()
                    .filter(|t| !TopicName::parse(t).is_ok_and(|n| n.is_partition())),
            );
        }
        Ok(listing)
    }

    async fn delete_topic(
        &self,
        topic: &TopicName,
        force: bool,
        partitioned: bool,
    ) -> Result<(), AdminError> {
        let mut segments = topic.rest_segments().to_vec();
        if partitioned {
            segments.push("partitions");
        }
        let req = self.request(Method::DELETE, &segments).await?;
        self.execute(req.query(&[("force", force)])).await.map(|_| ())
    }
}
