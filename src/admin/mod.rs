//! Administrative collaborator: tenant/namespace provisioning and topic cleanup.

pub mod auth;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod rest;

use crate::config::Target;
use crate::topic::{NameError, NamespaceName, TopicName};

#[derive(thiserror::Error, Debug)]
pub enum AdminError {
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("request: {0}")]
    Request(String),
    #[error("auth: {0}")]
    Auth(String),
    #[error(transparent)]
    Name(#[from] NameError),
}

impl AdminError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthAction {
    Produce,
    Consume,
}

impl AuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Produce => "produce",
            Self::Consume => "consume",
        }
    }
}

/// Topics of a namespace as reported by the admin API (fully-qualified names).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopicListing {
    pub partitioned: Vec<String>,
    pub non_partitioned: Vec<String>,
}

#[async_trait::async_trait]
pub trait Admin: Send + Sync {
    async fn create_tenant(
        &self,
        tenant: &str,
        allowed_clusters: &[String],
    ) -> Result<(), AdminError>;
    async fn create_namespace(&self, namespace: &NamespaceName) -> Result<(), AdminError>;
    async fn grant_namespace_permission(
        &self,
        namespace: &NamespaceName,
        role: &str,
        actions: &[AuthAction],
    ) -> Result<(), AdminError>;
    async fn list_topics(&self, namespace: &NamespaceName) -> Result<TopicListing, AdminError>;
    async fn delete_topic(
        &self,
        topic: &TopicName,
        force: bool,
        partitioned: bool,
    ) -> Result<(), AdminError>;
}

/// Create tenant and namespace (both idempotent) and grant the role produce/consume.
pub async fn provision_namespace(admin: &dyn Admin, target: &Target) -> Result<(), AdminError> {
    let ns = &target.namespace;
    match admin.create_tenant(&ns.tenant, std::slice::from_ref(&target.cluster)).await {
        Ok(()) => tracing::info!(tenant = %ns.tenant, cluster = %target.cluster, "created tenant"),
        Err(e) if e.is_already_exists() => {
            tracing::info!(tenant = %ns.tenant, "tenant already exists")
        }
        Err(e) => return Err(e),
    }

    match admin.create_namespace(ns).await {
        Ok(()) => tracing::info!(namespace = %ns, "created namespace"),
        Err(e) if e.is_already_exists() => {
            tracing::info!(namespace = %ns, "namespace already exists")
        }
        Err(e) => return Err(e),
    }

    if !target.role.is_empty() {
        admin
            .grant_namespace_permission(
                ns,
                &target.role,
                &[AuthAction::Produce, AuthAction::Consume],
            )
            .await?;
        tracing::info!(namespace = %ns, role = %target.role, "granted produce/consume");
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, AdminError)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Force-delete every topic of `namespace`. A failing topic does not stop the
/// others; failures are logged and returned in the report.
pub async fn cleanup_topics(
    admin: &dyn Admin,
    namespace: &NamespaceName,
) -> Result<CleanupReport, AdminError> {
    let listing = admin.list_topics(namespace).await?;
    tracing::info!(
        namespace = %namespace,
        partitioned = listing.partitioned.len(),
        non_partitioned = listing.non_partitioned.len(),
        "cleaning up topics"
    );

    let mut report = CleanupReport::default();
    let all = listing
        .partitioned
        .into_iter()
        .map(|t| (t, true))
        .chain(listing.non_partitioned.into_iter().map(|t| (t, false)));
    for (name, partitioned) in all {
        match delete_one(admin, &name, partitioned).await {
            Ok(()) => report.deleted.push(name),
            Err(e) => {
                tracing::warn!(topic = %name, error = %e, "unable to delete topic");
                report.failed.push((name, e));
            }
        }
    }
    Ok(report)
}

async fn delete_one(admin: &dyn Admin, name: &str, partitioned: bool) -> Result<(), AdminError> {
    let topic = TopicName::parse(name)?;
    tracing::info!(
        topic = %topic,
        kind = if partitioned { "partitioned" } else { "non-partitioned" },
        "deleting topic"
    );
    admin.delete_topic(&topic, true, partitioned).await
}
