//! In-memory admin for tests (feature `mock`).
use crate::admin::{Admin, AdminError, AuthAction, TopicListing};
use crate::topic::{NamespaceName, TopicName};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct State {
    tenants: HashSet<String>,
    namespaces: HashSet<String>,
    grants: HashMap<String, Vec<(String, Vec<AuthAction>)>>,
    topics: Vec<(String, bool)>,
    deleted: Vec<(String, bool)>,
    failing_deletes: HashSet<String>,
    next_tenant_error: Option<AdminError>,
    next_namespace_error: Option<AdminError>,
    listing_error: Option<AdminError>,
}

/// Mirrors the broker's 409 behaviour for tenants and namespaces. Clones share state.
#[derive(Clone, Default)]
pub struct MockAdmin {
    state: Arc<Mutex<State>>,
}

impl MockAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_tenant(&self, tenant: &str) {
        self.lock().tenants.insert(tenant.to_string());
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.lock().namespaces.insert(namespace.to_string());
    }

    pub fn add_topic(&self, topic: &str, partitioned: bool) {
        self.lock().topics.push((topic.to_string(), partitioned));
    }

    pub fn fail_delete(&self, topic: &str) {
        self.lock().failing_deletes.insert(topic.to_string());
    }

    pub fn fail_next_tenant(&self, err: AdminError) {
        self.lock().next_tenant_error = Some(err);
    }

    pub fn fail_next_namespace(&self, err: AdminError) {
        self.lock().next_namespace_error = Some(err);
    }

    pub fn fail_listing(&self, err: AdminError) {
        self.lock().listing_error = Some(err);
    }

    pub fn has_tenant(&self, tenant: &str) -> bool {
        self.lock().tenants.contains(tenant)
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.lock().namespaces.contains(namespace)
    }

    pub fn grants(&self, namespace: &str) -> Vec<(String, Vec<AuthAction>)> {
        self.lock().grants.get(namespace).cloned().unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<(String, bool)> {
        self.lock().deleted.clone()
    }

    pub fn remaining_topics(&self) -> Vec<String> {
        self.lock().topics.iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait::async_trait]
impl Admin for MockAdmin {
    async fn create_tenant(
        &self,
        tenant: &str,
        _allowed_clusters: &[String],
    ) -> Result<(), AdminError> {
        let mut state = self.lock();
        if let Some(err) = state.next_tenant_error.take() {
            return Err(err);
        }
        if !state.tenants.insert(tenant.to_string()) {
            return Err(AdminError::AlreadyExists(format!("tenant {}", tenant)));
        }
        Ok(())
    }

    async fn create_namespace(&self, namespace: &NamespaceName) -> Result<(), AdminError> {
        let mut state = self.lock();
        if let Some(err) = state.next_namespace_error.take() {
            return Err(err);
        }
        if !state.namespaces.insert(namespace.to_string()) {
            return Err(AdminError::AlreadyExists(format!("namespace {}", namespace)));
        }
        Ok(())
    }

    async fn grant_namespace_permission(
        &self,
        namespace: &NamespaceName,
        role: &str,
        actions: &[AuthAction],
    ) -> Result<(), AdminError> {
        self.lock()
            .grants
            .entry(namespace.to_string())
            .or_default()
            .push((role.to_string(), actions.to_vec()));
        Ok(())
    }

    async fn list_topics(&self, _namespace: &NamespaceName) -> Result<TopicListing, AdminError> {
        let mut state = self.lock();
        if let Some(err) = state.listing_error.take() {
            return Err(err);
        }
        let mut listing = TopicListing::default();
        for (topic, partitioned) in &state.topics {
            if *partitioned {
                listing.partitioned.push(topic.clone());
            } else {
                listing.non_partitioned.push(topic.clone());
            }
        }
        Ok(listing)
    }

    async fn delete_topic(
        &self,
        topic: &TopicName,
        _force: bool,
        partitioned: bool,
    ) -> Result<(), AdminError> {
        let name = topic.to_string();
        let mut state = self.lock();
        if state.failing_deletes.contains(&name) {
            return Err(AdminError::Status {
                status: 500,
                reason: format!("cannot delete {}", name),
            });
        }
        state.topics.retain(|(t, _)| t != &name);
        state.deleted.push((name, partitioned));
        Ok(())
    }
}
