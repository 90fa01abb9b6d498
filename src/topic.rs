//! Namespace and topic naming.

use std::fmt;

const PARTITION_MARKER: &str = "-partition-";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid name '{name}': {reason}")]
pub struct NameError {
    pub name: String,
    pub reason: &'static str,
}

impl NameError {
    fn new(name: &str, reason: &'static str) -> Self {
        Self { name: name.to_string(), reason }
    }
}

/// `tenant/namespace`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespaceName {
    pub tenant: String,
    pub namespace: String,
}

impl NamespaceName {
    pub fn new(tenant: &str, namespace: &str) -> Result<Self, NameError> {
        let full = format!("{}/{}", tenant, namespace);
        if tenant.is_empty() || tenant.contains('/') {
            return Err(NameError::new(&full, "tenant must be a single non-empty segment"));
        }
        if namespace.is_empty() || namespace.contains('/') {
            return Err(NameError::new(&full, "namespace must be a single non-empty segment"));
        }
        Ok(Self {
            tenant: tenant.to_string(),
            namespace: namespace.to_string(),
        })
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.namespace)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TopicDomain {
    Persistent,
    NonPersistent,
}

impl TopicDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::NonPersistent => "non-persistent",
        }
    }
}

/// Fully-qualified topic name, e.g. `persistent://tenant/ns/topic-0`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopicName {
    pub domain: TopicDomain,
    pub namespace: NamespaceName,
    pub local: String,
}

impl TopicName {
    /// Parses `domain://tenant/ns/topic` or the short form `tenant/ns/topic`
    /// (which defaults to the persistent domain).
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let (domain, rest) = match name.split_once("://") {
            Some(("persistent", rest)) => (TopicDomain::Persistent, rest),
            Some(("non-persistent", rest)) => (TopicDomain::NonPersistent, rest),
            Some(_) => return Err(NameError::new(name, "unknown topic domain")),
            None => (TopicDomain::Persistent, name),
        };
        let mut parts = rest.splitn(3, '/');
        let (Some(tenant), Some(namespace), Some(local)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(NameError::new(name, "expected tenant/namespace/topic"));
        };
        if local.is_empty() || local.contains('/') {
            return Err(NameError::new(name, "topic must be a single non-empty segment"));
        }
        let namespace =
            NamespaceName::new(tenant, namespace).map_err(|e| NameError::new(name, e.reason))?;
        Ok(Self {
            domain,
            namespace,
            local: local.to_string(),
        })
    }

    /// True for the per-partition sub-topics of a partitioned topic.
    pub fn is_partition(&self) -> bool {
        self.local
            .rsplit_once(PARTITION_MARKER)
            .is_some_and(|(base, idx)| {
                !base.is_empty() && !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit())
            })
    }

    /// Path segments used by the admin REST API: `persistent`, `tenant`, `ns`, `topic`.
    pub fn rest_segments(&self) -> [&str; 4] {
        [
            self.domain.as_str(),
            self.namespace.tenant.as_str(),
            self.namespace.namespace.as_str(),
            self.local.as_str(),
        ]
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.domain.as_str(), self.namespace, self.local)
    }
}

/// Topic the load driver publishes to for topic index `index`.
pub fn load_topic(tenant: &str, namespace: &str, index: u32) -> String {
    format!("{}/{}/topic-{}", tenant, namespace, index)
}
