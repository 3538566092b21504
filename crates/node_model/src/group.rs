//! Logical groups and the set of advertisers believed to denote one.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::service::ResolvedService;

/// Identifies a group independently of who advertises it. Equality is by `uid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub name: String,
    pub uid: String,
}

impl GroupDescriptor {
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
        }
    }
}

impl PartialEq for GroupDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for GroupDescriptor {}

impl std::hash::Hash for GroupDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}

/// Backend family that produced a group. Presentational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupSource {
    Mdns,
    DirectLink,
    Signaling,
    Archive,
}

impl GroupSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mdns => "mdns",
            Self::DirectLink => "direct-link",
            Self::Signaling => "signaling",
            Self::Archive => "archive",
        }
    }
}

impl std::fmt::Display for GroupSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered advertisers of one group uid.
#[derive(Debug)]
pub struct ResolvedGroup {
    descriptor: GroupDescriptor,
    source: GroupSource,
    services: Mutex<Vec<Arc<ResolvedService>>>,
}

impl ResolvedGroup {
    /// Create a group seeded from `seed` and assign the seed to it.
    pub fn new(seed: Arc<ResolvedService>, source: GroupSource) -> Result<Arc<Self>> {
        let group = Arc::new(Self {
            descriptor: seed.group(),
            source,
            services: Mutex::new(vec![seed.clone()]),
        });
        seed.assign_group(&group)?;
        Ok(group)
    }

    /// Append another advertiser of the same group.
    pub fn add_service(self: &Arc<Self>, service: Arc<ResolvedService>) -> Result<()> {
        if service.group_uid() != self.descriptor.uid {
            return Err(ModelError::GroupMismatch {
                group_uid: self.descriptor.uid.clone(),
                service_uid: service.group_uid().to_string(),
            });
        }
        service.assign_group(self)?;
        self.lock_services().push(service);
        Ok(())
    }

    /// Drop the advertiser with the given instance name.
    pub fn remove_service(&self, service_name: &str) -> Option<Arc<ResolvedService>> {
        let mut services = self.lock_services();
        let pos = services
            .iter()
            .position(|s| s.service_name() == service_name)?;
        Some(services.remove(pos))
    }

    pub fn services(&self) -> Vec<Arc<ResolvedService>> {
        self.lock_services().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_services().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_services().is_empty()
    }

    pub fn descriptor(&self) -> &GroupDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn uid(&self) -> &str {
        &self.descriptor.uid
    }

    pub fn source(&self) -> GroupSource {
        self.source
    }

    fn lock_services(&self) -> std::sync::MutexGuard<'_, Vec<Arc<ResolvedService>>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
