//! One advertiser's announcement of a group, as resolved by a discovery backend.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::error::{ModelError, Result};
use crate::group::{GroupDescriptor, ResolvedGroup};
use crate::peer::Peer;

/// Raw facts a provider learned about an advertiser.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    /// Id of the provider that resolved this service.
    pub provider_id: String,
    /// Transport-level instance name, unique within one provider.
    pub service_name: String,
    pub addr: IpAddr,
    /// Human-readable address. Falls back to `addr` when absent.
    pub addr_display: Option<String>,
    /// Port of the HTTP peer discovery endpoint.
    pub discovery_port: u16,
    /// Port the consensus engine listens on.
    pub engine_port: u16,
    pub attributes: HashMap<String, String>,
    pub app_id: String,
    pub group_name: String,
    pub group_uid: String,
    pub genesis_peers: Option<Vec<Peer>>,
    pub current_peers: Option<Vec<Peer>>,
}

impl ServiceRecord {
    /// Minimal record; attributes and rosters start empty.
    pub fn new(
        provider_id: impl Into<String>,
        service_name: impl Into<String>,
        addr: IpAddr,
        discovery_port: u16,
        group: &GroupDescriptor,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            service_name: service_name.into(),
            addr,
            addr_display: None,
            discovery_port,
            engine_port: 0,
            attributes: HashMap::new(),
            app_id: String::new(),
            group_name: group.name.clone(),
            group_uid: group.uid.clone(),
            genesis_peers: None,
            current_peers: None,
        }
    }
}

#[derive(Debug)]
enum GroupAssignment {
    Unassigned,
    Assigned(Weak<ResolvedGroup>),
}

#[derive(Debug)]
pub struct ResolvedService {
    record: ServiceRecord,
    assignment: Mutex<GroupAssignment>,
}

impl ResolvedService {
    pub fn new(record: ServiceRecord) -> Self {
        Self {
            record,
            assignment: Mutex::new(GroupAssignment::Unassigned),
        }
    }

    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    pub fn provider_id(&self) -> &str {
        &self.record.provider_id
    }

    pub fn service_name(&self) -> &str {
        &self.record.service_name
    }

    pub fn addr(&self) -> IpAddr {
        self.record.addr
    }

    pub fn display_addr(&self) -> String {
        self.record
            .addr_display
            .clone()
            .unwrap_or_else(|| self.record.addr.to_string())
    }

    pub fn discovery_port(&self) -> u16 {
        self.record.discovery_port
    }

    pub fn engine_port(&self) -> u16 {
        self.record.engine_port
    }

    /// Address of the HTTP peer discovery endpoint.
    pub fn discovery_addr(&self) -> SocketAddr {
        SocketAddr::new(self.record.addr, self.record.discovery_port)
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.record.attributes
    }

    pub fn app_id(&self) -> &str {
        &self.record.app_id
    }

    pub fn group_uid(&self) -> &str {
        &self.record.group_uid
    }

    pub fn group(&self) -> GroupDescriptor {
        GroupDescriptor::new(&self.record.group_name, &self.record.group_uid)
    }

    pub fn genesis_peers(&self) -> Option<&[Peer]> {
        self.record.genesis_peers.as_deref()
    }

    pub fn current_peers(&self) -> Option<&[Peer]> {
        self.record.current_peers.as_deref()
    }

    /// Attach this service to a group. Allowed once; any later call fails
    /// with [`ModelError::AlreadyAssigned`], whichever group is passed.
    pub fn assign_group(&self, group: &Arc<ResolvedGroup>) -> Result<()> {
        let mut slot = self
            .assignment
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *slot {
            GroupAssignment::Assigned(_) => Err(ModelError::AlreadyAssigned),
            GroupAssignment::Unassigned => {
                *slot = GroupAssignment::Assigned(Arc::downgrade(group));
                Ok(())
            }
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(
            *self
                .assignment
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            GroupAssignment::Assigned(_)
        )
    }

    /// The group this service was assigned to, if it is still alive.
    pub fn resolved_group(&self) -> Option<Arc<ResolvedGroup>> {
        match &*self
            .assignment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            GroupAssignment::Assigned(group) => group.upgrade(),
            GroupAssignment::Unassigned => None,
        }
    }
}
