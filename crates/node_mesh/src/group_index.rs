//! Per-provider view of resolved services, coalesced by group uid.
//!
//! Backends that can see the same group through several advertisers (or the
//! same advertiser twice) feed every resolution through a `GroupIndex` and
//! publish `groups()`; the manager then never sees two groups with one uid
//! from the same provider.
//!
//! The index keeps plain records. Every `groups()` call builds new
//! `ResolvedGroup`s, so a published list is never mutated afterwards.

use std::sync::Arc;

use node_model::{GroupSource, ResolvedGroup, ResolvedService, ServiceRecord};
use tracing::warn;

pub struct GroupIndex {
    source: GroupSource,
    /// Records in first-seen order, one per instance name.
    records: Vec<ServiceRecord>,
}

impl GroupIndex {
    pub fn new(source: GroupSource) -> Self {
        Self {
            source,
            records: Vec::new(),
        }
    }

    /// Add or refresh an advertiser. Returns true if it opened a new group.
    ///
    /// A record with an instance name already present replaces the old one
    /// in place.
    pub fn upsert(&mut self, record: ServiceRecord) -> bool {
        let opens_group = !self
            .records
            .iter()
            .any(|r| r.group_uid == record.group_uid);

        let existing = self
            .records
            .iter_mut()
            .find(|r| r.service_name == record.service_name);
        match existing {
            Some(slot) => *slot = record,
            None => self.records.push(record),
        }
        opens_group
    }

    /// Forget an advertiser. Groups left without advertisers disappear.
    pub fn remove(&mut self, service_name: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.service_name != service_name);
        self.records.len() != before
    }

    /// Fresh groups in first-seen uid order.
    pub fn groups(&self) -> Vec<Arc<ResolvedGroup>> {
        let mut groups: Vec<Arc<ResolvedGroup>> = Vec::new();
        for record in &self.records {
            let service = Arc::new(ResolvedService::new(record.clone()));
            let outcome = match groups.iter().find(|g| g.uid() == record.group_uid) {
                Some(group) => group.add_service(service),
                None => {
                    let group = ResolvedGroup::new(service, self.source);
                    group.map(|g| groups.push(g))
                }
            };
            if let Err(e) = outcome {
                warn!("skipping {} in group {}: {e}", record.service_name, record.group_uid);
            }
        }
        groups
    }

    /// Number of distinct groups.
    pub fn len(&self) -> usize {
        let mut uids: Vec<&str> = self
            .records
            .iter()
            .map(|r| r.group_uid.as_str())
            .collect();
        uids.sort_unstable();
        uids.dedup();
        uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_model::GroupDescriptor;

    fn record(name: &str, uid: &str, ip: &str) -> ServiceRecord {
        let desc = GroupDescriptor::new("team", uid);
        ServiceRecord::new("mdns-1", name, ip.parse().unwrap(), 8000, &desc)
    }

    #[test]
    fn coalesces_by_uid() {
        let mut index = GroupIndex::new(GroupSource::Mdns);
        assert!(index.upsert(record("a", "g1", "10.0.0.1")));
        assert!(!index.upsert(record("b", "g1", "10.0.0.2")));
        assert!(index.upsert(record("c", "g2", "10.0.0.3")));

        assert_eq!(index.len(), 2);
        let groups = index.groups();
        assert_eq!(groups[0].uid(), "g1");
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].source(), GroupSource::Mdns);
        assert_eq!(groups[1].uid(), "g2");
    }

    #[test]
    fn refresh_replaces_same_instance() {
        let mut index = GroupIndex::new(GroupSource::Mdns);
        assert!(index.upsert(record("a", "g1", "10.0.0.1")));
        assert!(!index.upsert(record("a", "g1", "10.0.0.9")));

        assert_eq!(index.len(), 1);
        let services = index.groups()[0].services();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].addr().to_string(), "10.0.0.9");
    }

    #[test]
    fn instance_moving_to_another_group() {
        let mut index = GroupIndex::new(GroupSource::Mdns);
        index.upsert(record("a", "g1", "10.0.0.1"));
        index.upsert(record("a", "g2", "10.0.0.1"));

        let groups = index.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].uid(), "g2");
    }

    #[test]
    fn remove_drops_empty_groups() {
        let mut index = GroupIndex::new(GroupSource::Signaling);
        index.upsert(record("a", "g1", "10.0.0.1"));
        index.upsert(record("b", "g1", "10.0.0.2"));

        assert!(index.remove("a"));
        assert_eq!(index.len(), 1);
        assert!(index.remove("b"));
        assert!(index.is_empty());
        assert!(index.groups().is_empty());
        assert!(!index.remove("b"));
    }

    #[test]
    fn published_groups_are_not_touched_by_later_changes() {
        let mut index = GroupIndex::new(GroupSource::Mdns);
        index.upsert(record("a", "g1", "10.0.0.1"));
        index.upsert(record("b", "g1", "10.0.0.2"));
        let published = index.groups();

        index.remove("a");
        index.upsert(record("b", "g1", "10.0.0.7"));
        index.upsert(record("c", "g1", "10.0.0.3"));

        let services = published[0].services();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].service_name(), "a");
        assert_eq!(services[1].addr().to_string(), "10.0.0.2");

        let current = index.groups();
        assert!(!Arc::ptr_eq(&published[0], &current[0]));
        assert_eq!(current[0].len(), 2);
    }

    #[test]
    fn refreshing_a_record_keeps_every_advertiser() {
        let mut index = GroupIndex::new(GroupSource::Mdns);
        index.upsert(record("a", "g1", "10.0.0.1"));
        index.upsert(record("b", "g1", "10.0.0.2"));
        index.upsert(record("a", "g1", "10.0.0.1"));

        let names: Vec<String> = index.groups()[0]
            .services()
            .iter()
            .map(|s| s.service_name().to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }
}
