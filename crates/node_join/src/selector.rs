//! Policies for picking which service of a group to ask for peers.

use std::sync::Arc;

use node_model::ResolvedService;
use rand::seq::SliceRandom;

pub trait ServiceSelector: Send + Sync {
    fn select(&self, services: &[Arc<ResolvedService>]) -> Option<Arc<ResolvedService>>;
}

/// The first service in discovery order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstService;

impl ServiceSelector for FirstService {
    fn select(&self, services: &[Arc<ResolvedService>]) -> Option<Arc<ResolvedService>> {
        services.first().cloned()
    }
}

/// A uniformly random service, spreading joiners over the members.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomService;

impl ServiceSelector for RandomService {
    fn select(&self, services: &[Arc<ResolvedService>]) -> Option<Arc<ResolvedService>> {
        services.choose(&mut rand::thread_rng()).cloned()
    }
}
