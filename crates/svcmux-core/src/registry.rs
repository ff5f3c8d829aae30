//! Endpoint Registry
//!
//! Catalog of configured services and their currently discovered endpoints.
//! Descriptors are fixed at construction. Endpoints are published by the
//! discovery engine through a single copy-on-write swap, so readers always see
//! either the old map or the new one, never a partial update.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::{Endpoint, ServiceDescriptor};

type EndpointMap = HashMap<String, Arc<Endpoint>>;

pub struct EndpointRegistry {
    descriptors: HashMap<String, Arc<ServiceDescriptor>>,
    /// Declaration order, for stable iteration
    order: Vec<String>,
    endpoints: ArcSwap<EndpointMap>,
}

impl EndpointRegistry {
    pub fn new(descriptors: impl IntoIterator<Item = ServiceDescriptor>) -> Self {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for descriptor in descriptors {
            if !map.contains_key(&descriptor.name) {
                order.push(descriptor.name.clone());
            }
            map.insert(descriptor.name.clone(), Arc::new(descriptor));
        }
        Self {
            descriptors: map,
            order,
            endpoints: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn descriptor(&self, service: &str) -> Option<Arc<ServiceDescriptor>> {
        self.descriptors.get(service).cloned()
    }

    /// Descriptors in declaration order
    pub fn descriptors(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.order
            .iter()
            .filter_map(|name| self.descriptors.get(name).cloned())
            .collect()
    }

    pub fn service_names(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, service: &str) -> bool {
        self.descriptors.contains_key(service)
    }

    /// Current endpoint for a service, if discovered
    pub fn endpoint(&self, service: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.load().get(service).cloned()
    }

    /// Consistent view of every discovered endpoint
    pub fn endpoints(&self) -> Arc<EndpointMap> {
        self.endpoints.load_full()
    }

    /// Replace endpoints for the given services in one swap.
    ///
    /// Services absent from `discovered` keep their previous endpoint.
    /// Endpoints for unknown services are ignored.
    pub fn publish(&self, discovered: impl IntoIterator<Item = Endpoint>) -> usize {
        let updates: Vec<Endpoint> = discovered
            .into_iter()
            .filter(|ep| self.descriptors.contains_key(&ep.service))
            .collect();
        let count = updates.len();
        if count == 0 {
            return 0;
        }

        self.endpoints.rcu(|current| {
            let mut next = EndpointMap::clone(current);
            for ep in &updates {
                next.insert(ep.service.clone(), Arc::new(ep.clone()));
            }
            next
        });

        debug!(updated = count, "[Registry] Published endpoints");
        count
    }

    /// Drop the endpoint of one service (e.g. when it is known to be gone)
    pub fn forget(&self, service: &str) {
        self.endpoints.rcu(|current| {
            let mut next = EndpointMap::clone(current);
            next.remove(service);
            next
        });
    }
}
