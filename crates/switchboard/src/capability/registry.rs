//! Owns every configured capability and drives their lifecycles together.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use tracing::{info, instrument, warn};

use super::descriptor::CapabilityDescriptor;
use super::errors::{AggregateError, StartError, StopError};
use super::handle::{CapabilityHandle, CapabilityStatus};
use crate::providers::Provider;

pub struct CapabilityRegistry {
    handles: HashMap<String, CapabilityHandle>,
}

impl CapabilityRegistry {
    pub fn new(
        descriptors: Vec<CapabilityDescriptor>,
        provider: Arc<dyn Provider>,
        timeout: Duration,
    ) -> Self {
        let mut handles = HashMap::new();
        for descriptor in descriptors {
            let name = descriptor.name.clone();
            let handle = CapabilityHandle::new(descriptor, Arc::clone(&provider), timeout);
            if handles.insert(name.clone(), handle).is_some() {
                warn!(capability = %name, "duplicate capability name, keeping the last one");
            }
        }
        CapabilityRegistry { handles }
    }

    #[cfg(test)]
    pub(crate) fn from_handles<I: IntoIterator<Item = CapabilityHandle>>(handles: I) -> Self {
        CapabilityRegistry {
            handles: handles
                .into_iter()
                .map(|handle| (handle.name().to_string(), handle))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityHandle> {
        self.handles.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityHandle> {
        self.handles.values()
    }

    /// Current status of every capability, sorted by name.
    pub async fn statuses(&self) -> BTreeMap<String, CapabilityStatus> {
        let mut statuses = BTreeMap::new();
        for handle in self.handles.values() {
            statuses.insert(handle.name().to_string(), handle.status().await);
        }
        statuses
    }

    /// Start every capability concurrently. Failures are collected rather
    /// than aborting the rest; the service runs degraded with whatever came
    /// up.
    #[instrument(skip(self))]
    pub async fn start_all(&self) -> Result<(), AggregateError<StartError>> {
        info!(count = self.handles.len(), "starting capabilities");
        let results = future::join_all(self.handles.values().map(|handle| async move {
            (handle.name().to_string(), handle.start().await)
        }))
        .await;

        let mut errors = AggregateError::new();
        for (name, result) in results {
            if let Err(error) = result {
                errors.push(name, error);
            }
        }
        errors.into_result()
    }

    /// Stop every capability concurrently, giving each up to `grace` before
    /// abandoning it.
    #[instrument(skip(self))]
    pub async fn stop_all(&self, grace: Duration) -> Result<(), AggregateError<StopError>> {
        info!(count = self.handles.len(), "stopping capabilities");
        let results = future::join_all(self.handles.values().map(|handle| async move {
            let result = tokio::time::timeout(grace, handle.stop()).await;
            (handle.name().to_string(), result)
        }))
        .await;

        let mut errors = AggregateError::new();
        for (name, result) in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(error)) => errors.push(name, error),
                Err(_) => {
                    warn!(
                        capability = %name,
                        grace_secs = grace.as_secs(),
                        "capability did not stop in time, abandoning it"
                    );
                    errors.push(name, StopError::Timeout(grace));
                }
            }
        }
        errors.into_result()
    }
}
