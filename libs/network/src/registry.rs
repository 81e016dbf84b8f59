//! Subscription Registry
//!
//! Ordered list of live subscriptions keyed by destination. A client holds
//! only a handful of reply destinations at a time, so lookups are a linear
//! scan and the first match wins.

use crate::session::Subscription;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First subscription for `destination`
    pub fn find(&self, destination: &str) -> Option<&Subscription> {
        self.entries.iter().find(|s| s.destination() == destination)
    }

    pub fn find_mut(&mut self, destination: &str) -> Option<&mut Subscription> {
        self.entries.iter_mut().find(|s| s.destination() == destination)
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.entries.push(subscription);
    }

    /// Remove every subscription for `destination`, keeping the order of the
    /// rest. The removed handles are returned so the caller can unsubscribe
    /// them from the session.
    pub fn remove_all(&mut self, destination: &str) -> Vec<Subscription> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|s| s.destination() == destination);
        self.entries = kept;
        removed
    }

    /// Drop every entry, returning them in registration order
    pub fn clear(&mut self) -> Vec<Subscription> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.destination())
    }
}
