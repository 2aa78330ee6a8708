//! Bus - typed resources shared with rules
//!
//! Rules are registered once and run for every participant, so anything they
//! need from the host (a database pool, a scoring table, a clock) travels on
//! the `Bus`. Lookups are keyed by type, never by string.

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// TypeMap of host resources handed to every rule invocation.
#[derive(Default)]
pub struct Bus {
    resources: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Bus {
    pub fn new() -> Self {
        Bus {
            resources: HashMap::new(),
        }
    }

    /// Builder form of [`Bus::insert`].
    pub fn with<T: Send + Sync + 'static>(mut self, resource: T) -> Self {
        self.insert(resource);
        self
    }

    /// Insert a resource, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, resource: T) {
        self.resources.insert(TypeId::of::<T>(), Box::new(resource));
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.resources
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.resources
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast().ok())
            .map(|boxed| *boxed)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("resource_count", &self.resources.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Threshold(u32);

    #[test]
    fn test_insert_and_get() {
        let bus = Bus::new().with(Threshold(18)).with("cohort-a".to_string());

        assert_eq!(bus.get::<Threshold>().map(|t| t.0), Some(18));
        assert_eq!(bus.get::<String>().map(String::as_str), Some("cohort-a"));
        assert!(bus.get::<u64>().is_none());
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn test_replace_and_remove() {
        let mut bus = Bus::new();
        bus.insert(Threshold(1));
        bus.insert(Threshold(2));
        assert_eq!(bus.len(), 1);

        if let Some(t) = bus.get_mut::<Threshold>() {
            t.0 += 1;
        }
        assert_eq!(bus.remove::<Threshold>().map(|t| t.0), Some(3));
        assert!(!bus.contains::<Threshold>());
        assert!(bus.is_empty());
    }
}
