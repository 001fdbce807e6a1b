//! Outbound interface to a roadmap store.
//!
//! The orchestrator only reads from a store, and only when an update request
//! arrives without `existing_roadmap`. Persisting results is the caller's
//! business.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::schema::Roadmap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("roadmap {id:?} not found")]
    NotFound { id: String },

    #[error("roadmap store failed: {0:#}")]
    Backend(#[from] anyhow::Error),
}

/// Lookup of roadmaps by opaque id.
#[async_trait]
pub trait RoadmapStore: Send + Sync {
    async fn fetch_roadmap(&self, id: &str) -> Result<Roadmap, StoreError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn RoadmapStore) {}
};

/// Store backed by a map, filled before it is shared.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRoadmapStore {
    roadmaps: HashMap<String, Roadmap>,
}

impl InMemoryRoadmapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a roadmap under its own id.
    pub fn insert(&mut self, roadmap: Roadmap) -> Option<Roadmap> {
        self.roadmaps.insert(roadmap.id.clone(), roadmap)
    }

    pub fn with_roadmap(mut self, roadmap: Roadmap) -> Self {
        self.insert(roadmap);
        self
    }

    pub fn len(&self) -> usize {
        self.roadmaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roadmaps.is_empty()
    }
}

#[async_trait]
impl RoadmapStore for InMemoryRoadmapStore {
    async fn fetch_roadmap(&self, id: &str) -> Result<Roadmap, StoreError> {
        self.roadmaps
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }
}
