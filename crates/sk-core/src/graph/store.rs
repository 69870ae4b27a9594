//! Graph store collaborator.
//!
//! The engine hands each finished projection to a [`GraphStore`]. Storage
//! protocol, connection handling and retries belong to the implementation;
//! the engine only relies on whole-projection replacement.

use super::GraphProjection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Errors that can occur in a graph store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The run was already persisted.
    #[error("Compliance run {0} was already persisted")]
    DuplicateRun(Uuid),
    /// The backing store could not be reached.
    #[error("Graph store unavailable: {0}")]
    Unavailable(String),
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for graph store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A projection as persisted for one compliance run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedProjection {
    pub run_id: Uuid,
    pub persisted_at: DateTime<Utc>,
    pub projection: GraphProjection,
}

/// Trait for persisting graph projections.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Replaces the stored graph with `projection` as one atomic unit.
    async fn replace(&self, run_id: Uuid, projection: GraphProjection) -> StoreResult<()>;

    /// Returns the currently stored projection, if any.
    async fn current(&self) -> StoreResult<Option<PersistedProjection>>;

    /// Lists the runs persisted so far, oldest first.
    async fn run_ids(&self) -> StoreResult<Vec<Uuid>>;
}

#[derive(Debug, Default)]
struct StoreState {
    current: Option<PersistedProjection>,
    runs: Vec<Uuid>,
}

/// In-memory implementation of GraphStore.
///
/// A single write lock guards both the projection and the run list, so
/// writes are serialized per run and readers never observe a partial graph.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryGraphStore {
    /// Creates a new empty in-memory graph store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn replace(&self, run_id: Uuid, projection: GraphProjection) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.runs.contains(&run_id) {
            return Err(StoreError::DuplicateRun(run_id));
        }

        info!(
            %run_id,
            nodes = projection.node_count(),
            edges = projection.edge_count(),
            "Replacing stored compliance graph"
        );
        state.runs.push(run_id);
        state.current = Some(PersistedProjection {
            run_id,
            persisted_at: Utc::now(),
            projection,
        });
        Ok(())
    }

    async fn current(&self) -> StoreResult<Option<PersistedProjection>> {
        Ok(self.state.read().await.current.clone())
    }

    async fn run_ids(&self) -> StoreResult<Vec<Uuid>> {
        Ok(self.state.read().await.runs.clone())
    }
}
