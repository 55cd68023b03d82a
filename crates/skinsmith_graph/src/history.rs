// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo history over immutable graph snapshots.
//!
//! Every edit produces a new [`Graph`] behind an `Arc`; undo and redo only
//! move a cursor over the stored snapshots, so no snapshot is ever mutated
//! after it has been committed.

use crate::error::GraphError;
use crate::graph::Graph;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Maximum undo history depth
const MAX_HISTORY: usize = 100;

/// History errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// The edit itself was rejected; history is unchanged
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Result type for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// A committed graph state
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The graph as it was after the edit
    pub graph: Arc<Graph>,
    /// Human-readable description of the edit
    pub description: String,
}

/// Snapshot stack plus cursor
#[derive(Debug)]
pub struct History {
    snapshots: VecDeque<Snapshot>,
    cursor: usize,
    max_depth: usize,
}

impl History {
    /// Start a history whose first snapshot is `initial`
    pub fn new(initial: Graph) -> Self {
        Self::with_max_depth(initial, MAX_HISTORY)
    }

    /// Create with custom maximum depth
    pub fn with_max_depth(initial: Graph, max_depth: usize) -> Self {
        let mut snapshots = VecDeque::new();
        snapshots.push_back(Snapshot {
            graph: Arc::new(initial),
            description: "Initial state".to_string(),
        });
        Self {
            snapshots,
            cursor: 0,
            max_depth: max_depth.max(1),
        }
    }

    /// The current graph
    pub fn current(&self) -> Arc<Graph> {
        Arc::clone(&self.snapshots[self.cursor].graph)
    }

    /// Push a new snapshot, discarding anything that could have been redone
    pub fn commit(&mut self, description: impl Into<String>, graph: Graph) -> Arc<Graph> {
        self.snapshots.truncate(self.cursor + 1);
        let graph = Arc::new(graph);
        self.snapshots.push_back(Snapshot {
            graph: Arc::clone(&graph),
            description: description.into(),
        });

        while self.snapshots.len() > self.max_depth + 1 {
            self.snapshots.pop_front();
        }
        self.cursor = self.snapshots.len() - 1;
        graph
    }

    /// Apply `edit` to a copy of the current graph and commit it on success.
    ///
    /// On error the current snapshot stays as it was.
    pub fn edit<T>(
        &mut self,
        description: impl Into<String>,
        edit: impl FnOnce(&mut Graph) -> std::result::Result<T, GraphError>,
    ) -> Result<T> {
        let mut graph = (*self.current()).clone();
        let value = edit(&mut graph)?;
        self.commit(description, graph);
        Ok(value)
    }

    /// Step back one snapshot
    pub fn undo(&mut self) -> Result<Arc<Graph>> {
        if self.cursor == 0 {
            return Err(HistoryError::NothingToUndo);
        }
        self.cursor -= 1;
        Ok(self.current())
    }

    /// Step forward one snapshot
    pub fn redo(&mut self) -> Result<Arc<Graph>> {
        if self.cursor + 1 >= self.snapshots.len() {
            return Err(HistoryError::NothingToRedo);
        }
        self.cursor += 1;
        Ok(self.current())
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Number of steps that can be undone
    pub fn undo_depth(&self) -> usize {
        self.cursor
    }

    /// Number of steps that can be redone
    pub fn redo_depth(&self) -> usize {
        self.snapshots.len() - self.cursor - 1
    }

    /// Get description of next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.can_undo()
            .then(|| self.snapshots[self.cursor].description.as_str())
    }

    /// Get description of next redo operation
    pub fn redo_description(&self) -> Option<&str> {
        self.snapshots
            .get(self.cursor + 1)
            .map(|s| s.description.as_str())
    }
}
