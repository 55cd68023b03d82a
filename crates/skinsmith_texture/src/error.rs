// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation and engine errors.

use crate::raster::AllocationError;
use skinsmith_graph::{GraphError, NodeId, NodeKind};
use thiserror::Error;

/// Failure inside a single node evaluator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    /// A divisor pixel was zero and the node is not in safe mode
    #[error("Division by zero at pixel ({x}, {y})")]
    DivisionByZero {
        /// Column of the first zero divisor
        x: u32,
        /// Row of the first zero divisor
        y: u32,
    },

    /// An input buffer does not have the expected shape
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A working buffer could not be allocated
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// A node evaluator failure, tagged with the node it came from
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Node {node_id} ({kind:?}) failed: {cause}")]
pub struct NodeEvaluationError {
    /// Failing node
    pub node_id: NodeId,
    /// Its kind
    pub kind: NodeKind,
    /// What went wrong
    pub cause: NodeError,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON text could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),

    /// Values are individually valid but inconsistent
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors that abort a whole render pass
#[derive(Debug, Error)]
pub enum EngineError {
    /// The evaluated part of the graph contains a cycle; no maps are produced
    #[error("Graph contains a cycle through {} node(s)", .0.len())]
    CycleDetected(Vec<NodeId>),

    /// The graph is structurally invalid
    #[error(transparent)]
    Graph(GraphError),

    /// A buffer could not be allocated or the resolution exceeds the limit
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// The pass was cancelled by a newer request
    #[error("Render pass cancelled")]
    Cancelled,

    /// Parameters could not be fingerprinted
    #[error("Failed to fingerprint parameters: {0}")]
    Fingerprint(#[from] bincode::Error),

    /// Configuration problem
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<GraphError> for EngineError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::CycleDetected(nodes) => Self::CycleDetected(nodes),
            other => Self::Graph(other),
        }
    }
}

impl From<AllocationError> for EngineError {
    fn from(err: AllocationError) -> Self {
        Self::ResourceExhaustion(err.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
