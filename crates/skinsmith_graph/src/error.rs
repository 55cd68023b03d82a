// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph structure errors.

use crate::node::NodeId;
use crate::port::{PortId, PortType};

/// Error raised by graph edits or validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port not found on the given node
    #[error("Port not found: {port} on node {node}")]
    PortNotFound {
        /// Node that was searched
        node: NodeId,
        /// Missing port
        port: PortId,
    },

    /// Parameter not found on the given node
    #[error("Parameter '{param}' not found on node {node}")]
    ParameterNotFound {
        /// Node that was searched
        node: NodeId,
        /// Missing parameter key
        param: String,
    },

    /// Source and destination port types have no coercion
    #[error("Incompatible port types: {from:?} -> {to:?}")]
    IncompatiblePortType {
        /// Source output type
        from: PortType,
        /// Destination input type
        to: PortType,
    },

    /// Node ports no longer match the arity or types of its kind
    #[error("Node {0} does not match its kind's port signature")]
    SignatureMismatch(NodeId),

    /// Connection must run from an output port to an input port
    #[error("Connection must go from an output port to an input port")]
    WrongDirection,

    /// Destination input already has an incoming connection
    #[error("Port already connected: {0}")]
    PortAlreadyConnected(PortId),

    /// Numeric parameter outside its bounds
    #[error("Parameter '{param}' value {value} outside range {min:?}..={max:?}")]
    OutOfRange {
        /// Parameter key
        param: String,
        /// Rejected value
        value: f64,
        /// Lower bound
        min: Option<f64>,
        /// Upper bound
        max: Option<f64>,
    },

    /// Choice parameter given a value not in its option list
    #[error("Parameter '{param}' has no option '{value}'")]
    InvalidOption {
        /// Parameter key
        param: String,
        /// Rejected choice
        value: String,
    },

    /// Parameter assigned a value of the wrong type
    #[error("Parameter '{param}' expects {expected}, got {found}")]
    ParameterTypeMismatch {
        /// Parameter key
        param: String,
        /// Type the parameter holds
        expected: &'static str,
        /// Type that was supplied
        found: &'static str,
    },

    /// The graph contains one or more cycles; lists every node on a cycle
    #[error("Graph contains a cycle through {} node(s)", .0.len())]
    CycleDetected(Vec<NodeId>),

    /// An output node's input is unconnected; its map renders the default
    #[error("Output node {node} has no input connected")]
    DanglingOutput {
        /// The output node
        node: NodeId,
        /// Its unconnected input port
        port: PortId,
    },

    /// Graph JSON could not be parsed or written
    #[error("Graph serialization failed: {0}")]
    Serialization(String),
}

impl GraphError {
    /// Whether this problem blocks evaluation or is only a warning
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DanglingOutput { .. })
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
