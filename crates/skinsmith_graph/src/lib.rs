// SPDX-License-Identifier: MIT OR Apache-2.0
//! Texture node graph model for Skinsmith.
//!
//! This crate holds everything about a texture graph that does not touch
//! pixels:
//! - Typed input/output ports and the port coercion table
//! - Inline node parameters with range and option checks
//! - The closed registry of node kinds and their signatures
//! - Connection validation, cycle detection and evaluation ordering
//! - Snapshot-based undo/redo
//!
//! Evaluation lives in `skinsmith_texture`.

pub mod connection;
pub mod error;
pub mod graph;
pub mod history;
pub mod node;
pub mod parameter;
pub mod port;

pub use connection::{Connection, ConnectionId};
pub use error::GraphError;
pub use graph::Graph;
pub use history::{History, HistoryError};
pub use node::{MapSlot, Node, NodeCategory, NodeId, NodeKind, NodeSignature};
pub use parameter::{ParamValue, ParamValues, Parameter};
pub use port::{coerce, Coercion, Port, PortDirection, PortId, PortType, PortValue};
