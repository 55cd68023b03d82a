// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and connections.
//!
//! The model tolerates transient invalid states while the user edits
//! (cycles, unconnected outputs); [`Graph::validate`] and
//! [`Graph::evaluation_order`] report them.

use crate::connection::{Connection, ConnectionId};
use crate::error::GraphError;
use crate::node::{Node, NodeId, NodeKind};
use crate::parameter::ParamValue;
use crate::port::{coerce, PortDirection, PortId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A texture node graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, Node>,
    /// Connections between nodes
    connections: IndexMap<ConnectionId, Connection>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
        }
    }

    /// Instantiate a node of `kind` with default ports and parameters
    pub fn add_node(&mut self, kind: NodeKind, position: [f32; 2]) -> NodeId {
        let node = Node::new(kind).with_position(position[0], position[1]);
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Insert an already built node after checking it against its kind
    pub fn insert_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        node.check_signature()?;
        let id = node.id;
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Remove a node and its connections
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.connections.retain(|_, c| !c.involves_node(node_id));
        self.nodes.shift_remove(&node_id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Move a node in the editor canvas
    pub fn set_position(&mut self, node_id: NodeId, position: [f32; 2]) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.position = position;
        Ok(())
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Connect an output port to an input port.
    ///
    /// An existing connection into the destination input is replaced.
    pub fn connect(
        &mut self,
        from_node: NodeId,
        from_port: PortId,
        to_node: NodeId,
        to_port: PortId,
    ) -> Result<ConnectionId, GraphError> {
        self.check_link(from_node, from_port, to_node, to_port)?;

        let replaced: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.feeds(to_node, to_port))
            .map(|c| c.id)
            .collect();
        for id in replaced {
            self.connections.shift_remove(&id);
        }

        let connection = Connection::new(from_node, from_port, to_node, to_port);
        let id = connection.id;
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Connect, failing with [`GraphError::PortAlreadyConnected`] instead of
    /// replacing an existing connection
    pub fn connect_exclusive(
        &mut self,
        from_node: NodeId,
        from_port: PortId,
        to_node: NodeId,
        to_port: PortId,
    ) -> Result<ConnectionId, GraphError> {
        if self.input_source(to_node, to_port).is_some() {
            return Err(GraphError::PortAlreadyConnected(to_port));
        }
        self.connect(from_node, from_port, to_node, to_port)
    }

    fn check_link(
        &self,
        from_node: NodeId,
        from_port: PortId,
        to_node: NodeId,
        to_port: PortId,
    ) -> Result<(), GraphError> {
        let source_node = self
            .nodes
            .get(&from_node)
            .ok_or(GraphError::NodeNotFound(from_node))?;
        let target_node = self
            .nodes
            .get(&to_node)
            .ok_or(GraphError::NodeNotFound(to_node))?;

        let source_port = source_node.port(&from_port).ok_or(GraphError::PortNotFound {
            node: from_node,
            port: from_port,
        })?;
        let target_port = target_node.port(&to_port).ok_or(GraphError::PortNotFound {
            node: to_node,
            port: to_port,
        })?;

        if source_port.direction != PortDirection::Output
            || target_port.direction != PortDirection::Input
        {
            return Err(GraphError::WrongDirection);
        }

        if coerce(source_port.port_type, target_port.port_type).is_none() {
            return Err(GraphError::IncompatiblePortType {
                from: source_port.port_type,
                to: target_port.port_type,
            });
        }
        Ok(())
    }

    /// Remove a connection
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        self.connections.shift_remove(&connection_id)
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get connections involving a node
    pub fn connections_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.involves_node(node_id))
    }

    /// The connection feeding an input, if any
    pub fn input_source(&self, node_id: NodeId, port_id: PortId) -> Option<&Connection> {
        self.connections.values().find(|c| c.feeds(node_id, port_id))
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Assign a parameter value after checking it against the bounds and
    /// options the node's kind declares.
    ///
    /// A rejected value leaves the graph untouched.
    pub fn set_parameter(
        &mut self,
        node_id: NodeId,
        param_id: &str,
        value: ParamValue,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let not_found = || GraphError::ParameterNotFound {
            node: node_id,
            param: param_id.to_string(),
        };
        let definition = node
            .kind
            .signature()
            .parameters
            .into_iter()
            .find(|p| p.id == param_id)
            .ok_or_else(not_found)?;
        definition.check(&value)?;
        let param = node
            .parameters
            .iter_mut()
            .find(|p| p.id == param_id)
            .ok_or_else(not_found)?;
        param.value = value;
        Ok(())
    }

    /// Output nodes in ascending id order
    pub fn output_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.kind.is_output())
            .map(|n| n.id)
            .collect();
        ids.sort();
        ids
    }

    /// Edges as (from, to) pairs between existing nodes
    fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.connections
            .values()
            .filter(|c| self.nodes.contains_key(&c.from_node) && self.nodes.contains_key(&c.to_node))
            .map(|c| (c.from_node, c.to_node))
    }

    fn adjacency(&self, forward: bool) -> HashMap<NodeId, Vec<NodeId>> {
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (from, to) in self.edges() {
            let (key, value) = if forward { (from, to) } else { (to, from) };
            adjacency.entry(key).or_default().push(value);
        }
        adjacency
    }

    fn reachable(&self, roots: &[NodeId], forward: bool) -> HashSet<NodeId> {
        let adjacency = self.adjacency(forward);
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<NodeId> = roots
            .iter()
            .copied()
            .filter(|id| self.nodes.contains_key(id))
            .collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(next) = adjacency.get(&id) {
                queue.extend(next.iter().copied());
            }
        }
        seen
    }

    /// The node and every node it (transitively) reads from
    pub fn upstream(&self, node_id: NodeId) -> HashSet<NodeId> {
        self.reachable(&[node_id], false)
    }

    /// The node and every node that (transitively) reads from it
    pub fn downstream(&self, node_id: NodeId) -> HashSet<NodeId> {
        self.reachable(&[node_id], true)
    }

    /// Evaluation order for the ancestors of `roots` (roots included).
    ///
    /// Kahn's algorithm; among ready nodes the smallest id goes first. If
    /// some nodes can't be ordered, the ones lying on a cycle are reported.
    pub fn evaluation_order(&self, roots: &[NodeId]) -> Result<Vec<NodeId>, GraphError> {
        let reachable = self.reachable(roots, false);
        let mut in_degree: HashMap<NodeId, usize> = reachable.iter().map(|&id| (id, 0)).collect();
        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for (from, to) in self.edges() {
            if reachable.contains(&from) && reachable.contains(&to) {
                *in_degree.entry(to).or_default() += 1;
                successors.entry(from).or_default().push(to);
            }
        }

        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(reachable.len());

        while let Some(id) = ready.pop_first() {
            order.push(id);
            for next in successors.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }

        if order.len() == reachable.len() {
            return Ok(order);
        }

        let resolved: HashSet<NodeId> = order.into_iter().collect();
        let unresolved: HashSet<NodeId> = reachable.difference(&resolved).copied().collect();
        Err(GraphError::CycleDetected(cycle_members(&unresolved, &successors)))
    }

    /// Evaluation order over the whole graph
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let all: Vec<NodeId> = self.nodes.keys().copied().collect();
        self.evaluation_order(&all)
    }

    /// Every structural problem, fatal ones first
    pub fn diagnostics(&self) -> Vec<GraphError> {
        let mut errors = Vec::new();

        for node in self.nodes.values() {
            if let Err(err) = node.check_signature() {
                errors.push(err);
            }
        }

        let mut fed: HashSet<(NodeId, PortId)> = HashSet::new();
        for c in self.connections.values() {
            if let Err(err) = self.check_link(c.from_node, c.from_port, c.to_node, c.to_port) {
                errors.push(err);
            } else if !fed.insert((c.to_node, c.to_port)) {
                errors.push(GraphError::PortAlreadyConnected(c.to_port));
            }
        }

        if let Err(err) = self.topological_order() {
            errors.push(err);
        }

        for id in self.output_nodes() {
            if let Some(node) = self.nodes.get(&id) {
                for port in node.inputs.iter().filter(|p| p.required) {
                    if self.input_source(id, port.id).is_none() {
                        errors.push(GraphError::DanglingOutput { node: id, port: port.id });
                    }
                }
            }
        }

        errors
    }

    /// Check the graph.
    ///
    /// Fails with the first fatal problem (structure, then cycles); a
    /// dangling output is reported only when nothing fatal was found.
    pub fn validate(&self) -> Result<(), GraphError> {
        let diagnostics = self.diagnostics();
        let first = diagnostics
            .iter()
            .find(|e| e.is_fatal())
            .or_else(|| diagnostics.first());
        match first {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Serialize to the editor's JSON format
    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from the editor's JSON format.
    ///
    /// Every node must match its kind's ports and parameter bounds; links
    /// and cycles are left to [`Graph::diagnostics`].
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let graph: Graph = serde_json::from_str(json)?;
        for node in graph.nodes.values() {
            node.check_signature()?;
        }
        tracing::debug!(
            "Loaded graph '{}' with {} nodes and {} connections",
            graph.name,
            graph.node_count(),
            graph.connection_count()
        );
        Ok(graph)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Nodes of `set` that can reach themselves through edges inside `set`
fn cycle_members(
    set: &HashSet<NodeId>,
    successors: &HashMap<NodeId, Vec<NodeId>>,
) -> Vec<NodeId> {
    let mut members: Vec<NodeId> = set
        .iter()
        .copied()
        .filter(|&start| {
            let mut seen = HashSet::new();
            let mut stack: Vec<NodeId> = successors.get(&start).cloned().unwrap_or_default();
            while let Some(id) = stack.pop() {
                if id == start {
                    return true;
                }
                if set.contains(&id) && seen.insert(id) {
                    stack.extend(successors.get(&id).into_iter().flatten().copied());
                }
            }
            false
        })
        .collect();
    members.sort();
    members
}
