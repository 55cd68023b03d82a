// SPDX-License-Identifier: MIT OR Apache-2.0
//! Incremental graph evaluation.
//!
//! A pass orders the ancestors of the requested roots, then evaluates each
//! node unless a fresh cache entry exists for it. Cache keys carry a Merkle
//! fingerprint of the node's kind, its parameter values and the fingerprints
//! of everything feeding it, so an edit anywhere upstream produces new keys
//! for the edited node and all of its descendants and nothing else.

use crate::config::RenderSettings;
use crate::error::{EngineError, NodeError, NodeEvaluationError, Result};
use crate::nodes::{self, InputValue, NodeContext, NodeInputs};
use crate::raster::{AllocationError, ChannelLayout, RasterBuffer, Resolution};
use lru::LruCache;
use skinsmith_graph::{coerce, Graph, Node, NodeId, ParamValue};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifies one cached node output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Producing node
    pub node: NodeId,
    /// Output port index
    pub output: usize,
    /// Pass resolution
    pub resolution: Resolution,
    /// Graph seed
    pub seed: u64,
    /// Merkle hash of the node and its upstream
    pub fingerprint: u64,
}

/// Lifecycle state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Valid for its key
    Fresh,
    /// Invalidated; recomputed or dropped by the next pass
    Stale,
    /// Never computed, or already swept
    Absent,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    buffer: Arc<RasterBuffer>,
    state: EntryState,
}

/// Counters for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Nodes whose evaluator ran
    pub evaluated: usize,
    /// Nodes served entirely from the cache
    pub cache_hits: usize,
    /// Nodes not run because something upstream failed
    pub skipped: usize,
}

/// Cooperative cancellation for a pass.
///
/// A token is cancelled once the shared generation counter moves past the
/// generation it was issued for.
#[derive(Debug, Clone)]
pub struct CancelToken {
    latest: Arc<AtomicU64>,
    generation: u64,
}

impl CancelToken {
    /// A token that is only cancelled by calling [`CancelToken::cancel`]
    pub fn new() -> Self {
        Self::for_generation(Arc::new(AtomicU64::new(0)), 0)
    }

    /// A token for `generation`, cancelled when `latest` moves on
    pub fn for_generation(latest: Arc<AtomicU64>, generation: u64) -> Self {
        Self { latest, generation }
    }

    /// Cancel this token and every other token of the same generation
    pub fn cancel(&self) {
        let _ = self.latest.compare_exchange(
            self.generation,
            self.generation.wrapping_add(1),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Whether the pass should stop
    pub fn is_cancelled(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.generation
    }

    /// Generation this token was issued for
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffers and diagnostics of one pass
#[derive(Debug, Clone, Default)]
pub struct Pass {
    /// Every produced buffer by (node, output index). Output nodes store
    /// their converted input at index 0.
    pub buffers: HashMap<(NodeId, usize), Arc<RasterBuffer>>,
    /// Evaluator failures, in evaluation order
    pub failures: Vec<NodeEvaluationError>,
    /// Nodes that failed or were skipped because of an upstream failure
    pub failed: HashSet<NodeId>,
    /// Counters
    pub stats: PassStats,
    /// Bytes held by `buffers`
    pub bytes: usize,
}

impl Pass {
    /// A produced buffer
    pub fn buffer(&self, node: NodeId, output: usize) -> Option<&Arc<RasterBuffer>> {
        self.buffers.get(&(node, output))
    }

    fn insert(&mut self, node: NodeId, output: usize, buffer: Arc<RasterBuffer>) {
        self.bytes += buffer.byte_len();
        if let Some(old) = self.buffers.insert((node, output), buffer) {
            self.bytes = self.bytes.saturating_sub(old.byte_len());
        }
    }
}

/// Merkle fingerprint of `node`: kind, parameter values and, per input,
/// either the upstream fingerprint and port or the input's default value.
///
/// `known` must already hold the fingerprints of the node's sources.
pub fn fingerprint(graph: &Graph, node: &Node, known: &HashMap<NodeId, u64>) -> Result<u64> {
    let mut hasher = DefaultHasher::new();
    node.kind.hash(&mut hasher);
    let values: Vec<&ParamValue> = node.parameters.iter().map(|p| &p.value).collect();
    bincode::serialize(&values)?.hash(&mut hasher);

    for (index, port) in node.inputs.iter().enumerate() {
        index.hash(&mut hasher);
        match graph.input_source(node.id, port.id) {
            Some(connection) => {
                known.get(&connection.from_node).hash(&mut hasher);
                graph
                    .node(connection.from_node)
                    .and_then(|source| source.output_index(&connection.from_port))
                    .hash(&mut hasher);
            }
            None => bincode::serialize(&port.default_value)?.hash(&mut hasher),
        }
    }
    Ok(hasher.finish())
}

/// Bytes of the buffers `node` would produce at `resolution`
fn output_bytes(node: &Node, resolution: Resolution) -> usize {
    let pixels = (resolution.pixels() as usize).pow(2);
    node.outputs
        .iter()
        .map(|port| {
            pixels
                .saturating_mul(ChannelLayout::for_port(port.port_type).channels())
                .saturating_mul(std::mem::size_of::<f32>())
        })
        .fold(0, usize::saturating_add)
}

/// Evaluates graphs and owns the buffer cache.
///
/// The cache is bounded both by entry count and by the bytes its buffers
/// hold; a pass is bounded by the bytes of the buffers it keeps alive.
pub struct Scheduler {
    cache: LruCache<CacheKey, CacheEntry>,
    cached_bytes: usize,
    cache_budget: usize,
    pass_budget: usize,
}

impl Scheduler {
    /// Create a scheduler caching at most `capacity` buffers
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            cached_bytes: 0,
            cache_budget: usize::MAX,
            pass_budget: usize::MAX,
        }
    }

    /// Limit the bytes held by cached buffers
    pub fn with_cache_budget(mut self, bytes: usize) -> Self {
        self.cache_budget = bytes;
        self
    }

    /// Limit the bytes a single pass may keep alive
    pub fn with_pass_budget(mut self, bytes: usize) -> Self {
        self.pass_budget = bytes;
        self
    }

    /// Number of cached buffers
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Bytes held by cached buffers
    pub fn cached_bytes(&self) -> usize {
        self.cached_bytes
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop every cached buffer
    pub fn clear(&mut self) {
        self.cache.clear();
        self.cached_bytes = 0;
    }

    /// State of the entry for `key`
    pub fn entry_state(&self, key: &CacheKey) -> EntryState {
        self.cache
            .peek(key)
            .map_or(EntryState::Absent, |entry| entry.state)
    }

    /// Mark the entries of `node` and everything downstream of it stale.
    ///
    /// Returns the number of entries marked.
    pub fn invalidate_downstream(&mut self, graph: &Graph, node: NodeId) -> usize {
        let affected = graph.downstream(node);
        let mut marked = 0;
        for (key, entry) in self.cache.iter_mut() {
            if affected.contains(&key.node) && entry.state == EntryState::Fresh {
                entry.state = EntryState::Stale;
                marked += 1;
            }
        }
        debug!("Invalidated {} cache entries downstream of {}", marked, node);
        marked
    }

    /// Evaluate the ancestors of `roots`.
    ///
    /// Cycles abort before anything runs. Evaluator errors are contained:
    /// the failing node is reported and its descendants are skipped.
    /// Allocation failure and cancellation abort the pass.
    pub fn run(
        &mut self,
        graph: &Graph,
        roots: &[NodeId],
        settings: &RenderSettings,
        cancel: &CancelToken,
    ) -> Result<Pass> {
        let order = graph.evaluation_order(roots)?;
        for node in order.iter().filter_map(|&id| graph.node(id)) {
            node.check_signature()?;
        }
        debug!(
            "Starting pass over {} nodes at {} (seed {})",
            order.len(),
            settings.resolution,
            settings.seed
        );

        let mut fingerprints: HashMap<NodeId, u64> = HashMap::with_capacity(order.len());
        for &id in &order {
            if let Some(node) = graph.node(id) {
                let fp = fingerprint(graph, node, &fingerprints)?;
                fingerprints.insert(id, fp);
            }
        }
        self.mark_outdated(&fingerprints);

        let mut pass = Pass::default();
        for &id in &order {
            if cancel.is_cancelled() {
                debug!("Pass cancelled before node {}", id);
                return Err(EngineError::Cancelled);
            }
            let (Some(node), Some(&fp)) = (graph.node(id), fingerprints.get(&id)) else {
                continue;
            };
            self.run_node(graph, node, fp, settings, &mut pass)?;
        }

        self.sweep();
        debug!(
            "Pass finished: {} evaluated, {} cached, {} skipped, {} failed",
            pass.stats.evaluated,
            pass.stats.cache_hits,
            pass.stats.skipped,
            pass.failures.len()
        );
        Ok(pass)
    }

    fn run_node(
        &mut self,
        graph: &Graph,
        node: &Node,
        fp: u64,
        settings: &RenderSettings,
        pass: &mut Pass,
    ) -> Result<()> {
        let blocked = graph
            .connections()
            .any(|c| c.to_node == node.id && pass.failed.contains(&c.from_node));
        if blocked {
            pass.failed.insert(node.id);
            pass.stats.skipped += 1;
            return Ok(());
        }

        if node.kind.is_output() {
            return self.pass_through(graph, node, pass);
        }

        let key = |output| CacheKey {
            node: node.id,
            output,
            resolution: settings.resolution,
            seed: settings.seed,
            fingerprint: fp,
        };

        let cached: Option<Vec<Arc<RasterBuffer>>> = (0..node.outputs.len())
            .map(|i| match self.cache.get(&key(i)) {
                Some(entry) if entry.state == EntryState::Fresh => Some(Arc::clone(&entry.buffer)),
                _ => None,
            })
            .collect();
        if let Some(buffers) = cached.filter(|b| !b.is_empty()) {
            for (i, buffer) in buffers.into_iter().enumerate() {
                pass.insert(node.id, i, buffer);
            }
            pass.stats.cache_hits += 1;
            return Ok(());
        }

        let needed = output_bytes(node, settings.resolution);
        if pass.bytes.saturating_add(needed) > self.pass_budget {
            warn!(
                "Node {} needs {} bytes but the pass already holds {} of {}",
                node.id, needed, pass.bytes, self.pass_budget
            );
            let size = settings.resolution.pixels();
            return Err(AllocationError {
                bytes: needed,
                width: size,
                height: size,
            }
            .into());
        }

        let ctx = NodeContext::new(settings.resolution, settings.seed, node.id);
        let outcome = gather_inputs(graph, node, pass)
            .and_then(|inputs| nodes::evaluate(node.kind, &inputs, &node.values(), &ctx));
        pass.stats.evaluated += 1;

        match outcome {
            Ok(buffers) => {
                for (i, buffer) in buffers.into_iter().enumerate() {
                    let buffer = Arc::new(buffer);
                    self.store(key(i), &buffer);
                    pass.insert(node.id, i, buffer);
                }
                Ok(())
            }
            Err(NodeError::Allocation(err)) => Err(err.into()),
            Err(cause) => {
                warn!("Node {} ({}) failed: {}", node.id, node.kind.display_name(), cause);
                pass.failed.insert(node.id);
                pass.failures.push(NodeEvaluationError {
                    node_id: node.id,
                    kind: node.kind,
                    cause,
                });
                Ok(())
            }
        }
    }

    /// Output nodes forward their source buffer, converted to the input's
    /// type; a dangling output produces nothing
    fn pass_through(&mut self, graph: &Graph, node: &Node, pass: &mut Pass) -> Result<()> {
        let Some(port) = node.inputs.first() else {
            return Ok(());
        };
        let Some(connection) = graph.input_source(node.id, port.id) else {
            return Ok(());
        };
        let Some(source) = graph.node(connection.from_node) else {
            return Ok(());
        };
        let converted = match source
            .outputs
            .iter()
            .enumerate()
            .find(|(_, p)| p.id == connection.from_port)
        {
            Some((index, from)) => {
                match (pass.buffer(source.id, index), coerce(from.port_type, port.port_type)) {
                    (Some(buffer), Some(coercion)) => {
                        Some(RasterBuffer::coerce(buffer, coercion, port.port_type)?)
                    }
                    _ => None,
                }
            }
            None => None,
        };

        match converted {
            Some(buffer) => pass.insert(node.id, 0, buffer),
            None => {
                warn!("Output node {} has an unusable input; using the default", node.id);
                pass.failed.insert(node.id);
            }
        }
        Ok(())
    }

    /// Cache `buffer`, evicting least recently used entries until the byte
    /// budget holds again. Buffers larger than the budget are not cached.
    fn store(&mut self, key: CacheKey, buffer: &Arc<RasterBuffer>) {
        let bytes = buffer.byte_len();
        if bytes > self.cache_budget {
            debug!("Not caching {} bytes for node {}: over budget", bytes, key.node);
            return;
        }
        let entry = CacheEntry {
            buffer: Arc::clone(buffer),
            state: EntryState::Fresh,
        };
        if let Some((_, replaced)) = self.cache.push(key, entry) {
            self.cached_bytes = self.cached_bytes.saturating_sub(replaced.buffer.byte_len());
        }
        self.cached_bytes += bytes;
        while self.cached_bytes > self.cache_budget {
            let Some((_, evicted)) = self.cache.pop_lru() else {
                break;
            };
            self.cached_bytes = self.cached_bytes.saturating_sub(evicted.buffer.byte_len());
        }
    }

    /// Mark entries of pass nodes whose fingerprint changed
    fn mark_outdated(&mut self, fingerprints: &HashMap<NodeId, u64>) {
        for (key, entry) in self.cache.iter_mut() {
            if let Some(&fp) = fingerprints.get(&key.node) {
                if fp != key.fingerprint {
                    entry.state = EntryState::Stale;
                }
            }
        }
    }

    fn sweep(&mut self) {
        let stale: Vec<CacheKey> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.state == EntryState::Stale)
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            if let Some(entry) = self.cache.pop(key) {
                self.cached_bytes = self.cached_bytes.saturating_sub(entry.buffer.byte_len());
            }
        }
        if !stale.is_empty() {
            debug!("Swept {} stale cache entries", stale.len());
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cached", &self.cache.len())
            .field("capacity", &self.cache.cap())
            .field("cached_bytes", &self.cached_bytes)
            .field("cache_budget", &self.cache_budget)
            .finish()
    }
}

/// Resolve a node's inputs from upstream buffers or port defaults
fn gather_inputs(graph: &Graph, node: &Node, pass: &Pass) -> std::result::Result<NodeInputs, NodeError> {
    let mut values = Vec::with_capacity(node.inputs.len());
    for port in &node.inputs {
        let Some(connection) = graph.input_source(node.id, port.id) else {
            values.push(NodeInputs::unconnected(port.port_type, port.default_value));
            continue;
        };
        let source = graph.node(connection.from_node).ok_or_else(|| {
            NodeError::InvalidInput(format!("source node {} is missing", connection.from_node))
        })?;
        let (index, from) = source
            .outputs
            .iter()
            .enumerate()
            .find(|(_, p)| p.id == connection.from_port)
            .ok_or_else(|| NodeError::InvalidInput(format!("'{}' has no such output", source.name)))?;
        let coercion = coerce(from.port_type, port.port_type).ok_or_else(|| {
            NodeError::InvalidInput(format!(
                "cannot feed {:?} into {:?} input '{}'",
                from.port_type, port.port_type, port.name
            ))
        })?;
        let buffer = pass.buffer(source.id, index).ok_or_else(|| {
            NodeError::InvalidInput(format!("'{}' produced no buffer", source.name))
        })?;
        values.push(InputValue::Buffer(RasterBuffer::coerce(buffer, coercion, port.port_type)?));
    }
    Ok(NodeInputs::new(values))
}
