// SPDX-License-Identifier: MIT OR Apache-2.0
//! Assembles the seven exported maps from a finished pass.

use crate::config::MapDefaults;
use crate::error::NodeEvaluationError;
use crate::raster::{AllocationError, ChannelLayout, RasterBuffer, Resolution};
use crate::scheduler::Pass;
use skinsmith_graph::{Graph, MapSlot, NodeId};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Flat normal pointing straight out of the surface
pub const FLAT_NORMAL: [f32; 4] = [0.5, 0.5, 1.0, 0.0];
/// Opaque mid-gray
pub const DEFAULT_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];
/// Transparent black
pub const DEFAULT_EMISSION: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// Where a map's buffer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapSource {
    /// Produced by this output node
    Node(NodeId),
    /// No usable output node; the documented default
    Default,
    /// The output node depends on a failed node; the default stands in
    Fallback,
}

/// One exported map
#[derive(Debug, Clone)]
pub struct MapEntry {
    /// Pixels in the slot's layout
    pub buffer: Arc<RasterBuffer>,
    /// Origin of the pixels
    pub source: MapSource,
}

/// Exactly one buffer per [`MapSlot`]
#[derive(Debug, Clone, Default)]
pub struct MapSet {
    entries: BTreeMap<MapSlot, MapEntry>,
}

impl MapSet {
    /// Entry of a slot
    pub fn get(&self, slot: MapSlot) -> Option<&MapEntry> {
        self.entries.get(&slot)
    }

    /// Buffer of a slot
    pub fn buffer(&self, slot: MapSlot) -> Option<&Arc<RasterBuffer>> {
        self.entries.get(&slot).map(|e| &e.buffer)
    }

    /// Source of a slot
    pub fn source(&self, slot: MapSlot) -> Option<MapSource> {
        self.entries.get(&slot).map(|e| e.source)
    }

    /// Entries in export order
    pub fn iter(&self) -> impl Iterator<Item = (MapSlot, &MapEntry)> {
        self.entries.iter().map(|(slot, entry)| (*slot, entry))
    }

    /// Number of maps
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no maps are present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Non-fatal problems reported with a render
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderWarning {
    /// A node evaluator failed; dependent maps use their default
    #[error(transparent)]
    NodeFailed(#[from] NodeEvaluationError),

    /// More than one output node targets the same map
    #[error("Several {slot:?} outputs; using {kept}, ignoring {ignored}")]
    DuplicateOutput {
        /// Map slot
        slot: MapSlot,
        /// Output node whose buffer is used
        kept: NodeId,
        /// Output node that is ignored
        ignored: NodeId,
    },

    /// An output node has nothing connected
    #[error("{slot:?} output {node} is not connected; using the default")]
    DanglingOutput {
        /// Map slot
        slot: MapSlot,
        /// The output node
        node: NodeId,
    },
}

/// Builds [`MapSet`]s, filling unproduced maps with defaults
#[derive(Debug, Clone, Default)]
pub struct MapCompositor {
    defaults: MapDefaults,
}

impl MapCompositor {
    /// Create a compositor with the given scalar defaults
    pub fn new(defaults: MapDefaults) -> Self {
        Self { defaults }
    }

    /// Fill value of a slot
    pub fn default_value(&self, slot: MapSlot) -> [f32; 4] {
        let scalar = |v: f32| [v, 0.0, 0.0, 0.0];
        match slot {
            MapSlot::Color => DEFAULT_COLOR,
            MapSlot::Normal => FLAT_NORMAL,
            MapSlot::Metalness => scalar(self.defaults.metalness),
            MapSlot::Roughness => scalar(self.defaults.roughness),
            MapSlot::Ao => scalar(self.defaults.ao),
            MapSlot::Height => scalar(self.defaults.height),
            MapSlot::Emission => DEFAULT_EMISSION,
        }
    }

    /// Uniform default buffer of a slot
    pub fn default_buffer(
        &self,
        slot: MapSlot,
        resolution: Resolution,
    ) -> Result<RasterBuffer, AllocationError> {
        let size = resolution.pixels();
        let layout = ChannelLayout::for_port(slot.port_type());
        Ok(RasterBuffer::try_filled(size, size, layout, self.default_value(slot))?.with_seamless(true))
    }

    /// Assemble the map set of a pass.
    ///
    /// Among several output nodes for one slot the lowest id wins.
    pub fn compose(
        &self,
        graph: &Graph,
        pass: &Pass,
        resolution: Resolution,
    ) -> Result<(MapSet, Vec<RenderWarning>), AllocationError> {
        let mut by_slot: BTreeMap<MapSlot, Vec<NodeId>> = BTreeMap::new();
        for id in graph.output_nodes() {
            if let Some(slot) = graph.node(id).and_then(|n| n.kind.output_slot()) {
                by_slot.entry(slot).or_default().push(id);
            }
        }

        let mut maps = MapSet::default();
        let mut warnings = Vec::new();

        for slot in MapSlot::ALL {
            let candidates = by_slot.get(&slot).map(Vec::as_slice).unwrap_or_default();
            let entry = match candidates.split_first() {
                None => self.default_entry(slot, resolution, MapSource::Default)?,
                Some((&kept, ignored)) => {
                    for &other in ignored {
                        warn!("Duplicate {} output {}; keeping {}", slot.name(), other, kept);
                        warnings.push(RenderWarning::DuplicateOutput {
                            slot,
                            kept,
                            ignored: other,
                        });
                    }
                    self.entry_for(slot, kept, pass, resolution, &mut warnings)?
                }
            };
            maps.entries.insert(slot, entry);
        }

        Ok((maps, warnings))
    }

    fn entry_for(
        &self,
        slot: MapSlot,
        node: NodeId,
        pass: &Pass,
        resolution: Resolution,
        warnings: &mut Vec<RenderWarning>,
    ) -> Result<MapEntry, AllocationError> {
        if let Some(buffer) = pass.buffer(node, 0) {
            let layout = ChannelLayout::for_port(slot.port_type());
            let buffer = if buffer.layout() == layout {
                Arc::clone(buffer)
            } else {
                Arc::new(buffer.try_map(layout, |x, y| buffer.channels4(x, y))?)
            };
            return Ok(MapEntry {
                buffer,
                source: MapSource::Node(node),
            });
        }

        if pass.failed.contains(&node) {
            return self.default_entry(slot, resolution, MapSource::Fallback);
        }

        warnings.push(RenderWarning::DanglingOutput { slot, node });
        self.default_entry(slot, resolution, MapSource::Default)
    }

    fn default_entry(
        &self,
        slot: MapSlot,
        resolution: Resolution,
        source: MapSource,
    ) -> Result<MapEntry, AllocationError> {
        Ok(MapEntry {
            buffer: Arc::new(self.default_buffer(slot, resolution)?),
            source,
        })
    }
}
