// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node evaluators.
//!
//! Every evaluator is a pure function of its input buffers, its parameter
//! values and the [`NodeContext`]. It returns one buffer per output port of
//! the node kind, in port order.

mod color;
mod effect;
mod filter;
mod input;
mod math;
mod noise;
mod pattern;
mod transform;

use crate::error::NodeError;
use crate::raster::{AllocationError, ChannelLayout, RasterBuffer, Resolution};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use skinsmith_graph::{MapSlot, Node, NodeId, NodeKind, ParamValues, PortType, PortValue};
use std::sync::Arc;

pub use filter::{normal_from_height, GradientKernel};

/// Result of one evaluator call
pub type EvalResult = Result<Vec<RasterBuffer>, NodeError>;

/// Per-node evaluation context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeContext {
    /// Edge length of every buffer in the pass
    pub size: u32,
    /// Graph-wide seed
    pub seed: u64,
    /// Seed derived from the graph seed and the node id
    pub node_seed: u64,
}

impl NodeContext {
    /// Context for a node in a pass at `resolution`
    pub fn new(resolution: Resolution, seed: u64, node_id: NodeId) -> Self {
        Self::with_size(resolution.pixels(), seed, node_id)
    }

    /// Context with an arbitrary edge length
    pub fn with_size(size: u32, seed: u64, node_id: NodeId) -> Self {
        Self {
            size,
            seed,
            node_seed: node_seed(seed, node_id),
        }
    }

    /// Seed for a `noise` crate generator; `salt` separates layers
    pub fn noise_seed(&self, salt: u32) -> u32 {
        let mixed = self.node_seed ^ u64::from(salt).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (mixed ^ (mixed >> 32)) as u32
    }

    /// Deterministic random generator; `salt` separates streams
    pub fn rng(&self, salt: u64) -> StdRng {
        StdRng::seed_from_u64(self.node_seed ^ salt.rotate_left(29))
    }

    /// Normalized coordinates of a pixel centre
    pub fn uv(&self, x: u32, y: u32) -> [f32; 2] {
        let size = self.size as f32;
        [(x as f32 + 0.5) / size, (y as f32 + 0.5) / size]
    }
}

/// Seed of a node: the graph seed mixed with the node's id.
///
/// Stable for a given pair, so the same graph and seed render identically.
pub fn node_seed(graph_seed: u64, node_id: NodeId) -> u64 {
    let bits = node_id.0.as_u128();
    let folded = (bits >> 64) as u64 ^ bits as u64;
    StdRng::seed_from_u64(graph_seed ^ folded.rotate_left(17)).gen()
}

/// A resolved input of the node being evaluated
#[derive(Debug, Clone)]
pub enum InputValue {
    /// Upstream buffer, already converted to the input's port type
    Buffer(Arc<RasterBuffer>),
    /// Unconnected input reading its default value
    Constant(PortValue),
    /// Unconnected UV input: the pixel's own coordinates
    Identity,
}

/// The inputs of a node, in port order
#[derive(Debug, Clone, Default)]
pub struct NodeInputs {
    values: Vec<InputValue>,
}

impl NodeInputs {
    /// Wrap resolved inputs
    pub fn new(values: Vec<InputValue>) -> Self {
        Self { values }
    }

    /// Value an unconnected input of this port reads
    pub fn unconnected(port_type: PortType, default: Option<PortValue>) -> InputValue {
        match (default, port_type) {
            (Some(value), _) => InputValue::Constant(value),
            (None, PortType::Vector2) => InputValue::Identity,
            (None, PortType::Float) => InputValue::Constant(PortValue::Float(0.0)),
            (None, PortType::Vector3) => InputValue::Constant(PortValue::Vector3([0.0; 3])),
            (None, PortType::Color | PortType::Texture) => {
                InputValue::Constant(PortValue::Color([0.0; 4]))
            }
        }
    }

    /// Inputs of `node` with nothing connected
    pub fn defaults(node: &Node) -> Self {
        Self::new(
            node.inputs
                .iter()
                .map(|p| Self::unconnected(p.port_type, p.default_value))
                .collect(),
        )
    }

    /// Replace one input
    pub fn set(&mut self, index: usize, value: InputValue) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// Input by index
    pub fn get(&self, index: usize) -> Option<&InputValue> {
        self.values.get(index)
    }

    /// Upstream buffer of a connected input
    pub fn buffer(&self, index: usize) -> Option<&Arc<RasterBuffer>> {
        match self.values.get(index) {
            Some(InputValue::Buffer(buffer)) => Some(buffer),
            _ => None,
        }
    }

    /// Scalar read at a pixel
    pub fn float(&self, index: usize, x: u32, y: u32) -> f32 {
        match self.values.get(index) {
            Some(InputValue::Buffer(b)) => b.value(x, y),
            Some(InputValue::Constant(v)) => v.to_channels()[0],
            Some(InputValue::Identity) | None => 0.0,
        }
    }

    /// Color read at a pixel
    pub fn color(&self, index: usize, x: u32, y: u32) -> [f32; 4] {
        match self.values.get(index) {
            Some(InputValue::Buffer(b)) => b.rgba(x, y),
            Some(InputValue::Constant(PortValue::Float(v))) => [*v, *v, *v, 1.0],
            Some(InputValue::Constant(v)) => v.to_channels(),
            Some(InputValue::Identity) | None => [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// UV read at a pixel; unconnected inputs yield the pixel centre
    pub fn uv(&self, index: usize, x: u32, y: u32, ctx: &NodeContext) -> [f32; 2] {
        match self.values.get(index) {
            Some(InputValue::Buffer(b)) => {
                let p = b.pixel(x, y);
                [p[0], p[1]]
            }
            Some(InputValue::Constant(v)) => {
                let c = v.to_channels();
                [c[0], c[1]]
            }
            Some(InputValue::Identity) | None => ctx.uv(x, y),
        }
    }

    /// Whether an input tiles: constants and identity UVs always do
    pub fn input_seamless(&self, index: usize) -> bool {
        match self.values.get(index) {
            Some(InputValue::Buffer(b)) => b.is_seamless(),
            _ => true,
        }
    }

    /// Whether every input tiles
    pub fn all_seamless(&self) -> bool {
        (0..self.values.len()).all(|i| self.input_seamless(i))
    }

    /// Input as a full buffer, allocating one for constants
    pub fn materialize(
        &self,
        index: usize,
        layout: ChannelLayout,
        ctx: &NodeContext,
    ) -> Result<Arc<RasterBuffer>, AllocationError> {
        match self.values.get(index) {
            Some(InputValue::Buffer(b)) if b.layout() == layout => Ok(Arc::clone(b)),
            Some(InputValue::Buffer(b)) => {
                Ok(Arc::new(b.try_map(layout, |x, y| b.channels4(x, y))?))
            }
            Some(InputValue::Constant(v)) => Ok(Arc::new(
                RasterBuffer::try_filled(ctx.size, ctx.size, layout, v.to_channels())?
                    .with_seamless(true),
            )),
            Some(InputValue::Identity) | None => Ok(Arc::new(
                RasterBuffer::try_from_fn(ctx.size, ctx.size, layout, |x, y| {
                    let [u, v] = ctx.uv(x, y);
                    [u, v, 0.0, 0.0]
                })?
                .with_seamless(true),
            )),
        }
    }
}

/// Single channel buffer filled per pixel
pub(crate) fn gray(
    ctx: &NodeContext,
    seamless: bool,
    mut f: impl FnMut(u32, u32) -> f32,
) -> Result<RasterBuffer, AllocationError> {
    Ok(
        RasterBuffer::try_from_fn(ctx.size, ctx.size, ChannelLayout::Gray, |x, y| {
            [f(x, y), 0.0, 0.0, 0.0]
        })?
        .with_seamless(seamless),
    )
}

/// RGBA buffer filled per pixel
pub(crate) fn rgba(
    ctx: &NodeContext,
    seamless: bool,
    f: impl FnMut(u32, u32) -> [f32; 4],
) -> Result<RasterBuffer, AllocationError> {
    Ok(RasterBuffer::try_from_fn(ctx.size, ctx.size, ChannelLayout::Rgba, f)?.with_seamless(seamless))
}

/// Evaluate one node.
///
/// Output kinds pass their input through; the scheduler normally short
/// circuits them.
pub fn evaluate(
    kind: NodeKind,
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    use NodeKind::*;
    match kind {
        ConstantFloat => input::constant_float(params, ctx),
        ConstantColor => input::constant_color(params, ctx),
        Uv => input::uv(ctx),
        Gradient => input::gradient(inputs, params, ctx),

        AmbientOcclusion => filter::ambient_occlusion(inputs, params, ctx),

        MathAdd => math::binary(inputs, ctx, |a, b| a + b),
        MathSubtract => math::binary(inputs, ctx, |a, b| a - b),
        MathMultiply => math::binary(inputs, ctx, |a, b| a * b),
        MathDivide => math::divide(inputs, params, ctx),
        MathOneMinus => math::one_minus(inputs, ctx),
        MathClamp => math::clamp(inputs, params, ctx),

        ColorMix => color::mix(inputs, params, ctx),
        HueShift => color::hue_shift(inputs, params, ctx),
        Levels => color::levels(inputs, params, ctx),
        Grayscale => color::grayscale(inputs, params, ctx),
        GradientMap => color::gradient_map(inputs, params, ctx),

        PatternChecker => pattern::checker(inputs, params, ctx),
        PatternStripes => pattern::stripes(inputs, params, ctx),
        PatternBrick => pattern::brick(inputs, params, ctx),
        PatternHex => pattern::hex(inputs, params, ctx),

        NoisePerlin => noise::perlin(inputs, params, ctx),
        NoiseSimplex => noise::simplex(inputs, params, ctx),
        NoiseWorley => noise::worley(inputs, params, ctx),
        NoiseFbm => noise::fbm(inputs, params, ctx),
        NoiseVoronoi => noise::voronoi(inputs, params, ctx),

        FilterBlur => filter::blur(inputs, params, ctx, ChannelLayout::Gray),
        FilterBlurColor => filter::blur(inputs, params, ctx, ChannelLayout::Rgba),
        FilterSharpen => filter::sharpen(inputs, params, ctx),
        FilterEdgeDetect => filter::edge_detect(inputs, params, ctx),
        FilterEmboss => filter::emboss(inputs, params, ctx),
        NormalFromHeight => filter::normal(inputs, params, ctx),

        TransformTile => transform::tile(inputs, params, ctx),
        TransformOffset => transform::offset(inputs, params, ctx),
        TransformRotate => transform::rotate(inputs, params, ctx),
        UvWarp => transform::uv_warp(inputs, params, ctx),

        EffectWear => effect::wear(inputs, params, ctx),
        EffectScratches => effect::scratches(params, ctx),
        EffectGrunge => effect::grunge(inputs, params, ctx),
        EffectHolographic => effect::holographic(inputs, params, ctx),
        EffectPearlescent => effect::pearlescent(inputs, params, ctx),

        // Passes forward output nodes without calling in here; direct callers
        // get the input materialized in the slot's layout
        OutputColor | OutputNormal | OutputMetalness | OutputRoughness | OutputAo
        | OutputHeight | OutputEmission => {
            let port_type = kind.output_slot().map_or(PortType::Color, MapSlot::port_type);
            let buffer = inputs.materialize(0, ChannelLayout::for_port(port_type), ctx)?;
            Ok(vec![(*buffer).clone()])
        }
    }
}

/// Hermite step between two edges
pub(crate) fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if (edge1 - edge0).abs() <= f32::EPSILON {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Linear interpolation between colors
pub(crate) fn lerp4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn test_node_seed_is_stable_and_distinct() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_eq!(node_seed(1, a), node_seed(1, a));
        assert_ne!(node_seed(1, a), node_seed(2, a));
        assert_ne!(node_seed(1, a), node_seed(1, b));
    }

    #[test]
    fn test_every_kind_yields_one_buffer_per_output() {
        let ctx = ctx(16);
        for kind in NodeKind::ALL {
            let node = Node::new(kind);
            let inputs = NodeInputs::defaults(&node);
            let outputs = evaluate(kind, &inputs, &node.values(), &ctx)
                .unwrap_or_else(|e| panic!("{kind:?} failed: {e}"));
            let expected = if kind.is_output() { 1 } else { node.outputs.len() };
            assert_eq!(outputs.len(), expected, "{kind:?}");
            for (buffer, port) in outputs.iter().zip(&node.outputs) {
                assert_eq!(buffer.layout(), ChannelLayout::for_port(port.port_type), "{kind:?}");
                assert_eq!(buffer.width(), 16);
                assert!(
                    buffer.data().iter().all(|v| v.is_finite() && (-1e-5..=1.0 + 1e-5).contains(v)),
                    "{kind:?} produced values outside 0..=1"
                );
            }
        }
    }

    #[test]
    fn test_unconnected_uv_is_pixel_centre() {
        let ctx = ctx(4);
        let inputs = inputs(NodeKind::Gradient, &[]);
        assert_eq!(inputs.uv(0, 0, 3, &ctx), [0.125, 0.875]);
    }

    #[test]
    fn test_float_constant_broadcasts_as_color() {
        let inputs = NodeInputs::new(vec![InputValue::Constant(PortValue::Float(0.3))]);
        assert_eq!(inputs.color(0, 0, 0), [0.3, 0.3, 0.3, 1.0]);
    }
}
