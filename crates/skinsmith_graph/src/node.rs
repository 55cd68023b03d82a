// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions and the closed node-kind registry.
//!
//! Every node kind the engine understands is a variant of [`NodeKind`].
//! A kind's [`NodeSignature`] fixes its ports and parameters, so a node
//! built from a kind always matches what its evaluator expects.

use crate::error::GraphError;
use crate::parameter::{ParamValues, Parameter};
use crate::port::{Port, PortId, PortType, PortValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Constants, coordinates, gradients
    Input,
    /// Baked lighting terms
    Lighting,
    /// Per-pixel arithmetic
    Math,
    /// Color operators
    Color,
    /// Parametric patterns
    Pattern,
    /// Seeded noise generators
    Noise,
    /// Neighborhood filters
    Filter,
    /// Spatial transforms
    Transform,
    /// Fixed domain pipelines (wear, scratches, holographic...)
    Effect,
    /// Map outputs
    Output,
}

/// One of the exported material maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapSlot {
    /// Base color
    Color,
    /// Tangent-space normal
    Normal,
    /// Metalness
    Metalness,
    /// Roughness
    Roughness,
    /// Ambient occlusion
    Ao,
    /// Height
    Height,
    /// Emission
    Emission,
}

impl MapSlot {
    /// All slots in export order
    pub const ALL: [MapSlot; 7] = [
        MapSlot::Color,
        MapSlot::Normal,
        MapSlot::Metalness,
        MapSlot::Roughness,
        MapSlot::Ao,
        MapSlot::Height,
        MapSlot::Emission,
    ];

    /// Port type of the slot's output node input
    pub fn port_type(self) -> PortType {
        match self {
            Self::Color | Self::Emission => PortType::Color,
            Self::Normal => PortType::Vector3,
            Self::Metalness | Self::Roughness | Self::Ao | Self::Height => PortType::Float,
        }
    }

    /// Map name used by exporters
    pub fn name(self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Normal => "normal",
            Self::Metalness => "metalness",
            Self::Roughness => "roughness",
            Self::Ao => "ao",
            Self::Height => "height",
            Self::Emission => "emission",
        }
    }
}

/// Every node type known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    // Input
    /// Constant scalar
    ConstantFloat,
    /// Constant color swatch
    ConstantColor,
    /// Identity UV coordinates
    Uv,
    /// Linear / radial / angular gradient
    Gradient,

    // Lighting
    /// Ambient occlusion estimated from a height field
    AmbientOcclusion,

    // Math
    /// A + B
    MathAdd,
    /// A - B
    MathSubtract,
    /// A * B
    MathMultiply,
    /// A / B
    MathDivide,
    /// 1 - x
    MathOneMinus,
    /// Clamp into a range
    MathClamp,

    // Color
    /// Blend two colors by a factor
    ColorMix,
    /// HSV adjustment
    HueShift,
    /// Input/output levels with gamma
    Levels,
    /// Color to luminance
    Grayscale,
    /// Scalar to color ramp
    GradientMap,

    // Pattern
    /// Checkerboard
    PatternChecker,
    /// Stripes
    PatternStripes,
    /// Brick wall
    PatternBrick,
    /// Hexagon tiles
    PatternHex,

    // Noise
    /// Perlin gradient noise
    NoisePerlin,
    /// Simplex noise
    NoiseSimplex,
    /// Worley distance noise
    NoiseWorley,
    /// Fractal Brownian motion over Perlin
    NoiseFbm,
    /// Voronoi cells with distance and cell-id outputs
    NoiseVoronoi,

    // Filter
    /// Blur a scalar buffer
    FilterBlur,
    /// Blur a color buffer
    FilterBlurColor,
    /// Unsharp mask
    FilterSharpen,
    /// Gradient magnitude
    FilterEdgeDetect,
    /// Directional relief
    FilterEmboss,
    /// Height field to tangent-space normal map
    NormalFromHeight,

    // Transform
    /// Repeat the input N×M times
    TransformTile,
    /// Shift with wrap-around
    TransformOffset,
    /// Rotate around the centre
    TransformRotate,
    /// Displace UV coordinates by a scalar field
    UvWarp,

    // Effect
    /// Edge wear revealing an under-layer
    EffectWear,
    /// Scattered scratch strokes
    EffectScratches,
    /// Dirt and grime mask
    EffectGrunge,
    /// Rainbow holographic foil
    EffectHolographic,
    /// Pearlescent sheen
    EffectPearlescent,

    // Output
    /// Base color map
    OutputColor,
    /// Normal map
    OutputNormal,
    /// Metalness map
    OutputMetalness,
    /// Roughness map
    OutputRoughness,
    /// Ambient occlusion map
    OutputAo,
    /// Height map
    OutputHeight,
    /// Emission map
    OutputEmission,
}

/// Ports and parameters of a node kind
#[derive(Debug, Clone)]
pub struct NodeSignature {
    /// Input ports in evaluator order
    pub inputs: Vec<Port>,
    /// Output ports in evaluator order
    pub outputs: Vec<Port>,
    /// Parameter definitions with defaults
    pub parameters: Vec<Parameter>,
}

const BLEND_MODES: &[&str] = &["normal", "multiply", "screen", "overlay", "add", "difference"];
const GRADIENT_METHODS: &[&str] = &["sobel", "prewitt", "scharr"];
const MID_GRAY: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

fn uv_in() -> Port {
    Port::input("UV", PortType::Vector2)
}

fn float_in(name: &str, default: f32) -> Port {
    Port::input(name, PortType::Float).with_default(PortValue::Float(default))
}

fn color_in(name: &str, default: [f32; 4]) -> Port {
    Port::input(name, PortType::Color).with_default(PortValue::Color(default))
}

fn float_out(name: &str) -> Port {
    Port::output(name, PortType::Float)
}

fn color_out(name: &str) -> Port {
    Port::output(name, PortType::Color)
}

fn scale(default: f32) -> Parameter {
    Parameter::float("scale", "Scale", default, 0.5, 64.0)
}

fn seamless(default: bool) -> Parameter {
    Parameter::flag("seamless", "Seamless", default)
}

fn sig(inputs: Vec<Port>, outputs: Vec<Port>, parameters: Vec<Parameter>) -> NodeSignature {
    NodeSignature {
        inputs,
        outputs,
        parameters,
    }
}

impl NodeKind {
    /// Every registered kind
    pub const ALL: [NodeKind; 47] = [
        Self::ConstantFloat,
        Self::ConstantColor,
        Self::Uv,
        Self::Gradient,
        Self::AmbientOcclusion,
        Self::MathAdd,
        Self::MathSubtract,
        Self::MathMultiply,
        Self::MathDivide,
        Self::MathOneMinus,
        Self::MathClamp,
        Self::ColorMix,
        Self::HueShift,
        Self::Levels,
        Self::Grayscale,
        Self::GradientMap,
        Self::PatternChecker,
        Self::PatternStripes,
        Self::PatternBrick,
        Self::PatternHex,
        Self::NoisePerlin,
        Self::NoiseSimplex,
        Self::NoiseWorley,
        Self::NoiseFbm,
        Self::NoiseVoronoi,
        Self::FilterBlur,
        Self::FilterBlurColor,
        Self::FilterSharpen,
        Self::FilterEdgeDetect,
        Self::FilterEmboss,
        Self::NormalFromHeight,
        Self::TransformTile,
        Self::TransformOffset,
        Self::TransformRotate,
        Self::UvWarp,
        Self::EffectWear,
        Self::EffectScratches,
        Self::EffectGrunge,
        Self::EffectHolographic,
        Self::EffectPearlescent,
        Self::OutputColor,
        Self::OutputNormal,
        Self::OutputMetalness,
        Self::OutputRoughness,
        Self::OutputAo,
        Self::OutputHeight,
        Self::OutputEmission,
    ];

    /// Category of this kind
    pub fn category(self) -> NodeCategory {
        use NodeKind::*;
        match self {
            ConstantFloat | ConstantColor | Uv | Gradient => NodeCategory::Input,
            AmbientOcclusion => NodeCategory::Lighting,
            MathAdd | MathSubtract | MathMultiply | MathDivide | MathOneMinus | MathClamp => {
                NodeCategory::Math
            }
            ColorMix | HueShift | Levels | Grayscale | GradientMap => NodeCategory::Color,
            PatternChecker | PatternStripes | PatternBrick | PatternHex => NodeCategory::Pattern,
            NoisePerlin | NoiseSimplex | NoiseWorley | NoiseFbm | NoiseVoronoi => NodeCategory::Noise,
            FilterBlur | FilterBlurColor | FilterSharpen | FilterEdgeDetect | FilterEmboss
            | NormalFromHeight => NodeCategory::Filter,
            TransformTile | TransformOffset | TransformRotate | UvWarp => NodeCategory::Transform,
            EffectWear | EffectScratches | EffectGrunge | EffectHolographic | EffectPearlescent => {
                NodeCategory::Effect
            }
            OutputColor | OutputNormal | OutputMetalness | OutputRoughness | OutputAo
            | OutputHeight | OutputEmission => NodeCategory::Output,
        }
    }

    /// Map slot this kind feeds, for output kinds
    pub fn output_slot(self) -> Option<MapSlot> {
        match self {
            Self::OutputColor => Some(MapSlot::Color),
            Self::OutputNormal => Some(MapSlot::Normal),
            Self::OutputMetalness => Some(MapSlot::Metalness),
            Self::OutputRoughness => Some(MapSlot::Roughness),
            Self::OutputAo => Some(MapSlot::Ao),
            Self::OutputHeight => Some(MapSlot::Height),
            Self::OutputEmission => Some(MapSlot::Emission),
            _ => None,
        }
    }

    /// Whether this is a map output kind
    pub fn is_output(self) -> bool {
        self.output_slot().is_some()
    }

    /// Kinds belonging to a category
    pub fn in_category(category: NodeCategory) -> impl Iterator<Item = NodeKind> {
        Self::ALL.into_iter().filter(move |k| k.category() == category)
    }

    /// Serialized tag, e.g. `noise-perlin`
    pub fn tag(self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Display name
    pub fn display_name(self) -> &'static str {
        use NodeKind::*;
        match self {
            ConstantFloat => "Float",
            ConstantColor => "Color",
            Uv => "UV Coordinates",
            Gradient => "Gradient",
            AmbientOcclusion => "Ambient Occlusion",
            MathAdd => "Add",
            MathSubtract => "Subtract",
            MathMultiply => "Multiply",
            MathDivide => "Divide",
            MathOneMinus => "One Minus",
            MathClamp => "Clamp",
            ColorMix => "Mix",
            HueShift => "Hue Shift",
            Levels => "Levels",
            Grayscale => "Grayscale",
            GradientMap => "Gradient Map",
            PatternChecker => "Checker",
            PatternStripes => "Stripes",
            PatternBrick => "Brick",
            PatternHex => "Hexagons",
            NoisePerlin => "Perlin Noise",
            NoiseSimplex => "Simplex Noise",
            NoiseWorley => "Worley Noise",
            NoiseFbm => "Fractal Noise",
            NoiseVoronoi => "Voronoi",
            FilterBlur => "Blur",
            FilterBlurColor => "Blur Color",
            FilterSharpen => "Sharpen",
            FilterEdgeDetect => "Edge Detect",
            FilterEmboss => "Emboss",
            NormalFromHeight => "Normal From Height",
            TransformTile => "Tile",
            TransformOffset => "Offset",
            TransformRotate => "Rotate",
            UvWarp => "UV Warp",
            EffectWear => "Edge Wear",
            EffectScratches => "Scratches",
            EffectGrunge => "Grunge",
            EffectHolographic => "Holographic",
            EffectPearlescent => "Pearlescent",
            OutputColor => "Color Output",
            OutputNormal => "Normal Output",
            OutputMetalness => "Metalness Output",
            OutputRoughness => "Roughness Output",
            OutputAo => "AO Output",
            OutputHeight => "Height Output",
            OutputEmission => "Emission Output",
        }
    }

    /// Build the ports and default parameters for this kind
    pub fn signature(self) -> NodeSignature {
        use NodeKind::*;
        match self {
            ConstantFloat => sig(
                vec![],
                vec![float_out("Value")],
                vec![Parameter::float("value", "Value", 0.5, 0.0, 1.0)],
            ),
            ConstantColor => sig(
                vec![],
                vec![color_out("Color")],
                vec![Parameter::color("color", "Color", MID_GRAY)],
            ),
            Uv => sig(vec![], vec![Port::output("UV", PortType::Vector2)], vec![]),
            Gradient => sig(
                vec![uv_in()],
                vec![float_out("Value")],
                vec![
                    Parameter::choice("mode", "Mode", &["linear", "radial", "angular"]),
                    Parameter::float("angle", "Angle", 0.0, 0.0, 360.0),
                ],
            ),

            AmbientOcclusion => sig(
                vec![float_in("Height", 0.5)],
                vec![float_out("AO")],
                vec![
                    Parameter::int("radius", "Radius", 4, 1, 32),
                    Parameter::float("strength", "Strength", 1.0, 0.0, 4.0),
                ],
            ),

            MathAdd | MathSubtract => sig(
                vec![float_in("A", 0.0), float_in("B", 0.0)],
                vec![float_out("Result")],
                vec![],
            ),
            MathMultiply => sig(
                vec![float_in("A", 1.0), float_in("B", 1.0)],
                vec![float_out("Result")],
                vec![],
            ),
            MathDivide => sig(
                vec![float_in("A", 1.0), float_in("B", 1.0)],
                vec![float_out("Result")],
                vec![Parameter::flag("safe", "Guard Zero Divisor", false)],
            ),
            MathOneMinus => sig(vec![float_in("Value", 0.0)], vec![float_out("Result")], vec![]),
            MathClamp => sig(
                vec![float_in("Value", 0.0)],
                vec![float_out("Result")],
                vec![
                    Parameter::float("min", "Min", 0.0, 0.0, 1.0),
                    Parameter::float("max", "Max", 1.0, 0.0, 1.0),
                ],
            ),

            ColorMix => sig(
                vec![
                    color_in("A", [0.0, 0.0, 0.0, 1.0]),
                    color_in("B", [1.0, 1.0, 1.0, 1.0]),
                    float_in("Factor", 0.5),
                ],
                vec![color_out("Color")],
                vec![
                    Parameter::choice("mode", "Blend Mode", BLEND_MODES),
                    Parameter::choice("space", "Color Space", &["rgb", "hsv"]),
                ],
            ),
            HueShift => sig(
                vec![color_in("Color", MID_GRAY)],
                vec![color_out("Color")],
                vec![
                    Parameter::float("shift", "Hue Shift", 0.0, -1.0, 1.0),
                    Parameter::float("saturation", "Saturation", 1.0, 0.0, 2.0),
                    Parameter::float("value", "Value", 1.0, 0.0, 2.0),
                ],
            ),
            Levels => sig(
                vec![color_in("Color", MID_GRAY)],
                vec![color_out("Color")],
                vec![
                    Parameter::float("in_black", "Input Black", 0.0, 0.0, 1.0),
                    Parameter::float("in_white", "Input White", 1.0, 0.0, 1.0),
                    Parameter::float("gamma", "Gamma", 1.0, 0.1, 10.0),
                    Parameter::float("out_black", "Output Black", 0.0, 0.0, 1.0),
                    Parameter::float("out_white", "Output White", 1.0, 0.0, 1.0),
                ],
            ),
            Grayscale => sig(
                vec![color_in("Color", MID_GRAY)],
                vec![float_out("Value")],
                vec![Parameter::choice("method", "Method", &["luminance", "average"])],
            ),
            GradientMap => sig(
                vec![float_in("Value", 0.5)],
                vec![color_out("Color")],
                vec![
                    Parameter::color("color_a", "Low Color", [0.0, 0.0, 0.0, 1.0]),
                    Parameter::color("color_b", "High Color", [1.0, 1.0, 1.0, 1.0]),
                ],
            ),

            PatternChecker => sig(
                vec![uv_in()],
                vec![float_out("Mask")],
                vec![scale(8.0), seamless(true)],
            ),
            PatternStripes => sig(
                vec![uv_in()],
                vec![float_out("Mask")],
                vec![
                    scale(8.0),
                    Parameter::choice("direction", "Direction", &["horizontal", "vertical"]),
                    Parameter::float("width", "Stripe Width", 0.5, 0.0, 1.0),
                    Parameter::float("softness", "Softness", 0.0, 0.0, 0.5),
                    seamless(true),
                ],
            ),
            PatternBrick => sig(
                vec![uv_in()],
                vec![float_out("Mask")],
                vec![
                    Parameter::float("rows", "Rows", 8.0, 1.0, 64.0),
                    Parameter::float("columns", "Columns", 4.0, 1.0, 64.0),
                    Parameter::float("mortar", "Mortar", 0.05, 0.0, 0.5),
                    Parameter::float("offset", "Row Offset", 0.5, 0.0, 1.0),
                    seamless(true),
                ],
            ),
            PatternHex => sig(
                vec![uv_in()],
                vec![float_out("Mask")],
                vec![
                    scale(8.0),
                    Parameter::float("border", "Border", 0.05, 0.0, 0.5),
                    seamless(true),
                ],
            ),

            NoisePerlin | NoiseSimplex | NoiseWorley => sig(
                vec![uv_in()],
                vec![float_out("Value")],
                vec![scale(8.0), seamless(false)],
            ),
            NoiseFbm => sig(
                vec![uv_in()],
                vec![float_out("Value")],
                vec![
                    scale(4.0),
                    Parameter::int("octaves", "Octaves", 5, 1, 10),
                    Parameter::float("persistence", "Persistence", 0.5, 0.0, 1.0),
                    Parameter::float("lacunarity", "Lacunarity", 2.0, 1.0, 4.0),
                    seamless(false),
                ],
            ),
            NoiseVoronoi => sig(
                vec![uv_in()],
                vec![float_out("Distance"), float_out("Cells")],
                vec![
                    scale(8.0),
                    Parameter::float("jitter", "Jitter", 1.0, 0.0, 1.0),
                    seamless(true),
                ],
            ),

            FilterBlur => sig(
                vec![float_in("Value", 0.5)],
                vec![float_out("Value")],
                vec![
                    Parameter::int("radius", "Radius", 2, 0, 64),
                    Parameter::choice("method", "Method", &["box", "gaussian"]),
                ],
            ),
            FilterBlurColor => sig(
                vec![color_in("Color", MID_GRAY)],
                vec![color_out("Color")],
                vec![
                    Parameter::int("radius", "Radius", 2, 0, 64),
                    Parameter::choice("method", "Method", &["box", "gaussian"]),
                ],
            ),
            FilterSharpen => sig(
                vec![color_in("Color", MID_GRAY)],
                vec![color_out("Color")],
                vec![
                    Parameter::float("amount", "Amount", 1.0, 0.0, 5.0),
                    Parameter::int("radius", "Radius", 1, 1, 16),
                ],
            ),
            FilterEdgeDetect => sig(
                vec![float_in("Value", 0.5)],
                vec![float_out("Edges")],
                vec![
                    Parameter::choice("method", "Operator", GRADIENT_METHODS),
                    Parameter::float("strength", "Strength", 1.0, 0.0, 10.0),
                ],
            ),
            FilterEmboss => sig(
                vec![float_in("Value", 0.5)],
                vec![float_out("Relief")],
                vec![
                    Parameter::float("angle", "Light Angle", 135.0, 0.0, 360.0),
                    Parameter::float("strength", "Strength", 1.0, 0.0, 10.0),
                ],
            ),
            NormalFromHeight => sig(
                vec![float_in("Height", 0.5)],
                vec![Port::output("Normal", PortType::Vector3)],
                vec![
                    Parameter::choice("method", "Operator", GRADIENT_METHODS),
                    Parameter::float("strength", "Strength", 1.0, 0.0, 32.0),
                    Parameter::flag("invert", "Invert", false),
                    Parameter::int("blur_radius", "Pre-Blur Radius", 0, 0, 16),
                ],
            ),

            TransformTile => sig(
                vec![color_in("Color", MID_GRAY)],
                vec![color_out("Color")],
                vec![
                    Parameter::int("tiles_x", "Tiles X", 2, 1, 32),
                    Parameter::int("tiles_y", "Tiles Y", 2, 1, 32),
                ],
            ),
            TransformOffset => sig(
                vec![color_in("Color", MID_GRAY)],
                vec![color_out("Color")],
                vec![
                    Parameter::float("offset_x", "Offset X", 0.0, 0.0, 1.0),
                    Parameter::float("offset_y", "Offset Y", 0.0, 0.0, 1.0),
                ],
            ),
            TransformRotate => sig(
                vec![color_in("Color", MID_GRAY)],
                vec![color_out("Color")],
                vec![Parameter::float("angle", "Angle", 0.0, -360.0, 360.0)],
            ),
            UvWarp => sig(
                vec![uv_in(), float_in("Warp", 0.5)],
                vec![Port::output("UV", PortType::Vector2)],
                vec![
                    Parameter::float("strength", "Strength", 0.1, 0.0, 1.0),
                    Parameter::float("angle", "Direction", 45.0, 0.0, 360.0),
                ],
            ),

            EffectWear => sig(
                vec![color_in("Base", [0.55, 0.08, 0.08, 1.0]), float_in("Height", 0.5)],
                vec![color_out("Color")],
                vec![
                    Parameter::float("amount", "Amount", 0.4, 0.0, 1.0),
                    scale(12.0),
                    Parameter::color("worn_color", "Worn Color", [0.75, 0.75, 0.78, 1.0]),
                ],
            ),
            EffectScratches => sig(
                vec![],
                vec![float_out("Mask")],
                vec![
                    Parameter::int("count", "Count", 60, 1, 500),
                    Parameter::float("length", "Length", 0.2, 0.01, 1.0),
                    Parameter::float("width", "Width", 0.004, 0.0005, 0.05),
                    Parameter::float("angle", "Angle", 30.0, 0.0, 180.0),
                    Parameter::float("spread", "Angle Spread", 20.0, 0.0, 180.0),
                ],
            ),
            EffectGrunge => sig(
                vec![uv_in()],
                vec![float_out("Mask")],
                vec![
                    scale(6.0),
                    Parameter::float("contrast", "Contrast", 1.5, 0.0, 4.0),
                    seamless(false),
                ],
            ),
            EffectHolographic => sig(
                vec![color_in("Base", [0.8, 0.8, 0.85, 1.0])],
                vec![color_out("Color")],
                vec![
                    scale(4.0),
                    Parameter::float("intensity", "Intensity", 0.8, 0.0, 1.0),
                    Parameter::float("shift", "Hue Offset", 0.0, 0.0, 1.0),
                ],
            ),
            EffectPearlescent => sig(
                vec![color_in("Base", [0.9, 0.88, 0.85, 1.0])],
                vec![color_out("Color")],
                vec![
                    scale(3.0),
                    Parameter::float("intensity", "Intensity", 0.5, 0.0, 1.0),
                ],
            ),

            OutputColor | OutputNormal | OutputMetalness | OutputRoughness | OutputAo
            | OutputHeight | OutputEmission => {
                let slot = self.output_slot().unwrap_or(MapSlot::Color);
                sig(vec![Port::input("Input", slot.port_type()).required()], vec![], vec![])
            }
        }
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Node kind, selects the evaluator
    pub kind: NodeKind,
    /// Display name (can be customized)
    pub name: String,
    /// Position in the graph UI
    pub position: [f32; 2],
    /// Input ports
    pub inputs: Vec<Port>,
    /// Output ports
    pub outputs: Vec<Port>,
    /// Inline parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Node {
    /// Create a new node of the given kind with default ports and parameters
    pub fn new(kind: NodeKind) -> Self {
        let signature = kind.signature();
        Self {
            id: NodeId::new(),
            kind,
            name: kind.display_name().to_string(),
            position: [0.0, 0.0],
            inputs: signature.inputs,
            outputs: signature.outputs,
            parameters: signature.parameters,
        }
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// Get an input port by index
    pub fn input(&self, index: usize) -> Option<&Port> {
        self.inputs.get(index)
    }

    /// Get an output port by index
    pub fn output(&self, index: usize) -> Option<&Port> {
        self.outputs.get(index)
    }

    /// Get a port by ID
    pub fn port(&self, port_id: &PortId) -> Option<&Port> {
        self.inputs
            .iter()
            .find(|p| p.id == *port_id)
            .or_else(|| self.outputs.iter().find(|p| p.id == *port_id))
    }

    /// Position of an input port in evaluator order
    pub fn input_index(&self, port_id: &PortId) -> Option<usize> {
        self.inputs.iter().position(|p| p.id == *port_id)
    }

    /// Position of an output port in evaluator order
    pub fn output_index(&self, port_id: &PortId) -> Option<usize> {
        self.outputs.iter().position(|p| p.id == *port_id)
    }

    /// Get all ports
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    /// Parameter by key
    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Typed read view over the parameters
    pub fn values(&self) -> ParamValues<'_> {
        ParamValues::new(&self.parameters)
    }

    /// Whether the ports still match the kind's signature (arity and types)
    pub fn matches_signature(&self) -> bool {
        let signature = self.kind.signature();
        let same = |a: &[Port], b: &[Port]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.port_type == y.port_type)
        };
        same(&self.inputs, &signature.inputs) && same(&self.outputs, &signature.outputs)
    }

    /// Check ports and parameter values against the kind's registry entry.
    ///
    /// Bounds and options come from the registry, never from the node's own
    /// (possibly deserialized) parameter definitions.
    pub fn check_signature(&self) -> Result<(), GraphError> {
        if !self.matches_signature() {
            return Err(GraphError::SignatureMismatch(self.id));
        }
        let definitions = self.kind.signature().parameters;
        if definitions.len() != self.parameters.len() {
            return Err(GraphError::SignatureMismatch(self.id));
        }
        for definition in &definitions {
            let param = self
                .parameter(&definition.id)
                .ok_or(GraphError::SignatureMismatch(self.id))?;
            definition.check(&param.value)?;
        }
        Ok(())
    }
}
