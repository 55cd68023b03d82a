// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.
//!
//! Ports are typed sockets. Whether two port types may be linked is decided
//! in exactly one place, [`coerce`], which both connection validation and
//! the evaluator use.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub Uuid);

impl PortId {
    /// Create a new random port ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PortId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

/// Data type that can flow through ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    /// Single channel (height, masks, AO)
    Float,
    /// Two channels (UV coordinates)
    Vector2,
    /// Three channels (normals stored as remapped unit vectors)
    Vector3,
    /// RGBA color
    Color,
    /// RGBA texture, aliases [`PortType::Color`]
    Texture,
}

impl PortType {
    /// Number of channels a buffer of this type carries
    pub fn channels(self) -> usize {
        match self {
            Self::Float => 1,
            Self::Vector2 => 2,
            Self::Vector3 => 3,
            Self::Color | Self::Texture => 4,
        }
    }

    /// Check if this type can connect to another type
    pub fn can_connect_to(self, other: PortType) -> bool {
        coerce(self, other).is_some()
    }
}

/// How a value of one port type is turned into another when a connection
/// crosses types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Types match exactly
    Identity,
    /// Scalar widened into every color channel, alpha set to one
    Broadcast,
    /// Same buffer viewed under another name (texture/color)
    Alias,
}

/// The full coercion table.
///
/// Exact matches, `float -> color` broadcast and `texture <-> color`
/// aliasing are the only links allowed.
pub fn coerce(from: PortType, to: PortType) -> Option<Coercion> {
    use PortType::*;
    match (from, to) {
        _ if from == to => Some(Coercion::Identity),
        (Float, Color) => Some(Coercion::Broadcast),
        (Texture, Color) | (Color, Texture) => Some(Coercion::Alias),
        _ => None,
    }
}

/// A port on a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    /// Unique port ID
    pub id: PortId,
    /// Port name
    pub name: String,
    /// Port direction
    pub direction: PortDirection,
    /// Data type
    pub port_type: PortType,
    /// Default value (for inputs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<PortValue>,
    /// Whether this port must be connected for the node to produce anything
    #[serde(default)]
    pub required: bool,
}

impl Port {
    /// Create a new input port
    pub fn input(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            id: PortId::new(),
            name: name.into(),
            direction: PortDirection::Input,
            port_type,
            default_value: None,
            required: false,
        }
    }

    /// Create a new output port
    pub fn output(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            id: PortId::new(),
            name: name.into(),
            direction: PortDirection::Output,
            port_type,
            default_value: None,
            required: false,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: PortValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Check if a connection from this port to `other` is valid
    pub fn can_connect(&self, other: &Port) -> bool {
        self.direction == PortDirection::Output
            && other.direction == PortDirection::Input
            && self.port_type.can_connect_to(other.port_type)
    }
}

/// Value that can be stored in a port
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PortValue {
    /// Float
    Float(f32),
    /// 2D vector
    Vector2([f32; 2]),
    /// 3D vector
    Vector3([f32; 3]),
    /// Color
    Color([f32; 4]),
}

impl PortValue {
    /// Get the port type for this value
    pub fn port_type(&self) -> PortType {
        match self {
            Self::Float(_) => PortType::Float,
            Self::Vector2(_) => PortType::Vector2,
            Self::Vector3(_) => PortType::Vector3,
            Self::Color(_) => PortType::Color,
        }
    }

    /// Expand into four channels; unused channels are zero, color alpha kept
    pub fn to_channels(&self) -> [f32; 4] {
        match *self {
            Self::Float(v) => [v, 0.0, 0.0, 0.0],
            Self::Vector2([x, y]) => [x, y, 0.0, 0.0],
            Self::Vector3([x, y, z]) => [x, y, z, 0.0],
            Self::Color(c) => c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coercion_table() {
        assert_eq!(coerce(PortType::Float, PortType::Float), Some(Coercion::Identity));
        assert_eq!(coerce(PortType::Float, PortType::Color), Some(Coercion::Broadcast));
        assert_eq!(coerce(PortType::Texture, PortType::Color), Some(Coercion::Alias));
        assert_eq!(coerce(PortType::Color, PortType::Texture), Some(Coercion::Alias));
        assert_eq!(coerce(PortType::Color, PortType::Vector3), None);
        assert_eq!(coerce(PortType::Color, PortType::Float), None);
        assert_eq!(coerce(PortType::Float, PortType::Vector2), None);
    }

    #[test]
    fn test_port_direction_matters() {
        let out = Port::output("Out", PortType::Float);
        let input = Port::input("In", PortType::Color);
        assert!(out.can_connect(&input));
        assert!(!input.can_connect(&out));
    }
}
