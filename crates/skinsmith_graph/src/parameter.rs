// SPDX-License-Identifier: MIT OR Apache-2.0
//! Inline node parameters.
//!
//! Parameters are configuration that lives on the node itself rather than
//! arriving through a connection (noise scale, swatch colors, blend modes).

use crate::error::GraphError;
use serde::{Deserialize, Serialize};

/// A parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// Floating point value
    Float(f32),
    /// Integer value
    Int(i32),
    /// Boolean flag
    Bool(bool),
    /// RGBA color
    Color([f32; 4]),
    /// One of a fixed set of options
    Choice(String),
}

impl ParamValue {
    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Color(_) => "color",
            Self::Choice(_) => "choice",
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Int(v) => Some(f64::from(*v)),
            _ => None,
        }
    }
}

/// A parameter definition plus its current value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Stable key, unique within the node
    pub id: String,
    /// Display name
    pub name: String,
    /// Current value
    pub value: ParamValue,
    /// Inclusive lower bound (numeric parameters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound (numeric parameters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Allowed values (choice parameters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Parameter {
    /// Float parameter with a range
    pub fn float(id: &str, name: &str, value: f32, min: f32, max: f32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            value: ParamValue::Float(value),
            min: Some(f64::from(min)),
            max: Some(f64::from(max)),
            options: None,
        }
    }

    /// Integer parameter with a range
    pub fn int(id: &str, name: &str, value: i32, min: i32, max: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            value: ParamValue::Int(value),
            min: Some(f64::from(min)),
            max: Some(f64::from(max)),
            options: None,
        }
    }

    /// Boolean parameter
    pub fn flag(id: &str, name: &str, value: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            value: ParamValue::Bool(value),
            min: None,
            max: None,
            options: None,
        }
    }

    /// Color parameter
    pub fn color(id: &str, name: &str, value: [f32; 4]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            value: ParamValue::Color(value),
            min: Some(0.0),
            max: Some(1.0),
            options: None,
        }
    }

    /// Choice parameter; the first option is the default
    pub fn choice(id: &str, name: &str, options: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            value: ParamValue::Choice(options.first().copied().unwrap_or_default().to_string()),
            min: None,
            max: None,
            options: Some(options.iter().map(|o| o.to_string()).collect()),
        }
    }

    /// Check whether `value` may be assigned to this parameter
    pub fn check(&self, value: &ParamValue) -> Result<(), GraphError> {
        if std::mem::discriminant(&self.value) != std::mem::discriminant(value) {
            return Err(GraphError::ParameterTypeMismatch {
                param: self.id.clone(),
                expected: self.value.type_name(),
                found: value.type_name(),
            });
        }

        let out_of_range = |v: f64| {
            self.min.is_some_and(|min| v < min) || self.max.is_some_and(|max| v > max) || v.is_nan()
        };

        match value {
            ParamValue::Float(_) | ParamValue::Int(_) => {
                let v = value.numeric().unwrap_or(f64::NAN);
                if out_of_range(v) {
                    return Err(GraphError::OutOfRange {
                        param: self.id.clone(),
                        value: v,
                        min: self.min,
                        max: self.max,
                    });
                }
            }
            ParamValue::Color(c) => {
                if let Some(v) = c.iter().map(|&x| f64::from(x)).find(|&x| out_of_range(x)) {
                    return Err(GraphError::OutOfRange {
                        param: self.id.clone(),
                        value: v,
                        min: self.min,
                        max: self.max,
                    });
                }
            }
            ParamValue::Choice(choice) => {
                if let Some(options) = &self.options {
                    if !options.iter().any(|o| o == choice) {
                        return Err(GraphError::InvalidOption {
                            param: self.id.clone(),
                            value: choice.clone(),
                        });
                    }
                }
            }
            ParamValue::Bool(_) => {}
        }
        Ok(())
    }
}

/// Read-only typed view over a node's parameters, handed to evaluators
#[derive(Debug, Clone, Copy)]
pub struct ParamValues<'a> {
    params: &'a [Parameter],
}

impl<'a> ParamValues<'a> {
    /// Wrap a parameter list
    pub fn new(params: &'a [Parameter]) -> Self {
        Self { params }
    }

    /// Raw value lookup
    pub fn get(&self, id: &str) -> Option<&'a ParamValue> {
        self.params.iter().find(|p| p.id == id).map(|p| &p.value)
    }

    /// Float value, or `default` if missing or of another type
    pub fn float(&self, id: &str, default: f32) -> f32 {
        match self.get(id) {
            Some(ParamValue::Float(v)) => *v,
            Some(ParamValue::Int(v)) => *v as f32,
            _ => default,
        }
    }

    /// Integer value, or `default`
    pub fn int(&self, id: &str, default: i32) -> i32 {
        match self.get(id) {
            Some(ParamValue::Int(v)) => *v,
            _ => default,
        }
    }

    /// Boolean value, or `default`
    pub fn flag(&self, id: &str, default: bool) -> bool {
        match self.get(id) {
            Some(ParamValue::Bool(v)) => *v,
            _ => default,
        }
    }

    /// Color value, or `default`
    pub fn color(&self, id: &str, default: [f32; 4]) -> [f32; 4] {
        match self.get(id) {
            Some(ParamValue::Color(c)) => *c,
            _ => default,
        }
    }

    /// Choice value, or `default`
    pub fn choice(&self, id: &str, default: &'a str) -> &'a str {
        match self.get(id) {
            Some(ParamValue::Choice(c)) => c.as_str(),
            _ => default,
        }
    }
}
