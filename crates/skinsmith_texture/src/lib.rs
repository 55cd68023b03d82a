// SPDX-License-Identifier: MIT OR Apache-2.0
//! Procedural texture evaluation for Skinsmith.
//!
//! Turns a [`skinsmith_graph::Graph`] into the seven material maps:
//! color, normal, metalness, roughness, ambient occlusion, height and
//! emission.
//!
//! ## Architecture
//!
//! - [`raster`]: float pixel buffers, sampling and layout coercion
//! - [`nodes`]: one pure evaluator per node kind
//! - [`scheduler`]: ordered evaluation with an incremental LRU cache
//! - [`compositor`]: one buffer per map slot, defaults for the rest
//! - [`engine`]: the editor-facing facade
//! - [`worker`]: background rendering where newer requests supersede older ones
//!
//! Rendering is deterministic: the same graph, resolution and seed always
//! produce the same pixels.

pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod nodes;
pub mod raster;
pub mod scheduler;
pub mod worker;

pub use compositor::{MapCompositor, MapEntry, MapSet, MapSource, RenderWarning};
pub use config::{EngineConfig, MapDefaults, RenderSettings};
pub use engine::{RenderOutput, TextureEngine};
pub use error::{ConfigError, EngineError, NodeError, NodeEvaluationError, Result};
pub use raster::{AllocationError, ChannelLayout, InvalidResolution, RasterBuffer, Resolution};
pub use scheduler::{CacheKey, CancelToken, EntryState, Pass, PassStats, Scheduler};
pub use worker::{RenderResult, RenderWorker, WorkerStatus};
