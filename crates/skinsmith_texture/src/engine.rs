// SPDX-License-Identifier: MIT OR Apache-2.0
//! The texture engine: the editor-facing entry point.
//!
//! The editor hands the engine a new graph snapshot (or a single parameter
//! edit) and gets back the full map set. Buffers of unaffected nodes are
//! reused from the scheduler's cache between calls.

use crate::compositor::{MapCompositor, MapSet, RenderWarning};
use crate::config::{EngineConfig, RenderSettings};
use crate::error::{EngineError, NodeEvaluationError, Result};
use crate::scheduler::{CancelToken, PassStats, Scheduler};
use skinsmith_graph::{Graph, GraphError, NodeId, ParamValue};
use std::sync::Arc;
use tracing::{debug, info};

/// Maps and diagnostics of one render
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// One buffer per map slot
    pub maps: MapSet,
    /// Node failures, duplicate and dangling outputs
    pub warnings: Vec<RenderWarning>,
    /// Pass counters
    pub stats: PassStats,
}

impl RenderOutput {
    /// Node evaluator failures among the warnings
    pub fn failures(&self) -> impl Iterator<Item = &NodeEvaluationError> {
        self.warnings.iter().filter_map(|w| match w {
            RenderWarning::NodeFailed(err) => Some(err),
            _ => None,
        })
    }
}

/// Evaluates graph snapshots into map sets
#[derive(Debug)]
pub struct TextureEngine {
    config: EngineConfig,
    settings: RenderSettings,
    graph: Arc<Graph>,
    scheduler: Scheduler,
    compositor: MapCompositor,
}

impl TextureEngine {
    /// Create an engine; the config is validated first
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Texture engine ready: {} at most, cache of {} buffers ({} bytes)",
            config.max_resolution, config.cache_capacity, config.cache_budget_bytes
        );
        Ok(Self {
            settings: config.render,
            graph: Arc::new(Graph::default()),
            scheduler: Scheduler::new(config.cache_capacity)
                .with_cache_budget(usize::try_from(config.cache_budget_bytes).unwrap_or(usize::MAX))
                .with_pass_budget(usize::try_from(config.pass_budget_bytes).unwrap_or(usize::MAX)),
            compositor: MapCompositor::new(config.map_defaults),
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current render settings
    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    /// Current graph snapshot
    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// The evaluation cache
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Change resolution or seed for the next render.
    ///
    /// A resolution above the configured maximum is rejected and the
    /// previous settings stay in effect.
    pub fn set_settings(&mut self, settings: RenderSettings) -> Result<()> {
        if settings.resolution > self.config.max_resolution {
            return Err(EngineError::ResourceExhaustion(format!(
                "resolution {} exceeds the configured maximum {}",
                settings.resolution, self.config.max_resolution
            )));
        }
        if settings != self.settings {
            debug!(
                "Render settings changed to {} seed {}",
                settings.resolution, settings.seed
            );
        }
        self.settings = settings;
        Ok(())
    }

    /// Structural problems of a graph, for live editor feedback
    pub fn validate_graph(&self, graph: &Graph) -> Vec<GraphError> {
        graph.diagnostics()
    }

    /// Replace the graph and render it
    pub fn on_graph_changed(&mut self, graph: impl Into<Arc<Graph>>) -> Result<RenderOutput> {
        self.render_graph(graph.into(), &CancelToken::new())
    }

    /// Apply one parameter edit and re-render incrementally.
    ///
    /// A rejected value leaves the current graph untouched.
    pub fn on_parameter_changed(
        &mut self,
        node: NodeId,
        param: &str,
        value: ParamValue,
    ) -> Result<RenderOutput> {
        let mut graph = (*self.graph).clone();
        graph.set_parameter(node, param, value)?;
        self.scheduler.invalidate_downstream(&graph, node);
        self.graph = Arc::new(graph);
        self.render(&CancelToken::new())
    }

    /// Replace the graph and render it, stopping early if `cancel` fires
    pub fn render_graph(&mut self, graph: Arc<Graph>, cancel: &CancelToken) -> Result<RenderOutput> {
        self.graph = graph;
        self.render(cancel)
    }

    /// Render the current graph.
    ///
    /// Only ancestors of output nodes are evaluated. A graph without output
    /// nodes runs no evaluator at all and every map carries its default.
    pub fn render(&mut self, cancel: &CancelToken) -> Result<RenderOutput> {
        let graph = Arc::clone(&self.graph);
        let roots = graph.output_nodes();
        let pass = self.scheduler.run(&graph, &roots, &self.settings, cancel)?;

        let (maps, map_warnings) = self
            .compositor
            .compose(&graph, &pass, self.settings.resolution)?;

        let mut warnings: Vec<RenderWarning> =
            pass.failures.into_iter().map(RenderWarning::from).collect();
        warnings.extend(map_warnings);

        info!(
            "Rendered '{}' at {}: {} evaluated, {} cached, {} warning(s)",
            graph.name,
            self.settings.resolution,
            pass.stats.evaluated,
            pass.stats.cache_hits,
            warnings.len()
        );

        Ok(RenderOutput {
            maps,
            warnings,
            stats: pass.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::MapSource;
    use crate::error::NodeError;
    use crate::raster::{ChannelLayout, Resolution};
    use skinsmith_graph::{MapSlot, NodeKind};

    fn engine() -> TextureEngine {
        let mut config = EngineConfig::default();
        config.render = RenderSettings {
            resolution: Resolution::R256,
            seed: 42,
        };
        TextureEngine::new(config).unwrap()
    }

    fn link(
        graph: &mut Graph,
        from: NodeId,
        out: usize,
        to: NodeId,
        input: usize,
    ) -> std::result::Result<(), GraphError> {
        let from_port = graph.node(from).unwrap().output(out).unwrap().id;
        let to_port = graph.node(to).unwrap().input(input).unwrap().id;
        graph.connect(from, from_port, to, to_port).map(|_| ())
    }

    /// fbm -> gradient map -> color; fbm -> normal -> normal; voronoi -> roughness
    fn material() -> (Graph, [NodeId; 4]) {
        let mut graph = Graph::new("material");
        let fbm = graph.add_node(NodeKind::NoiseFbm, [0.0, 0.0]);
        let ramp = graph.add_node(NodeKind::GradientMap, [200.0, 0.0]);
        let normal = graph.add_node(NodeKind::NormalFromHeight, [200.0, 100.0]);
        let voronoi = graph.add_node(NodeKind::NoiseVoronoi, [0.0, 200.0]);
        let out_color = graph.add_node(NodeKind::OutputColor, [400.0, 0.0]);
        let out_normal = graph.add_node(NodeKind::OutputNormal, [400.0, 100.0]);
        let out_rough = graph.add_node(NodeKind::OutputRoughness, [400.0, 200.0]);
        link(&mut graph, fbm, 0, ramp, 0).unwrap();
        link(&mut graph, fbm, 0, normal, 0).unwrap();
        link(&mut graph, ramp, 0, out_color, 0).unwrap();
        link(&mut graph, normal, 0, out_normal, 0).unwrap();
        link(&mut graph, voronoi, 0, out_rough, 0).unwrap();
        (graph, [fbm, ramp, normal, voronoi])
    }

    #[test]
    fn test_same_graph_and_seed_render_identically() {
        let (graph, _) = material();
        let graph = Arc::new(graph);
        let a = engine().on_graph_changed(Arc::clone(&graph)).unwrap();
        let b = engine().on_graph_changed(graph).unwrap();
        for slot in MapSlot::ALL {
            assert_eq!(
                a.maps.buffer(slot).unwrap().data(),
                b.maps.buffer(slot).unwrap().data(),
                "{slot:?}"
            );
        }
    }

    #[test]
    fn test_graph_loaded_from_json_renders_the_same() {
        let (graph, _) = material();
        let loaded = Graph::from_json(&graph.to_json().unwrap()).unwrap();
        let a = engine().on_graph_changed(graph).unwrap();
        let b = engine().on_graph_changed(loaded).unwrap();
        assert_eq!(a.maps.buffer(MapSlot::Color), b.maps.buffer(MapSlot::Color));
        assert_eq!(a.maps.buffer(MapSlot::Normal), b.maps.buffer(MapSlot::Normal));
    }

    #[test]
    fn test_seed_changes_noise() {
        let (graph, _) = material();
        let graph = Arc::new(graph);
        let mut engine = engine();
        let a = engine.on_graph_changed(Arc::clone(&graph)).unwrap();
        engine
            .set_settings(RenderSettings {
                resolution: Resolution::R256,
                seed: 43,
            })
            .unwrap();
        let b = engine.on_graph_changed(graph).unwrap();
        assert_ne!(a.maps.buffer(MapSlot::Color), b.maps.buffer(MapSlot::Color));
    }

    #[test]
    fn test_parameter_edit_leaves_unaffected_maps_alone() {
        let (graph, [_, ramp, _, _]) = material();
        let mut engine = engine();
        let before = engine.on_graph_changed(graph).unwrap();

        let after = engine
            .on_parameter_changed(ramp, "color_b", ParamValue::Color([1.0, 0.0, 0.0, 1.0]))
            .unwrap();
        assert_eq!(after.stats.evaluated, 1);
        assert_eq!(after.stats.cache_hits, 3);
        for slot in [MapSlot::Normal, MapSlot::Roughness] {
            assert!(Arc::ptr_eq(
                before.maps.buffer(slot).unwrap(),
                after.maps.buffer(slot).unwrap()
            ));
        }
        assert_ne!(before.maps.buffer(MapSlot::Color), after.maps.buffer(MapSlot::Color));
    }

    #[test]
    fn test_rejected_parameter_leaves_graph_untouched() {
        let (graph, [fbm, ..]) = material();
        let mut engine = engine();
        engine.on_graph_changed(graph).unwrap();
        let snapshot = Arc::clone(engine.graph());

        let err = engine
            .on_parameter_changed(fbm, "octaves", ParamValue::Int(1000))
            .unwrap_err();
        assert!(matches!(err, EngineError::Graph(GraphError::OutOfRange { .. })));
        assert!(Arc::ptr_eq(&snapshot, engine.graph()));
    }

    #[test]
    fn test_cycle_yields_no_maps() {
        let mut graph = Graph::new("loop");
        let a = graph.add_node(NodeKind::MathOneMinus, [0.0, 0.0]);
        let b = graph.add_node(NodeKind::MathOneMinus, [0.0, 0.0]);
        let c = graph.add_node(NodeKind::MathOneMinus, [0.0, 0.0]);
        let out = graph.add_node(NodeKind::OutputHeight, [0.0, 0.0]);
        link(&mut graph, a, 0, b, 0).unwrap();
        link(&mut graph, b, 0, c, 0).unwrap();
        link(&mut graph, c, 0, a, 0).unwrap();
        link(&mut graph, c, 0, out, 0).unwrap();

        let mut engine = engine();
        let diagnostics = engine.validate_graph(&graph);
        assert!(diagnostics.iter().any(|e| matches!(e, GraphError::CycleDetected(_))));

        match engine.on_graph_changed(graph) {
            Err(EngineError::CycleDetected(mut nodes)) => {
                nodes.sort();
                let mut expected = vec![a, b, c];
                expected.sort();
                assert_eq!(nodes, expected);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_port_types_are_checked_on_connect() {
        let mut graph = Graph::new("types");
        let color = graph.add_node(NodeKind::ConstantColor, [0.0, 0.0]);
        let float = graph.add_node(NodeKind::ConstantFloat, [0.0, 0.0]);
        let out_normal = graph.add_node(NodeKind::OutputNormal, [0.0, 0.0]);
        let out_color = graph.add_node(NodeKind::OutputColor, [0.0, 0.0]);

        let err = link(&mut graph, color, 0, out_normal, 0).unwrap_err();
        assert!(matches!(err, GraphError::IncompatiblePortType { .. }));
        assert_eq!(graph.connection_count(), 0);

        link(&mut graph, float, 0, out_color, 0).unwrap();
        let output = engine().on_graph_changed(graph).unwrap();
        let map = output.maps.buffer(MapSlot::Color).unwrap();
        assert_eq!(map.layout(), ChannelLayout::Rgba);
        assert_eq!(map.pixel(0, 0), &[0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_seamless_noise_wraps_continuously() {
        let mut graph = Graph::new("tile");
        let perlin = graph.add_node(NodeKind::NoisePerlin, [0.0, 0.0]);
        graph.set_parameter(perlin, "seamless", ParamValue::Bool(true)).unwrap();
        let out = graph.add_node(NodeKind::OutputHeight, [0.0, 0.0]);
        link(&mut graph, perlin, 0, out, 0).unwrap();

        let output = engine().on_graph_changed(graph).unwrap();
        let h = output.maps.buffer(MapSlot::Height).unwrap();
        let (seam, interior) = seam_and_interior_steps(h);
        assert!(seam <= interior * 1.5 + 1e-4, "seam {seam} vs interior {interior}");
        assert!(h.is_seamless());
    }

    /// Largest step across the wrap-around edges and largest step between
    /// neighbouring pixels, both directions
    fn seam_and_interior_steps(h: &crate::raster::RasterBuffer) -> (f32, f32) {
        let n = h.width();
        let (mut seam, mut interior) = (0.0f32, 0.0f32);
        for i in 0..n {
            seam = seam
                .max((h.value(n - 1, i) - h.value(0, i)).abs())
                .max((h.value(i, n - 1) - h.value(i, 0)).abs());
            for j in 0..n - 1 {
                interior = interior
                    .max((h.value(j + 1, i) - h.value(j, i)).abs())
                    .max((h.value(i, j + 1) - h.value(i, j)).abs());
            }
        }
        (seam, interior)
    }

    fn height_of(kind: NodeKind, params: &[(&str, ParamValue)]) -> Arc<crate::raster::RasterBuffer> {
        let mut graph = Graph::new("pattern");
        let pattern = graph.add_node(kind, [0.0, 0.0]);
        for (id, value) in params {
            graph.set_parameter(pattern, id, value.clone()).unwrap();
        }
        let out = graph.add_node(NodeKind::OutputHeight, [200.0, 0.0]);
        link(&mut graph, pattern, 0, out, 0).unwrap();
        let output = engine().on_graph_changed(graph).unwrap();
        output.maps.buffer(MapSlot::Height).unwrap().clone()
    }

    #[test]
    fn test_seamless_soft_stripes_wrap_continuously() {
        for direction in ["horizontal", "vertical"] {
            let h = height_of(
                NodeKind::PatternStripes,
                &[
                    ("scale", ParamValue::Float(5.6)),
                    ("direction", ParamValue::Choice(direction.to_string())),
                    ("softness", ParamValue::Float(0.2)),
                ],
            );
            let (seam, interior) = seam_and_interior_steps(&h);
            assert!(interior > 0.0);
            assert!(
                seam <= interior + 1e-4,
                "{direction}: seam {seam} vs interior {interior}"
            );
        }
    }

    #[test]
    fn test_seamless_brick_repeats_across_the_edges() {
        // Snaps to 8 rows and 4 columns: one brick is 64 px wide and a
        // pair of offset rows is 64 px tall at 256
        let h = height_of(
            NodeKind::PatternBrick,
            &[
                ("rows", ParamValue::Float(7.3)),
                ("columns", ParamValue::Float(4.4)),
                ("mortar", ParamValue::Float(0.1)),
            ],
        );
        let n = h.width();
        assert!(h.data().contains(&0.0) && h.data().contains(&1.0));
        for y in 0..n {
            for x in 0..n {
                let v = h.value(x, y);
                assert_eq!(v, h.value((x + 64) % n, y), "({x}, {y})");
                assert_eq!(v, h.value(x, (y + 64) % n), "({x}, {y})");
            }
        }
    }

    #[test]
    fn test_flat_height_gives_flat_normal_map() {
        let mut graph = Graph::new("flat");
        let height = graph.add_node(NodeKind::ConstantFloat, [0.0, 0.0]);
        let normal = graph.add_node(NodeKind::NormalFromHeight, [0.0, 0.0]);
        let out = graph.add_node(NodeKind::OutputNormal, [0.0, 0.0]);
        graph.set_parameter(normal, "strength", ParamValue::Float(10.0)).unwrap();
        link(&mut graph, height, 0, normal, 0).unwrap();
        link(&mut graph, normal, 0, out, 0).unwrap();

        let mut engine = engine();
        for method in ["sobel", "prewitt", "scharr"] {
            graph
                .set_parameter(normal, "method", ParamValue::Choice(method.to_string()))
                .unwrap();
            let output = engine.on_graph_changed(graph.clone()).unwrap();
            let map = output.maps.buffer(MapSlot::Normal).unwrap();
            assert_eq!(output.maps.source(MapSlot::Normal), Some(MapSource::Node(out)));
            assert!(map.data().chunks(3).all(|p| p == [0.5, 0.5, 1.0]), "{method}");
        }
    }

    #[test]
    fn test_only_color_wired_fills_other_maps_with_defaults() {
        let mut graph = Graph::new("color only");
        let checker = graph.add_node(NodeKind::PatternChecker, [0.0, 0.0]);
        let out = graph.add_node(NodeKind::OutputColor, [0.0, 0.0]);
        link(&mut graph, checker, 0, out, 0).unwrap();

        let output = engine().on_graph_changed(graph).unwrap();
        assert!(output.warnings.is_empty());
        assert_eq!(output.maps.source(MapSlot::Color), Some(MapSource::Node(out)));
        let expected: [(MapSlot, &[f32]); 6] = [
            (MapSlot::Normal, &[0.5, 0.5, 1.0]),
            (MapSlot::Metalness, &[0.0]),
            (MapSlot::Roughness, &[0.5]),
            (MapSlot::Ao, &[1.0]),
            (MapSlot::Height, &[0.5]),
            (MapSlot::Emission, &[0.0, 0.0, 0.0, 0.0]),
        ];
        for (slot, pixel) in expected {
            assert_eq!(output.maps.source(slot), Some(MapSource::Default));
            let buffer = output.maps.buffer(slot).unwrap();
            assert!(buffer.data().chunks(pixel.len()).all(|p| p == pixel), "{slot:?}");
        }
    }

    #[test]
    fn test_failing_node_is_contained() {
        let mut graph = Graph::new("partial");
        let zero = graph.add_node(NodeKind::ConstantFloat, [0.0, 0.0]);
        let divide = graph.add_node(NodeKind::MathDivide, [0.0, 0.0]);
        let out_height = graph.add_node(NodeKind::OutputHeight, [0.0, 0.0]);
        let bricks = graph.add_node(NodeKind::PatternBrick, [0.0, 0.0]);
        let out_color = graph.add_node(NodeKind::OutputColor, [0.0, 0.0]);
        graph.set_parameter(zero, "value", ParamValue::Float(0.0)).unwrap();
        link(&mut graph, zero, 0, divide, 1).unwrap();
        link(&mut graph, divide, 0, out_height, 0).unwrap();
        link(&mut graph, bricks, 0, out_color, 0).unwrap();

        let output = engine().on_graph_changed(graph).unwrap();
        let failures: Vec<_> = output.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].node_id, divide);
        assert!(matches!(failures[0].cause, NodeError::DivisionByZero { .. }));

        assert_eq!(output.maps.source(MapSlot::Color), Some(MapSource::Node(out_color)));
        assert_eq!(output.maps.source(MapSlot::Height), Some(MapSource::Fallback));
        assert!(output.maps.buffer(MapSlot::Height).unwrap().data().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn test_resolution_above_maximum_is_rejected() {
        let mut config = EngineConfig::default();
        config.max_resolution = Resolution::R512;
        config.render.resolution = Resolution::R256;
        let mut engine = TextureEngine::new(config).unwrap();

        let err = engine
            .set_settings(RenderSettings {
                resolution: Resolution::R1024,
                seed: 0,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceExhaustion(_)));
        assert_eq!(engine.settings().resolution, Resolution::R256);
    }

    #[test]
    fn test_graph_without_outputs_evaluates_nothing() {
        let mut graph = Graph::new("unwired");
        let noise = graph.add_node(NodeKind::NoisePerlin, [0.0, 0.0]);
        let levels = graph.add_node(NodeKind::Levels, [200.0, 0.0]);
        link(&mut graph, noise, 0, levels, 0).unwrap();

        let mut engine = engine();
        let output = engine.on_graph_changed(graph).unwrap();
        assert_eq!(output.stats.evaluated, 0);
        assert!(output.warnings.is_empty());
        assert!(engine.scheduler().is_empty());
        for slot in MapSlot::ALL {
            assert_eq!(output.maps.source(slot), Some(MapSource::Default), "{slot:?}");
        }
        let ao = output.maps.buffer(MapSlot::Ao).unwrap();
        assert!(ao.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_engine_config_budgets_reach_the_scheduler() {
        let mut config = EngineConfig::default();
        config.max_resolution = Resolution::R256;
        config.render.resolution = Resolution::R256;
        config.pass_budget_bytes = crate::config::rgba_buffer_bytes(Resolution::R256);
        let mut engine = TextureEngine::new(config).unwrap();

        let (graph, _) = material();
        let err = engine.on_graph_changed(graph).unwrap_err();
        assert!(matches!(err, EngineError::ResourceExhaustion(_)));
    }

    #[test]
    fn test_empty_graph_renders_defaults() {
        let output = engine().on_graph_changed(Graph::default()).unwrap();
        assert_eq!(output.maps.len(), 7);
        assert_eq!(output.stats, PassStats::default());
    }
}
