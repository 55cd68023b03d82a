// SPDX-License-Identifier: MIT OR Apache-2.0
//! Surface effects built from noise, height edges and seeded strokes.

use super::color::{blend_rgb, hsv_to_rgb, BlendMode};
use super::filter::GradientKernel;
use super::noise::{sample_fbm, unit};
use super::{gray, lerp4, rgba, smoothstep, EvalResult, NodeContext, NodeInputs};
use crate::raster::{ChannelLayout, RasterBuffer};
use noise::Perlin;
use rand::Rng;
use skinsmith_graph::ParamValues;

fn clamp4(c: [f32; 4]) -> [f32; 4] {
    c.map(|v| v.clamp(0.0, 1.0))
}

/// Edge wear: exposes `worn_color` where noise and height ridges agree
pub(super) fn wear(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let amount = params.float("amount", 0.4).clamp(0.0, 1.0);
    let scale = f64::from(params.float("scale", 12.0));
    let worn = params.color("worn_color", [0.75, 0.75, 0.78, 1.0]);
    let height = inputs.materialize(1, ChannelLayout::Gray, ctx)?;
    let seamless = inputs.all_seamless();
    let perlin = Perlin::new(ctx.noise_seed(0));
    let threshold = 1.0 - amount;

    let buffer = rgba(ctx, seamless, |x, y| {
        let noise = unit(sample_fbm(&perlin, ctx.uv(x, y), scale, 4, 0.5, 2.0, seamless));
        let (gx, gy) = GradientKernel::Sobel.gradient(&height, x, y);
        let edge = ((gx * gx + gy * gy).sqrt() * 8.0).min(1.0);
        let mask = smoothstep(threshold, threshold + 0.15, noise * 0.5 + edge * 0.5);
        clamp4(lerp4(inputs.color(0, x, y), worn, mask))
    })?;
    Ok(vec![buffer])
}

struct Scratch {
    start: [f32; 2],
    end: [f32; 2],
    depth: f32,
}

fn segment_distance(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ap = [p[0] - a[0], p[1] - a[1]];
    let len2 = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if len2 > 0.0 {
        ((ap[0] * ab[0] + ap[1] * ab[1]) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let d = [ap[0] - ab[0] * t, ap[1] - ab[1] * t];
    (d[0] * d[0] + d[1] * d[1]).sqrt()
}

/// Horizontal extent of the points on the line at height `y` that lie
/// within `reach` of the segment `a`-`b`, or `None` if the line misses it
fn row_span(a: [f32; 2], b: [f32; 2], y: f32, reach: f32) -> Option<(f32, f32)> {
    let dy = b[1] - a[1];
    let (t0, t1) = if dy.abs() <= f32::EPSILON {
        if (y - a[1]).abs() > reach {
            return None;
        }
        (0.0, 1.0)
    } else {
        let ta = (y - reach - a[1]) / dy;
        let tb = (y + reach - a[1]) / dy;
        let (lo, hi) = (ta.min(tb).max(0.0), ta.max(tb).min(1.0));
        if lo > hi {
            return None;
        }
        (lo, hi)
    };
    let xa = a[0] + (b[0] - a[0]) * t0;
    let xb = a[0] + (b[0] - a[0]) * t1;
    Some((xa.min(xb) - reach, xa.max(xb) + reach))
}

/// Seeded straight scratches, wrapped around the edges so the mask tiles
pub(super) fn scratches(params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let count = params.int("count", 60).max(0) as usize;
    let length = params.float("length", 0.2);
    let size = ctx.size as f32;
    let half_width = (params.float("width", 0.004) * 0.5).max(0.5 / size);
    let angle = params.float("angle", 30.0);
    let spread = params.float("spread", 20.0) * 0.5;

    let mut rng = ctx.rng(0);
    let strokes: Vec<Scratch> = (0..count)
        .map(|_| {
            let start = [rng.gen::<f32>(), rng.gen::<f32>()];
            let theta = (angle + rng.gen_range(-spread..=spread)).to_radians();
            let len = length * rng.gen_range(0.5..=1.0);
            Scratch {
                start,
                end: [start[0] + theta.cos() * len, start[1] + theta.sin() * len],
                depth: rng.gen_range(0.5..=1.0),
            }
        })
        .collect();

    let mut mask = RasterBuffer::try_new(ctx.size, ctx.size, ChannelLayout::Gray)?.with_seamless(true);
    let wrap = i64::from(ctx.size);
    let reach = half_width * 2.0;

    for s in &strokes {
        // Rows touched by the stroke, unwrapped
        let lo_y = ((s.start[1].min(s.end[1]) - reach) * size).floor() as i64;
        let hi_y = ((s.start[1].max(s.end[1]) + reach) * size).ceil() as i64;

        for py in lo_y..=hi_y {
            let y = (py as f32 + 0.5) / size;
            let Some((x0, x1)) = row_span(s.start, s.end, y, reach) else {
                continue;
            };
            let lo_x = (x0 * size - 0.5).floor() as i64;
            let hi_x = (x1 * size - 0.5).ceil() as i64;
            for px in lo_x..=hi_x {
                let p = [(px as f32 + 0.5) / size, y];
                let d = segment_distance(p, s.start, s.end);
                let intensity = (1.0 - smoothstep(half_width * 0.5, reach, d)) * s.depth;
                if intensity <= 0.0 {
                    continue;
                }
                let cell = &mut mask.pixel_mut(px.rem_euclid(wrap) as u32, py.rem_euclid(wrap) as u32)[0];
                *cell = cell.max(intensity);
            }
        }
    }

    Ok(vec![mask])
}

/// Two octave bands of fractal noise pushed apart by `contrast`
pub(super) fn grunge(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let scale = f64::from(params.float("scale", 6.0));
    let contrast = params.float("contrast", 1.5);
    let seamless = params.flag("seamless", false);
    let coarse = Perlin::new(ctx.noise_seed(1));
    let fine = Perlin::new(ctx.noise_seed(2));

    let buffer = gray(ctx, seamless && inputs.input_seamless(0), |x, y| {
        let uv = inputs.uv(0, x, y, ctx);
        let a = unit(sample_fbm(&coarse, uv, scale, 6, 0.55, 2.0, seamless));
        let b = unit(sample_fbm(&fine, uv, scale * 4.0, 3, 0.5, 2.0, seamless));
        let g = a * 0.7 + b * 0.3;
        ((g - 0.5) * contrast + 0.5).clamp(0.0, 1.0)
    })?;
    Ok(vec![buffer])
}

/// Diagonal rainbow bands, wobbled by noise and screened over the base
pub(super) fn holographic(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    // Whole band counts keep the hue periodic over a tile
    let bands = params.float("scale", 4.0).round().max(1.0);
    let intensity = params.float("intensity", 0.8).clamp(0.0, 1.0);
    let shift = params.float("shift", 0.0);
    let perlin = Perlin::new(ctx.noise_seed(0));
    let seamless = inputs.all_seamless();

    let buffer = rgba(ctx, seamless, |x, y| {
        let uv = ctx.uv(x, y);
        let wobble = sample_fbm(&perlin, uv, 3.0, 3, 0.5, 2.0, seamless) as f32 * 0.15;
        let hue = (uv[0] + uv[1]) * bands + wobble + shift;
        let base = inputs.color(0, x, y);
        let [r, g, b] = hsv_to_rgb([hue, 0.6, 1.0]);
        let film = blend_rgb(base, [r, g, b, base[3]], BlendMode::Screen);
        clamp4(lerp4(base, film, intensity))
    })?;
    Ok(vec![buffer])
}

/// Soft cool-to-warm sheen overlaid on the base
pub(super) fn pearlescent(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let scale = f64::from(params.float("scale", 3.0));
    let intensity = params.float("intensity", 0.5).clamp(0.0, 1.0);
    let perlin = Perlin::new(ctx.noise_seed(0));
    let seamless = inputs.all_seamless();

    let buffer = rgba(ctx, seamless, |x, y| {
        let n = unit(sample_fbm(&perlin, ctx.uv(x, y), scale, 3, 0.5, 2.0, seamless));
        let base = inputs.color(0, x, y);
        let [r, g, b] = hsv_to_rgb([0.55 + 0.35 * n, 0.25, 1.0]);
        let sheen = blend_rgb(base, [r, g, b, base[3]], BlendMode::Overlay);
        clamp4(lerp4(base, sheen, intensity))
    })?;
    Ok(vec![buffer])
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::super::{evaluate, InputValue, NodeContext, NodeInputs};
    use skinsmith_graph::{Node, NodeId, NodeKind, ParamValue, PortValue};

    #[test]
    fn test_wear_amount_zero_keeps_base() {
        let ctx = ctx(16);
        let mut node = Node::new(NodeKind::EffectWear);
        node.parameters[0].value = ParamValue::Float(0.0);
        let out = evaluate(NodeKind::EffectWear, &NodeInputs::defaults(&node), &node.values(), &ctx).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                let c = out[0].rgba(x, y);
                assert!((c[0] - 0.55).abs() < 1e-6 && (c[1] - 0.08).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_full_wear_exposes_worn_color() {
        let ctx = ctx(16);
        let mut node = Node::new(NodeKind::EffectWear);
        node.parameters[0].value = ParamValue::Float(1.0);
        let out = evaluate(NodeKind::EffectWear, &NodeInputs::defaults(&node), &node.values(), &ctx).unwrap();
        // Threshold zero: every pixel with any noise is worn through
        let worn = (0..16 * 16)
            .filter(|i| (out[0].rgba(i % 16, i / 16)[0] - 0.75).abs() < 1e-3)
            .count();
        assert!(worn > 16 * 16 / 2, "{worn}");
    }

    #[test]
    fn test_scratches_are_deterministic_and_sparse() {
        let id = NodeId::new();
        let a = run(NodeKind::EffectScratches, &NodeInputs::default(), &NodeContext::with_size(64, 3, id));
        let b = run(NodeKind::EffectScratches, &NodeInputs::default(), &NodeContext::with_size(64, 3, id));
        assert_eq!(a, b);
        let lit = a[0].data().iter().filter(|&&v| v > 0.0).count();
        assert!(lit > 0 && lit < 64 * 64 / 2, "{lit}");
        assert!(a[0].is_seamless());
    }

    #[test]
    fn test_row_span_covers_every_pixel_in_reach() {
        let size = 64.0;
        let reach = 0.03;
        let segments = [
            ([0.1, 0.2], [0.7, 0.5]),
            ([0.5, 0.9], [0.45, 0.1]),
            ([0.2, 0.4], [0.8, 0.4]),
            ([0.9, 0.3], [1.3, 0.35]),
            ([0.3, 0.3], [0.3, 0.3]),
        ];
        for (a, b) in segments {
            for py in -8..72 {
                let y = (py as f32 + 0.5) / size;
                let span = super::row_span(a, b, y, reach);
                for px in -8..96 {
                    let x = (px as f32 + 0.5) / size;
                    if super::segment_distance([x, y], a, b) >= reach {
                        continue;
                    }
                    let (x0, x1) = span.unwrap_or_else(|| panic!("row {py} missed {a:?}-{b:?}"));
                    assert!(x >= x0 && x <= x1, "pixel {px},{py} outside {x0}..{x1}");
                }
            }
        }
    }

    #[test]
    fn test_row_span_skips_distant_rows() {
        assert_eq!(super::row_span([0.1, 0.5], [0.9, 0.5], 0.6, 0.05), None);
        assert_eq!(super::row_span([0.1, 0.1], [0.2, 0.3], 0.9, 0.05), None);
        let (x0, x1) = super::row_span([0.1, 0.1], [0.5, 0.5], 0.3, 0.01).unwrap();
        assert!(x0 < 0.3 && x1 > 0.3);
        assert!(x1 - x0 < 0.1);
    }

    #[test]
    fn test_grunge_contrast_spreads_values() {
        let ctx = ctx(32);
        let mut flat = Node::new(NodeKind::EffectGrunge);
        flat.parameters[1].value = ParamValue::Float(0.0);
        let out = evaluate(NodeKind::EffectGrunge, &NodeInputs::defaults(&flat), &flat.values(), &ctx).unwrap();
        assert!(out[0].data().iter().all(|&v| v == 0.5));

        let out = run(NodeKind::EffectGrunge, &inputs(NodeKind::EffectGrunge, &[]), &ctx);
        assert!(!out[0].is_uniform());
    }

    #[test]
    fn test_holographic_zero_intensity_is_base() {
        let ctx = ctx(8);
        let mut node = Node::new(NodeKind::EffectHolographic);
        node.parameters[1].value = ParamValue::Float(0.0);
        let mut inputs = NodeInputs::defaults(&node);
        inputs.set(0, InputValue::Constant(PortValue::Color([0.2, 0.3, 0.4, 1.0])));
        let out = evaluate(NodeKind::EffectHolographic, &inputs, &node.values(), &ctx).unwrap();
        assert!(out[0].data().chunks(4).all(|p| p == [0.2, 0.3, 0.4, 1.0]));
    }

    #[test]
    fn test_holographic_shows_several_hues() {
        let ctx = ctx(32);
        let out = run(NodeKind::EffectHolographic, &inputs(NodeKind::EffectHolographic, &[]), &ctx);
        assert!(!out[0].is_uniform());
    }

    #[test]
    fn test_pearlescent_stays_close_to_base() {
        let ctx = ctx(16);
        let out = run(NodeKind::EffectPearlescent, &inputs(NodeKind::EffectPearlescent, &[]), &ctx);
        for p in out[0].data().chunks(4) {
            assert!((p[0] - 0.9).abs() < 0.3);
            assert_eq!(p[3], 1.0);
        }
    }
}
