// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spatial transforms: tiling, wrapping offset, rotation and UV warping.

use super::{rgba, EvalResult, NodeContext, NodeInputs};
use crate::raster::{ChannelLayout, RasterBuffer};
use skinsmith_graph::ParamValues;

pub(super) fn tile(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let src = inputs.materialize(0, ChannelLayout::Rgba, ctx)?;
    let tx = params.int("tiles_x", 2).max(1) as f32;
    let ty = params.int("tiles_y", 2).max(1) as f32;

    let buffer = rgba(ctx, src.is_seamless(), |x, y| {
        let [u, v] = ctx.uv(x, y);
        src.sample_bilinear((u * tx).fract(), (v * ty).fract(), true)
    })?;
    Ok(vec![buffer])
}

/// Shift by a fraction of the image, wrapping around the edges
pub(super) fn offset(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let src = inputs.materialize(0, ChannelLayout::Rgba, ctx)?;
    let size = i64::from(ctx.size);
    let dx = (params.float("offset_x", 0.0) * ctx.size as f32).round() as i64;
    let dy = (params.float("offset_y", 0.0) * ctx.size as f32).round() as i64;

    let buffer = rgba(ctx, src.is_seamless(), |x, y| {
        let sx = (i64::from(x) - dx).rem_euclid(size) as u32;
        let sy = (i64::from(y) - dy).rem_euclid(size) as u32;
        src.channels4(sx, sy)
    })?;
    Ok(vec![buffer])
}

/// Rotate about the image centre with bilinear sampling
pub(super) fn rotate(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let src = inputs.materialize(0, ChannelLayout::Rgba, ctx)?;
    let angle = params.float("angle", 0.0);
    let (sin, cos) = (-angle.to_radians()).sin_cos();
    // Quarter turns of a tiling image still tile
    let seamless = src.is_seamless() && angle.rem_euclid(90.0) == 0.0;

    let buffer = rgba(ctx, seamless, |x, y| {
        let [u, v] = ctx.uv(x, y);
        let (px, py) = (u - 0.5, v - 0.5);
        let su = px * cos - py * sin + 0.5;
        let sv = px * sin + py * cos + 0.5;
        src.sample_bilinear(su, sv, src.is_seamless())
    })?;
    Ok(vec![buffer])
}

/// Displace UVs along a direction by a scalar warp field centred on 0.5
pub(super) fn uv_warp(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let strength = params.float("strength", 0.1);
    let (dy, dx) = params.float("angle", 45.0).to_radians().sin_cos();

    let buffer = RasterBuffer::try_from_fn(ctx.size, ctx.size, ChannelLayout::Uv, |x, y| {
        let [u, v] = inputs.uv(0, x, y, ctx);
        let amount = (inputs.float(1, x, y) - 0.5) * 2.0 * strength;
        [
            (u + dx * amount).rem_euclid(1.0),
            (v + dy * amount).rem_euclid(1.0),
            0.0,
            0.0,
        ]
    })?
    .with_seamless(inputs.all_seamless());
    Ok(vec![buffer])
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::super::{evaluate, InputValue};
    use crate::raster::{ChannelLayout, RasterBuffer};
    use skinsmith_graph::{Node, NodeKind, ParamValue, PortValue};

    fn quadrants(size: u32) -> RasterBuffer {
        RasterBuffer::try_from_fn(size, size, ChannelLayout::Rgba, |x, y| {
            let r = if x < size / 2 { 1.0 } else { 0.0 };
            let g = if y < size / 2 { 1.0 } else { 0.0 };
            [r, g, 0.0, 1.0]
        })
        .unwrap()
        .with_seamless(true)
    }

    #[test]
    fn test_tile_repeats_source() {
        let ctx = ctx(8);
        let out = run(NodeKind::TransformTile, &inputs(NodeKind::TransformTile, &[(0, quadrants(8))]), &ctx);
        let t = &out[0];
        for y in 0..8 {
            for x in 0..4 {
                assert_eq!(t.channels4(x, y), t.channels4(x + 4, y));
            }
        }
        assert!(t.is_seamless());
    }

    #[test]
    fn test_offset_wraps() {
        let ctx = ctx(8);
        let mut node = Node::new(NodeKind::TransformOffset);
        node.parameters[0].value = ParamValue::Float(0.5);
        let src = quadrants(8);
        let inputs = inputs(NodeKind::TransformOffset, &[(0, src.clone())]);
        let out = evaluate(NodeKind::TransformOffset, &inputs, &node.values(), &ctx).unwrap();
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(out[0].channels4((x + 4) % 8, y), src.channels4(x, y));
            }
        }
    }

    #[test]
    fn test_rotate_zero_is_identity_and_quarter_turn_moves_quadrants() {
        let ctx = ctx(8);
        let src = quadrants(8);
        let inputs = inputs(NodeKind::TransformRotate, &[(0, src.clone())]);
        let out = run(NodeKind::TransformRotate, &inputs, &ctx);
        assert_eq!(out[0].data(), src.data());

        let mut node = Node::new(NodeKind::TransformRotate);
        node.parameters[0].value = ParamValue::Float(90.0);
        let turned = evaluate(NodeKind::TransformRotate, &inputs, &node.values(), &ctx).unwrap();
        // Red (left half) ends up in the top or bottom half, not split left/right
        let top_left = turned[0].channels4(1, 1)[0];
        let top_right = turned[0].channels4(6, 1)[0];
        assert!((top_left - top_right).abs() < 1e-3);
        assert!(turned[0].is_seamless());
    }

    #[test]
    fn test_neutral_warp_keeps_uvs() {
        let ctx = ctx(4);
        let out = run(NodeKind::UvWarp, &inputs(NodeKind::UvWarp, &[]), &ctx);
        for y in 0..4 {
            for x in 0..4 {
                let p = out[0].pixel(x, y);
                let [u, v] = ctx.uv(x, y);
                assert!((p[0] - u).abs() < 1e-6 && (p[1] - v).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_warp_shifts_along_direction() {
        let ctx = ctx(4);
        let mut node = Node::new(NodeKind::UvWarp);
        node.parameters[1].value = ParamValue::Float(0.0);
        let mut inputs = inputs(NodeKind::UvWarp, &[]);
        inputs.set(1, InputValue::Constant(PortValue::Float(1.0)));
        let out = evaluate(NodeKind::UvWarp, &inputs, &node.values(), &ctx).unwrap();
        let p = out[0].pixel(0, 0);
        assert!((p[0] - 0.225).abs() < 1e-5, "{p:?}");
        assert!((p[1] - 0.125).abs() < 1e-5);
    }
}
