// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parametric patterns in UV space.
//!
//! With `seamless` set, repeat counts snap to whole numbers (even where the
//! pattern alternates) so the last column continues into the first.

use super::{gray, smoothstep, EvalResult, NodeContext, NodeInputs};
use skinsmith_graph::ParamValues;

const SQRT_3: f32 = 1.732_050_8;

/// Nearest whole repeat count, at least `min`
fn snap(value: f32, min: f32) -> f32 {
    value.round().max(min)
}

/// Nearest even repeat count, at least 2
fn snap_even(value: f32) -> f32 {
    ((value / 2.0).round() * 2.0).max(2.0)
}

fn wrap_uv(uv: [f32; 2], seamless: bool) -> [f32; 2] {
    if seamless {
        [uv[0].rem_euclid(1.0), uv[1].rem_euclid(1.0)]
    } else {
        uv
    }
}

pub(super) fn checker(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let seamless = params.flag("seamless", true);
    let scale = params.float("scale", 8.0);
    let cells = if seamless { snap_even(scale) } else { scale };

    let buffer = gray(ctx, seamless && inputs.input_seamless(0), |x, y| {
        let [u, v] = wrap_uv(inputs.uv(0, x, y, ctx), seamless);
        let ix = (u * cells).floor() as i64;
        let iy = (v * cells).floor() as i64;
        if (ix + iy).rem_euclid(2) == 0 {
            1.0
        } else {
            0.0
        }
    })?;
    Ok(vec![buffer])
}

pub(super) fn stripes(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let seamless = params.flag("seamless", true);
    let scale = params.float("scale", 8.0);
    let count = if seamless { snap(scale, 1.0) } else { scale };
    let vertical = params.choice("direction", "horizontal") == "vertical";
    let half = params.float("width", 0.5) * 0.5;
    let softness = params.float("softness", 0.0);

    let buffer = gray(ctx, seamless && inputs.input_seamless(0), |x, y| {
        let [u, v] = wrap_uv(inputs.uv(0, x, y, ctx), seamless);
        let t = if vertical { u } else { v } * count;
        // Distance to the stripe centre line, periodic in t
        let f = t.rem_euclid(1.0);
        let d = (f - half).abs().min(1.0 - (f - half).abs());
        1.0 - smoothstep(half - softness, half + softness, d)
    })?;
    Ok(vec![buffer])
}

pub(super) fn brick(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let seamless = params.flag("seamless", true);
    let rows = params.float("rows", 8.0);
    let columns = params.float("columns", 4.0);
    let (rows, columns) = if seamless {
        (snap_even(rows), snap(columns, 1.0))
    } else {
        (rows, columns)
    };
    let mortar = params.float("mortar", 0.05);
    let offset = params.float("offset", 0.5);
    // Mortar is measured in brick heights; convert to a fraction of brick width
    let mortar_u = mortar * columns / rows;

    let buffer = gray(ctx, seamless && inputs.input_seamless(0), |x, y| {
        let [u, v] = wrap_uv(inputs.uv(0, x, y, ctx), seamless);
        let row = (v * rows).floor();
        let shift = if (row as i64).rem_euclid(2) == 1 { offset } else { 0.0 };
        let fu = (u * columns + shift).rem_euclid(1.0);
        let fv = (v * rows).rem_euclid(1.0);

        let inside_u = fu > mortar_u * 0.5 && fu < 1.0 - mortar_u * 0.5;
        let inside_v = fv > mortar * 0.5 && fv < 1.0 - mortar * 0.5;
        if inside_u && inside_v {
            1.0
        } else {
            0.0
        }
    })?;
    Ok(vec![buffer])
}

/// Pointy-top hexagon tiles.
///
/// Works in units of the hex circumradius: columns are `sqrt(3)` apart and
/// rows 1.5 apart, so the vertical period (two rows) is 3.
pub(super) fn hex(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let seamless = params.flag("seamless", true);
    let scale = params.float("scale", 8.0);
    let border = params.float("border", 0.05);

    let columns = if seamless { snap(scale, 1.0) } else { scale };
    // Regular hexes need 2/sqrt(3) rows per column; tiling needs an even count
    let rows = columns * 2.0 / SQRT_3;
    let rows = if seamless { snap_even(rows) } else { rows };

    let period = [SQRT_3, 3.0];
    let half = [SQRT_3 * 0.5, 1.5];
    let apothem = SQRT_3 * 0.5;

    let buffer = gray(ctx, seamless && inputs.input_seamless(0), |x, y| {
        let [u, v] = wrap_uv(inputs.uv(0, x, y, ctx), seamless);
        let p = [u * columns * SQRT_3, v * rows * 1.5];

        // Two interleaved lattices; the nearer centre wins
        let local = |shift: [f32; 2]| {
            [
                (p[0] - shift[0]).rem_euclid(period[0]) - half[0],
                (p[1] - shift[1]).rem_euclid(period[1]) - half[1],
            ]
        };
        let a = local([0.0, 0.0]);
        let b = local(half);
        let q = if a[0] * a[0] + a[1] * a[1] <= b[0] * b[0] + b[1] * b[1] {
            a
        } else {
            b
        };

        let (qx, qy) = (q[0].abs(), q[1].abs());
        let edge = qx.max(qx * 0.5 + qy * SQRT_3 * 0.5) / apothem;
        if edge < 1.0 - border {
            1.0
        } else {
            0.0
        }
    })?;
    Ok(vec![buffer])
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::super::{evaluate, InputValue, NodeContext, NodeInputs};
    use crate::raster::{ChannelLayout, RasterBuffer};
    use skinsmith_graph::{Node, NodeKind, ParamValue};
    use std::sync::Arc;

    /// Render with identity UVs and with UVs one full period further on;
    /// a tileable pattern gives the same image both ways
    fn mismatches_after_period_shift(node: &Node, ctx: &NodeContext) -> usize {
        let plain = NodeInputs::defaults(node);
        let shifted_uv = RasterBuffer::try_from_fn(ctx.size, ctx.size, ChannelLayout::Uv, |x, y| {
            let [u, v] = ctx.uv(x, y);
            [u + 1.0, v + 1.0, 0.0, 0.0]
        })
        .unwrap()
        .with_seamless(true);
        let mut shifted = NodeInputs::defaults(node);
        shifted.set(0, InputValue::Buffer(Arc::new(shifted_uv)));

        let a = evaluate(node.kind, &plain, &node.values(), ctx).unwrap();
        let b = evaluate(node.kind, &shifted, &node.values(), ctx).unwrap();
        a[0].data().iter().zip(b[0].data()).filter(|(x, y)| x != y).count()
    }

    #[test]
    fn test_checker_alternates() {
        let ctx = ctx(16);
        let out = run(NodeKind::PatternChecker, &inputs(NodeKind::PatternChecker, &[]), &ctx);
        let c = &out[0];
        assert_eq!(c.value(0, 0), 1.0);
        assert_eq!(c.value(2, 0), 0.0);
        assert_eq!(c.value(2, 2), 1.0);
        assert!(c.is_seamless());
    }

    #[test]
    fn test_seamless_checker_snaps_to_even_cells() {
        let ctx = ctx(32);
        let mut node = Node::new(NodeKind::PatternChecker);
        node.parameters[0].value = ParamValue::Float(7.3);
        let inputs = NodeInputs::defaults(&node);
        let out = evaluate(NodeKind::PatternChecker, &inputs, &node.values(), &ctx).unwrap();
        // 7.3 snaps to 8 cells of 4 px; the last column continues the first
        let c = &out[0];
        for y in 0..32 {
            assert_ne!(c.value(31, y), c.value(0, y));
            assert_eq!(c.value(0, y), c.value(8, y));
        }
        assert_eq!(mismatches_after_period_shift(&node, &ctx), 0);
    }

    #[test]
    fn test_non_seamless_checker_keeps_fractional_scale() {
        let ctx = ctx(32);
        let mut node = Node::new(NodeKind::PatternChecker);
        node.parameters[0].value = ParamValue::Float(7.3);
        node.parameters[1].value = ParamValue::Bool(false);
        assert!(mismatches_after_period_shift(&node, &ctx) > 0);
    }

    #[test]
    fn test_stripes_width() {
        let ctx = ctx(64);
        let out = run(NodeKind::PatternStripes, &inputs(NodeKind::PatternStripes, &[]), &ctx);
        let lit = out[0].data().iter().filter(|&&v| v > 0.5).count();
        let ratio = lit as f32 / (64.0 * 64.0);
        assert!((ratio - 0.5).abs() < 0.05, "{ratio}");
        assert_eq!(mismatches_after_period_shift(&Node::new(NodeKind::PatternStripes), &ctx), 0);
    }

    #[test]
    fn test_brick_has_mortar_and_bricks() {
        let ctx = ctx(256);
        let node = Node::new(NodeKind::PatternBrick);
        let out = run(NodeKind::PatternBrick, &NodeInputs::defaults(&node), &ctx);
        let data = out[0].data();
        assert!(data.iter().any(|&v| v == 0.0));
        assert!(data.iter().filter(|&&v| v == 1.0).count() > data.len() / 2);
        assert_eq!(mismatches_after_period_shift(&node, &ctx), 0);
    }

    #[test]
    fn test_hex_tiles_seamlessly() {
        let ctx = ctx(256);
        let node = Node::new(NodeKind::PatternHex);
        let out = run(NodeKind::PatternHex, &NodeInputs::defaults(&node), &ctx);
        let h = &out[0];
        assert!(h.data().iter().any(|&v| v == 0.0));
        assert!(h.data().iter().any(|&v| v == 1.0));
        assert!(h.is_seamless());
        // Pixels lying exactly on a slanted border may round either way
        assert!(mismatches_after_period_shift(&node, &ctx) <= 8);
    }
}
