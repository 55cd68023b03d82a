// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constants, coordinates and gradients.

use super::{gray, rgba, EvalResult, NodeContext, NodeInputs};
use crate::raster::{ChannelLayout, RasterBuffer};
use skinsmith_graph::ParamValues;
use std::f32::consts::TAU;

pub(super) fn constant_float(params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let value = params.float("value", 0.5);
    Ok(vec![gray(ctx, true, |_, _| value)?])
}

pub(super) fn constant_color(params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let color = params.color("color", [0.5, 0.5, 0.5, 1.0]);
    Ok(vec![rgba(ctx, true, |_, _| color)?])
}

pub(super) fn uv(ctx: &NodeContext) -> EvalResult {
    let buffer = RasterBuffer::try_from_fn(ctx.size, ctx.size, ChannelLayout::Uv, |x, y| {
        let [u, v] = ctx.uv(x, y);
        [u, v, 0.0, 0.0]
    })?;
    Ok(vec![buffer.with_seamless(true)])
}

pub(super) fn gradient(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let angle = params.float("angle", 0.0).to_radians();
    let (sin, cos) = angle.sin_cos();
    let mode = params.choice("mode", "linear");

    let buffer = gray(ctx, false, |x, y| {
        let [u, v] = inputs.uv(0, x, y, ctx);
        let (dx, dy) = (u - 0.5, v - 0.5);
        let t = match mode {
            "radial" => (dx * dx + dy * dy).sqrt() * 2.0,
            "angular" => (dy.atan2(dx) - angle).rem_euclid(TAU) / TAU,
            // Project onto the rotated axis so the ramp spans 0..1 corner to corner
            _ => {
                let extent = 0.5 * (cos.abs() + sin.abs());
                (dx * cos + dy * sin) / (2.0 * extent) + 0.5
            }
        };
        t.clamp(0.0, 1.0)
    })?;
    Ok(vec![buffer])
}
