// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-pixel scalar arithmetic. Results are clamped to `[0, 1]`.

use super::{gray, EvalResult, NodeContext, NodeInputs};
use crate::error::NodeError;
use skinsmith_graph::ParamValues;

pub(super) fn binary(
    inputs: &NodeInputs,
    ctx: &NodeContext,
    op: impl Fn(f32, f32) -> f32,
) -> EvalResult {
    let buffer = gray(ctx, inputs.all_seamless(), |x, y| {
        op(inputs.float(0, x, y), inputs.float(1, x, y)).clamp(0.0, 1.0)
    })?;
    Ok(vec![buffer])
}

/// `A / B`; a zero divisor is an error unless `safe`, where it yields zero
pub(super) fn divide(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let safe = params.flag("safe", false);
    if !safe {
        for y in 0..ctx.size {
            for x in 0..ctx.size {
                if inputs.float(1, x, y) == 0.0 {
                    return Err(NodeError::DivisionByZero { x, y });
                }
            }
        }
    }

    let buffer = gray(ctx, inputs.all_seamless(), |x, y| {
        let b = inputs.float(1, x, y);
        if b == 0.0 {
            0.0
        } else {
            (inputs.float(0, x, y) / b).clamp(0.0, 1.0)
        }
    })?;
    Ok(vec![buffer])
}

pub(super) fn one_minus(inputs: &NodeInputs, ctx: &NodeContext) -> EvalResult {
    let buffer = gray(ctx, inputs.all_seamless(), |x, y| {
        (1.0 - inputs.float(0, x, y)).clamp(0.0, 1.0)
    })?;
    Ok(vec![buffer])
}

pub(super) fn clamp(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let min = params.float("min", 0.0);
    let max = params.float("max", 1.0).max(min);
    let buffer = gray(ctx, inputs.all_seamless(), |x, y| inputs.float(0, x, y).clamp(min, max))?;
    Ok(vec![buffer])
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::super::{evaluate, InputValue};
    use crate::error::NodeError;
    use crate::raster::{ChannelLayout, RasterBuffer};
    use skinsmith_graph::{Node, NodeKind, ParamValue, PortValue};

    #[test]
    fn test_add_clamps() {
        let ctx = ctx(4);
        let mut inputs = inputs(NodeKind::MathAdd, &[]);
        inputs.set(0, InputValue::Constant(PortValue::Float(0.7)));
        inputs.set(1, InputValue::Constant(PortValue::Float(0.6)));
        let out = run(NodeKind::MathAdd, &inputs, &ctx);
        assert_eq!(out[0].value(0, 0), 1.0);
    }

    #[test]
    fn test_divide_by_zero_pixel_fails() {
        let ctx = ctx(4);
        let divisor = RasterBuffer::try_from_fn(4, 4, ChannelLayout::Gray, |x, y| {
            [if (x, y) == (2, 1) { 0.0 } else { 1.0 }, 0.0, 0.0, 0.0]
        })
        .unwrap();
        let node = Node::new(NodeKind::MathDivide);
        let inputs = inputs(NodeKind::MathDivide, &[(1, divisor)]);
        let err = evaluate(NodeKind::MathDivide, &inputs, &node.values(), &ctx).unwrap_err();
        assert_eq!(err, NodeError::DivisionByZero { x: 2, y: 1 });
    }

    #[test]
    fn test_safe_divide_yields_zero() {
        let ctx = ctx(4);
        let mut node = Node::new(NodeKind::MathDivide);
        node.parameters[0].value = ParamValue::Bool(true);
        let mut inputs = inputs(NodeKind::MathDivide, &[]);
        inputs.set(1, InputValue::Constant(PortValue::Float(0.0)));
        let out = evaluate(NodeKind::MathDivide, &inputs, &node.values(), &ctx).unwrap();
        assert!(out[0].data().iter().all(|&v| v == 0.0));
    }
}
