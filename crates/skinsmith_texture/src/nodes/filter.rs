// SPDX-License-Identifier: MIT OR Apache-2.0
//! Neighborhood filters.
//!
//! Reads outside the image clamp to the nearest edge pixel, or wrap when the
//! source buffer is seamless (see [`RasterBuffer::resolve`]).

use super::{gray, EvalResult, NodeContext, NodeInputs};
use crate::raster::{AllocationError, ChannelLayout, RasterBuffer};
use skinsmith_graph::ParamValues;

/// Edge length at which `strength = 1` gives the reference slope
pub const REFERENCE_SIZE: f32 = 256.0;

/// 3×3 gradient operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientKernel {
    /// Weights 1-2-1
    Sobel,
    /// Weights 1-1-1
    Prewitt,
    /// Weights 3-10-3
    Scharr,
}

impl GradientKernel {
    /// Parse a choice parameter value, Sobel for anything unknown
    pub fn parse(name: &str) -> Self {
        match name {
            "prewitt" => Self::Prewitt,
            "scharr" => Self::Scharr,
            _ => Self::Sobel,
        }
    }

    /// (corner, edge) weights
    fn weights(self) -> (f32, f32) {
        match self {
            Self::Sobel => (1.0, 2.0),
            Self::Prewitt => (1.0, 1.0),
            Self::Scharr => (3.0, 10.0),
        }
    }

    /// Horizontal and vertical derivative at a pixel, in value units per
    /// pixel (the raw response divided by the kernel's weight sum)
    pub fn gradient(self, buffer: &RasterBuffer, x: u32, y: u32) -> (f32, f32) {
        let (c, e) = self.weights();
        let (x, y) = (i64::from(x), i64::from(y));
        let h = |dx: i64, dy: i64| buffer.fetch(x + dx, y + dy);

        let gx = c * (h(1, -1) - h(-1, -1)) + e * (h(1, 0) - h(-1, 0)) + c * (h(1, 1) - h(-1, 1));
        let gy = c * (h(-1, 1) - h(-1, -1)) + e * (h(0, 1) - h(0, -1)) + c * (h(1, 1) - h(1, -1));
        let norm = 2.0 * (2.0 * c + e);
        (gx / norm, gy / norm)
    }
}

/// Tangent-space normal map from a height field.
///
/// The slope is scaled by `size / REFERENCE_SIZE` so a given `strength`
/// looks the same at every resolution. `invert` flips both gradients. The
/// result is `normalize(-dx, -dy, 1) * 0.5 + 0.5`, so a flat field maps to
/// exactly `(0.5, 0.5, 1.0)`.
pub fn normal_from_height(
    height: &RasterBuffer,
    kernel: GradientKernel,
    strength: f32,
    invert: bool,
) -> Result<RasterBuffer, AllocationError> {
    let sign = if invert { -1.0 } else { 1.0 };
    let scale = sign * strength * height.width() as f32 / REFERENCE_SIZE;

    height.try_map(ChannelLayout::Xyz, |x, y| {
        let (gx, gy) = kernel.gradient(height, x, y);
        let (dx, dy) = (gx * scale, gy * scale);
        let len = (dx * dx + dy * dy + 1.0).sqrt();
        [
            -dx / len * 0.5 + 0.5,
            -dy / len * 0.5 + 0.5,
            1.0 / len * 0.5 + 0.5,
            0.0,
        ]
    })
}

fn blur_weights(radius: u32, gaussian: bool) -> Vec<f32> {
    let r = i64::from(radius);
    let sigma = (radius as f32 / 2.0).max(0.5);
    let raw: Vec<f32> = (-r..=r)
        .map(|k| {
            if gaussian {
                let k = k as f32;
                (-(k * k) / (2.0 * sigma * sigma)).exp()
            } else {
                1.0
            }
        })
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / sum).collect()
}

/// Separable box or Gaussian blur
pub(crate) fn blur_buffer(
    src: &RasterBuffer,
    radius: u32,
    gaussian: bool,
) -> Result<RasterBuffer, AllocationError> {
    if radius == 0 {
        return Ok(src.clone());
    }
    let weights = blur_weights(radius, gaussian);
    let r = i64::from(radius);

    let pass = |buffer: &RasterBuffer, horizontal: bool| {
        buffer.try_map(buffer.layout(), |x, y| {
            let mut acc = [0.0; 4];
            for (k, w) in weights.iter().enumerate() {
                let offset = k as i64 - r;
                let p = if horizontal {
                    buffer.fetch4(i64::from(x) + offset, i64::from(y))
                } else {
                    buffer.fetch4(i64::from(x), i64::from(y) + offset)
                };
                for c in 0..4 {
                    acc[c] += p[c] * w;
                }
            }
            acc
        })
    };

    let horizontal = pass(src, true)?;
    pass(&horizontal, false)
}

pub(super) fn blur(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
    layout: ChannelLayout,
) -> EvalResult {
    let src = inputs.materialize(0, layout, ctx)?;
    let radius = params.int("radius", 2).max(0) as u32;
    let gaussian = params.choice("method", "box") == "gaussian";
    Ok(vec![blur_buffer(&src, radius, gaussian)?])
}

pub(super) fn sharpen(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let src = inputs.materialize(0, ChannelLayout::Rgba, ctx)?;
    let amount = params.float("amount", 1.0);
    let radius = params.int("radius", 1).max(1) as u32;
    let blurred = blur_buffer(&src, radius, false)?;

    let out = src.try_map(ChannelLayout::Rgba, |x, y| {
        let c = src.channels4(x, y);
        let b = blurred.channels4(x, y);
        let s = |i: usize| (c[i] + amount * (c[i] - b[i])).clamp(0.0, 1.0);
        [s(0), s(1), s(2), c[3]]
    })?;
    Ok(vec![out])
}

pub(super) fn edge_detect(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let src = inputs.materialize(0, ChannelLayout::Gray, ctx)?;
    let kernel = GradientKernel::parse(params.choice("method", "sobel"));
    let strength = params.float("strength", 1.0);

    let out = gray(ctx, src.is_seamless(), |x, y| {
        let (gx, gy) = kernel.gradient(&src, x, y);
        // A full 0 -> 1 step reads as 1 at strength 1
        ((gx * gx + gy * gy).sqrt() * 2.0 * strength).clamp(0.0, 1.0)
    })?;
    Ok(vec![out])
}

pub(super) fn emboss(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let src = inputs.materialize(0, ChannelLayout::Gray, ctx)?;
    let (ly, lx) = params.float("angle", 135.0).to_radians().sin_cos();
    let strength = params.float("strength", 1.0);

    let out = gray(ctx, src.is_seamless(), |x, y| {
        let (gx, gy) = GradientKernel::Sobel.gradient(&src, x, y);
        (0.5 - (gx * lx + gy * ly) * 2.0 * strength).clamp(0.0, 1.0)
    })?;
    Ok(vec![out])
}

pub(super) fn normal(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let height = inputs.materialize(0, ChannelLayout::Gray, ctx)?;
    let kernel = GradientKernel::parse(params.choice("method", "sobel"));
    let strength = params.float("strength", 1.0);
    let invert = params.flag("invert", false);
    let blur_radius = params.int("blur_radius", 0).max(0) as u32;

    let out = if blur_radius > 0 {
        let blurred = blur_buffer(&height, blur_radius, false)?;
        normal_from_height(&blurred, kernel, strength, invert)?
    } else {
        normal_from_height(&height, kernel, strength, invert)?
    };
    Ok(vec![out])
}

/// Cavity-based ambient occlusion: pixels lower than their blurred
/// neighborhood are darkened
pub(super) fn ambient_occlusion(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let height = inputs.materialize(0, ChannelLayout::Gray, ctx)?;
    let radius = params.int("radius", 4).max(1) as u32;
    let strength = params.float("strength", 1.0);
    let blurred = blur_buffer(&height, radius, true)?;

    let out = gray(ctx, height.is_seamless(), |x, y| {
        let cavity = (blurred.value(x, y) - height.value(x, y)).max(0.0);
        (1.0 - cavity * strength * 4.0).clamp(0.0, 1.0)
    })?;
    Ok(vec![out])
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::super::{evaluate, NodeInputs};
    use super::*;
    use skinsmith_graph::{Node, NodeKind, ParamValue};

    fn ramp(size: u32) -> RasterBuffer {
        RasterBuffer::try_from_fn(size, size, ChannelLayout::Gray, |x, _| {
            [x as f32 / size as f32, 0.0, 0.0, 0.0]
        })
        .unwrap()
    }

    #[test]
    fn test_flat_height_gives_flat_normal_for_every_setting() {
        for size in [4, 16] {
            for value in [0.0, 0.37, 1.0] {
                let height = RasterBuffer::try_filled(size, size, ChannelLayout::Gray, [value; 4]).unwrap();
                for kernel in [GradientKernel::Sobel, GradientKernel::Prewitt, GradientKernel::Scharr] {
                    for strength in [0.0, 1.0, 32.0] {
                        for invert in [false, true] {
                            let n = normal_from_height(&height, kernel, strength, invert).unwrap();
                            for y in 0..size {
                                for x in 0..size {
                                    assert_eq!(n.pixel(x, y), &[0.5, 0.5, 1.0]);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_flat_height_through_node_with_pre_blur() {
        let ctx = ctx(16);
        let mut node = Node::new(NodeKind::NormalFromHeight);
        node.parameters[3].value = ParamValue::Int(3);
        let height = RasterBuffer::try_filled(16, 16, ChannelLayout::Gray, [0.8; 4]).unwrap();
        let inputs = inputs(NodeKind::NormalFromHeight, &[(0, height)]);
        let out = evaluate(NodeKind::NormalFromHeight, &inputs, &node.values(), &ctx).unwrap();
        assert!(out[0].data().chunks(3).all(|p| p == [0.5, 0.5, 1.0]));
    }

    #[test]
    fn test_ramp_tilts_normal_against_slope() {
        let height = ramp(16);
        let n = normal_from_height(&height, GradientKernel::Sobel, 1.0, false).unwrap();
        let p = n.pixel(8, 8);
        assert!(p[0] < 0.5, "x component should lean away from rising height");
        assert_eq!(p[1], 0.5);

        let inverted = normal_from_height(&height, GradientKernel::Sobel, 1.0, true).unwrap();
        assert!(inverted.pixel(8, 8)[0] > 0.5);
    }

    #[test]
    fn test_kernels_agree_on_linear_ramp() {
        let height = ramp(16);
        let slopes: Vec<f32> = [GradientKernel::Sobel, GradientKernel::Prewitt, GradientKernel::Scharr]
            .into_iter()
            .map(|k| k.gradient(&height, 8, 8).0)
            .collect();
        for s in &slopes {
            assert!((s - 1.0 / 16.0).abs() < 1e-6, "{slopes:?}");
        }
    }

    #[test]
    fn test_slope_is_resolution_independent() {
        // The same ramp over UV at two resolutions gives the same normal
        let small = normal_from_height(&ramp(32), GradientKernel::Sobel, 4.0, false).unwrap();
        let large = normal_from_height(&ramp(64), GradientKernel::Sobel, 4.0, false).unwrap();
        assert!((small.pixel(16, 16)[0] - large.pixel(32, 32)[0]).abs() < 1e-5);
    }

    #[test]
    fn test_boundary_clamps_unless_seamless() {
        let height = ramp(8);
        let clamped = normal_from_height(&height, GradientKernel::Sobel, 1.0, false).unwrap();
        let wrapped = normal_from_height(&height.clone().with_seamless(true), GradientKernel::Sobel, 1.0, false).unwrap();
        // Wrapping sees the drop from the last column back to zero
        assert!(wrapped.pixel(0, 4)[0] > 0.5);
        assert!(clamped.pixel(0, 4)[0] < 0.5);
        assert!(wrapped.is_seamless());
    }

    #[test]
    fn test_blur_preserves_constant_and_mean() {
        let flat = RasterBuffer::try_filled(8, 8, ChannelLayout::Rgba, [0.2, 0.4, 0.6, 1.0]).unwrap();
        let blurred = blur_buffer(&flat, 3, true).unwrap();
        for v in blurred.data().chunks(4) {
            for (a, b) in v.iter().zip([0.2, 0.4, 0.6, 1.0]) {
                assert!((a - b).abs() < 1e-5);
            }
        }

        let noisy = RasterBuffer::try_from_fn(8, 8, ChannelLayout::Gray, |x, y| {
            [((x * 7 + y * 3) % 5) as f32 / 4.0, 0.0, 0.0, 0.0]
        })
        .unwrap()
        .with_seamless(true);
        let mean = |b: &RasterBuffer| b.data().iter().sum::<f32>() / b.data().len() as f32;
        let blurred = blur_buffer(&noisy, 2, false).unwrap();
        assert!((mean(&noisy) - mean(&blurred)).abs() < 1e-4);
    }

    #[test]
    fn test_wide_blur_weights_stay_normalized() {
        for gaussian in [false, true] {
            let weights = blur_weights(100_000, gaussian);
            assert_eq!(weights.len(), 200_001);
            assert!(weights.iter().all(|w| w.is_finite() && *w >= 0.0));
            let sum: f64 = weights.iter().map(|&w| f64::from(w)).sum();
            assert!((sum - 1.0).abs() < 1e-3, "sum {sum}");
            assert_eq!(weights[0], weights[200_000]);
        }
    }

    #[test]
    fn test_edge_detect_finds_step() {
        let ctx = ctx(8);
        let step = RasterBuffer::try_from_fn(8, 8, ChannelLayout::Gray, |x, _| {
            [if x < 4 { 0.0 } else { 1.0 }, 0.0, 0.0, 0.0]
        })
        .unwrap();
        let out = run(NodeKind::FilterEdgeDetect, &inputs(NodeKind::FilterEdgeDetect, &[(0, step)]), &ctx);
        assert_eq!(out[0].value(0, 4), 0.0);
        assert_eq!(out[0].value(4, 4), 1.0);
    }

    #[test]
    fn test_ao_is_white_on_flat_ground() {
        let ctx = ctx(8);
        let node = Node::new(NodeKind::AmbientOcclusion);
        let out = run(NodeKind::AmbientOcclusion, &NodeInputs::defaults(&node), &ctx);
        assert!(out[0].data().iter().all(|&v| v == 1.0));
    }
}
