// SPDX-License-Identifier: MIT OR Apache-2.0
//! Color operators: blending, HSV adjustment, levels, grayscale, ramps.

use super::{gray, lerp4, rgba, EvalResult, NodeContext, NodeInputs};
use skinsmith_graph::ParamValues;

/// Blend modes of the mix node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BlendMode {
    Normal,
    Multiply,
    Screen,
    Overlay,
    Add,
    Difference,
}

impl BlendMode {
    fn parse(name: &str) -> Self {
        match name {
            "multiply" => Self::Multiply,
            "screen" => Self::Screen,
            "overlay" => Self::Overlay,
            "add" => Self::Add,
            "difference" => Self::Difference,
            _ => Self::Normal,
        }
    }

    fn apply(self, base: f32, blend: f32) -> f32 {
        match self {
            Self::Normal => blend,
            Self::Multiply => base * blend,
            Self::Screen => 1.0 - (1.0 - base) * (1.0 - blend),
            Self::Overlay => {
                if base < 0.5 {
                    2.0 * base * blend
                } else {
                    1.0 - 2.0 * (1.0 - base) * (1.0 - blend)
                }
            }
            Self::Add => (base + blend).min(1.0),
            Self::Difference => (base - blend).abs(),
        }
    }
}

/// Blend `blend` onto `base` with `mode`, alpha taken from `blend`
pub(super) fn blend_rgb(base: [f32; 4], blend: [f32; 4], mode: BlendMode) -> [f32; 4] {
    [
        mode.apply(base[0], blend[0]),
        mode.apply(base[1], blend[1]),
        mode.apply(base[2], blend[2]),
        blend[3],
    ]
}

/// RGB to HSV, all components in `[0, 1]`
pub(super) fn rgb_to_hsv([r, g, b]: [f32; 3]) -> [f32; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max <= f32::EPSILON { 0.0 } else { delta / max };
    [h, s, max]
}

/// HSV to RGB, all components in `[0, 1]`
pub(super) fn hsv_to_rgb([h, s, v]: [f32; 3]) -> [f32; 3] {
    let h = h.rem_euclid(1.0) * 6.0;
    let c = v * s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

fn lerp_hsv(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    let ha = rgb_to_hsv([a[0], a[1], a[2]]);
    let hb = rgb_to_hsv([b[0], b[1], b[2]]);
    // Shortest way round the hue circle
    let mut dh = hb[0] - ha[0];
    if dh > 0.5 {
        dh -= 1.0;
    } else if dh < -0.5 {
        dh += 1.0;
    }
    let [r, g, bl] = hsv_to_rgb([
        ha[0] + dh * t,
        ha[1] + (hb[1] - ha[1]) * t,
        ha[2] + (hb[2] - ha[2]) * t,
    ]);
    [r, g, bl, a[3] + (b[3] - a[3]) * t]
}

fn clamp4(c: [f32; 4]) -> [f32; 4] {
    c.map(|v| v.clamp(0.0, 1.0))
}

pub(super) fn mix(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let mode = BlendMode::parse(params.choice("mode", "normal"));
    let hsv = params.choice("space", "rgb") == "hsv";

    let buffer = rgba(ctx, inputs.all_seamless(), |x, y| {
        let a = inputs.color(0, x, y);
        let b = inputs.color(1, x, y);
        let t = inputs.float(2, x, y).clamp(0.0, 1.0);
        let blended = blend_rgb(a, b, mode);
        let out = if hsv {
            lerp_hsv(a, blended, t)
        } else {
            lerp4(a, blended, t)
        };
        clamp4(out)
    })?;
    Ok(vec![buffer])
}

pub(super) fn hue_shift(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let shift = params.float("shift", 0.0);
    let saturation = params.float("saturation", 1.0);
    let value = params.float("value", 1.0);

    let buffer = rgba(ctx, inputs.all_seamless(), |x, y| {
        let c = inputs.color(0, x, y);
        let [h, s, v] = rgb_to_hsv([c[0], c[1], c[2]]);
        let [r, g, b] = hsv_to_rgb([
            h + shift,
            (s * saturation).clamp(0.0, 1.0),
            (v * value).clamp(0.0, 1.0),
        ]);
        clamp4([r, g, b, c[3]])
    })?;
    Ok(vec![buffer])
}

pub(super) fn levels(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let in_black = params.float("in_black", 0.0);
    let in_white = params.float("in_white", 1.0);
    let gamma = params.float("gamma", 1.0).max(0.01);
    let out_black = params.float("out_black", 0.0);
    let out_white = params.float("out_white", 1.0);
    let range = in_white - in_black;

    let level = |c: f32| {
        let t = if range.abs() <= f32::EPSILON {
            if c < in_black {
                0.0
            } else {
                1.0
            }
        } else {
            ((c - in_black) / range).clamp(0.0, 1.0)
        };
        (out_black + t.powf(1.0 / gamma) * (out_white - out_black)).clamp(0.0, 1.0)
    };

    let buffer = rgba(ctx, inputs.all_seamless(), |x, y| {
        let c = inputs.color(0, x, y);
        [level(c[0]), level(c[1]), level(c[2]), c[3]]
    })?;
    Ok(vec![buffer])
}

/// Rec. 709 luminance
pub(super) fn luminance(c: [f32; 4]) -> f32 {
    0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2]
}

pub(super) fn grayscale(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let average = params.choice("method", "luminance") == "average";
    let buffer = gray(ctx, inputs.all_seamless(), |x, y| {
        let c = inputs.color(0, x, y);
        let v = if average {
            (c[0] + c[1] + c[2]) / 3.0
        } else {
            luminance(c)
        };
        v.clamp(0.0, 1.0)
    })?;
    Ok(vec![buffer])
}

pub(super) fn gradient_map(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let low = params.color("color_a", [0.0, 0.0, 0.0, 1.0]);
    let high = params.color("color_b", [1.0, 1.0, 1.0, 1.0]);
    let buffer = rgba(ctx, inputs.all_seamless(), |x, y| {
        lerp4(low, high, inputs.float(0, x, y).clamp(0.0, 1.0))
    })?;
    Ok(vec![buffer])
}
