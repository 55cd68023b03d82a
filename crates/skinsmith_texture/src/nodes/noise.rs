// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seeded noise generators built on the `noise` crate.
//!
//! Plain noise samples the plane at `uv * scale`. Seamless noise samples a
//! 4D torus instead (one circle per axis), which repeats exactly once per
//! unit of UV.

use super::{gray, EvalResult, NodeContext, NodeInputs};
use crate::raster::{ChannelLayout, RasterBuffer};
use noise::core::worley::ReturnType;
use noise::{NoiseFn, Perlin, Simplex, Worley};
use skinsmith_graph::ParamValues;
use std::f64::consts::TAU;

/// Sample `noise` at a UV coordinate with the given frequency
pub(super) fn sample<N>(noise: &N, uv: [f32; 2], frequency: f64, seamless: bool) -> f64
where
    N: NoiseFn<f64, 2> + NoiseFn<f64, 4>,
{
    let (u, v) = (f64::from(uv[0]), f64::from(uv[1]));
    if seamless {
        let r = frequency / TAU;
        let (su, cu) = (u * TAU).sin_cos();
        let (sv, cv) = (v * TAU).sin_cos();
        NoiseFn::<f64, 4>::get(noise, [r * cu, r * su, r * cv, r * sv])
    } else {
        NoiseFn::<f64, 2>::get(noise, [u * frequency, v * frequency])
    }
}

/// Fractal Brownian motion over `noise`, normalized back to `[-1, 1]`
pub(super) fn sample_fbm<N>(
    noise: &N,
    uv: [f32; 2],
    scale: f64,
    octaves: u32,
    persistence: f64,
    lacunarity: f64,
    seamless: bool,
) -> f64
where
    N: NoiseFn<f64, 2> + NoiseFn<f64, 4>,
{
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = scale;
    let mut max_value = 0.0;

    for _ in 0..octaves.max(1) {
        total += sample(noise, uv, frequency, seamless) * amplitude;
        max_value += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }

    if max_value > 0.0 {
        total / max_value
    } else {
        0.0
    }
}

/// Map a signed noise value into `[0, 1]`
pub(super) fn unit(value: f64) -> f32 {
    ((value + 1.0) * 0.5).clamp(0.0, 1.0) as f32
}

fn single<N>(noise: N, inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult
where
    N: NoiseFn<f64, 2> + NoiseFn<f64, 4>,
{
    let scale = f64::from(params.float("scale", 8.0));
    let seamless = params.flag("seamless", false);
    let buffer = gray(ctx, seamless && inputs.input_seamless(0), |x, y| {
        unit(sample(&noise, inputs.uv(0, x, y, ctx), scale, seamless))
    })?;
    Ok(vec![buffer])
}

pub(super) fn perlin(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    single(Perlin::new(ctx.noise_seed(0)), inputs, params, ctx)
}

pub(super) fn simplex(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    single(Simplex::new(ctx.noise_seed(0)), inputs, params, ctx)
}

pub(super) fn worley(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let worley = Worley::new(ctx.noise_seed(0)).set_return_type(ReturnType::Distance);
    single(worley, inputs, params, ctx)
}

pub(super) fn fbm(inputs: &NodeInputs, params: &ParamValues<'_>, ctx: &NodeContext) -> EvalResult {
    let perlin = Perlin::new(ctx.noise_seed(0));
    let scale = f64::from(params.float("scale", 4.0));
    let octaves = params.int("octaves", 5).max(1) as u32;
    let persistence = f64::from(params.float("persistence", 0.5));
    let lacunarity = f64::from(params.float("lacunarity", 2.0));
    let seamless = params.flag("seamless", false);

    let buffer = gray(ctx, seamless && inputs.input_seamless(0), |x, y| {
        let uv = inputs.uv(0, x, y, ctx);
        unit(sample_fbm(&perlin, uv, scale, octaves, persistence, lacunarity, seamless))
    })?;
    Ok(vec![buffer])
}

/// Integer hash of a lattice cell
fn cell_hash(ix: i64, iy: i64, seed: u64) -> u64 {
    let mut h = seed
        ^ (ix as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (iy as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    h = h.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    h ^ (h >> 33)
}

fn hash_unit(h: u64) -> f32 {
    (h >> 40) as f32 / (1u64 << 24) as f32
}

/// Voronoi cells: distance to the nearest feature point and a per-cell value.
///
/// Seamless mode snaps the cell count to a whole number and wraps the cell
/// lattice, so feature points near one edge are seen from the other.
pub(super) fn voronoi(
    inputs: &NodeInputs,
    params: &ParamValues<'_>,
    ctx: &NodeContext,
) -> EvalResult {
    let seamless = params.flag("seamless", true);
    let scale = params.float("scale", 8.0);
    let cells = if seamless { scale.round().max(1.0) } else { scale };
    let period = cells as i64;
    let jitter = params.float("jitter", 1.0);
    let seed = ctx.node_seed;

    let mut distance = RasterBuffer::try_new(ctx.size, ctx.size, ChannelLayout::Gray)?;
    let mut ids = RasterBuffer::try_new(ctx.size, ctx.size, ChannelLayout::Gray)?;

    for y in 0..ctx.size {
        for x in 0..ctx.size {
            let [u, v] = inputs.uv(0, x, y, ctx);
            let (px, py) = (u * cells, v * cells);
            let (cx, cy) = (px.floor() as i64, py.floor() as i64);

            let mut best = f32::MAX;
            let mut best_hash = 0;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (cx + dx, cy + dy);
                    let (hx, hy) = if seamless {
                        (nx.rem_euclid(period), ny.rem_euclid(period))
                    } else {
                        (nx, ny)
                    };
                    let h = cell_hash(hx, hy, seed);
                    let fx = nx as f32 + 0.5 + (hash_unit(h) - 0.5) * jitter;
                    let fy = ny as f32 + 0.5 + (hash_unit(h.rotate_left(24)) - 0.5) * jitter;
                    let d = ((fx - px).powi(2) + (fy - py).powi(2)).sqrt();
                    if d < best {
                        best = d;
                        best_hash = h;
                    }
                }
            }

            distance.pixel_mut(x, y)[0] = best.min(1.0);
            ids.pixel_mut(x, y)[0] = hash_unit(best_hash.rotate_left(48));
        }
    }

    let tiles = seamless && inputs.input_seamless(0);
    Ok(vec![distance.with_seamless(tiles), ids.with_seamless(tiles)])
}
