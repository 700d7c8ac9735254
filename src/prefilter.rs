//! Environment prefiltering: GGX specular roughness filter and cosine
//! diffuse irradiance convolution.
//!
//! Both run in two phases: a small sequential sample cache build, then a
//! parallel fan-out of that cache across every destination texel. Row
//! blocks are fixed by geometry, so the output does not depend on the
//! rayon thread count.

use crate::cubemap::{texel_direction, Cubemap, Face, MipChain};
use crate::sampling;
use anyhow::{ensure, Result};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Progress observer: (level, fraction done). Called at least once per
/// completed scanline, possibly from several worker threads at once.
pub type ProgressFn<'a> = &'a (dyn Fn(u32, f32) + Sync);

const FILTER_LOD_BIAS: f32 = 4.0;
const ROWS_PER_BLOCK: usize = 8;
// Per-face texel count below which parallel dispatch costs more than it buys.
const SERIAL_TEXEL_THRESHOLD: usize = 64 * 64;

pub struct SpecularFilterOptions {
    /// Perceptually-linear roughness in [0, 1]; 0 selects the exact
    /// nearest-sample fast path.
    pub linear_roughness: f32,
    /// Importance-sample iterations. Samples facing away from the normal
    /// are dropped without retry, so fewer entries may contribute.
    pub sample_count: usize,
    /// Per-axis sign flips applied to sampled directions (handedness).
    pub mirror: Vec3,
    /// When false, every sample reads mip 0 instead of its variance-derived
    /// level: sharper and noisier.
    pub prefilter: bool,
    /// Base seed for the per-scanline-block kernel rotation. `None` draws
    /// one per call; results are then consistent within a run only.
    pub seed: Option<u64>,
    /// Opaque level tag passed through to the progress callback.
    pub level: u32,
}

impl Default for SpecularFilterOptions {
    fn default() -> Self {
        Self {
            linear_roughness: 0.0,
            sample_count: 1024,
            mirror: Vec3::ONE,
            prefilter: true,
            seed: None,
            level: 0,
        }
    }
}

struct SpecularSample {
    l: Vec3,
    weight: f32,
    lerp: f32,
    l0: usize,
    l1: usize,
}

struct DiffuseSample {
    l: Vec3,
    lerp: f32,
    l0: usize,
    l1: usize,
}

/// Convolves `src` into one level of a prefiltered specular chain.
pub fn roughness_filter(
    dst: &mut Cubemap,
    src: &MipChain,
    options: &SpecularFilterOptions,
    progress: Option<ProgressFn>,
) -> Result<()> {
    ensure!(options.sample_count > 0, "sample_count must be positive");
    ensure!(
        (0.0..=1.0).contains(&options.linear_roughness),
        "linear_roughness {} outside [0, 1]",
        options.linear_roughness
    );

    let dim = dst.dimension();
    let mirror = options.mirror;
    let level = options.level;
    let serial = (dim as usize * dim as usize) <= SERIAL_TEXEL_THRESHOLD;
    let rows_done = AtomicUsize::new(0);
    let total_rows = dim as usize * 6;

    if options.linear_roughness == 0.0 {
        // No filtering at all: each texel is the nearest base-level sample
        // along its (mirrored) direction.
        let base = src.level(0);
        for face in Face::ALL {
            let texels = dst.face_mut(face);
            let run_rows = |(block, rows): (usize, &mut [Vec3])| {
                for (r, row) in rows.chunks_mut(dim as usize).enumerate() {
                    let y = (block * ROWS_PER_BLOCK + r) as u32;
                    for (x, texel) in row.iter_mut().enumerate() {
                        let n = (texel_direction(dim, face, x as u32, y) * mirror).normalize();
                        *texel = base.sample_nearest(n);
                    }
                    report_row(&rows_done, total_rows, level, progress);
                }
            };
            let chunk = dim as usize * ROWS_PER_BLOCK;
            if serial {
                texels.chunks_mut(chunk).enumerate().for_each(run_rows);
            } else {
                texels.par_chunks_mut(chunk).enumerate().for_each(run_rows);
            }
        }
        return Ok(());
    }

    let cache = build_specular_cache(src, options.linear_roughness, options.sample_count, options.prefilter);
    let base_seed = options.seed.unwrap_or_else(|| rand::thread_rng().gen());

    for face in Face::ALL {
        let texels = dst.face_mut(face);
        let run_rows = |(block, rows): (usize, &mut [Vec3])| {
            // one kernel rotation per worker block: trades banding for noise
            let mut rng = StdRng::seed_from_u64(block_seed(base_seed, face, block));
            let phi: f32 = rng.gen_range(-PI..PI);
            let (sin_phi, cos_phi) = phi.sin_cos();
            for (r, row) in rows.chunks_mut(dim as usize).enumerate() {
                let y = (block * ROWS_PER_BLOCK + r) as u32;
                for (x, texel) in row.iter_mut().enumerate() {
                    let n = (texel_direction(dim, face, x as u32, y) * mirror).normalize();
                    let (t, b) = rotated_tangent_frame(n, cos_phi, sin_phi);
                    let mut c = Vec3::ZERO;
                    for s in &cache {
                        let l = t * s.l.x + b * s.l.y + n * s.l.z;
                        c += src.sample_trilinear(l, s.l0, s.l1, s.lerp) * s.weight;
                    }
                    // cache weights sum to 1, no further normalization
                    *texel = c;
                }
                report_row(&rows_done, total_rows, level, progress);
            }
        };
        let chunk = dim as usize * ROWS_PER_BLOCK;
        if serial {
            texels.chunks_mut(chunk).enumerate().for_each(run_rows);
        } else {
            texels.par_chunks_mut(chunk).enumerate().for_each(run_rows);
        }
    }
    Ok(())
}

/// Cosine-weighted hemisphere convolution producing a diffuse irradiance
/// cubemap.
pub fn diffuse_irradiance(
    dst: &mut Cubemap,
    src: &MipChain,
    sample_count: usize,
    progress: Option<ProgressFn>,
) -> Result<()> {
    ensure!(sample_count > 0, "sample_count must be positive");

    let cache = build_diffuse_cache(src, sample_count);
    let inv_count = 1.0 / sample_count as f32;

    let dim = dst.dimension();
    let serial = (dim as usize * dim as usize) <= SERIAL_TEXEL_THRESHOLD;
    let rows_done = AtomicUsize::new(0);
    let total_rows = dim as usize * 6;

    for face in Face::ALL {
        let texels = dst.face_mut(face);
        let run_rows = |(block, rows): (usize, &mut [Vec3])| {
            for (r, row) in rows.chunks_mut(dim as usize).enumerate() {
                let y = (block * ROWS_PER_BLOCK + r) as u32;
                for (x, texel) in row.iter_mut().enumerate() {
                    let n = texel_direction(dim, face, x as u32, y);
                    let (t, b) = tangent_frame(n);
                    let mut c = Vec3::ZERO;
                    for s in &cache {
                        let l = t * s.l.x + b * s.l.y + n * s.l.z;
                        c += src.sample_trilinear(l, s.l0, s.l1, s.lerp);
                    }
                    // standard Monte-Carlo estimator: divide by the requested
                    // sample count, not the number of accepted samples
                    *texel = c * inv_count;
                }
                report_row(&rows_done, total_rows, 0, progress);
            }
        };
        let chunk = dim as usize * ROWS_PER_BLOCK;
        if serial {
            texels.chunks_mut(chunk).enumerate().for_each(run_rows);
        } else {
            texels.par_chunks_mut(chunk).enumerate().for_each(run_rows);
        }
    }
    Ok(())
}

fn build_specular_cache(
    src: &MipChain,
    linear_roughness: f32,
    sample_count: usize,
    prefilter: bool,
) -> Vec<SpecularSample> {
    let a = linear_roughness;
    let dim0 = src.level(0).dimension() as f32;
    let max_level = src.max_level();
    let inv_count = 1.0 / sample_count as f32;
    let omega_p = (4.0 * PI) / (6.0 * dim0 * dim0);

    let mut cache = Vec::with_capacity(sample_count);
    let mut total_weight = 0.0f32;
    for i in 0..sample_count {
        let u = sampling::hammersley(i as u32, inv_count);
        let h = sampling::hemisphere_importance_sample_ggx(u, a);
        // tangent space with N = V = +Z, so L = reflect(-V, H) simplifies
        let n_dot_h = h.z;
        let n_dot_l = 2.0 * n_dot_h * n_dot_h - 1.0;
        if n_dot_l <= 0.0 {
            // rejected samples are dropped, never retried; the loop still
            // runs exactly sample_count iterations
            continue;
        }
        let l = Vec3::new(2.0 * n_dot_h * h.x, 2.0 * n_dot_h * h.y, n_dot_l);
        let pdf = sampling::d_ggx(n_dot_h, a) / 4.0;
        let omega_s = 1.0 / (sample_count as f32 * pdf);
        let lod = log4(omega_s) - log4(omega_p) + log4(FILTER_LOD_BIAS);
        let mip = if prefilter { lod.clamp(0.0, max_level as f32) } else { 0.0 };
        let l0 = mip as usize;
        let l1 = (l0 + 1).min(max_level);
        total_weight += n_dot_l;
        cache.push(SpecularSample { l, weight: n_dot_l, lerp: mip - l0 as f32, l0, l1 });
    }

    let inv_weight = 1.0 / total_weight;
    for s in &mut cache {
        s.weight *= inv_weight;
    }
    // ascending weights tighten the floating-point summation error; the
    // order carries no meaning beyond that
    cache.sort_by(|a, b| a.weight.total_cmp(&b.weight));
    cache
}

fn build_diffuse_cache(src: &MipChain, sample_count: usize) -> Vec<DiffuseSample> {
    let dim0 = src.level(0).dimension() as f32;
    let max_level = src.max_level();
    let inv_count = 1.0 / sample_count as f32;
    let omega_p = (4.0 * PI) / (6.0 * dim0 * dim0);

    let mut cache = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        let u = sampling::hammersley(i as u32, inv_count);
        let l = sampling::hemisphere_cos_sample(u);
        let n_dot_l = l.z;
        if n_dot_l <= 0.0 {
            continue;
        }
        let pdf = n_dot_l / PI;
        let omega_s = 1.0 / (sample_count as f32 * pdf);
        let lod = (log4(omega_s) - log4(omega_p) + log4(FILTER_LOD_BIAS))
            .clamp(0.0, max_level as f32);
        let l0 = lod as usize;
        let l1 = (l0 + 1).min(max_level);
        cache.push(DiffuseSample { l, lerp: lod - l0 as f32, l0, l1 });
    }
    cache
}

fn tangent_frame(n: Vec3) -> (Vec3, Vec3) {
    // fall back to +X near the poles where cross(+Z, N) degenerates
    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let t = up.cross(n).normalize();
    let b = n.cross(t);
    (t, b)
}

fn rotated_tangent_frame(n: Vec3, cos_phi: f32, sin_phi: f32) -> (Vec3, Vec3) {
    let (t, b) = tangent_frame(n);
    (t * cos_phi + b * sin_phi, b * cos_phi - t * sin_phi)
}

fn block_seed(base: u64, face: Face, block: usize) -> u64 {
    // splitmix64-style mix so neighboring blocks decorrelate
    let mut z = base ^ (((face.index() as u64) << 32) | block as u64)
        .wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn report_row(rows_done: &AtomicUsize, total_rows: usize, level: u32, progress: Option<ProgressFn>) {
    let done = rows_done.fetch_add(1, Ordering::Relaxed) + 1;
    if let Some(cb) = progress {
        cb(level, done as f32 / total_rows as f32);
    }
}

fn log4(x: f32) -> f32 {
    0.5 * x.log2()
}
