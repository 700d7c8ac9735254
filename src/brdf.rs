//! Split-sum DFG integration and a per-texel BRDF visualization cubemap.

use crate::cubemap::{texel_direction, Cubemap, Face};
use crate::sampling;
use anyhow::{ensure, Result};
use glam::{Vec2, Vec3};
use half::f16;
use rayon::prelude::*;
use std::f32::consts::PI;

const DFG_SAMPLE_COUNT: usize = 1024;
const CLOTH_SAMPLE_COUNT: usize = 4096;

/// Which split-sum formulation fills the red/green channels.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DfgTerm {
    Standard,
    Multiscatter,
}

/// 2D float RGB table, row-major.
#[derive(Clone)]
pub struct Lut2d {
    width: u32,
    height: u32,
    data: Vec<Vec3>,
}

impl Lut2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, data: vec![Vec3::ZERO; (width * height) as usize] }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texel(&self, x: u32, y: u32) -> Vec3 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn data(&self) -> &[Vec3] {
        &self.data
    }

    /// Table as RGBA16F bits for a `Rgba16Float` texture upload.
    pub fn to_rgba_f16_bits(&self) -> Vec<u16> {
        let mut out = Vec::with_capacity(self.data.len() * 4);
        for texel in &self.data {
            out.push(f16::from_f32(texel.x).to_bits());
            out.push(f16::from_f32(texel.y).to_bits());
            out.push(f16::from_f32(texel.z).to_bits());
            out.push(f16::from_f32(1.0).to_bits());
        }
        out
    }
}

/// Tabulates the analytic split-sum BRDF integral over (NoV, roughness).
/// Row 0 is roughness ~1, the last row roughness ~0; NoV grows with x.
/// With `cloth` set, the blue channel holds the Charlie sheen integral.
pub fn compute_dfg(dst: &mut Lut2d, term: DfgTerm, cloth: bool) -> Result<()> {
    ensure!(dst.width > 0 && dst.height > 0, "empty DFG destination");
    let width = dst.width as usize;
    let height = dst.height as f32;

    dst.data
        .par_chunks_mut(width)
        .with_min_len(1)
        .with_max_len(8)
        .enumerate()
        .for_each(|(y, row)| {
            let coord = ((height - y as f32 + 0.5) / height).clamp(0.0, 1.0);
            let linear_roughness = coord * coord;
            for (x, texel) in row.iter_mut().enumerate() {
                let n_dot_v = (x as f32 + 0.5) / width as f32;
                let dfg = match term {
                    DfgTerm::Standard => dfv(n_dot_v, linear_roughness, DFG_SAMPLE_COUNT),
                    DfgTerm::Multiscatter => {
                        dfv_multiscatter(n_dot_v, linear_roughness, DFG_SAMPLE_COUNT)
                    }
                };
                let sheen = if cloth {
                    dfv_charlie_uniform(n_dot_v, linear_roughness, CLOTH_SAMPLE_COUNT)
                } else {
                    0.0
                };
                *texel = Vec3::new(dfg.x, dfg.y, sheen);
            }
        });
    Ok(())
}

/// Per-texel D * F * V * NoL with the texel direction taken as the half
/// vector; a diagnostic image, not part of the runtime LUT pipeline.
pub fn brdf_visualization(dst: &mut Cubemap, linear_roughness: f32) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&linear_roughness),
        "linear_roughness {linear_roughness} outside [0, 1]"
    );
    let dim = dst.dimension();
    let a = linear_roughness;
    for face in Face::ALL {
        let texels = dst.face_mut(face);
        texels.par_chunks_mut(dim as usize).enumerate().for_each(|(y, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                let h = texel_direction(dim, face, x as u32, y as u32);
                // N = V = +Z
                let l = 2.0 * h.z * h - Vec3::Z;
                let n_dot_l = l.z;
                let n_dot_h = h.z;
                let l_dot_h = l.dot(h);
                let mut value = 0.0;
                if n_dot_l > 0.0 && l_dot_h > 0.0 {
                    let d = sampling::d_ggx(n_dot_h, a);
                    let f = sampling::fresnel(0.04, 1.0, l_dot_h);
                    let v = sampling::visibility_smith_ggx_correlated(1.0, n_dot_l, a);
                    value = d * f * v * n_dot_l;
                }
                *texel = Vec3::splat(value);
            }
        });
    }
    Ok(())
}

fn dfv(n_dot_v: f32, linear_roughness: f32, sample_count: usize) -> Vec2 {
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
    let inv_count = 1.0 / sample_count as f32;
    let mut r = Vec2::ZERO;
    for i in 0..sample_count {
        let u = sampling::hammersley(i as u32, inv_count);
        let h = sampling::hemisphere_importance_sample_ggx(u, linear_roughness);
        let l = 2.0 * v.dot(h) * h - v;
        let v_dot_h = v.dot(h).max(0.0);
        let n_dot_l = l.z.clamp(0.0, 1.0);
        let n_dot_h = h.z.clamp(0.0, 1.0);
        if n_dot_l > 0.0 {
            let g = sampling::visibility_smith_ggx_correlated(n_dot_v, n_dot_l, linear_roughness);
            let gv = g * n_dot_l * (v_dot_h / n_dot_h);
            let fc = (1.0 - v_dot_h).powi(5);
            r.x += gv * (1.0 - fc);
            r.y += gv * fc;
        }
    }
    r * (4.0 / sample_count as f32)
}

fn dfv_multiscatter(n_dot_v: f32, linear_roughness: f32, sample_count: usize) -> Vec2 {
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
    let inv_count = 1.0 / sample_count as f32;
    let mut r = Vec2::ZERO;
    for i in 0..sample_count {
        let u = sampling::hammersley(i as u32, inv_count);
        let h = sampling::hemisphere_importance_sample_ggx(u, linear_roughness);
        let l = 2.0 * v.dot(h) * h - v;
        let v_dot_h = v.dot(h).max(0.0);
        let n_dot_l = l.z.clamp(0.0, 1.0);
        let n_dot_h = h.z.clamp(0.0, 1.0);
        if n_dot_l > 0.0 {
            let g = sampling::visibility_smith_ggx_correlated(n_dot_v, n_dot_l, linear_roughness);
            let gv = g * n_dot_l * (v_dot_h / n_dot_h);
            let fc = (1.0 - v_dot_h).powi(5);
            // the multiscatter energy-compensation split: Fc-weighted term
            // and the unweighted total
            r.x += gv * fc;
            r.y += gv;
        }
    }
    r * (4.0 / sample_count as f32)
}

fn dfv_charlie_uniform(n_dot_v: f32, linear_roughness: f32, sample_count: usize) -> f32 {
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
    let inv_count = 1.0 / sample_count as f32;
    let mut r = 0.0f32;
    for i in 0..sample_count {
        let u = sampling::hammersley(i as u32, inv_count);
        let h = sampling::hemisphere_uniform_sample(u);
        let l = 2.0 * v.dot(h) * h - v;
        let v_dot_h = v.dot(h).max(0.0);
        let n_dot_l = l.z.clamp(0.0, 1.0);
        let n_dot_h = h.z.clamp(0.0, 1.0);
        if n_dot_l > 0.0 {
            let vis = sampling::visibility_ashikhmin(n_dot_v, n_dot_l);
            let d = sampling::d_charlie(n_dot_h, linear_roughness);
            r += vis * d * n_dot_l * v_dot_h;
        }
    }
    // pdf = 1/(2 pi); the extra 4 is the half-vector Jacobian
    r * (4.0 * 2.0 * PI / sample_count as f32)
}
