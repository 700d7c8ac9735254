//! Real spherical-harmonics projection and reconstruction of cubemap
//! radiance.
//!
//! The basis evaluator runs on Legendre three-term recurrences plus a
//! complex-power recurrence for the azimuthal part, so no trig is
//! evaluated per band. It matches the closed-form definition to floating
//! point tolerance; the recurrence is an optimization, not a deviation.

use crate::cubemap::{texel_direction, Cubemap, Face};
use anyhow::{ensure, Result};
use glam::Vec3;
use rayon::prelude::*;
use std::f32::consts::PI;

/// Coefficient index for band l, order m: l^2 + l + m.
pub fn sh_index(m: i32, l: usize) -> usize {
    ((l * l + l) as i32 + m) as usize
}

/// n! / d! in f64; exact for the band counts this crate deals with.
fn factorial_ratio(n: usize, d: usize) -> f64 {
    let mut r = 1.0f64;
    for i in (d + 1)..=n {
        r *= i as f64;
    }
    r
}

/// Normalization constant of the real SH basis function (m, l).
pub fn k_ml(m: i32, l: usize) -> f32 {
    let m = m.unsigned_abs() as usize;
    let k = (2 * l + 1) as f64 / (4.0 * std::f64::consts::PI) / factorial_ratio(l + m, l - m);
    (k.sqrt()) as f32
}

/// SH coefficients of the clamped cosine lobe: pi, 2pi/3, then the
/// closed-form alternating even terms (odd bands above 1 vanish).
pub fn compute_truncated_cos_sh(l: usize) -> f32 {
    if l == 0 {
        PI
    } else if l == 1 {
        2.0 * PI / 3.0
    } else if l % 2 == 1 {
        0.0
    } else {
        let l_2 = l / 2;
        let sign = if l_2 % 2 == 1 { 1.0f64 } else { -1.0 };
        let a0 = sign / ((l + 2) * (l - 1)) as f64;
        let a1 = factorial_ratio(l, l_2) / (factorial_ratio(l_2, 0) * (1u64 << l) as f64);
        (2.0 * std::f64::consts::PI * a0 * a1) as f32
    }
}

/// Evaluates all num_bands^2 non-normalized real SH basis values at a unit
/// direction into `sh_basis`.
pub fn compute_sh_basis(sh_basis: &mut [f32], num_bands: usize, s: Vec3) {
    debug_assert!(sh_basis.len() >= num_bands * num_bands);

    // P_l^0(z) three-term recurrence
    let mut pml_2 = 0.0f32;
    let mut pml_1 = 1.0f32;
    sh_basis[0] = pml_1;
    for l in 1..num_bands {
        let pml = ((2 * l - 1) as f32 * pml_1 * s.z - (l - 1) as f32 * pml_2) / l as f32;
        pml_2 = pml_1;
        pml_1 = pml;
        sh_basis[sh_index(0, l)] = pml;
    }

    // P_m^m diagonal seeds then the vertical recurrence; the common
    // sin(theta)^m factor is deferred to the azimuthal pass below
    let mut pmm = 1.0f32;
    for m in 1..num_bands {
        pmm *= (1 - 2 * m as i32) as f32;
        let mut pml_2 = pmm;
        let mut pml_1 = (2 * m + 1) as f32 * pmm * s.z;
        sh_basis[sh_index(-(m as i32), m)] = pml_2;
        sh_basis[sh_index(m as i32, m)] = pml_2;
        if m + 1 < num_bands {
            sh_basis[sh_index(-(m as i32), m + 1)] = pml_1;
            sh_basis[sh_index(m as i32, m + 1)] = pml_1;
            for l in (m + 2)..num_bands {
                let pml = ((2 * l - 1) as f32 * pml_1 * s.z - (l + m - 1) as f32 * pml_2)
                    / (l - m) as f32;
                pml_2 = pml_1;
                pml_1 = pml;
                sh_basis[sh_index(-(m as i32), l)] = pml;
                sh_basis[sh_index(m as i32, l)] = pml;
            }
        }
    }

    // cos(m phi) sin^m(theta) and sin(m phi) sin^m(theta) via the powers
    // of (x + iy); no atan2/cos/sin per band
    let mut cm = s.x;
    let mut sm = s.y;
    for m in 1..num_bands {
        for l in m..num_bands {
            sh_basis[sh_index(-(m as i32), l)] *= sm;
            sh_basis[sh_index(m as i32, l)] *= cm;
        }
        let cm_next = cm * s.x - sm * s.y;
        let sm_next = sm * s.x + cm * s.y;
        cm = cm_next;
        sm = sm_next;
    }
}

/// Projects a cubemap's radiance onto num_bands^2 SH coefficients.
/// With `irradiance` set, the coefficients are pre-convolved by the
/// cosine lobe (divided by pi), ready for diffuse reconstruction.
pub fn compute_sh(cm: &Cubemap, num_bands: usize, irradiance: bool) -> Result<Vec<Vec3>> {
    ensure!(num_bands >= 1, "num_bands must be at least 1");
    let num_coefs = num_bands * num_bands;
    let dim = cm.dimension();

    // parallel per-face partial sums, folded in fixed face order so the
    // result does not depend on the thread count
    let partials: Vec<Vec<Vec3>> = Face::ALL
        .par_iter()
        .map(|&face| {
            let mut acc = vec![Vec3::ZERO; num_coefs];
            let mut basis = vec![0.0f32; num_coefs];
            for y in 0..dim {
                for x in 0..dim {
                    let s = texel_direction(dim, face, x, y);
                    let c = cm.texel(face, x, y) * cm.solid_angle(x, y);
                    compute_sh_basis(&mut basis, num_bands, s);
                    for (coef, b) in acc.iter_mut().zip(&basis) {
                        *coef += c * *b;
                    }
                }
            }
            acc
        })
        .collect();

    let mut sh = vec![Vec3::ZERO; num_coefs];
    for partial in &partials {
        for (coef, p) in sh.iter_mut().zip(partial) {
            *coef += *p;
        }
    }

    for l in 0..num_bands {
        let lobe = if irradiance { compute_truncated_cos_sh(l) / PI } else { 1.0 };
        for m in -(l as i32)..=(l as i32) {
            let mut k = k_ml(m, l) * lobe;
            if m != 0 {
                k *= std::f32::consts::SQRT_2;
            }
            sh[sh_index(m, l)] *= k;
        }
    }
    Ok(sh)
}

/// Reconstructs (renders) a cubemap from SH coefficients produced by
/// `compute_sh`; the inverse operation, lossy at num_bands by construction.
pub fn render_sh(dst: &mut Cubemap, sh: &[Vec3], num_bands: usize) -> Result<()> {
    ensure!(num_bands >= 1, "num_bands must be at least 1");
    let num_coefs = num_bands * num_bands;
    ensure!(sh.len() == num_coefs, "expected {} coefficients, got {}", num_coefs, sh.len());

    // fold the normalization into a scaled copy once
    let mut scaled = sh.to_vec();
    for l in 0..num_bands {
        for m in -(l as i32)..=(l as i32) {
            let mut k = k_ml(m, l);
            if m != 0 {
                k *= std::f32::consts::SQRT_2;
            }
            scaled[sh_index(m, l)] *= k;
        }
    }

    let dim = dst.dimension();
    for face in Face::ALL {
        let texels = dst.face_mut(face);
        texels.par_chunks_mut(dim as usize).enumerate().for_each(|(y, row)| {
            let mut basis = vec![0.0f32; num_coefs];
            for (x, texel) in row.iter_mut().enumerate() {
                let s = texel_direction(dim, face, x as u32, y as u32);
                compute_sh_basis(&mut basis, num_bands, s);
                let mut c = Vec3::ZERO;
                for (coef, b) in scaled.iter().zip(&basis) {
                    c += *coef * *b;
                }
                *texel = c;
            }
        });
    }
    Ok(())
}

// Fully folded constants of the 3-band irradiance path: orthonormalization
// applied on both the projection and reconstruction side plus the cosine
// lobe over pi, expressed over the plain polynomial basis
// [1, y, z, x, xy, yz, 3z^2-1, zx, x^2-y^2].
const SH3_IRRADIANCE: [f32; 9] = [
    1.0 / (4.0 * PI),
    1.0 / (2.0 * PI),
    1.0 / (2.0 * PI),
    1.0 / (2.0 * PI),
    15.0 / (16.0 * PI),
    15.0 / (16.0 * PI),
    5.0 / (64.0 * PI),
    15.0 / (16.0 * PI),
    15.0 / (64.0 * PI),
];

fn sh3_polynomials(s: Vec3) -> [f32; 9] {
    [
        1.0,
        s.y,
        s.z,
        s.x,
        s.x * s.y,
        s.y * s.z,
        3.0 * s.z * s.z - 1.0,
        s.z * s.x,
        s.x * s.x - s.y * s.y,
    ]
}

/// Unrolled 3-band irradiance projection with all constants folded in;
/// equal to `compute_sh(cm, 3, true)` up to floating point tolerance.
pub fn compute_irradiance_sh3(cm: &Cubemap) -> [Vec3; 9] {
    let dim = cm.dimension();
    let partials: Vec<[Vec3; 9]> = Face::ALL
        .par_iter()
        .map(|&face| {
            let mut acc = [Vec3::ZERO; 9];
            for y in 0..dim {
                for x in 0..dim {
                    let s = texel_direction(dim, face, x, y);
                    let c = cm.texel(face, x, y) * cm.solid_angle(x, y);
                    let p = sh3_polynomials(s);
                    for i in 0..9 {
                        acc[i] += c * p[i];
                    }
                }
            }
            acc
        })
        .collect();

    let mut sh = [Vec3::ZERO; 9];
    for partial in &partials {
        for i in 0..9 {
            sh[i] += partial[i];
        }
    }
    for i in 0..9 {
        sh[i] *= SH3_IRRADIANCE[i];
    }
    sh
}

/// Renders coefficients from `compute_irradiance_sh3`; the scaling is
/// already folded, so this is a plain polynomial dot product per texel.
pub fn render_prescaled_sh3(dst: &mut Cubemap, sh: &[Vec3; 9]) {
    let dim = dst.dimension();
    for face in Face::ALL {
        let texels = dst.face_mut(face);
        texels.par_chunks_mut(dim as usize).enumerate().for_each(|(y, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                let s = texel_direction(dim, face, x as u32, y as u32);
                let p = sh3_polynomials(s);
                let mut c = Vec3::ZERO;
                for i in 0..9 {
                    c += sh[i] * p[i];
                }
                *texel = c;
            }
        });
    }
}
