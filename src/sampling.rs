//! Low-discrepancy sequences, hemisphere samplers and microfacet terms.
//! Pure functions; inputs are caller-guaranteed (finite, roughness >= 0).

use glam::{Vec2, Vec3};
use std::f32::consts::PI;

/// 2D Hammersley point i of a sequence of n = 1/inv_n samples.
/// Bit-exact deterministic; the prefilter sample caches rely on that.
pub fn hammersley(i: u32, inv_n: f32) -> Vec2 {
    Vec2::new(i as f32 * inv_n, radical_inverse_vdc(i))
}

fn radical_inverse_vdc(bits: u32) -> f32 {
    let mut b = bits;
    b = (b << 16) | (b >> 16);
    b = ((b & 0x5555_5555) << 1) | ((b & 0xAAAA_AAAA) >> 1);
    b = ((b & 0x3333_3333) << 2) | ((b & 0xCCCC_CCCC) >> 2);
    b = ((b & 0x0F0F_0F0F) << 4) | ((b & 0xF0F0_F0F0) >> 4);
    b = ((b & 0x00FF_00FF) << 8) | ((b & 0xFF00_FF00) >> 8);
    (b as f32) * 2.328_306_4e-10
}

/// Half-vector sample distributed as D_GGX(a) * cos(theta).
pub fn hemisphere_importance_sample_ggx(u: Vec2, a: f32) -> Vec3 {
    let phi = 2.0 * PI * u.x;
    // (a^2 - 1) written as (a + 1)(a - 1) keeps cos_theta2 accurate as a -> 1
    let cos_theta2 = (1.0 - u.y) / (1.0 + (a + 1.0) * ((a - 1.0) * u.y));
    let cos_theta = cos_theta2.sqrt();
    let sin_theta = (1.0 - cos_theta2).max(0.0).sqrt();
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Cosine-weighted hemisphere sample, pdf = cos(theta) / pi.
pub fn hemisphere_cos_sample(u: Vec2) -> Vec3 {
    let phi = 2.0 * PI * u.x;
    let cos_theta2 = 1.0 - u.y;
    let cos_theta = cos_theta2.sqrt();
    let sin_theta = (1.0 - cos_theta2).max(0.0).sqrt();
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Uniform hemisphere sample, pdf = 1 / (2 pi).
pub fn hemisphere_uniform_sample(u: Vec2) -> Vec3 {
    let phi = 2.0 * PI * u.x;
    let cos_theta = 1.0 - u.y;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Charlie sheen importance sample via the closed-form inverse CDF
/// sin(theta) = u.y^(a / (2a + 1)).
pub fn hemisphere_importance_sample_charlie(u: Vec2, a: f32) -> Vec3 {
    let phi = 2.0 * PI * u.x;
    let sin_theta = u.y.powf(a / (2.0 * a + 1.0));
    let cos_theta = (1.0 - sin_theta * sin_theta).max(0.0).sqrt();
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

pub fn d_ggx(n_dot_h: f32, a: f32) -> f32 {
    let f = (a - 1.0) * ((a + 1.0) * (n_dot_h * n_dot_h)) + 1.0;
    (a * a) / (PI * f * f)
}

pub fn d_ashikhmin(n_dot_h: f32, a: f32) -> f32 {
    let a2 = a * a;
    let cos2h = n_dot_h * n_dot_h;
    let sin2h = 1.0 - cos2h;
    let sin4h = sin2h * sin2h;
    1.0 / (PI * (1.0 + 4.0 * a2)) * (sin4h + 4.0 * (-cos2h / (sin2h * a2)).exp())
}

pub fn d_charlie(n_dot_h: f32, a: f32) -> f32 {
    let inv_alpha = 1.0 / a;
    let cos2h = n_dot_h * n_dot_h;
    let sin2h = 1.0 - cos2h;
    (2.0 + inv_alpha) * sin2h.powf(inv_alpha * 0.5) / (2.0 * PI)
}

/// Schlick Fresnel: f0 + (f90 - f0) * (1 - LoH)^5.
pub fn fresnel(f0: f32, f90: f32, l_dot_h: f32) -> f32 {
    let fc = (1.0 - l_dot_h).powi(5);
    f0 * (1.0 - fc) + f90 * fc
}

/// Height-correlated Smith visibility for GGX; includes the 1/(4 NoV NoL)
/// specular denominator.
pub fn visibility_smith_ggx_correlated(n_dot_v: f32, n_dot_l: f32, a: f32) -> f32 {
    let a2 = a * a;
    let lambda_v = n_dot_l * ((n_dot_v - a2 * n_dot_v) * n_dot_v + a2).sqrt();
    let lambda_l = n_dot_v * ((n_dot_l - a2 * n_dot_l) * n_dot_l + a2).sqrt();
    0.5 / (lambda_v + lambda_l)
}

pub fn visibility_ashikhmin(n_dot_v: f32, n_dot_l: f32) -> f32 {
    1.0 / (4.0 * (n_dot_l + n_dot_v - n_dot_l * n_dot_v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hammersley_is_deterministic_and_distinct() {
        let n = 64u32;
        let inv_n = 1.0 / n as f32;
        let mut seen = Vec::new();
        for i in 0..n {
            let a = hammersley(i, inv_n);
            let b = hammersley(i, inv_n);
            assert_eq!(a, b);
            assert!(!seen.contains(&(a.x.to_bits(), a.y.to_bits())), "duplicate at {i}");
            seen.push((a.x.to_bits(), a.y.to_bits()));
            assert!((0.0..1.0).contains(&a.x) && (0.0..1.0).contains(&a.y));
        }
    }

    #[test]
    fn cos_sampler_pdf_integrates_hemisphere_area() {
        // E[1/pdf] over the cosine distribution is the hemisphere area 2 pi
        let n = 4096u32;
        let inv_n = 1.0 / n as f32;
        let mut sum = 0.0f64;
        for i in 0..n {
            let s = hemisphere_cos_sample(hammersley(i, inv_n));
            let pdf = s.z / PI;
            sum += 1.0 / pdf as f64;
        }
        let estimate = sum / n as f64;
        let expected = 2.0 * std::f64::consts::PI;
        assert!((estimate - expected).abs() < 0.05 * expected, "estimate {estimate}");
    }

    #[test]
    fn uniform_sampler_integrates_cosine_to_pi() {
        let n = 4096u32;
        let inv_n = 1.0 / n as f32;
        let mut sum = 0.0f64;
        for i in 0..n {
            let s = hemisphere_uniform_sample(hammersley(i, inv_n));
            sum += (s.z as f64) * 2.0 * std::f64::consts::PI;
        }
        let estimate = sum / n as f64;
        assert!((estimate - std::f64::consts::PI).abs() < 0.02, "estimate {estimate}");
    }

    #[test]
    fn charlie_sampler_pdf_integrates_hemisphere_area() {
        let a = 0.5f32;
        let n = 16384u32;
        let inv_n = 1.0 / n as f32;
        let mut sum = 0.0f64;
        for i in 0..n {
            let s = hemisphere_importance_sample_charlie(hammersley(i, inv_n), a);
            let pdf = d_charlie(s.z, a) * s.z;
            if pdf > 1e-8 {
                sum += 1.0 / pdf as f64;
            }
        }
        let estimate = sum / n as f64;
        let expected = 2.0 * std::f64::consts::PI;
        assert!((estimate - expected).abs() < 0.1 * expected, "estimate {estimate}");
    }

    #[test]
    fn ggx_distribution_is_normalized() {
        // quadrature of D(h) cos(theta) over the hemisphere
        let a = 0.5f32;
        let steps = 512;
        let mut integral = 0.0f64;
        for ti in 0..steps {
            let theta = (ti as f32 + 0.5) / steps as f32 * (PI / 2.0);
            let d = d_ggx(theta.cos(), a) as f64;
            integral +=
                d * (theta.cos() as f64) * (theta.sin() as f64) * (PI / 2.0 / steps as f32) as f64;
        }
        integral *= 2.0 * std::f64::consts::PI;
        assert!((integral - 1.0).abs() < 1e-2, "integral {integral}");
    }

    #[test]
    fn ggx_sampler_matches_distribution_mean() {
        // E[cos(theta)] under D * cos sampling equals the quadrature of
        // D * cos^2 over the hemisphere
        let a = 0.4f32;
        let n = 8192u32;
        let inv_n = 1.0 / n as f32;
        let mut mc = 0.0f64;
        for i in 0..n {
            mc += hemisphere_importance_sample_ggx(hammersley(i, inv_n), a).z as f64;
        }
        mc /= n as f64;

        let steps = 2048;
        let mut quad = 0.0f64;
        for ti in 0..steps {
            let theta = (ti as f32 + 0.5) / steps as f32 * (PI / 2.0);
            let d = d_ggx(theta.cos(), a) as f64;
            let cos = theta.cos() as f64;
            quad += d * cos * cos * (theta.sin() as f64) * (PI / 2.0 / steps as f32) as f64;
        }
        quad *= 2.0 * std::f64::consts::PI;
        assert!((mc - quad).abs() < 0.02, "mc {mc} quad {quad}");
    }

    #[test]
    fn ashikhmin_distribution_is_finite_and_nonnegative() {
        for a in [0.2f32, 0.5, 1.0] {
            for i in 0..=10 {
                let n_dot_h = i as f32 / 10.0;
                let d = d_ashikhmin(n_dot_h, a);
                assert!(d.is_finite() && d >= 0.0, "D({n_dot_h}, {a}) = {d}");
            }
        }
    }

    #[test]
    fn fresnel_endpoints() {
        assert!((fresnel(0.04, 1.0, 1.0) - 0.04).abs() < 1e-6);
        assert!((fresnel(0.04, 1.0, 0.0) - 1.0).abs() < 1e-6);
    }
}
