use cubebake::{
    compute_dfg, diffuse_irradiance, roughness_filter, Cubemap, DfgTerm, Face, Lut2d, MipChain,
    SpecularFilterOptions,
};
use glam::Vec3;
use std::sync::atomic::{AtomicUsize, Ordering};

fn synthetic_environment(dim: u32) -> Cubemap {
    Cubemap::generate(dim, |_, dir| {
        let sky = Vec3::new(0.35, 0.5, 0.85) * (dir.y * 0.5 + 0.5);
        let sun = Vec3::new(4.0, 3.6, 3.0) * dir.dot(Vec3::new(0.4, 0.8, 0.45).normalize()).max(0.0).powi(32);
        let ground = Vec3::new(0.2, 0.17, 0.12) * (0.5 - dir.y * 0.5);
        sky + sun + ground
    })
}

#[test]
fn full_bake_produces_finite_energy_preserving_maps() {
    let env = synthetic_environment(64);
    let chain = MipChain::from_base(env, 6);

    // specular chain: one destination level per roughness step
    let mip_count = 5u32;
    let mut specular_levels = Vec::new();
    for level in 0..mip_count {
        let dim = 32 >> level;
        let mut dst = Cubemap::new(dim.max(1));
        let options = SpecularFilterOptions {
            linear_roughness: level as f32 / (mip_count - 1) as f32,
            sample_count: 256,
            seed: Some(11),
            level,
            ..Default::default()
        };
        roughness_filter(&mut dst, &chain, &options, None).expect("roughness filter");
        specular_levels.push(dst);
    }

    let mut diffuse = Cubemap::new(16);
    diffuse_irradiance(&mut diffuse, &chain, 512, None).expect("diffuse irradiance");

    let mut dfg = Lut2d::new(64, 64);
    compute_dfg(&mut dfg, DfgTerm::Multiscatter, true).expect("dfg");

    for cm in specular_levels.iter().chain(std::iter::once(&diffuse)) {
        for face in Face::ALL {
            for texel in cm.face(face) {
                assert!(texel.x.is_finite() && texel.y.is_finite() && texel.z.is_finite());
                assert!(texel.min_element() >= 0.0, "negative radiance {texel}");
            }
        }
    }
    assert!(dfg.data().iter().all(|t| t.x.is_finite() && t.y.is_finite() && t.z.is_finite()));

    // roughness blurs but must not create energy: each specular level's
    // mean stays close to the environment mean
    let mean = |cm: &Cubemap| {
        let mut sum = Vec3::ZERO;
        let mut count = 0usize;
        for face in Face::ALL {
            for texel in cm.face(face) {
                sum += *texel;
                count += 1;
            }
        }
        sum / count as f32
    };
    let base_mean = mean(chain.level(0));
    for (level, cm) in specular_levels.iter().enumerate() {
        let m = mean(cm);
        assert!(
            (m - base_mean).abs().max_element() < 0.25 * base_mean.max_element().max(0.1),
            "level {level} mean {m} drifted from {base_mean}"
        );
    }
}

#[test]
fn progress_callback_observes_every_scanline() {
    let env = synthetic_environment(16);
    let chain = MipChain::from_base(env, 3);
    let calls = AtomicUsize::new(0);
    let cb = |_level: u32, fraction: f32| {
        assert!((0.0..=1.0).contains(&fraction));
        calls.fetch_add(1, Ordering::Relaxed);
    };
    let mut dst = Cubemap::new(16);
    diffuse_irradiance(&mut dst, &chain, 64, Some(&cb)).expect("convolve");
    assert_eq!(calls.load(Ordering::Relaxed), 16 * 6);
}

#[test]
fn sh_reconstruction_tracks_low_frequency_content() {
    // an environment linear in direction is fully captured by two SH bands
    let env = Cubemap::generate(32, |_, dir| Vec3::splat(0.5 + 0.4 * dir.y));
    let sh = cubebake::sh::compute_sh(&env, 2, false).expect("project");
    let mut out = Cubemap::new(16);
    cubebake::sh::render_sh(&mut out, &sh, 2).expect("render");
    for face in Face::ALL {
        for y in 0..16 {
            for x in 0..16 {
                let dir = out.direction_for(face, x, y);
                let expected = 0.5 + 0.4 * dir.y;
                let got = out.texel(face, x, y).x;
                assert!((got - expected).abs() < 5e-3, "at {face:?} ({x}, {y}): {got} vs {expected}");
            }
        }
    }
}
