//! CPU precomputation of image-based-lighting assets: roughness-prefiltered
//! specular cubemap chains, diffuse irradiance convolution, split-sum DFG
//! lookup tables and spherical-harmonics projection of environment radiance.

pub mod brdf;
pub mod cubemap;
pub mod prefilter;
pub mod sampling;
pub mod sh;

pub use brdf::{brdf_visualization, compute_dfg, DfgTerm, Lut2d};
pub use cubemap::{Cubemap, Face, MipChain};
pub use prefilter::{diffuse_irradiance, roughness_filter, ProgressFn, SpecularFilterOptions};
