use glam::Vec3;
use half::f16;

/// Cube face order matches the usual GPU array-layer convention.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Face {
    PosX = 0,
    NegX = 1,
    PosY = 2,
    NegY = 3,
    PosZ = 4,
    NegZ = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [Face::PosX, Face::NegX, Face::PosY, Face::NegY, Face::PosZ, Face::NegZ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Outward direction through the center of texel (x, y) on a face of a
/// `dim` sized cubemap.
pub fn texel_direction(dim: u32, face: Face, x: u32, y: u32) -> Vec3 {
    let a = (2.0 * (x as f32 + 0.5) / dim as f32) - 1.0;
    let b = (2.0 * (y as f32 + 0.5) / dim as f32) - 1.0;
    match face {
        Face::PosX => Vec3::new(1.0, -b, -a),
        Face::NegX => Vec3::new(-1.0, -b, a),
        Face::PosY => Vec3::new(a, 1.0, b),
        Face::NegY => Vec3::new(a, -1.0, -b),
        Face::PosZ => Vec3::new(a, -b, 1.0),
        Face::NegZ => Vec3::new(-a, -b, -1.0),
    }
    .normalize()
}

/// Projects a direction onto its major-axis face. Returns the face and
/// (s, t) coordinates in [-1, 1], inverse-consistent with `texel_direction`.
fn face_projection(dir: Vec3) -> (Face, f32, f32) {
    let ax = dir.x.abs();
    let ay = dir.y.abs();
    let az = dir.z.abs();
    if ax >= ay && ax >= az {
        if dir.x > 0.0 {
            (Face::PosX, -dir.z / ax, -dir.y / ax)
        } else {
            (Face::NegX, dir.z / ax, -dir.y / ax)
        }
    } else if ay >= az {
        if dir.y > 0.0 {
            (Face::PosY, dir.x / ay, dir.z / ay)
        } else {
            (Face::NegY, dir.x / ay, -dir.z / ay)
        }
    } else if dir.z > 0.0 {
        (Face::PosZ, dir.x / az, -dir.y / az)
    } else {
        (Face::NegZ, -dir.x / az, -dir.y / az)
    }
}

fn sphere_quadrant_area(x: f32, y: f32) -> f32 {
    (x * y).atan2((x * x + y * y + 1.0).sqrt())
}

/// Six square faces of linear RGB radiance, row-major per face.
#[derive(Clone)]
pub struct Cubemap {
    dim: u32,
    faces: [Vec<Vec3>; 6],
}

impl Cubemap {
    pub fn new(dim: u32) -> Self {
        let texels = (dim * dim) as usize;
        Self {
            dim,
            faces: [
                vec![Vec3::ZERO; texels],
                vec![Vec3::ZERO; texels],
                vec![Vec3::ZERO; texels],
                vec![Vec3::ZERO; texels],
                vec![Vec3::ZERO; texels],
                vec![Vec3::ZERO; texels],
            ],
        }
    }

    /// Fills a cubemap from a per-direction radiance function.
    pub fn generate(dim: u32, f: impl Fn(Face, Vec3) -> Vec3) -> Self {
        let mut cm = Self::new(dim);
        for face in Face::ALL {
            for y in 0..dim {
                for x in 0..dim {
                    let dir = texel_direction(dim, face, x, y);
                    cm.faces[face.index()][(y * dim + x) as usize] = f(face, dir);
                }
            }
        }
        cm
    }

    pub fn dimension(&self) -> u32 {
        self.dim
    }

    pub fn direction_for(&self, face: Face, x: u32, y: u32) -> Vec3 {
        texel_direction(self.dim, face, x, y)
    }

    pub fn texel(&self, face: Face, x: u32, y: u32) -> Vec3 {
        self.faces[face.index()][(y * self.dim + x) as usize]
    }

    pub fn face(&self, face: Face) -> &[Vec3] {
        &self.faces[face.index()]
    }

    pub fn face_mut(&mut self, face: Face) -> &mut [Vec3] {
        &mut self.faces[face.index()]
    }

    /// Nearest texel along a direction.
    pub fn sample_nearest(&self, dir: Vec3) -> Vec3 {
        let (face, s, t) = face_projection(dir);
        let max = self.dim - 1;
        let x = (((s * 0.5 + 0.5) * self.dim as f32) as u32).min(max);
        let y = (((t * 0.5 + 0.5) * self.dim as f32) as u32).min(max);
        self.texel(face, x, y)
    }

    /// Bilinear sample on the major-axis face, clamped to the face edge.
    pub fn sample_bilinear(&self, dir: Vec3) -> Vec3 {
        let (face, s, t) = face_projection(dir);
        let max = (self.dim - 1) as f32;
        let fx = ((s * 0.5 + 0.5) * self.dim as f32 - 0.5).clamp(0.0, max);
        let fy = ((t * 0.5 + 0.5) * self.dim as f32 - 0.5).clamp(0.0, max);
        let x0 = fx.floor();
        let y0 = fy.floor();
        let x1 = (x0 + 1.0).min(max);
        let y1 = (y0 + 1.0).min(max);
        let tx = fx - x0;
        let ty = fy - y0;
        let c00 = self.texel(face, x0 as u32, y0 as u32);
        let c10 = self.texel(face, x1 as u32, y0 as u32);
        let c01 = self.texel(face, x0 as u32, y1 as u32);
        let c11 = self.texel(face, x1 as u32, y1 as u32);
        let c0 = c00 * (1.0 - tx) + c10 * tx;
        let c1 = c01 * (1.0 - tx) + c11 * tx;
        c0 * (1.0 - ty) + c1 * ty
    }

    /// Solid angle subtended by texel (x, y); identical for all faces.
    pub fn solid_angle(&self, x: u32, y: u32) -> f32 {
        let inv_dim = 1.0 / self.dim as f32;
        let s = ((x as f32 + 0.5) * 2.0 * inv_dim) - 1.0;
        let t = ((y as f32 + 0.5) * 2.0 * inv_dim) - 1.0;
        let x0 = s - inv_dim;
        let y0 = t - inv_dim;
        let x1 = s + inv_dim;
        let y1 = t + inv_dim;
        sphere_quadrant_area(x0, y0) - sphere_quadrant_area(x0, y1) - sphere_quadrant_area(x1, y0)
            + sphere_quadrant_area(x1, y1)
    }

    /// Face texels as RGBA16F bits, ready for a `Rgba16Float` texture upload.
    pub fn face_to_rgba_f16_bits(&self, face: Face) -> Vec<u16> {
        let mut out = Vec::with_capacity(self.faces[face.index()].len() * 4);
        for texel in &self.faces[face.index()] {
            out.push(f16::from_f32(texel.x).to_bits());
            out.push(f16::from_f32(texel.y).to_bits());
            out.push(f16::from_f32(texel.z).to_bits());
            out.push(f16::from_f32(1.0).to_bits());
        }
        out
    }
}

/// An ordered stack of progressively downsampled cubemaps, level 0 sharpest,
/// each level exactly half the dimension of the previous one.
pub struct MipChain {
    levels: Vec<Cubemap>,
}

impl MipChain {
    /// Builds a chain by repeated 2x2 box downsampling of the base level.
    /// Stops early once a level reaches 1x1.
    pub fn from_base(base: Cubemap, level_count: usize) -> Self {
        let mut levels = vec![base];
        while levels.len() < level_count.max(1) && levels[levels.len() - 1].dimension() > 1 {
            let next = downsample(&levels[levels.len() - 1]);
            levels.push(next);
        }
        Self { levels }
    }

    /// Wraps pre-built levels, enforcing the strict halving invariant.
    pub fn from_levels(levels: Vec<Cubemap>) -> anyhow::Result<Self> {
        anyhow::ensure!(!levels.is_empty(), "mip chain needs at least one level");
        for pair in levels.windows(2) {
            anyhow::ensure!(
                pair[1].dimension() * 2 == pair[0].dimension(),
                "mip level dimensions must halve: {} does not follow {}",
                pair[1].dimension(),
                pair[0].dimension()
            );
        }
        Ok(Self { levels })
    }

    pub fn level(&self, index: usize) -> &Cubemap {
        &self.levels[index]
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Bilinear in levels l0 and l1, blended by `lerp`.
    pub fn sample_trilinear(&self, dir: Vec3, l0: usize, l1: usize, lerp: f32) -> Vec3 {
        let c0 = self.levels[l0].sample_bilinear(dir);
        if l0 == l1 {
            return c0;
        }
        let c1 = self.levels[l1].sample_bilinear(dir);
        c0 + (c1 - c0) * lerp
    }
}

fn downsample(src: &Cubemap) -> Cubemap {
    let dim = (src.dimension() / 2).max(1);
    let mut dst = Cubemap::new(dim);
    for face in Face::ALL {
        for y in 0..dim {
            for x in 0..dim {
                let sum = src.texel(face, x * 2, y * 2)
                    + src.texel(face, x * 2 + 1, y * 2)
                    + src.texel(face, x * 2, y * 2 + 1)
                    + src.texel(face, x * 2 + 1, y * 2 + 1);
                dst.face_mut(face)[(y * dim + x) as usize] = sum * 0.25;
            }
        }
    }
    dst
}
