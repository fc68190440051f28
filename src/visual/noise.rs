//! 4D simplex noise
//!
//! Stefan Gustavson's simplex algorithm over a seeded permutation table.
//! Output is roughly in [-1, 1] and fully determined by the seed.

const F4: f64 = 0.309_016_994_374_947_45; // (sqrt(5) - 1) / 4
const G4: f64 = 0.138_196_601_125_010_5; // (5 - sqrt(5)) / 20

const GRAD4: [[f64; 4]; 32] = [
    [0.0, 1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0, -1.0],
    [0.0, 1.0, -1.0, 1.0],
    [0.0, 1.0, -1.0, -1.0],
    [0.0, -1.0, 1.0, 1.0],
    [0.0, -1.0, 1.0, -1.0],
    [0.0, -1.0, -1.0, 1.0],
    [0.0, -1.0, -1.0, -1.0],
    [1.0, 0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0, -1.0],
    [1.0, 0.0, -1.0, 1.0],
    [1.0, 0.0, -1.0, -1.0],
    [-1.0, 0.0, 1.0, 1.0],
    [-1.0, 0.0, 1.0, -1.0],
    [-1.0, 0.0, -1.0, 1.0],
    [-1.0, 0.0, -1.0, -1.0],
    [1.0, 1.0, 0.0, 1.0],
    [1.0, 1.0, 0.0, -1.0],
    [1.0, -1.0, 0.0, 1.0],
    [1.0, -1.0, 0.0, -1.0],
    [-1.0, 1.0, 0.0, 1.0],
    [-1.0, 1.0, 0.0, -1.0],
    [-1.0, -1.0, 0.0, 1.0],
    [-1.0, -1.0, 0.0, -1.0],
    [1.0, 1.0, 1.0, 0.0],
    [1.0, 1.0, -1.0, 0.0],
    [1.0, -1.0, 1.0, 0.0],
    [1.0, -1.0, -1.0, 0.0],
    [-1.0, 1.0, 1.0, 0.0],
    [-1.0, 1.0, -1.0, 0.0],
    [-1.0, -1.0, 1.0, 0.0],
    [-1.0, -1.0, -1.0, 0.0],
];

/// Seeded 4D simplex noise generator
#[derive(Clone)]
pub struct Simplex4 {
    seed: u64,
    perm: [u8; 512],
}

impl std::fmt::Debug for Simplex4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simplex4").field("seed", &self.seed).finish()
    }
}

impl Simplex4 {
    pub fn new(seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut table: Vec<u8> = (0..=255).collect();
        rng.shuffle(&mut table);

        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = table[i & 255];
        }
        Self { seed, perm }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    fn perm(&self, i: usize) -> usize {
        self.perm[i] as usize
    }

    fn gradient_index(&self, i: usize, j: usize, k: usize, l: usize) -> usize {
        self.perm(i + self.perm(j + self.perm(k + self.perm(l)))) % 32
    }

    #[inline]
    fn corner(&self, gi: usize, x: f64, y: f64, z: f64, w: f64) -> f64 {
        let t = 0.6 - x * x - y * y - z * z - w * w;
        if t < 0.0 {
            return 0.0;
        }
        let g = GRAD4[gi];
        let t2 = t * t;
        t2 * t2 * (g[0] * x + g[1] * y + g[2] * z + g[3] * w)
    }

    /// Sample the noise field
    pub fn sample(&self, x: f32, y: f32, z: f32, w: f32) -> f32 {
        let (x, y, z, w) = (x as f64, y as f64, z as f64, w as f64);

        // Skew into the simplex cell
        let s = (x + y + z + w) * F4;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let k = (z + s).floor();
        let l = (w + s).floor();
        let t = (i + j + k + l) * G4;

        let x0 = x - (i - t);
        let y0 = y - (j - t);
        let z0 = z - (k - t);
        let w0 = w - (l - t);

        // Rank the coordinates to find the simplex traversal order
        let mut rank = [0u8; 4];
        let coords = [x0, y0, z0, w0];
        for a in 0..4 {
            for b in (a + 1)..4 {
                if coords[a] > coords[b] {
                    rank[a] += 1;
                } else {
                    rank[b] += 1;
                }
            }
        }
        let step = |threshold: u8| -> [usize; 4] {
            [
                (rank[0] >= threshold) as usize,
                (rank[1] >= threshold) as usize,
                (rank[2] >= threshold) as usize,
                (rank[3] >= threshold) as usize,
            ]
        };
        let o1 = step(3);
        let o2 = step(2);
        let o3 = step(1);

        let ii = (i as i64 & 255) as usize;
        let jj = (j as i64 & 255) as usize;
        let kk = (k as i64 & 255) as usize;
        let ll = (l as i64 & 255) as usize;

        let mut total = self.corner(self.gradient_index(ii, jj, kk, ll), x0, y0, z0, w0);

        for (n, offset) in [o1, o2, o3].iter().enumerate() {
            let g = G4 * (n + 1) as f64;
            let gi = self.gradient_index(
                ii + offset[0],
                jj + offset[1],
                kk + offset[2],
                ll + offset[3],
            );
            total += self.corner(
                gi,
                x0 - offset[0] as f64 + g,
                y0 - offset[1] as f64 + g,
                z0 - offset[2] as f64 + g,
                w0 - offset[3] as f64 + g,
            );
        }

        let g = 4.0 * G4;
        total += self.corner(
            self.gradient_index(ii + 1, jj + 1, kk + 1, ll + 1),
            x0 - 1.0 + g,
            y0 - 1.0 + g,
            z0 - 1.0 + g,
            w0 - 1.0 + g,
        );

        (27.0 * total) as f32
    }
}

impl Default for Simplex4 {
    fn default() -> Self {
        Self::new(0x5eed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_per_seed() {
        let a = Simplex4::new(7);
        let b = Simplex4::new(7);
        let c = Simplex4::new(8);
        let p = (0.3, -1.7, 2.2, 5.1);
        assert_eq!(a.sample(p.0, p.1, p.2, p.3), b.sample(p.0, p.1, p.2, p.3));

        let differs = (0..50).any(|i| {
            let x = i as f32 * 0.37;
            a.sample(x, 0.5, -x, 1.0) != c.sample(x, 0.5, -x, 1.0)
        });
        assert!(differs);
    }

    #[test]
    fn test_range_and_variation() {
        let noise = Simplex4::default();
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for i in 0..2000 {
            let t = i as f32 * 0.113;
            let v = noise.sample(t.sin() * 3.0, t.cos() * 3.0, t * 0.21, t * 0.05);
            assert!(v.is_finite());
            assert!(v.abs() <= 1.2, "sample {} out of range", v);
            min = min.min(v);
            max = max.max(v);
        }
        assert!(max - min > 0.5);
    }

    #[test]
    fn test_zero_at_lattice_origin() {
        // Every corner lies outside the 0.6 radius or sees a zero offset
        let noise = Simplex4::new(3);
        assert!(noise.sample(0.0, 0.0, 0.0, 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_continuity() {
        let noise = Simplex4::new(11);
        let a = noise.sample(1.0, 2.0, 3.0, 4.0);
        let b = noise.sample(1.0001, 2.0, 3.0, 4.0);
        assert!((a - b).abs() < 1e-2);
    }
}
