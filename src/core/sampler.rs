use std::f64::consts::PI;

use rand::{Rng as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;

use super::types::ReturnAssumption;

/// Annual portfolio return draws for one simulated path.
///
/// Returns are sampled as a normal approximation `mean + vol * z`, clamped to
/// [-0.95, 4.0]; the same shape is used for every strategy and every trial in
/// a run so comparisons never mix distributions. Each trial owns its RNG
/// state, seeded from the run seed and the trial index, so trials can run in
/// parallel and a fixed run seed reproduces every draw.
pub struct ReturnSampler {
    rng: ChaCha8Rng,
    cached_normal: Option<f64>,
}

impl ReturnSampler {
    pub fn for_trial(base_seed: u64, trial: u32) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(derive_seed(base_seed, trial)),
            cached_normal: None,
        }
    }

    pub fn annual_return(&mut self, assumption: ReturnAssumption) -> f64 {
        let z = self.standard_normal();
        (assumption.mean + assumption.vol * z).clamp(-0.95, 4.0)
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1: f64 = self.rng.r#gen::<f64>().max(1e-12);
        let u2: f64 = self.rng.r#gen();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }
}

pub fn derive_seed(base_seed: u64, trial: u32) -> u64 {
    splitmix64(base_seed ^ ((trial as u64) << 32 | trial as u64))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
