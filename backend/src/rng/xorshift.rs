//! xorshift64* random number generator
//!
//! Fast, deterministic PRNG shared by every agent of a run.
//!
//! # Algorithm
//!
//! xorshift64* with 64-bit state. Uniform doubles take the top 53 bits;
//! Gaussian draws use the polar Box-Muller transform and cache the second
//! variate, so the number of underlying `next()` calls per Gaussian is
//! data dependent but still fully determined by the seed.
//!
//! # Determinism
//!
//! Same seed → same sequence. Household decisions consume draws in a fixed
//! order, so the draw sequence is part of a run's observable output.

use serde::{Deserialize, Serialize};

/// Everything needed to resume a generator mid-sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RngState {
    pub state: u64,
    pub spare_gaussian: Option<f64>,
}

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use housing_credit_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let u = rng.next_f64();
/// let z = rng.next_gaussian();
/// assert!((0.0..1.0).contains(&u));
/// assert!(z.is_finite());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit)
    state: u64,
    /// Second Gaussian variate left over from the last polar draw
    spare_gaussian: Option<f64>,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// A zero seed is mapped to 1 (xorshift state must be non-zero).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self {
            state,
            spare_gaussian: None,
        }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate random value in range [min, max)
    ///
    /// # Panics
    /// Panics if min >= max
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");

        let value = self.next();
        let range_size = (max - min) as u64;
        min + (value % range_size) as i64
    }

    /// Generate random integer in range [min, max]
    ///
    /// # Example
    /// ```
    /// use housing_credit_core_rs::RngManager;
    ///
    /// let mut rng = RngManager::new(7);
    /// let months = rng.next_int_inclusive(6, 24);
    /// assert!((6..=24).contains(&months));
    /// ```
    pub fn next_int_inclusive(&mut self, min: i64, max: i64) -> i64 {
        self.range(min, max + 1)
    }

    /// Get current RNG state, including any cached Gaussian variate
    pub fn get_state(&self) -> RngState {
        RngState {
            state: self.state,
            spare_gaussian: self.spare_gaussian,
        }
    }

    /// Resume from a saved state
    ///
    /// # Example
    /// ```
    /// use housing_credit_core_rs::RngManager;
    ///
    /// let mut rng = RngManager::new(9);
    /// rng.next_gaussian();
    /// let mut resumed = RngManager::from_state(rng.get_state());
    /// assert_eq!(rng.next_gaussian(), resumed.next_gaussian());
    /// ```
    pub fn from_state(saved: RngState) -> Self {
        Self {
            state: if saved.state == 0 { 1 } else { saved.state },
            spare_gaussian: saved.spare_gaussian,
        }
    }

    /// Generate random f64 in range [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Standard normal draw (mean 0, standard deviation 1)
    pub fn next_gaussian(&mut self) -> f64 {
        if let Some(spare) = self.spare_gaussian.take() {
            return spare;
        }
        loop {
            let u = 2.0 * self.next_f64() - 1.0;
            let v = 2.0 * self.next_f64() - 1.0;
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                let factor = (-2.0 * s.ln() / s).sqrt();
                self.spare_gaussian = Some(v * factor);
                return u * factor;
            }
        }
    }

    /// Bernoulli trial: true with the given probability
    pub fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }
}
