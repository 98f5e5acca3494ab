//! Deterministic randomness for the tick: production rolls, purification
//! rolls, item colors, and fair ordering of outputs and roots.
//!
//! The random source is always passed in explicitly. [`SimRng`] is the
//! engine's generator; tests may substitute any [`RandomSource`].

use crate::fixed::Fixed64;

/// A source of uniformly distributed 64-bit values.
///
/// Everything the simulation needs (probability checks, bounded indices,
/// shuffles) is derived from [`RandomSource::next_u64`].
pub trait RandomSource {
    /// Generate the next `u64` in the sequence.
    fn next_u64(&mut self) -> u64;

    /// Returns `true` with the given probability (Fixed64 in [0, 1]).
    ///
    /// - probability <= 0 always returns false
    /// - probability >= 1 always returns true
    ///
    /// Exactly one value is drawn for probabilities strictly between 0
    /// and 1, none otherwise.
    fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::ONE {
            return true;
        }
        // For p in (0,1) the raw Q32.32 bits are the fraction scaled to
        // [0, 2^32); compare against a uniform u32.
        let upper = self.next_u64() >> 32;
        upper < probability.to_bits() as u64
    }

    /// Uniform index in `0..n`. `n` must be non-zero.
    fn below(&mut self, n: usize) -> usize {
        debug_assert!(n > 0, "below(0) has no valid result");
        ((self.next_u64() as u128 * n as u128) >> 64) as usize
    }

    /// Fisher-Yates shuffle in place, walking from the back.
    fn shuffle<T>(&mut self, items: &mut [T])
    where
        Self: Sized,
    {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn next_u64(&mut self) -> u64 {
        (**self).next_u64()
    }
}

/// The engine's generator: SplitMix64 over a single `u64` of state, so it
/// snapshots alongside the world.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    const GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Raw state, folded into the state hash.
    pub fn state(&self) -> u64 {
        self.state
    }
}

impl RandomSource for SimRng {
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(Self::GAMMA);
        let mix = |z: u64, shift: u32, mul: u64| (z ^ (z >> shift)).wrapping_mul(mul);
        let z = mix(self.state, 30, 0xBF58_476D_1CE4_E5B9);
        let z = mix(z, 27, 0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}
