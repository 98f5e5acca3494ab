use fixed::types::I32F32;

/// Q32.32 fixed point. Rates are stored in this form so random rolls
/// compare identically on every platform.
pub type Fixed64 = I32F32;

/// Simulation time, counted in whole ticks.
pub type Ticks = u64;

/// Lossy conversion for building worlds from decimal data.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// A probability: `0 <= v <= 1`.
#[inline]
pub fn is_unit_interval(v: Fixed64) -> bool {
    (Fixed64::ZERO..=Fixed64::ONE).contains(&v)
}
