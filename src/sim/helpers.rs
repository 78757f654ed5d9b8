//! Numerical guards and rate conversions shared by the engines.
//!
//! Rate equations clamp out-of-range inputs to safe bounds instead of
//! failing; only a non-finite result that survives clamping is an error.

use crate::error::SimError;

pub fn clamp01(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// `num / den`, or `fallback` when the denominator is zero or not finite.
pub fn safe_div(num: f64, den: f64, fallback: f64) -> f64 {
    if den.abs() > f64::EPSILON && den.is_finite() {
        num / den
    } else {
        fallback
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `x / (x + half)`: zero at zero, one half at `half`, approaches one.
/// Non-decreasing in `x` for non-negative inputs.
pub fn saturate(x: f64, half: f64) -> f64 {
    let x = x.max(0.0);
    safe_div(x, x + half, 0.0)
}

/// Hill dose-response `c^n / (ec50^n + c^n)`.
pub fn hill(concentration: f64, ec50: f64, n: f64) -> f64 {
    if concentration.is_nan() || concentration <= 0.0 {
        return 0.0;
    }
    if ec50 <= 0.0 {
        return 1.0;
    }
    // Ratio form stays finite for large concentrations.
    let ratio = (ec50 / concentration).powf(n);
    clamp01(1.0 / (1.0 + ratio))
}

/// Probability that an event with constant `rate` (per minute) occurs within `dt`.
pub fn rate_to_probability(rate: f64, dt: f64) -> f64 {
    if rate <= 0.0 || dt <= 0.0 {
        return 0.0;
    }
    clamp01(1.0 - (-rate * dt).exp())
}

/// Fraction remaining after `dt` of first-order elimination with the given half-life.
pub fn half_life_factor(half_life: f64, dt: f64) -> f64 {
    if half_life <= 0.0 {
        return 0.0;
    }
    (-dt / half_life).exp2()
}

/// Exact first-order relaxation of `current` toward `target` over `dt`.
pub fn relax(current: f64, target: f64, rate: f64, dt: f64) -> f64 {
    if rate <= 0.0 || dt <= 0.0 {
        return current;
    }
    target + (current - target) * (-rate * dt).exp()
}

/// Integer count from an expected value: the whole part plus one more with
/// probability equal to the fractional part.
pub fn stochastic_count(expected: f64, rng: &mut dyn rand::RngCore) -> usize {
    use rand::Rng;
    if expected.is_nan() || expected <= 0.0 {
        return 0;
    }
    let whole = expected.floor();
    let extra = rng.random_bool(clamp01(expected - whole));
    whole as usize + usize::from(extra)
}

pub fn ensure_finite(system: &'static str, quantity: &'static str, value: f64) -> Result<f64, SimError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimError::NonFinite { system, quantity })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn hill_is_half_at_ec50() {
        assert!((hill(2.0, 2.0, 3.0) - 0.5).abs() < 1e-12);
        assert_eq!(hill(0.0, 2.0, 3.0), 0.0);
        assert!(hill(1e9, 2.0, 3.0) > 0.999_999);
    }

    #[test]
    fn hill_is_monotone_in_concentration() {
        let mut prev = 0.0;
        for i in 1..200 {
            let e = hill(i as f64 * 0.05, 1.0, 2.5);
            assert!(e >= prev);
            prev = e;
        }
    }

    #[test]
    fn half_life_factor_composes() {
        let whole = half_life_factor(60.0, 90.0);
        let split = half_life_factor(60.0, 30.0) * half_life_factor(60.0, 60.0);
        assert!((whole - split).abs() < 1e-15);
        assert!((half_life_factor(60.0, 60.0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn relax_moves_toward_target_without_overshoot() {
        let v = relax(0.0, 1.0, 0.5, 1.0);
        assert!(v > 0.0 && v < 1.0);
        assert_eq!(relax(0.3, 1.0, 0.0, 1.0), 0.3);
        assert!((relax(0.0, 1.0, 1e6, 1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn safe_div_guards_zero() {
        assert_eq!(safe_div(1.0, 0.0, 7.0), 7.0);
        assert_eq!(safe_div(1.0, f64::NAN, 7.0), 7.0);
        assert_eq!(safe_div(6.0, 3.0, 7.0), 2.0);
    }

    #[test]
    fn stochastic_count_matches_expectation() {
        let mut rng = SmallRng::seed_from_u64(3);
        let total: usize = (0..10_000).map(|_| stochastic_count(1.25, &mut rng)).sum();
        let mean = total as f64 / 10_000.0;
        assert!((mean - 1.25).abs() < 0.05, "mean {mean}");
        assert_eq!(stochastic_count(-1.0, &mut rng), 0);
        assert_eq!(stochastic_count(f64::NAN, &mut rng), 0);
    }

    #[test]
    fn ensure_finite_reports_system() {
        assert_eq!(ensure_finite("x", "y", 1.0), Ok(1.0));
        assert_eq!(
            ensure_finite("physiology", "cardiac_output", f64::INFINITY),
            Err(SimError::NonFinite {
                system: "physiology",
                quantity: "cardiac_output"
            })
        );
    }
}
