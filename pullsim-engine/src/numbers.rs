//! Numeric conversion helpers centralizing lossy casts.

use num_traits::cast::cast;

/// Convert u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(f64::MAX)
}

/// Convert u128 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u128_to_f64(value: u128) -> f64 {
    cast::<u128, f64>(value).unwrap_or(f64::MAX)
}

/// Ceil a non-negative f64 and clamp it to the u64 range, returning 0 for
/// non-finite or negative values.
#[must_use]
pub fn ceil_f64_to_u64(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let max = cast::<u64, f64>(u64::MAX).unwrap_or(f64::MAX);
    cast::<f64, u64>(value.min(max).ceil()).unwrap_or(u64::MAX)
}

/// Round a value up to the next multiple of `step`; a zero step is the identity.
#[must_use]
pub fn ceil_to_multiple(value: f64, step: u64) -> f64 {
    if step == 0 || !value.is_finite() {
        return value;
    }
    let step = u64_to_f64(step);
    (value / step).ceil() * step
}

/// Fraction `part / whole`, or 0.0 for an empty whole.
#[must_use]
pub fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    u64_to_f64(part) / u64_to_f64(whole)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_handles_non_finite_and_negative() {
        assert_eq!(ceil_f64_to_u64(f64::NAN), 0);
        assert_eq!(ceil_f64_to_u64(-3.0), 0);
        assert_eq!(ceil_f64_to_u64(2.000_1), 3);
        assert_eq!(ceil_f64_to_u64(f64::INFINITY), 0);
    }

    #[test]
    fn rounds_up_to_multiples() {
        assert!((ceil_to_multiple(171.0, 10) - 180.0).abs() < f64::EPSILON);
        assert!((ceil_to_multiple(180.0, 10) - 180.0).abs() < f64::EPSILON);
        assert!((ceil_to_multiple(42.5, 0) - 42.5).abs() < f64::EPSILON);
    }

    #[test]
    fn ratio_guards_empty_whole() {
        assert!(ratio(3, 0).abs() < f64::EPSILON);
        assert!((ratio(1, 4) - 0.25).abs() < f64::EPSILON);
    }
}
