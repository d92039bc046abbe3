//! Numeric semantics: the `Number::` and `BigInt::` operation families.
//!
//! Numbers are IEEE-754 doubles with the standard's exact edge cases
//! (signed zeros, NaN, the 2^32 modular conversions). BigInts are
//! arbitrary-precision integers whose bitwise operators behave as
//! two's-complement over sign-magnitude, which is what `num_bigint`
//! implements; the unit tests pin that down rather than assume it.

use num_bigint::BigInt;
use num_traits::{Pow, Signed, ToPrimitive, Zero};

use crate::{
    agent::Agent,
    completion::JsResult,
    intrinsics::error::ErrorKind,
};

const TWO_POW_32: f64 = 4_294_967_296.0;

/// `ToInt32`-style wrap of an already-converted number: modulo 2^32 into the
/// signed range, with NaN and the infinities mapping to 0.
pub fn wrap_to_int32(n: f64) -> i32 {
    wrap_to_uint32(n) as i32
}

/// `ToUint32`-style wrap: modulo 2^32, with NaN and the infinities mapping
/// to 0.
pub fn wrap_to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let modulus = n.trunc().rem_euclid(TWO_POW_32);
    // The remainder is integral and in [0, 2^32), so the cast is exact.
    modulus as u32
}

/// SameValue on numbers: NaN equals NaN, the zeros are distinct.
pub fn number_same_value(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    if a == 0.0 && b == 0.0 {
        return a.is_sign_negative() == b.is_sign_negative();
    }
    a == b
}

/// SameValueZero on numbers: NaN equals NaN, the zeros coincide.
pub fn number_same_value_zero(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

/// `Number::exponentiate`, which differs from `f64::powf` at the edges the
/// standard cares about (a unit base with an infinite exponent is NaN).
pub fn number_exponentiate(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() {
        return f64::NAN;
    }
    if exponent == 0.0 {
        return 1.0;
    }
    if base.is_nan() {
        return f64::NAN;
    }
    if exponent.is_infinite() {
        let mag = base.abs();
        return if mag > 1.0 {
            if exponent > 0.0 { f64::INFINITY } else { 0.0 }
        } else if mag < 1.0 {
            if exponent > 0.0 { 0.0 } else { f64::INFINITY }
        } else {
            f64::NAN
        };
    }
    base.powf(exponent)
}

/// `Number::toString` in base 10: `"NaN"`, signed infinities, and otherwise
/// the shortest round-tripping decimal laid out by the standard's
/// decimal-point and exponent rules. The digits come from `ryu`; the layout
/// is ours, so output does not depend on host formatting.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n == 0.0 {
        return "0".to_owned();
    }
    if n < 0.0 {
        return format!("-{}", number_to_string(-n));
    }
    if n.is_infinite() {
        return "Infinity".to_owned();
    }

    let mut buffer = ryu::Buffer::new();
    let formatted = buffer.format_finite(n);

    // Split ryu's output into a digit string and a base-10 exponent such
    // that the value is 0.digits * 10^point.
    let (mantissa, exp10) = match formatted.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse::<i32>().unwrap_or(0)),
        None => (formatted, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let mut digits: Vec<u8> = int_part.bytes().chain(frac_part.bytes()).collect();
    let mut point = int_part.len() as i32 + exp10;
    while digits.first() == Some(&b'0') {
        digits.remove(0);
        point -= 1;
    }
    while digits.last() == Some(&b'0') {
        digits.pop();
    }
    let digits = String::from_utf8(digits).expect("ascii digits");
    let k = digits.len() as i32;

    if k <= point && point <= 21 {
        // Integer with trailing zeros.
        let zeros = "0".repeat((point - k) as usize);
        format!("{digits}{zeros}")
    } else if 0 < point && point <= 21 {
        format!("{}.{}", &digits[..point as usize], &digits[point as usize..])
    } else if -6 < point && point <= 0 {
        let zeros = "0".repeat((-point) as usize);
        format!("0.{zeros}{digits}")
    } else {
        let exponent = point - 1;
        let sign = if exponent >= 0 { "+" } else { "-" };
        let magnitude = exponent.abs();
        if k == 1 {
            format!("{digits}e{sign}{magnitude}")
        } else {
            format!("{}.{}e{sign}{magnitude}", &digits[..1], &digits[1..])
        }
    }
}

// --- BigInt operations ---

/// `BigInt::divide`; division by zero is a RangeError.
pub(crate) fn bigint_divide(agent: &mut Agent, a: &BigInt, b: &BigInt) -> JsResult<BigInt> {
    if b.is_zero() {
        return Err(agent.throw_error(ErrorKind::Range, "division by zero"));
    }
    Ok(a / b)
}

/// `BigInt::remainder`; the result takes the sign of the dividend.
pub(crate) fn bigint_remainder(agent: &mut Agent, a: &BigInt, b: &BigInt) -> JsResult<BigInt> {
    if b.is_zero() {
        return Err(agent.throw_error(ErrorKind::Range, "division by zero"));
    }
    Ok(a % b)
}

/// `BigInt::exponentiate`; a negative exponent is a RangeError.
pub(crate) fn bigint_exponentiate(agent: &mut Agent, a: &BigInt, b: &BigInt) -> JsResult<BigInt> {
    if b.is_negative() {
        return Err(agent.throw_error(ErrorKind::Range, "exponent must be non-negative"));
    }
    let Some(exp) = b.to_u32() else {
        return Err(agent.throw_error(ErrorKind::Range, "exponent too large"));
    };
    Ok(Pow::pow(a, exp))
}

/// `BigInt::leftShift`; a negative count shifts right. The shift amount is
/// bounded to keep a hostile exponent from exhausting memory.
pub(crate) fn bigint_shift_left(agent: &mut Agent, a: &BigInt, b: &BigInt) -> JsResult<BigInt> {
    if b.is_negative() {
        return bigint_shift_right(agent, a, &-b);
    }
    let Some(count) = b.to_u32().filter(|&c| c <= 1 << 20) else {
        return Err(agent.throw_error(ErrorKind::Range, "shift count too large"));
    };
    Ok(a << count)
}

/// `BigInt::signedRightShift`; arithmetic shift, so negative values round
/// toward negative infinity.
pub(crate) fn bigint_shift_right(agent: &mut Agent, a: &BigInt, b: &BigInt) -> JsResult<BigInt> {
    if b.is_negative() {
        return bigint_shift_left(agent, a, &-b);
    }
    let Some(count) = b.to_u32().filter(|&c| c <= 1 << 20) else {
        return Err(agent.throw_error(ErrorKind::Range, "shift count too large"));
    };
    Ok(a >> count)
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use super::*;

    #[test]
    fn wrap_to_int32_is_idempotent() {
        for x in [0.0, -0.0, 1.5, -1.5, 3e9, -3e9, 1e308, f64::NAN, f64::INFINITY] {
            let once = wrap_to_int32(x);
            assert_eq!(wrap_to_int32(f64::from(once)), once, "input {x}");
        }
    }

    #[test]
    fn wrap_to_uint32_agrees_with_int32_mod_2_32() {
        for x in [0.0, 1.0, -1.0, 2.5e9, -2.5e9, 4294967296.0, 4294967297.0] {
            let signed = wrap_to_int32(x);
            let unsigned = wrap_to_uint32(x);
            assert_eq!(signed as u32, unsigned, "input {x}");
        }
    }

    #[test]
    fn wrap_handles_non_finite() {
        assert_eq!(wrap_to_int32(f64::NAN), 0);
        assert_eq!(wrap_to_int32(f64::INFINITY), 0);
        assert_eq!(wrap_to_uint32(f64::NEG_INFINITY), 0);
        assert_eq!(wrap_to_uint32(-1.0), 4_294_967_295);
    }

    #[test]
    fn same_value_distinguishes_zeros() {
        assert!(number_same_value(f64::NAN, f64::NAN));
        assert!(!number_same_value(0.0, -0.0));
        assert!(number_same_value_zero(0.0, -0.0));
        assert!(number_same_value_zero(f64::NAN, f64::NAN));
    }

    #[test]
    fn exponentiate_edge_cases() {
        assert!(number_exponentiate(1.0, f64::INFINITY).is_nan());
        assert!(number_exponentiate(-1.0, f64::NEG_INFINITY).is_nan());
        assert_eq!(number_exponentiate(f64::NAN, 0.0), 1.0);
        assert_eq!(number_exponentiate(2.0, 10.0), 1024.0);
    }

    #[test]
    fn number_to_string_layout() {
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(0.0), "0");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-42.5), "-42.5");
        assert_eq!(number_to_string(100.0), "100");
        assert_eq!(number_to_string(4_294_967_295.0), "4294967295");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(1e-6), "0.000001");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e20), "100000000000000000000");
        assert_eq!(number_to_string(1.5e22), "1.5e+22");
        assert_eq!(number_to_string(0.1), "0.1");
    }

    #[test]
    fn bigint_bitwise_is_twos_complement() {
        // num_bigint implements signed bitwise as-if two's complement;
        // these pin the cases the shortcut path relies on.
        let v = |n: i64| BigInt::from(n);
        assert_eq!(&v(-5) & &v(3), v(3));
        assert_eq!(&v(-1) | &v(0), v(-1));
        assert_eq!(&v(-2) ^ &v(-3), v(3));
        assert_eq!(&v(-1) & &v(255), v(255));
        assert_eq!(&v(-256) | &v(1), v(-255));
    }

    #[test]
    fn bigint_shift_is_arithmetic() {
        let v = |n: i64| BigInt::from(n);
        assert_eq!(&v(-8) >> 1u32, v(-4));
        assert_eq!(&v(-7) >> 1u32, v(-4), "rounds toward negative infinity");
        assert_eq!(&v(3) << 4u32, v(48));
    }
}
