//! Exact vote arithmetic.
//!
//! Ballot weights and tallies are big-integer rationals for the whole
//! tabulation; rounding happens only when a tally is written into a round
//! outcome or shown to an operator.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};

/// A ballot weight or tally. Always non-negative inside the engine.
pub type Weight = BigRational;

/// How to settle a value exactly halfway between two representable tallies.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum HalfRounding {
    /// Round half away from zero.
    Up,
    /// Banker's rounding.
    ToEven,
}

pub fn whole(n: u64) -> Weight {
    BigRational::from_integer(BigInt::from(n))
}

pub fn ratio(num: u64, den: u64) -> Weight {
    BigRational::new(BigInt::from(num), BigInt::from(den))
}

fn pow10(places: u8) -> BigInt {
    BigInt::from(10u32).pow(places as u32)
}

/// `value` scaled by `10^places` and rounded to an integer.
fn scaled_integer(value: &Weight, places: u8, half: HalfRounding) -> BigInt {
    debug_assert!(!value.is_negative());
    let scaled = value * BigRational::from_integer(pow10(places));
    let numer = scaled.numer();
    let denom = scaled.denom();
    // numer and denom are non-negative after normalization, so truncation
    // is the floor.
    let quot = numer / denom;
    let rem = numer % denom;
    let twice = &rem + &rem;
    let one = BigInt::from(1u8);
    let two = BigInt::from(2u8);
    match twice.cmp(denom) {
        std::cmp::Ordering::Less => quot,
        std::cmp::Ordering::Greater => quot + one,
        std::cmp::Ordering::Equal => match half {
            HalfRounding::Up => quot + one,
            HalfRounding::ToEven => {
                if (&quot % &two).is_zero() {
                    quot
                } else {
                    quot + one
                }
            }
        },
    }
}

/// Round to `places` decimal digits, staying exact (denominator `10^places`).
pub fn round_to_places(value: &Weight, places: u8, half: HalfRounding) -> Weight {
    BigRational::new(scaled_integer(value, places, half), pow10(places))
}

/// Render `value` rounded to `places` digits, with trailing zeros trimmed
/// so that whole tallies read as plain integers.
pub fn format_weight(value: &Weight, places: u8, half: HalfRounding) -> String {
    let scaled = scaled_integer(value, places, half);
    if places == 0 {
        return scaled.to_string();
    }
    let scale = pow10(places);
    let quot = &scaled / &scale;
    let rem = &scaled % &scale;
    if rem.is_zero() {
        return quot.to_string();
    }
    let frac = rem.to_string();
    let mut out = format!("{}.{}{}", quot, "0".repeat(places as usize - frac.len()), frac);
    while out.ends_with('0') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_numbers_without_fraction() {
        assert_eq!(format_weight(&whole(6), 4, HalfRounding::Up), "6");
        assert_eq!(format_weight(&whole(0), 4, HalfRounding::Up), "0");
        assert_eq!(format_weight(&whole(12), 0, HalfRounding::Up), "12");
    }

    #[test]
    fn rounds_thirds_to_four_places() {
        let third = ratio(1, 3);
        assert_eq!(format_weight(&third, 4, HalfRounding::Up), "0.3333");
        let two_thirds = ratio(2, 3);
        assert_eq!(format_weight(&two_thirds, 4, HalfRounding::Up), "0.6667");
    }

    #[test]
    fn half_up_and_half_even_differ_on_ties() {
        let half = ratio(1, 2);
        assert_eq!(format_weight(&half, 0, HalfRounding::Up), "1");
        assert_eq!(format_weight(&half, 0, HalfRounding::ToEven), "0");
        let three_halves = ratio(3, 2);
        assert_eq!(format_weight(&three_halves, 0, HalfRounding::Up), "2");
        assert_eq!(format_weight(&three_halves, 0, HalfRounding::ToEven), "2");
        // 0.25 at one decimal place: the half digit sits on an even quotient.
        let quarter = ratio(1, 4);
        assert_eq!(format_weight(&quarter, 1, HalfRounding::ToEven), "0.2");
        assert_eq!(format_weight(&quarter, 1, HalfRounding::Up), "0.3");
    }

    #[test]
    fn round_to_places_is_exact() {
        let third = ratio(1, 3);
        let rounded = round_to_places(&third, 4, HalfRounding::Up);
        assert_eq!(rounded, ratio(3333, 10000));
    }
}
