//! Vector hashing
//!
//! Deterministic mapping from window values to 64-bit vector ids:
//! - Raw tokens hash to 32-bit feature values (short-string path for length 2)
//! - Weight class 1 passes the value through unchanged
//! - Weight class 2 packs two 32-bit values into one id
//! - Larger weight classes fold each value's decimal digits into a 64-bit accumulator
//!
//! All arithmetic wraps as two's complement. The trained tables were keyed with
//! exactly these ids, so any change here invalidates every model.

/// Multiplier for every rolling hash.
pub const PRIME: i32 = 59;
/// Low-word multiplier for two-value ids.
pub const PRIME2: i64 = 37;
/// Seed of the 32-bit string hash.
pub const PRIME_START: i32 = 17;
/// Seed of the 64-bit digit fold.
pub const PRIME_BASE: i64 = 1_125_899_906_842_597;
/// Folded in place of a dependent tier that a number set does not use.
pub const PLACEHOLDER: i32 = 1975;

/// Vector id of a number set not yet computed for the current window.
pub const VID_UNSET: i64 = -1;
/// Vector id of a number set excluded because a required value is empty.
pub const VID_EXCLUDED: i64 = -2;

const PRIME64: i64 = PRIME as i64;
const MINUS: i64 = b'-' as i64;
const DIGIT_ZERO: i64 = b'0' as i64;
const LOW_WORD: i64 = 0xffff_ffff;

/// Hash a raw token string into a 32-bit feature value.
///
/// Two-unit strings take a dedicated path that separates the units with
/// `'~'` and `' '` to keep common two-letter tokens from colliding. Empty
/// strings map to the model's empty sentinel.
///
/// # Examples
///
/// ```
/// use framewise::hasher::hash_short_string;
///
/// assert_eq!(hash_short_string("", 0), 0);
/// assert_eq!(hash_short_string("cat", 0), 3_841_901);
/// assert_eq!(hash_short_string("ab", 0), 226_357_492);
/// ```
pub fn hash_short_string(s: &str, empty: i32) -> i32 {
    if s.is_empty() {
        return empty;
    }
    let mut units = s.encode_utf16();
    match (units.next(), units.next(), units.next()) {
        (Some(first), Some(second), None) => {
            let mut res = PRIME.wrapping_mul(PRIME_START).wrapping_add(i32::from(first));
            res = PRIME.wrapping_mul(res).wrapping_add(i32::from(b'~'));
            res = PRIME.wrapping_mul(res).wrapping_add(i32::from(b' '));
            PRIME.wrapping_mul(res).wrapping_add(i32::from(second))
        }
        _ => hash_code32(s),
    }
}

/// Hash a single UTF-16 code unit the way a one-character string hashes.
#[inline]
pub fn hash_code_unit(unit: u16) -> i32 {
    PRIME.wrapping_mul(PRIME_START).wrapping_add(i32::from(unit))
}

fn hash_code32(s: &str) -> i32 {
    s.encode_utf16().fold(PRIME_START, |acc, unit| {
        PRIME.wrapping_mul(acc).wrapping_add(i32::from(unit))
    })
}

/// Fold one value into a 64-bit accumulator as decimal digits.
///
/// A zero accumulator restarts at [`PRIME_BASE`]. Negative values fold a sign
/// marker first, then the digits of their magnitude.
fn fold_digits(acc: i64, value: i32) -> i64 {
    let mut acc = if acc == 0 { PRIME_BASE } else { acc };
    let mut num = i64::from(value);
    if num < 0 {
        acc = PRIME64.wrapping_mul(acc).wrapping_add(MINUS);
        num = -num;
    }
    while num > 0 {
        acc = PRIME64.wrapping_mul(acc).wrapping_add(num % 10 + DIGIT_ZERO);
        num /= 10;
    }
    acc
}

/// Fold the next value of a number set into its running vector id.
///
/// `acc` starts at [`VID_UNSET`]. `weight_class` is the total number of values
/// the number set folds for one window.
#[inline]
pub fn fold(weight_class: usize, value: i32, acc: i64) -> i64 {
    match weight_class {
        1 => i64::from(value),
        2 => {
            if acc == VID_UNSET {
                i64::from(value).wrapping_mul(PRIME2) & LOW_WORD
            } else {
                (i64::from(value) << 32) | acc
            }
        }
        _ => fold_digits(if acc == VID_UNSET { 0 } else { acc }, value),
    }
}

/// Hash a complete tuple of values for a number set of the given weight class.
///
/// # Examples
///
/// ```
/// use framewise::hasher::hash_values;
///
/// // single values pass through
/// assert_eq!(hash_values(1, &[42]), 42);
/// // pairs pack high and low words
/// assert_eq!(hash_values(2, &[3, 5]), (5i64 << 32) | 111);
/// // identical inputs always give identical ids
/// assert_eq!(hash_values(3, &[1, -2, 3]), hash_values(3, &[1, -2, 3]));
/// ```
pub fn hash_values(weight_class: usize, values: &[i32]) -> i64 {
    values
        .iter()
        .fold(VID_UNSET, |acc, &value| fold(weight_class, value, acc))
}

/// A sequence element that can be turned into a 32-bit feature value.
///
/// Implemented for raw token strings and for pre-tokenized values.
pub trait Token {
    /// Feature value of this token, `empty` when there is none.
    fn feature(&self, empty: i32) -> i32;

    /// Raw text, when the token has one.
    fn text(&self) -> Option<&str> {
        None
    }
}

impl Token for str {
    fn feature(&self, empty: i32) -> i32 {
        hash_short_string(self, empty)
    }

    fn text(&self) -> Option<&str> {
        Some(self)
    }
}

impl Token for String {
    fn feature(&self, empty: i32) -> i32 {
        hash_short_string(self, empty)
    }

    fn text(&self) -> Option<&str> {
        Some(self)
    }
}

impl<T: Token + ?Sized> Token for &T {
    fn feature(&self, empty: i32) -> i32 {
        (**self).feature(empty)
    }

    fn text(&self) -> Option<&str> {
        (**self).text()
    }
}

impl Token for i32 {
    fn feature(&self, _empty: i32) -> i32 {
        *self
    }
}

impl Token for i64 {
    fn feature(&self, _empty: i32) -> i32 {
        *self as i32
    }
}

impl<T: Token> Token for Option<T> {
    fn feature(&self, empty: i32) -> i32 {
        match self {
            Some(token) => token.feature(empty),
            None => empty,
        }
    }

    fn text(&self) -> Option<&str> {
        self.as_ref().and_then(|token| token.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_char_matches_code_unit_hash() {
        assert_eq!(hash_short_string("a", 0), 1100);
        assert_eq!(hash_code_unit(u16::from(b'a')), 1100);
    }

    #[test]
    fn two_unit_strings_use_separator_path() {
        // 59*17+'a' -> '~' -> ' ' -> 'b'
        assert_eq!(hash_short_string("ab", 0), 226_357_492);
        assert_ne!(hash_short_string("ab", 0), hash_code32("ab"));
    }

    #[test]
    fn empty_string_maps_to_sentinel() {
        assert_eq!(hash_short_string("", -7), -7);
        assert_eq!(None::<&str>.feature(-7), -7);
    }

    #[test]
    fn long_strings_wrap_in_32_bits() {
        let long = "internationalization".repeat(4);
        // must not panic in debug builds
        let a = hash_short_string(&long, 0);
        let b = hash_short_string(&long, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn digit_fold_starts_at_base() {
        assert_eq!(hash_values(3, &[0]), PRIME_BASE);
        assert_eq!(hash_values(3, &[7]), 66_428_094_503_713_278);
    }

    #[test]
    fn negative_values_fold_sign_marker() {
        let expected = PRIME64
            .wrapping_mul(PRIME64.wrapping_mul(PRIME_BASE).wrapping_add(MINUS))
            .wrapping_add(i64::from(b'7'));
        assert_eq!(hash_values(3, &[-7]), expected);
        assert_ne!(hash_values(3, &[-7]), hash_values(3, &[7]));
    }

    #[test]
    fn min_value_folds_its_magnitude() {
        let marker = PRIME64.wrapping_mul(PRIME_BASE).wrapping_add(MINUS);
        // 2147483648, least significant digit first
        let expected = [8, 4, 6, 3, 8, 4, 7, 4, 1, 2]
            .iter()
            .fold(marker, |acc, &d| PRIME64.wrapping_mul(acc).wrapping_add(d + DIGIT_ZERO));
        assert_eq!(hash_values(3, &[i32::MIN]), expected);
        assert_ne!(hash_values(3, &[i32::MIN, 5]), hash_values(3, &[-5]));
    }

    #[test]
    fn digit_order_separates_split_numbers() {
        assert_ne!(hash_values(3, &[1, 23]), hash_values(3, &[12, 3]));
    }

    #[test]
    fn pair_packing_keeps_sign_of_high_word() {
        let id = hash_values(2, &[1, -1]);
        assert!(id < 0);
        assert_eq!(id & LOW_WORD, 37);
    }

    #[test]
    fn incremental_fold_matches_batch() {
        let values = [3_841_901, 0, -15, 226_357_492];
        let mut acc = VID_UNSET;
        for &v in &values {
            acc = fold(4, v, acc);
        }
        assert_eq!(acc, hash_values(4, &values));
    }

    #[test]
    fn tokens_from_values_and_strings() {
        assert_eq!(5i32.feature(0), 5);
        assert_eq!((1i64 << 33 | 9).feature(0), 9);
        assert_eq!("cat".feature(0), hash_short_string("cat", 0));
        assert_eq!(String::from("cat").text(), Some("cat"));
        assert_eq!(5i32.text(), None);
    }
}
