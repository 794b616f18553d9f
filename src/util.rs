//! Miscellaneous integer and formatting helpers.

use log::info;

/// Integer division, but always rounded up.
pub fn divide_rounding_up(numerator: usize, denominator: usize) -> usize {
    let quotient = numerator / denominator;
    quotient + if numerator % denominator != 0 { 1 } else { 0 }
}

fn bit_length(n: usize) -> u32 {
    usize::BITS - n.leading_zeros()
}

/// Check whether or not the input is a power of two.
pub fn is_power_of_two(n: usize) -> bool {
    (1usize << bit_length(n).saturating_sub(1)) == n
}

/// The largest power of two that is smaller than the input.
///
/// Except for the degenerate inputs `0` and `1`, for which it returns `1`.
pub fn largest_power_of_two_smaller_than(n: usize) -> usize {
    let result = 1usize << bit_length(n).saturating_sub(1);
    if result == n && n > 1 {
        result >> 1
    } else {
        result
    }
}

/// Convert an amount with units to a string, pluralized if necessary.
///
/// ```
/// use lithium::util::quantity;
/// assert_eq!(quantity(1, "line"), "1 line");
/// assert_eq!(quantity(4, "chunk"), "4 chunks");
/// ```
pub fn quantity(amount: usize, unit: &str) -> String {
    if amount == 1 {
        format!("{} {}", amount, unit)
    } else {
        format!("{} {}s", amount, unit)
    }
}

/// Log the standard header for the lithium summary.
pub fn summary_header() {
    info!("=== LITHIUM SUMMARY ===");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn divide_rounding_up_works() {
        assert_eq!(divide_rounding_up(0, 1), 0);
        assert_eq!(divide_rounding_up(1, 1), 1);
        assert_eq!(divide_rounding_up(2, 1), 2);
        assert_eq!(divide_rounding_up(1, 2), 1);
        assert_eq!(divide_rounding_up(2, 2), 1);
        assert_eq!(divide_rounding_up(3, 2), 2);
        assert_eq!(divide_rounding_up(4, 2), 2);

        for n in 0..1000usize {
            for d in 1..10usize {
                assert_eq!(divide_rounding_up(n, d), (n + d - 1) / d);
                if n == d {
                    assert_eq!(divide_rounding_up(n, d), 1);
                }
                if n == d + 1 {
                    assert_eq!(divide_rounding_up(n, d), 2);
                }
            }
        }
    }

    fn is_power_of_two_reference(n: usize) -> bool {
        // Is log2(n) an integer?
        if n == 0 {
            return false;
        }
        let log = (n as f64).log2().round() as u32;
        1usize.checked_shl(log).map_or(false, |p| p == n)
    }

    #[test]
    fn is_power_of_two_works() {
        assert!(!is_power_of_two(0));
        for n in 1..10_000usize {
            assert_eq!(is_power_of_two(n), is_power_of_two_reference(n), "n = {}", n);
        }

        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let n: usize = rng.gen();
            assert_eq!(is_power_of_two(n), n.count_ones() == 1, "n = {}", n);
        }
    }

    #[test]
    fn largest_power_of_two_smaller_than_works() {
        assert_eq!(largest_power_of_two_smaller_than(0), 1);
        assert_eq!(largest_power_of_two_smaller_than(1), 1);
        assert_eq!(largest_power_of_two_smaller_than(2), 1);
        assert_eq!(largest_power_of_two_smaller_than(3), 2);
        assert_eq!(largest_power_of_two_smaller_than(4), 2);
        assert_eq!(largest_power_of_two_smaller_than(5), 4);
        assert_eq!(largest_power_of_two_smaller_than(1025), 1024);

        for n in 2..10_000usize {
            let result = largest_power_of_two_smaller_than(n);
            assert!(is_power_of_two(result));
            assert!(result < n);
            assert!(result * 2 >= n);
        }
    }

    #[test]
    fn quantity_pluralizes() {
        assert_eq!(quantity(0, "line"), "0 lines");
        assert_eq!(quantity(1, "char"), "1 char");
        assert_eq!(quantity(2, "symbol-delimiter"), "2 symbol-delimiters");
    }
}
