use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Standard normal N(0, 1). Constructing it is a plain struct literal, so
/// the helpers below build it per call instead of holding shared state.
#[inline]
fn standard() -> Normal {
    Normal::standard()
}

/// Cumulative distribution function of the standard normal.
#[inline]
pub fn norm_cdf(x: f64) -> f64 {
    standard().cdf(x)
}

/// Probability density function of the standard normal.
#[inline]
pub fn norm_pdf(x: f64) -> f64 {
    standard().pdf(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const CDF_REFERENCE: &[(f64, f64)] = &[
        (-3.0, 0.0013498980316300946),
        (-1.0, 0.15865525393145702),
        (0.0, 0.5),
        (0.5, 0.6914624612740131),
        (2.0, 0.9772498680518208),
    ];

    #[test]
    fn test_cdf_reference_values() {
        for &(x, expected) in CDF_REFERENCE {
            assert_abs_diff_eq!(norm_cdf(x), expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_cdf_symmetry() {
        for x in [0.1, 0.7, 1.3, 2.9] {
            assert_abs_diff_eq!(norm_cdf(x) + norm_cdf(-x), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_pdf_peak() {
        assert_abs_diff_eq!(norm_pdf(0.0), 0.3989422804014327, epsilon = 1e-12);
        assert_abs_diff_eq!(norm_pdf(1.5), norm_pdf(-1.5), epsilon = 1e-12);
    }
}
