use itertools::Itertools;
use log::*;
use statrs::distribution::{
    Continuous,
    ContinuousCDF,
    Normal,
};

/// Consistency constant making the MAD an estimator of the normal sigma.
pub const MAD_CONSTANT: f64 = 1.4826;

const HUBER_TOL: f64 = 1e-6;
const HUBER_MAX_ITER: usize = 1000;

/// Median of the finite values; `None` for an empty input.
pub fn median(values: &[f64]) -> Option<f64> {
    let sorted = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .sorted_by(|a, b| a.total_cmp(b))
        .collect_vec();
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
    else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation around `center`, scaled by [`MAD_CONSTANT`].
pub fn mad(
    values: &[f64],
    center: f64,
) -> Option<f64> {
    let deviations = values
        .iter()
        .map(|v| (v - center).abs())
        .collect_vec();
    median(&deviations).map(|m| m * MAD_CONSTANT)
}

/// Location and scale of a Huber M-estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HuberEstimate {
    pub mu:    f64,
    pub scale: f64,
}

/// Huber M-estimator of location with the MAD as fixed scale.
///
/// Values further than `k * scale` from the current location are winsorized
/// before averaging, so a handful of saturated readings cannot drag the
/// estimate. When the MAD is zero the median is returned with zero scale and
/// the caller decides how to treat the degenerate sample.
pub fn huber(
    values: &[f64],
    k: f64,
) -> Option<HuberEstimate> {
    let values = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect_vec();
    let mut mu = median(&values)?;
    let scale = mad(&values, mu)?;
    if scale == 0.0 {
        debug!("Huber estimate: MAD is zero, returning the median");
        return Some(HuberEstimate { mu, scale });
    }

    let n = values.len() as f64;
    for _ in 0..HUBER_MAX_ITER {
        let (lower, upper) = (mu - k * scale, mu + k * scale);
        let next = values
            .iter()
            .map(|v| v.clamp(lower, upper))
            .sum::<f64>()
            / n;
        if (next - mu).abs() < HUBER_TOL * scale {
            return Some(HuberEstimate { mu: next, scale });
        }
        mu = next;
    }
    warn!(
        "Huber estimate did not converge after {} iterations",
        HUBER_MAX_ITER
    );
    Some(HuberEstimate { mu, scale })
}

/// Inverse Mills ratio `pdf(z) / (1 - cdf(z))` of the standard normal.
///
/// Far in the upper tail the survival function underflows; the ratio is then
/// taken from its asymptotic expansion.
pub fn inverse_mills_ratio(z: f64) -> f64 {
    let normal = Normal::standard();
    let sf = normal.sf(z);
    if sf > 1e-280 {
        normal.pdf(z) / sf
    }
    else {
        (z + (z * z + 4.0).sqrt()) / 2.0
    }
}

/// Expected true signal given an observed intensity `x` under the
/// normal-exponential convolution model: background `N(mu, sigma^2)` plus
/// signal `Exp(mean = alpha)`.
pub fn normexp_signal(
    x: f64,
    mu: f64,
    sigma: f64,
    alpha: f64,
) -> f64 {
    let sigma2 = sigma * sigma;
    let mu_sf = x - mu - sigma2 / alpha;
    mu_sf + sigma * inverse_mills_ratio(-mu_sf / sigma)
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[f64::NAN, 1.0]), Some(1.0));
    }

    #[test]
    fn test_mad() {
        // deviations from 3: 2,1,0,1,2 -> median 1
        let m = mad(&[1.0, 2.0, 3.0, 4.0, 5.0], 3.0).unwrap();
        assert_approx_eq!(m, MAD_CONSTANT);
    }

    #[test]
    fn test_huber_ignores_outliers() {
        let mut values = (0..200)
            .map(|i| 100.0 + (i % 10) as f64)
            .collect_vec();
        let clean = huber(&values, 1.5).unwrap();
        values.extend([65535.0; 5]);
        let dirty = huber(&values, 1.5).unwrap();

        assert!((clean.mu - 104.5).abs() < 0.5);
        assert!((dirty.mu - clean.mu).abs() < 1.0);

        let naive_mean = values.iter().sum::<f64>() / values.len() as f64;
        assert!(naive_mean > 1000.0);
    }

    #[test]
    fn test_huber_degenerate() {
        let est = huber(&[5.0; 50], 1.5).unwrap();
        assert_eq!(est, HuberEstimate { mu: 5.0, scale: 0.0 });
        assert!(huber(&[], 1.5).is_none());
    }

    #[test]
    fn test_inverse_mills_tail_continuity() {
        let exact = inverse_mills_ratio(30.0);
        let asymptotic = (30.0 + (30.0f64 * 30.0 + 4.0).sqrt()) / 2.0;
        assert!((exact - asymptotic).abs() < 1e-3);
        assert!(inverse_mills_ratio(60.0).is_finite());
    }

    #[test]
    fn test_normexp_signal_properties() {
        let (mu, sigma, alpha) = (300.0, 50.0, 2000.0);
        // Always positive and monotone in x.
        let xs = [0.0, 100.0, 300.0, 1000.0, 10000.0];
        let signals = xs
            .iter()
            .map(|x| normexp_signal(*x, mu, sigma, alpha))
            .collect_vec();
        assert!(signals.iter().all(|s| *s > 0.0));
        assert!(signals.windows(2).all(|w| w[0] < w[1]));
        // High intensities are shifted by roughly the background.
        assert!((signals[4] - (10000.0 - mu - sigma * sigma / alpha)).abs() < 1e-6);
    }
}
