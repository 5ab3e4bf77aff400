use crate::models::normal::{norm_cdf, norm_pdf};
use crate::state::{GreekResult, Greeks, OptionContract, OptionType};

/// Black-Scholes-Merton closed form for European options with a continuous
/// dividend yield.
///
/// d1 = (ln(S/K) + (r - q + sigma^2/2)*T) / (sigma * sqrt(T))
/// d2 = d1 - sigma * sqrt(T)
///
/// Call = e^(-qT)*N(d1)*S - N(d2)*K*e^(-rT)
/// Put  = N(-d2)*K*e^(-rT) - e^(-qT)*N(-d1)*S
///
/// Vega and rho are per 1-point move (/100), theta per calendar day (/365).
/// No input validation: sigma <= 0 or T <= 0 yields non-finite output.

/// Quantities shared by the price and every Greek. Stack-allocated.
#[derive(Debug, Clone, Copy)]
struct Terms {
    sqrt_t: f64,
    d1: f64,
    d2: f64,
    /// e^(-qT)
    q_disc: f64,
    /// e^(-rT)
    r_disc: f64,
}

impl Terms {
    #[inline]
    fn new(spot: f64, strike: f64, rate: f64, sigma: f64, ttl: f64, div: f64) -> Self {
        let sqrt_t = ttl.sqrt();
        let sigma_sqrt_t = sigma * sqrt_t;
        let d1 = ((spot / strike).ln() + (rate - div + 0.5 * sigma * sigma) * ttl) / sigma_sqrt_t;
        Self {
            sqrt_t,
            d1,
            d2: d1 - sigma_sqrt_t,
            q_disc: (-div * ttl).exp(),
            r_disc: (-rate * ttl).exp(),
        }
    }

    #[inline]
    fn of(opt: &OptionContract) -> Self {
        Self::new(opt.spot, opt.strike, opt.rate, opt.sigma, opt.ttl_years, opt.div_yield)
    }

    #[inline]
    fn price(&self, spot: f64, strike: f64, option_type: OptionType) -> f64 {
        match option_type {
            OptionType::Call => self.q_disc * norm_cdf(self.d1) * spot - norm_cdf(self.d2) * strike * self.r_disc,
            OptionType::Put => norm_cdf(-self.d2) * strike * self.r_disc - self.q_disc * norm_cdf(-self.d1) * spot,
        }
    }
}

#[inline]
pub fn price(opt: &OptionContract) -> f64 {
    Terms::of(opt).price(opt.spot, opt.strike, opt.option_type)
}

/// Field-wise entry for structure-of-arrays callers.
#[inline]
pub fn price_parts(
    spot: f64,
    strike: f64,
    rate: f64,
    sigma: f64,
    ttl: f64,
    div: f64,
    option_type: OptionType,
) -> f64 {
    Terms::new(spot, strike, rate, sigma, ttl, div).price(spot, strike, option_type)
}

pub fn delta(opt: &OptionContract) -> f64 {
    let t = Terms::of(opt);
    match opt.option_type {
        OptionType::Call => t.q_disc * norm_cdf(t.d1),
        OptionType::Put => t.q_disc * (norm_cdf(t.d1) - 1.0),
    }
}

pub fn gamma(opt: &OptionContract) -> f64 {
    let t = Terms::of(opt);
    t.q_disc * norm_pdf(t.d1) / (opt.spot * opt.sigma * t.sqrt_t)
}

pub fn vega(opt: &OptionContract) -> f64 {
    let t = Terms::of(opt);
    opt.spot * t.q_disc * norm_pdf(t.d1) * t.sqrt_t / 100.0
}

pub fn theta(opt: &OptionContract) -> f64 {
    greeks(opt).theta
}

pub fn rho(opt: &OptionContract) -> f64 {
    let t = Terms::of(opt);
    let k_t_disc = opt.strike * opt.ttl_years * t.r_disc;
    match opt.option_type {
        OptionType::Call => k_t_disc * norm_cdf(t.d2) / 100.0,
        OptionType::Put => -k_t_disc * norm_cdf(-t.d2) / 100.0,
    }
}

/// All five sensitivities from a single evaluation of d1, d2 and the
/// discount factors.
pub fn greeks(opt: &OptionContract) -> Greeks {
    let t = Terms::of(opt);
    greeks_from_terms(opt, &t)
}

pub fn price_and_greeks(opt: &OptionContract) -> GreekResult {
    let t = Terms::of(opt);
    GreekResult {
        price: t.price(opt.spot, opt.strike, opt.option_type),
        greeks: greeks_from_terms(opt, &t),
    }
}

fn greeks_from_terms(opt: &OptionContract, t: &Terms) -> Greeks {
    let pdf_d1 = norm_pdf(t.d1);
    let is_call = opt.option_type == OptionType::Call;

    // N(d) for the side being priced: calls use +d, puts use -d
    let (cdf_d1, cdf_d2) = if is_call {
        (norm_cdf(t.d1), norm_cdf(t.d2))
    } else {
        (norm_cdf(-t.d1), norm_cdf(-t.d2))
    };
    let sign = if is_call { 1.0 } else { -1.0 };

    let spot_disc = opt.spot * t.q_disc;
    let strike_disc = opt.strike * t.r_disc;

    let delta = sign * t.q_disc * cdf_d1;
    let gamma = t.q_disc * pdf_d1 / (opt.spot * opt.sigma * t.sqrt_t);
    let vega = spot_disc * pdf_d1 * t.sqrt_t / 100.0;

    let decay = -(spot_disc * pdf_d1 * opt.sigma) / (2.0 * t.sqrt_t);
    let theta = (decay - sign * opt.rate * strike_disc * cdf_d2 + sign * opt.div_yield * spot_disc * cdf_d1) / 365.0;

    let rho = sign * strike_disc * opt.ttl_years * cdf_d2 / 100.0;

    Greeks {
        delta,
        gamma,
        vega,
        theta,
        rho,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ExerciseStyle;
    use approx::assert_abs_diff_eq;

    fn call(spot: f64, strike: f64, rate: f64, sigma: f64, ttl: f64, div: f64) -> OptionContract {
        OptionContract::new(spot, strike, rate, sigma, ttl, div, OptionType::Call, ExerciseStyle::European)
    }

    fn put_of(opt: &OptionContract) -> OptionContract {
        OptionContract {
            option_type: OptionType::Put,
            ..*opt
        }
    }

    #[test]
    fn test_reference_call() {
        let opt = call(100.0, 101.0, 0.04, 0.1, 1.5, 0.0);
        assert_abs_diff_eq!(price(&opt), 7.596410548080172, epsilon = 1e-6);
    }

    #[test]
    fn test_reference_put() {
        let opt = put_of(&call(100.0, 101.0, 0.04, 0.1, 1.5, 0.0));
        assert_abs_diff_eq!(price(&opt), 2.7146284400892924, epsilon = 1e-6);
    }

    #[test]
    fn test_put_call_parity_with_dividends() {
        let c = call(105.0, 100.0, 0.03, 0.3, 0.75, 0.02);
        let p = put_of(&c);
        let forward_gap = c.spot * (-c.div_yield * c.ttl_years).exp() - c.strike * (-c.rate * c.ttl_years).exp();
        assert_abs_diff_eq!(price(&c) - price(&p), forward_gap, epsilon = 1e-9);
    }

    #[test]
    fn test_price_parts_matches_record() {
        let c = call(97.0, 100.0, 0.05, 0.22, 0.4, 0.01);
        let parts = price_parts(c.spot, c.strike, c.rate, c.sigma, c.ttl_years, c.div_yield, c.option_type);
        assert_eq!(parts, price(&c));
    }

    #[test]
    fn test_combined_greeks_match_individual() {
        for opt in [call(100.0, 95.0, 0.05, 0.25, 0.5, 0.01), put_of(&call(90.0, 100.0, 0.02, 0.35, 1.2, 0.03))] {
            let g = greeks(&opt);
            assert_abs_diff_eq!(g.delta, delta(&opt), epsilon = 1e-14);
            assert_abs_diff_eq!(g.gamma, gamma(&opt), epsilon = 1e-14);
            assert_abs_diff_eq!(g.vega, vega(&opt), epsilon = 1e-14);
            assert_abs_diff_eq!(g.theta, theta(&opt), epsilon = 1e-14);
            assert_abs_diff_eq!(g.rho, rho(&opt), epsilon = 1e-14);

            let full = price_and_greeks(&opt);
            assert_eq!(full.price, price(&opt));
            assert_eq!(full.greeks, g);
        }
    }

    #[test]
    fn test_greeks_match_finite_differences() {
        let opt = call(100.0, 100.0, 0.05, 0.2, 1.0, 0.02);
        let g = greeks(&opt);

        let h = 1e-3;
        let bump = |f: &dyn Fn(&mut OptionContract, f64)| {
            let mut up = opt;
            f(&mut up, h);
            let mut dn = opt;
            f(&mut dn, -h);
            (price(&up) - price(&dn)) / (2.0 * h)
        };

        assert_abs_diff_eq!(g.delta, bump(&|o, d| o.spot += d), epsilon = 1e-6);
        assert_abs_diff_eq!(g.vega, bump(&|o, d| o.sigma += d) / 100.0, epsilon = 1e-6);
        assert_abs_diff_eq!(g.rho, bump(&|o, d| o.rate += d) / 100.0, epsilon = 1e-6);
        // theta is the decay as calendar time passes, i.e. -dV/dT per day
        assert_abs_diff_eq!(g.theta, -bump(&|o, d| o.ttl_years += d) / 365.0, epsilon = 1e-6);

        let mut up = opt;
        up.spot += h;
        let mut dn = opt;
        dn.spot -= h;
        let fd_gamma = (price(&up) - 2.0 * price(&opt) + price(&dn)) / (h * h);
        assert_abs_diff_eq!(g.gamma, fd_gamma, epsilon = 1e-4);
    }

    #[test]
    fn test_degenerate_inputs_propagate_non_finite() {
        let zero_vol = call(100.0, 100.0, 0.0, 0.0, 1.0, 0.0);
        let expired = call(100.0, 100.0, 0.05, 0.2, 0.0, 0.0);
        // gamma divides by sigma * sqrt(T) directly
        assert!(!greeks(&zero_vol).gamma.is_finite());
        assert!(!greeks(&expired).gamma.is_finite());
        assert!(!gamma(&expired).is_finite());
    }
}
