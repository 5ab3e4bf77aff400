use crate::models::AmericanPricer;
use crate::state::{payoff, ExerciseStyle, GreekResult, Greeks, OptionContract, OptionType};

/// Cox-Ross-Rubinstein binomial lattice.
///
/// dt = T/n, u = e^(sigma*sqrt(dt)), d = 1/u
/// p  = (e^((r-q)*dt) - d) / (u - d), one-step discount e^(-r*dt)
///
/// Terminal node i (i up-moves counted from the top) sits at S*u^(n-i)*d^i.
/// Backward induction walks the stock value back by dividing by u and takes
/// max(continuation, intrinsic) at American nodes. European records keep the
/// continuation value only. O(n^2) time, O(n) space.

/// Scratch buffers for one lattice evaluation, sized `steps + 1`.
///
/// Owned by exactly one worker at a time. Grows when a deeper lattice is
/// requested and never shrinks, so a long-lived workspace stops allocating
/// after the first evaluation at its largest depth.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    prices: Vec<f64>,
    option_values: Vec<f64>,
}

impl Workspace {
    pub fn new(steps: usize) -> Self {
        let mut ws = Self::default();
        ws.ensure_steps(steps);
        ws
    }

    /// Grow both buffers to hold `steps + 1` nodes. No-op when already large enough.
    #[inline]
    pub fn ensure_steps(&mut self, steps: usize) {
        let nodes = steps + 1;
        if self.prices.len() < nodes {
            self.prices.resize(nodes, 0.0);
            self.option_values.resize(nodes, 0.0);
        }
    }

    /// Deepest lattice this workspace can hold without reallocating.
    #[inline]
    pub fn capacity_steps(&self) -> usize {
        self.prices.len().saturating_sub(1)
    }
}

/// Finite-difference bump sizes for lattice Greeks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreekBumps {
    pub d_spot: f64,
    /// Years. Theta reprices at T - d_time.
    pub d_time: f64,
    pub d_sigma: f64,
    pub d_rate: f64,
}

impl Default for GreekBumps {
    fn default() -> Self {
        Self {
            d_spot: 0.01,
            d_time: 1.0 / 365.0,
            d_sigma: 0.01,
            d_rate: 0.001,
        }
    }
}

/// Floor for the theta bump so T - dT stays a valid maturity.
const MIN_TTL: f64 = 1e-8;

/// Allocating convenience form. The pricing hot path uses [`price_with_workspace`].
pub fn price(opt: &OptionContract, steps: usize) -> f64 {
    let mut ws = Workspace::new(steps);
    price_with_workspace(opt, steps, &mut ws)
}

pub fn price_with_workspace(opt: &OptionContract, steps: usize, ws: &mut Workspace) -> f64 {
    price_parts_with_workspace(
        opt.spot,
        opt.strike,
        opt.rate,
        opt.sigma,
        opt.ttl_years,
        opt.div_yield,
        opt.option_type,
        opt.style,
        steps,
        ws,
    )
}

/// Field-wise entry for structure-of-arrays callers.
#[allow(clippy::too_many_arguments)]
pub fn price_parts_with_workspace(
    spot: f64,
    strike: f64,
    rate: f64,
    sigma: f64,
    ttl: f64,
    div: f64,
    option_type: OptionType,
    style: ExerciseStyle,
    steps: usize,
    ws: &mut Workspace,
) -> f64 {
    let steps = steps.max(1);
    ws.ensure_steps(steps);
    let prices = &mut ws.prices[..=steps];
    let values = &mut ws.option_values[..=steps];

    let dt = ttl / steps as f64;
    let u = (sigma * dt.sqrt()).exp();
    let d = 1.0 / u;
    let p = (((rate - div) * dt).exp() - d) / (u - d);
    let one_minus_p = 1.0 - p;
    let discount = (-rate * dt).exp();
    let early_exercise = style == ExerciseStyle::American;

    // Terminal layer, top node first
    for (i, (price, value)) in prices.iter_mut().zip(values.iter_mut()).enumerate() {
        *price = spot * u.powi((steps - i) as i32) * d.powi(i as i32);
        *value = payoff(option_type, *price, strike);
    }

    for step in (0..steps).rev() {
        for i in 0..=step {
            prices[i] /= u;
            let continuation = discount * (p * values[i] + one_minus_p * values[i + 1]);
            values[i] = if early_exercise {
                continuation.max(payoff(option_type, prices[i], strike))
            } else {
                continuation
            };
        }
    }

    values[0]
}

/// Bump-and-reprice Greeks against one shared workspace.
///
/// Six lattice runs: base, spot up, spot down, T - dT, sigma + dSigma,
/// r + dR. Reported in the closed-form engine's units so European and
/// American rows of one batch line up.
pub fn greeks_with_workspace(
    opt: &OptionContract,
    steps: usize,
    bumps: &GreekBumps,
    ws: &mut Workspace,
) -> GreekResult {
    let base = price_with_workspace(opt, steps, ws);

    let spot_up = price_with_workspace(&OptionContract { spot: opt.spot + bumps.d_spot, ..*opt }, steps, ws);
    let spot_dn = price_with_workspace(&OptionContract { spot: opt.spot - bumps.d_spot, ..*opt }, steps, ws);

    let shorter_ttl = (opt.ttl_years - bumps.d_time).max(MIN_TTL);
    let earlier = price_with_workspace(&OptionContract { ttl_years: shorter_ttl, ..*opt }, steps, ws);

    let vol_up = price_with_workspace(&OptionContract { sigma: opt.sigma + bumps.d_sigma, ..*opt }, steps, ws);
    let rate_up = price_with_workspace(&OptionContract { rate: opt.rate + bumps.d_rate, ..*opt }, steps, ws);

    let ds = bumps.d_spot;
    let elapsed_days = (opt.ttl_years - shorter_ttl) * 365.0;

    GreekResult {
        price: base,
        greeks: Greeks {
            delta: (spot_up - spot_dn) / (2.0 * ds),
            gamma: (spot_up - 2.0 * base + spot_dn) / (ds * ds),
            vega: (vol_up - base) / bumps.d_sigma / 100.0,
            theta: (earlier - base) / elapsed_days,
            rho: (rate_up - base) / bumps.d_rate / 100.0,
        },
    }
}

/// The lattice itself as an American pricer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatticePricer;

impl AmericanPricer for LatticePricer {
    #[inline]
    fn name(&self) -> &'static str {
        "CRR-Lattice"
    }

    #[inline]
    fn price(&self, opt: &OptionContract, steps: usize, ws: &mut Workspace) -> f64 {
        price_with_workspace(&opt.with_style(ExerciseStyle::American), steps, ws)
    }
}
