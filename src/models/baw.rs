use crate::models::binomial::{self, Workspace};
use crate::models::black_scholes;
use crate::models::normal::norm_cdf;
use crate::models::AmericanPricer;
use crate::state::{ExerciseStyle, OptionContract, OptionType};

/// Barone-Adesi-Whaley quadratic approximation for American options.
///
/// With n = 2(r-q)/sigma^2 and k = 2r/(sigma^2 (1 - e^(-rT))), the early
/// exercise premium behaves like A*(S/S*)^e where e is a root of
///
///   e^2 + (n-1)e - k = 0
///
/// (q2 > 0 for calls, q1 < 0 for puts). The critical price S* is where the
/// approximate value meets intrinsic with matching slope. It is found by
/// Newton iteration on the squared smooth-pasting residual, using central
/// finite differences for both derivatives.
///
/// Any failure hands the whole instrument to the lattice: q >= r, a bad
/// exponent, no convergence, a non-finite iterate, a boundary that leaves a
/// value-matching residual, or a result below intrinsic. The result is
/// floored at the European value.
#[derive(Debug, Clone, Copy)]
pub struct BaroneAdesiWhaley {
    max_iterations: usize,
}

/// Central-difference step for the objective's derivatives.
const FD_STEP: f64 = 0.01;
/// Newton stops when successive iterates are closer than this.
const TOLERANCE: f64 = 1e-5;
/// Largest value-matching residual accepted at the solved boundary, per unit of strike.
const MAX_RESIDUAL: f64 = 1e-6;

impl BaroneAdesiWhaley {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
        }
    }

    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// The approximation alone, `None` when it cannot be trusted.
    pub fn approximate(&self, opt: &OptionContract) -> Option<f64> {
        let boundary = Boundary::new(opt)?;
        let critical = boundary.solve(opt.spot, self.max_iterations)?;
        // Newton on the squared residual also stops at local minima where
        // value matching does not hold
        if boundary.objective(critical).sqrt() > MAX_RESIDUAL * opt.strike {
            return None;
        }
        let european = black_scholes::price(opt);

        let premium = boundary.premium_coefficient(critical);
        let exponent = boundary.exponent;
        let american = match opt.option_type {
            OptionType::Call if opt.spot >= critical => opt.intrinsic(),
            OptionType::Put if opt.spot <= critical => opt.intrinsic(),
            _ => european + premium * (opt.spot / critical).powf(exponent),
        };

        let floored = american.max(european);
        if !floored.is_finite() || floored < opt.intrinsic() {
            return None;
        }
        Some(floored)
    }
}

impl Default for BaroneAdesiWhaley {
    fn default() -> Self {
        Self::new(100)
    }
}

impl AmericanPricer for BaroneAdesiWhaley {
    #[inline]
    fn name(&self) -> &'static str {
        "Barone-Adesi-Whaley"
    }

    fn price(&self, opt: &OptionContract, steps: usize, ws: &mut Workspace) -> f64 {
        match self.approximate(opt) {
            Some(value) => value,
            None => {
                tracing::trace!(
                    spot = opt.spot,
                    strike = opt.strike,
                    rate = opt.rate,
                    div_yield = opt.div_yield,
                    side = %opt.option_type,
                    "boundary solve unusable, pricing on lattice"
                );
                binomial::price_with_workspace(&opt.with_style(ExerciseStyle::American), steps, ws)
            }
        }
    }
}

/// Per-instrument constants of the boundary problem. Stack-allocated.
#[derive(Debug, Clone, Copy)]
struct Boundary {
    strike: f64,
    rate: f64,
    sigma: f64,
    ttl: f64,
    div: f64,
    option_type: OptionType,
    /// q2 for calls, q1 for puts.
    exponent: f64,
    /// e^(-qT)
    q_disc: f64,
}

impl Boundary {
    fn new(opt: &OptionContract) -> Option<Self> {
        if opt.div_yield >= opt.rate {
            return None;
        }

        let sigma2 = opt.sigma * opt.sigma;
        let n = 2.0 * (opt.rate - opt.div_yield) / sigma2;
        let k = 2.0 * opt.rate / (sigma2 * (1.0 - (-opt.rate * opt.ttl_years).exp()));
        let root = ((n - 1.0) * (n - 1.0) + 4.0 * k).sqrt();

        let exponent = match opt.option_type {
            OptionType::Call => 0.5 * (-(n - 1.0) + root),
            OptionType::Put => 0.5 * (-(n - 1.0) - root),
        };
        let right_sign = match opt.option_type {
            OptionType::Call => exponent > 0.0,
            OptionType::Put => exponent < 0.0,
        };
        if !exponent.is_finite() || !right_sign {
            return None;
        }

        Some(Self {
            strike: opt.strike,
            rate: opt.rate,
            sigma: opt.sigma,
            ttl: opt.ttl_years,
            div: opt.div_yield,
            option_type: opt.option_type,
            exponent,
            q_disc: (-opt.div_yield * opt.ttl_years).exp(),
        })
    }

    #[inline]
    fn d1(&self, sx: f64) -> f64 {
        ((sx / self.strike).ln() + (self.rate - self.div + 0.5 * self.sigma * self.sigma) * self.ttl)
            / (self.sigma * self.ttl.sqrt())
    }

    /// Squared residual of the value-matching condition at trial price `sx`:
    ///   call: S* - K = c(S*) + (1 - e^(-qT) N(d1)) S*/q2
    ///   put:  K - S* = p(S*) - (1 - e^(-qT) N(-d1)) S*/q1
    fn objective(&self, sx: f64) -> f64 {
        if sx <= 0.0 {
            return 1e100;
        }
        let european = black_scholes::price_parts(sx, self.strike, self.rate, self.sigma, self.ttl, self.div, self.option_type);
        let d1 = self.d1(sx);
        let residual = match self.option_type {
            OptionType::Call => european + (1.0 - self.q_disc * norm_cdf(d1)) * sx / self.exponent - sx + self.strike,
            OptionType::Put => european - (1.0 - self.q_disc * norm_cdf(-d1)) * sx / self.exponent + sx - self.strike,
        };
        residual * residual
    }

    #[inline]
    fn derivative(&self, sx: f64) -> f64 {
        (self.objective(sx + FD_STEP) - self.objective(sx - FD_STEP)) / (2.0 * FD_STEP)
    }

    #[inline]
    fn second_derivative(&self, sx: f64) -> f64 {
        (self.derivative(sx + FD_STEP) - self.derivative(sx - FD_STEP)) / (2.0 * FD_STEP)
    }

    /// Newton's method on the objective's stationary point, starting at spot.
    fn solve(&self, spot: f64, max_iterations: usize) -> Option<f64> {
        let mut sx = spot;
        for _ in 0..max_iterations {
            let next = sx - self.derivative(sx) / self.second_derivative(sx);
            if !next.is_finite() || next <= 0.0 {
                return None;
            }
            if (next - sx).abs() < TOLERANCE {
                return Some(next);
            }
            sx = next;
        }
        None
    }

    /// A2 (calls) or A1 (puts) given the critical price.
    fn premium_coefficient(&self, critical: f64) -> f64 {
        let d1 = self.d1(critical);
        match self.option_type {
            OptionType::Call => critical * (1.0 - self.q_disc * norm_cdf(d1)) / self.exponent,
            OptionType::Put => -critical * (1.0 - self.q_disc * norm_cdf(-d1)) / self.exponent,
        }
    }
}
