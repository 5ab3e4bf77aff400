use crate::batch::OptionBatch;
use crate::config::AppConfig;
use crate::errors::EngineResult;
use crate::models::binomial::{self, GreekBumps, Workspace};
use crate::models::{black_scholes, AmericanPricer};
use crate::state::{ExerciseStyle, GreekResult, OptionContract};
use rayon::prelude::*;

/// Routes instruments to an engine by exercise style and fans batches out
/// over a fixed-size worker pool.
///
/// European rows go to the closed form. American rows go to the configured
/// [`AmericanPricer`]. Batch calls split the output into one contiguous chunk
/// per worker; each chunk owns one [`Workspace`] for the whole call, so
/// lattice evaluations inside a batch never allocate after the first one.
pub struct PricingDispatcher {
    pool: rayon::ThreadPool,
    american: Box<dyn AmericanPricer>,
    steps: usize,
    bumps: GreekBumps,
}

impl PricingDispatcher {
    pub fn new(config: &AppConfig) -> EngineResult<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("pricer-{i}"))
            .build()?;

        let american = config.american_model.build(config.baw_max_iterations);
        tracing::info!(
            workers = pool.current_num_threads(),
            steps = config.steps,
            american = american.name(),
            "pricing dispatcher ready"
        );

        Ok(Self {
            pool,
            american,
            steps: config.steps,
            bumps: GreekBumps::default(),
        })
    }

    /// Swap the American strategy. Dispatch logic is unchanged.
    pub fn with_american_pricer(mut self, american: Box<dyn AmericanPricer>) -> Self {
        self.american = american;
        self
    }

    pub fn with_bumps(mut self, bumps: GreekBumps) -> Self {
        self.bumps = bumps;
        self
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    #[inline]
    pub fn american_pricer(&self) -> &dyn AmericanPricer {
        self.american.as_ref()
    }

    // ── Single instrument ──

    pub fn price(&self, opt: &OptionContract) -> f64 {
        self.price_with_steps(opt, self.steps)
    }

    pub fn price_with_steps(&self, opt: &OptionContract, steps: usize) -> f64 {
        let mut ws = Workspace::default();
        self.route(opt, steps, &mut ws)
    }

    #[inline]
    fn route(&self, opt: &OptionContract, steps: usize, ws: &mut Workspace) -> f64 {
        match opt.style {
            ExerciseStyle::European => black_scholes::price(opt),
            ExerciseStyle::American => self.american.price(opt, steps, ws),
        }
    }

    fn route_with_greeks(&self, opt: &OptionContract, steps: usize, ws: &mut Workspace) -> GreekResult {
        match opt.style {
            ExerciseStyle::European => black_scholes::price_and_greeks(opt),
            ExerciseStyle::American => {
                let price = self.american.price(opt, steps, ws);
                let bumped = binomial::greeks_with_workspace(opt, steps, &self.bumps, ws);
                GreekResult {
                    price,
                    greeks: bumped.greeks,
                }
            }
        }
    }

    // ── Batches ──

    /// One price per row, in row order.
    pub fn price_batch(&self, batch: &OptionBatch) -> Vec<f64> {
        self.price_batch_with_steps(batch, self.steps)
    }

    pub fn price_batch_with_steps(&self, batch: &OptionBatch, steps: usize) -> Vec<f64> {
        let style = batch.style();
        let mut out = vec![0.0; batch.len()];
        self.fill(&mut out, steps, |i, ws| match style[i] {
            ExerciseStyle::European => black_scholes::price_parts(
                batch.spot()[i],
                batch.strike()[i],
                batch.rate()[i],
                batch.sigma()[i],
                batch.ttl_years()[i],
                batch.div_yield()[i],
                batch.option_type()[i],
            ),
            ExerciseStyle::American => self.american.price(&batch.row(i), steps, ws),
        });
        out
    }

    pub fn price_and_greeks(&self, batch: &OptionBatch) -> Vec<GreekResult> {
        self.price_and_greeks_with_steps(batch, self.steps)
    }

    pub fn price_and_greeks_with_steps(&self, batch: &OptionBatch, steps: usize) -> Vec<GreekResult> {
        let mut out = vec![GreekResult::default(); batch.len()];
        self.fill(&mut out, steps, |i, ws| self.route_with_greeks(&batch.row(i), steps, ws));
        out
    }

    /// Array-of-structs form for callers holding plain records.
    pub fn price_contracts(&self, contracts: &[OptionContract]) -> Vec<f64> {
        let mut out = vec![0.0; contracts.len()];
        let steps = self.steps;
        self.fill(&mut out, steps, |i, ws| self.route(&contracts[i], steps, ws));
        out
    }

    /// Write `eval(i)` into `out[i]` for every row, one workspace per chunk.
    fn fill<T, F>(&self, out: &mut [T], steps: usize, eval: F)
    where
        T: Send,
        F: Fn(usize, &mut Workspace) -> T + Sync,
    {
        if out.is_empty() {
            return;
        }
        let chunk = out.len().div_ceil(self.workers().max(1));

        self.pool.install(|| {
            out.par_chunks_mut(chunk).enumerate().for_each(|(c, slots)| {
                let mut ws = Workspace::new(steps);
                let offset = c * chunk;
                for (j, slot) in slots.iter_mut().enumerate() {
                    *slot = eval(offset + j, &mut ws);
                }
            });
        });
    }
}

impl std::fmt::Debug for PricingDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingDispatcher")
            .field("workers", &self.workers())
            .field("american", &self.american.name())
            .field("steps", &self.steps)
            .field("bumps", &self.bumps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::baw::BaroneAdesiWhaley;
    use crate::models::binomial::LatticePricer;
    use crate::models::AmericanModel;
    use crate::state::OptionType;
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config(threads: usize, steps: usize) -> AppConfig {
        AppConfig {
            threads,
            steps,
            ..AppConfig::default()
        }
    }

    fn mixed_batch(n: usize) -> OptionBatch {
        (0..n)
            .map(|i| {
                let strike = 80.0 + i as f64;
                let option_type = if i % 2 == 0 { OptionType::Call } else { OptionType::Put };
                let style = if i % 3 == 0 { ExerciseStyle::American } else { ExerciseStyle::European };
                OptionContract::new(100.0, strike, 0.05, 0.25, 0.75, 0.01, option_type, style)
            })
            .collect()
    }

    #[test]
    fn test_single_instrument_routing() {
        let d = PricingDispatcher::new(&config(2, 200)).unwrap();
        let e = OptionContract::new(100.0, 101.0, 0.04, 0.1, 1.5, 0.0, OptionType::Call, ExerciseStyle::European);
        assert_eq!(d.price(&e), black_scholes::price(&e));

        let a = OptionContract::new(100.0, 100.0, 0.05, 0.2, 1.0, 0.0, OptionType::Put, ExerciseStyle::American);
        let mut ws = Workspace::default();
        assert_eq!(d.price(&a), BaroneAdesiWhaley::new(100).price(&a, 200, &mut ws));
    }

    #[test]
    fn test_batch_preserves_input_order() {
        let batch = mixed_batch(37);
        let d = PricingDispatcher::new(&config(4, 150)).unwrap();
        let prices = d.price_batch(&batch);
        assert_eq!(prices.len(), batch.len());
        for (i, opt) in batch.iter().enumerate() {
            assert_eq!(prices[i], d.price(&opt), "row {i}");
        }
    }

    #[test]
    fn test_batch_independent_of_worker_count() {
        let batch = mixed_batch(23);
        let one = PricingDispatcher::new(&config(1, 120)).unwrap().price_batch(&batch);
        let many = PricingDispatcher::new(&config(5, 120)).unwrap().price_batch(&batch);
        assert_eq!(one, many);
    }

    #[test]
    fn test_contracts_match_batch() {
        let batch = mixed_batch(11);
        let rows: Vec<OptionContract> = batch.iter().collect();
        let d = PricingDispatcher::new(&config(3, 100)).unwrap();
        assert_eq!(d.price_contracts(&rows), d.price_batch(&batch));
    }

    #[test]
    fn test_empty_batch() {
        let d = PricingDispatcher::new(&config(2, 100)).unwrap();
        assert!(d.price_batch(&OptionBatch::new()).is_empty());
        assert!(d.price_and_greeks(&OptionBatch::new()).is_empty());
    }

    #[test]
    fn test_bad_row_does_not_disturb_neighbours() {
        let mut batch = mixed_batch(6);
        let mut broken = batch.get(2).unwrap();
        broken.spot = f64::NAN;
        let mut fixed: Vec<OptionContract> = batch.iter().collect();
        fixed[2] = broken;
        batch = OptionBatch::from(fixed.as_slice());

        let d = PricingDispatcher::new(&config(3, 100)).unwrap();
        let prices = d.price_batch(&batch);
        assert!(prices[2].is_nan());
        for (i, p) in prices.iter().enumerate().filter(|(i, _)| *i != 2) {
            assert!(p.is_finite(), "row {i} = {p}");
        }
    }

    #[test]
    fn test_greeks_routing() {
        let batch = mixed_batch(9);
        let d = PricingDispatcher::new(&config(2, 300)).unwrap();
        let results = d.price_and_greeks(&batch);
        for (i, opt) in batch.iter().enumerate() {
            match opt.style {
                ExerciseStyle::European => assert_eq!(results[i], black_scholes::price_and_greeks(&opt)),
                ExerciseStyle::American => {
                    assert_eq!(results[i].price, d.price_with_steps(&opt, 300));
                    let lattice = binomial::greeks_with_workspace(&opt, 300, &GreekBumps::default(), &mut Workspace::default());
                    assert_eq!(results[i].greeks, lattice.greeks);
                }
            }
        }
    }

    #[test]
    fn test_step_override() {
        let a = OptionContract::new(100.0, 100.0, 0.05, 0.2, 1.0, 0.0, OptionType::Put, ExerciseStyle::American);
        let d = PricingDispatcher::new(&config(1, 50))
            .unwrap()
            .with_american_pricer(AmericanModel::Lattice.build(1));
        assert_eq!(d.price_with_steps(&a, 400), binomial::price(&a, 400));
        assert_eq!(d.price(&a), binomial::price(&a, 50));
    }

    /// Counts calls and records the workspace each call saw.
    struct Recording {
        calls: Arc<AtomicUsize>,
        workspaces: Arc<std::sync::Mutex<Vec<usize>>>,
    }

    impl AmericanPricer for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn price(&self, opt: &OptionContract, steps: usize, ws: &mut Workspace) -> f64 {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.workspaces
                .lock()
                .unwrap()
                .push(&*ws as *const Workspace as usize);
            LatticePricer.price(opt, steps, ws)
        }
    }

    #[test]
    fn test_pluggable_strategy_and_workspace_per_worker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let workspaces = Arc::new(std::sync::Mutex::new(Vec::new()));
        let d = PricingDispatcher::new(&config(2, 60))
            .unwrap()
            .with_american_pricer(Box::new(Recording {
                calls: calls.clone(),
                workspaces: workspaces.clone(),
            }));
        assert_eq!(d.american_pricer().name(), "recording");

        let batch: OptionBatch = (0..10)
            .map(|i| OptionContract::new(100.0, 90.0 + i as f64, 0.03, 0.3, 0.5, 0.0, OptionType::Put, ExerciseStyle::American))
            .collect();
        let prices = d.price_batch(&batch);

        assert_eq!(calls.load(Ordering::Relaxed), 10);
        for (i, opt) in batch.iter().enumerate() {
            assert_abs_diff_eq!(prices[i], binomial::price(&opt, 60), epsilon = 0.0);
        }
        // two workers, two chunks: at most two distinct workspaces
        let mut seen = workspaces.lock().unwrap().clone();
        seen.sort_unstable();
        seen.dedup();
        assert!(seen.len() <= 2, "saw {} workspaces", seen.len());
    }
}
