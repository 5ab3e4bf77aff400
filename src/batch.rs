use crate::state::{ExerciseStyle, OptionContract, OptionType};

/// Structure-of-arrays batch of instruments.
///
/// One contiguous vector per field. All vectors have the same length at all
/// times: the only way to grow the batch is [`OptionBatch::push`], which
/// extends every column, and there is no removal. Insertion order is the
/// instrument's index for the lifetime of the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionBatch {
    spot: Vec<f64>,
    strike: Vec<f64>,
    rate: Vec<f64>,
    sigma: Vec<f64>,
    ttl_years: Vec<f64>,
    div_yield: Vec<f64>,
    option_type: Vec<OptionType>,
    style: Vec<ExerciseStyle>,
}

impl OptionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        let mut batch = Self::default();
        batch.reserve(n);
        batch
    }

    pub fn reserve(&mut self, n: usize) {
        self.spot.reserve(n);
        self.strike.reserve(n);
        self.rate.reserve(n);
        self.sigma.reserve(n);
        self.ttl_years.reserve(n);
        self.div_yield.reserve(n);
        self.option_type.reserve(n);
        self.style.reserve(n);
    }

    /// Append one instrument and return its index.
    pub fn push(&mut self, opt: &OptionContract) -> usize {
        let idx = self.len();
        self.spot.push(opt.spot);
        self.strike.push(opt.strike);
        self.rate.push(opt.rate);
        self.sigma.push(opt.sigma);
        self.ttl_years.push(opt.ttl_years);
        self.div_yield.push(opt.div_yield);
        self.option_type.push(opt.option_type);
        self.style.push(opt.style);
        debug_assert!(self.columns_aligned());
        idx
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.spot.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spot.is_empty()
    }

    /// Row `i` gathered back into a record.
    #[inline]
    pub fn get(&self, i: usize) -> Option<OptionContract> {
        if i >= self.len() {
            return None;
        }
        Some(self.row(i))
    }

    /// Unchecked-by-contract row access for the pricing hot loop.
    /// Panics on out-of-range index like slice indexing.
    #[inline]
    pub(crate) fn row(&self, i: usize) -> OptionContract {
        OptionContract {
            spot: self.spot[i],
            strike: self.strike[i],
            rate: self.rate[i],
            sigma: self.sigma[i],
            ttl_years: self.ttl_years[i],
            div_yield: self.div_yield[i],
            option_type: self.option_type[i],
            style: self.style[i],
        }
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = OptionContract> + '_ {
        (0..self.len()).map(move |i| self.row(i))
    }

    #[inline]
    pub fn spot(&self) -> &[f64] {
        &self.spot
    }

    #[inline]
    pub fn strike(&self) -> &[f64] {
        &self.strike
    }

    #[inline]
    pub fn rate(&self) -> &[f64] {
        &self.rate
    }

    #[inline]
    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }

    #[inline]
    pub fn ttl_years(&self) -> &[f64] {
        &self.ttl_years
    }

    #[inline]
    pub fn div_yield(&self) -> &[f64] {
        &self.div_yield
    }

    #[inline]
    pub fn option_type(&self) -> &[OptionType] {
        &self.option_type
    }

    #[inline]
    pub fn style(&self) -> &[ExerciseStyle] {
        &self.style
    }

    #[inline]
    pub(crate) fn set_spot(&mut self, i: usize, spot: f64) {
        self.spot[i] = spot;
    }

    #[inline]
    pub(crate) fn set_sigma(&mut self, i: usize, sigma: f64) {
        self.sigma[i] = sigma;
    }

    fn columns_aligned(&self) -> bool {
        let n = self.spot.len();
        self.strike.len() == n
            && self.rate.len() == n
            && self.sigma.len() == n
            && self.ttl_years.len() == n
            && self.div_yield.len() == n
            && self.option_type.len() == n
            && self.style.len() == n
    }
}

impl From<&[OptionContract]> for OptionBatch {
    fn from(options: &[OptionContract]) -> Self {
        let mut batch = Self::with_capacity(options.len());
        for opt in options {
            batch.push(opt);
        }
        batch
    }
}

impl FromIterator<OptionContract> for OptionBatch {
    fn from_iter<I: IntoIterator<Item = OptionContract>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut batch = Self::with_capacity(iter.size_hint().0);
        for opt in iter {
            batch.push(&opt);
        }
        batch
    }
}
