pub mod normal;
pub mod black_scholes;
pub mod binomial;
pub mod baw;

use crate::errors::{EngineError, EngineResult};
use crate::models::baw::BaroneAdesiWhaley;
use crate::models::binomial::{LatticePricer, Workspace};
use crate::state::OptionContract;
use std::str::FromStr;

/// Strategy for valuing American-style instruments.
///
/// `price()` must be a pure function of its inputs: the workspace is scratch
/// space only and carries nothing between calls.
/// Send + Sync required so one instance can serve every pricing worker.
pub trait AmericanPricer: Send + Sync {
    fn name(&self) -> &'static str;

    fn price(&self, opt: &OptionContract, steps: usize, ws: &mut Workspace) -> f64;
}

/// Which American pricer the dispatcher is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmericanModel {
    /// Early-exercise boundary approximation, lattice fallback.
    Baw,
    /// Plain CRR lattice.
    Lattice,
}

impl AmericanModel {
    pub fn build(self, baw_max_iterations: usize) -> Box<dyn AmericanPricer> {
        match self {
            Self::Baw => Box::new(BaroneAdesiWhaley::new(baw_max_iterations)),
            Self::Lattice => Box::new(LatticePricer),
        }
    }
}

impl FromStr for AmericanModel {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baw" | "barone-adesi-whaley" => Ok(Self::Baw),
            "lattice" | "binomial" | "crr" => Ok(Self::Lattice),
            other => Err(EngineError::Config(format!("unknown american model: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_parsing() {
        assert_eq!("BAW".parse::<AmericanModel>().unwrap(), AmericanModel::Baw);
        assert_eq!("binomial".parse::<AmericanModel>().unwrap(), AmericanModel::Lattice);
        assert!("trinomial".parse::<AmericanModel>().is_err());
    }

    #[test]
    fn test_build_names() {
        assert_eq!(AmericanModel::Baw.build(50).name(), "Barone-Adesi-Whaley");
        assert_eq!(AmericanModel::Lattice.build(50).name(), "CRR-Lattice");
    }
}
