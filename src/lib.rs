//! Real-time option pricing core: closed-form and lattice engines, an
//! early-exercise approximation, a parallel batch dispatcher, and the shared
//! market-data store that feeds it.

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod feeds;
pub mod models;
pub mod state;
pub mod store;

pub use batch::OptionBatch;
pub use config::AppConfig;
pub use dispatch::PricingDispatcher;
pub use errors::{EngineError, EngineResult};
pub use models::binomial::{GreekBumps, Workspace};
pub use models::{AmericanModel, AmericanPricer};
pub use state::{ExerciseStyle, GreekResult, Greeks, OptionContract, OptionType, Tick};
pub use store::{MarketStore, TickOutcome};
