//! Strategy engine crate.
//!
//! Scans venue events for mispriced daily-high contracts, sizes and places
//! orders under a circuit breaker and gate cascade, and settles resolved
//! positions back into P&L and forecast accuracy history.

pub mod cache;
pub mod dates;
pub mod executor;
pub mod notifications;
pub mod persistence;
pub mod scanner;
pub mod settlement;

pub use cache::{new_forecast_cache, ForecastCache, ForecastEntry};
pub use executor::{ExecutionSummary, Executor};
pub use notifications::{AlertLevel, Notifier};
pub use persistence::Persistence;
pub use scanner::{scan, BacktestEntry};
pub use settlement::{run_settlement, SettlementSummary};
