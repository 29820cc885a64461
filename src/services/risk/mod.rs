pub mod backtest;
pub mod forecast;
pub mod heuristic;
pub mod likelihood;

pub use backtest::{BacktestReport, Backtester};
pub use forecast::{CorridorForecast, CycleReport, ForecastError, ForecastService};
pub use heuristic::{assess, wind_relation, HeuristicInputs};
pub use likelihood::{FrequencyModel, LikelihoodQuery};
