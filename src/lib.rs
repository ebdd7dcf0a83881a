pub mod backtest;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod models;
pub mod signals;
pub mod store;
#[cfg(test)]
pub mod test_helpers;
