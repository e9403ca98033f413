pub mod aggregator;
pub mod app;
pub mod cli;
pub mod config;
pub mod harvest;
pub mod output;
pub mod pool;
pub mod probe;
pub mod progress;
pub mod queue;
pub mod runner;
pub mod utils;

#[cfg(test)]
mod tests;
