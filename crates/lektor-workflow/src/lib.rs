pub mod backend;
pub mod busy;
pub mod config;
pub mod criteria;
pub mod error;
pub mod orchestrator;
pub mod repository;
pub mod snapshot;
pub mod state;

#[cfg(test)]
mod testing;
