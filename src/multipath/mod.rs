//! Multi-link packet scheduling.
//!
//! This module implements the decision side of the core:
//! - Reliability scoring shared by all strategies
//! - Four link mapping strategies behind one capability trait
//! - The scheduler that forwards outcomes to the monitors
//! - Sticky connections and packet duplication
//! - The manager that owns and drives all of the above

mod connection;
mod duplication;
mod manager;
mod scheduler;
pub mod scoring;
mod strategy;

pub use connection::{Binding, ConnectionConfig, ConnectionManager};
pub use duplication::{DuplicationConfig, DuplicationPlanner, DuplicationPolicy};
pub use manager::{Dispatch, EventStats, MultipathManager};
pub use scheduler::{Monitors, Scheduler};
pub use strategy::{
    GreedyLoad, LinkSelector, ReliabilityAware, RoundRobin, SelectionContext, SlaAware, Strategy,
    StrategyConfig, StrategyKind,
};
