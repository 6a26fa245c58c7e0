//! # mlo-core
//!
//! Traffic-engineering decision core for multi-link wireless operation.
//!
//! For every outbound packet the core picks one of several parallel links,
//! tracks the delivered quality of each link, and measures per-flow SLA
//! compliance across three priority tiers.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Packet events (external simulation layer)          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                        MultipathManager                         │
//! │  ┌────────────┐  ┌───────────┐  ┌────────────┐  ┌────────────┐  │
//! │  │ Classifier │  │ Scheduler │  │ Connection │  │ Duplicator │  │
//! │  │  (tiers)   │  │(strategy) │  │  manager   │  │            │  │
//! │  └────────────┘  └───────────┘  └────────────┘  └────────────┘  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        Link Quality Monitor      │     SLA Deviation Monitor    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                    Report / snapshot accessors                  │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! Events flow classifier → `select_link` → (external transmission) →
//! `record` → monitors. The manager owns every piece of mutable state;
//! strategies only ever see borrowed monitors.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::cast_possible_truncation)]  // Link and flow ids are u8 by construction
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]       // Acceptable for stats
#![allow(clippy::suboptimal_flops)]          // Clarity over micro-optimization
#![allow(clippy::similar_names)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::use_self)]
#![allow(clippy::match_same_arms)]           // Explicit arm per variant is clearer
#![allow(clippy::return_self_not_must_use)]

pub mod classifier;
pub mod config;
pub mod error;
pub mod metrics;
pub mod multipath;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of distinct traffic identifiers.
pub const MAX_FLOWS: usize = 256;

/// Upper bound on parallel links.
pub const MAX_LINKS: usize = 16;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classifier::{classify, Classification};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::metrics::{
        ContractLevel, LinkMetrics, LinkQualityMonitor, Report, SlaContract, SlaDeviationMonitor,
    };
    pub use crate::multipath::{MultipathManager, Scheduler, Strategy, StrategyKind};
    pub use crate::types::*;
}
