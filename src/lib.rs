//! Synthetic financial-transaction load generator.
//!
//! Provisions a topic, then runs a fixed pool of workers that each publish
//! one random record per pacing interval through their own client and
//! observe acknowledgments out of band.

pub mod broker;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod pool;
pub mod provision;
pub mod rate;
pub mod record;
pub mod worker;
