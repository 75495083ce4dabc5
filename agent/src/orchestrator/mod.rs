//! Two-phase upgrade compatibility test

pub mod fsm;
pub mod locks;
pub mod policy;
pub mod result;
pub mod runner;

pub use result::TestResult;
pub use runner::{Orchestrator, Timings};
