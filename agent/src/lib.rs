//! Upgrade compatibility agent library
//!
//! Installs a baseline build and then a candidate build of an app on attached
//! Android and iOS devices, and checks the upgraded app comes up in the foreground.

pub mod app;
pub mod artifact;
pub mod device;
pub mod downloads;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod orchestrator;
pub mod server;
pub mod share;
pub mod storage;
pub mod utils;
pub mod workers;
