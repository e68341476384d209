//! Session log file registry with age-based eviction.

mod registry;

pub use registry::{RegisterReport, SessionLogRegistry};
