//! Agent loop orchestrating the station lifecycle

mod lifecycle;

pub use lifecycle::{LifecycleError, StationAgent};
