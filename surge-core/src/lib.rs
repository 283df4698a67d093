mod config;
mod constants;
mod error;
mod metric;
mod schedule;
mod stats;
mod threshold;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use metric::*;
pub use stats::*;
pub use threshold::*;
