//! Shared plumbing for the `dla` command-line driver.

pub mod driver;
pub mod inspect;

pub use driver::{RunOptions, RunReport, SaveThrottle, install_stop_handler, run_simulation};
pub use inspect::{HistorySummary, RecordSummary, summarize};
