//! Usage accounting engine: counter sampling, the daily ledger and its clock.

pub mod clock;
pub mod ledger;
pub mod sampler;

pub use clock::{Clock, SystemClock};
pub use ledger::{Rollover, UsageLedger};
pub use sampler::{CounterReading, CounterSampler, CounterSource, SysinfoCounter};
