//! Typed records for the multi-line `key value` files of cgroup controllers.
//!
//! - [`KeyValueStat`]: generic parser driven by a table of per-key setters.
//! - [`V1MemoryStat`] / [`V2MemoryStat`]: `memory.stat` of each cgroup generation.
//! - [`CpuStat`]: cgroup v2 `cpu.stat`.

mod cpu;
mod error;
mod memory;
mod parser;

pub use cpu::CpuStat;
pub use error::StatParseError;
pub use memory::{V1MemoryStat, V2MemoryStat};
pub use parser::KeyValueStat;
