// Misc utilities useful to lsflog, samplestore and bsample.

mod command;
mod configs;
mod dates;
mod table;

// The immutable sampler configuration, loaded once at startup.

pub use configs::Commands;
pub use configs::MonitorConfig;

// Read the configuration from an optional JSON file plus the environment.

pub use configs::read_monitor_config;

// Run an external report command and capture its status and output.

pub use command::run_command;
pub use command::CommandOutput;
pub use command::CommandRunner;
pub use command::ShellRunner;

// Types and utilities for manipulating sample timestamps.

pub use dates::Timestamp;

// The time right now, truncated to whole seconds.

pub use dates::now;

// Format a Timestamp as YYYYMMDD_HHMMSS, and parse it back.

pub use dates::format_sample_time;
pub use dates::parse_sample_time;

// An ordered set of named columns and the rows aligned to them.

pub use table::Table;
