// Parsers for the text reports of LSF-family batch schedulers (LSF, volclava, openlava) and of the
// FlexNet license manager.  Nothing here runs commands except the probes, which take a runner.

mod bjobs_time;
mod detail;
mod license;
mod probe;
mod tabular;
mod units;

// Memory units and normalization to MB.

pub use units::round1;
pub use units::MemUnit;

// Split a header-plus-columns report into a Table.

pub use tabular::parse_tabular;
pub use tabular::Preprocess;

// The per-job detail report, in either dialect.

pub use detail::new_detail_parser;
pub use detail::DetailParser;
pub use detail::DetailRecord;
pub use detail::Dialect;
pub use detail::LsfDetailParser;
pub use detail::OpenlavaDetailParser;

// Scheduler identification and the reservation unit, and a parser built from them.

pub use probe::parse_lsid;
pub use probe::parse_unit_for_limits;
pub use probe::probe_detail_parser;
pub use probe::SchedulerFamily;
pub use probe::SchedulerInfo;

// Event times of the detail report, which carry no year.

pub use bjobs_time::parse_bjobs_time;

// License manager status and expiry.

pub use license::expire_days;
pub use license::parse_lmstat;
pub use license::Feature;
pub use license::FeatureExpiry;
pub use license::FeatureUsage;
pub use license::Issued;
pub use license::LicenseServer;
pub use license::VendorDaemon;
