// The sharded store of scheduler samples: which shard a job goes to, writing a pass into a shard
// under its lock, reading back, and retention.

mod lock;
mod range;
mod retention;
mod store;

// Job id => job shard.

pub use range::group_by_range;
pub use range::job_range;
pub use range::numeric_job_id;
pub use range::JobRange;

// The advisory per-shard write lock.

pub use lock::lock_path;
pub use lock::ShardLock;

// Write and read shards.

pub use store::list_tables;
pub use store::open_read_only;
pub use store::read_table;
pub use store::table_columns;
pub use store::write_shard;
pub use store::SampleRow;
pub use store::WriteOutcome;
pub use store::WritePolicy;

// Drop the oldest rows of a table beyond a cap.

pub use retention::trim_table;
