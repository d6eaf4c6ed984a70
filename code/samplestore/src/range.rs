/// Job shards.
///
/// Jobs are grouped into shard files by numeric id, `size` ids per file, so that no single file
/// holds an unbounded number of tables and a job's file is computable from its id alone.  Array
/// job elements ("104[3]") go with their parent id; the full id is still the job's table key.
use anyhow::{bail, Result};
use log::warn;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobRange {
    pub low: u64,
    pub high: u64,
}

impl JobRange {
    /// "100000_199999"

    pub fn label(&self) -> String {
        format!("{}_{}", self.low, self.high)
    }

    pub fn file_name(&self) -> String {
        format!("{}.db", self.label())
    }
}

pub fn numeric_job_id(id: &str) -> Result<u64> {
    let base = match id.find('[') {
        Some(ix) => &id[..ix],
        None => id,
    };
    match base.trim().parse::<u64>() {
        Ok(n) => Ok(n),
        Err(_) => bail!("Not a job id: '{id}'"),
    }
}

pub fn job_range(id: &str, size: u64) -> Result<JobRange> {
    if size == 0 {
        bail!("Job range size must be positive");
    }
    let n = numeric_job_id(id)?;
    let low = n / size * size;
    Ok(JobRange {
        low,
        high: low + (size - 1),
    })
}

/// Group job ids by shard, keeping the order in which the ids were seen within each shard.  Ids
/// that are not job ids are reported and left out.

pub fn group_by_range<'a, I>(ids: I, size: u64) -> Result<BTreeMap<JobRange, Vec<String>>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: BTreeMap<JobRange, Vec<String>> = BTreeMap::new();
    for id in ids {
        match job_range(id, size) {
            Ok(r) => groups.entry(r).or_default().push(id.to_string()),
            Err(e) => {
                if size == 0 {
                    return Err(e);
                }
                warn!("{e}");
            }
        }
    }
    Ok(groups)
}

#[test]
fn test_job_range() {
    let r = job_range("123456", 100000).unwrap();
    assert!(r.low == 100000);
    assert!(r.high == 199999);
    assert!(r.label() == "100000_199999");
    assert!(r.file_name() == "100000_199999.db");

    assert!(job_range("123456[17]", 100000).unwrap() == r);
    assert!(job_range("99999", 100000).unwrap().label() == "0_99999");
    assert!(job_range("10000", 10000).unwrap().label() == "10000_19999");

    assert!(job_range("abc", 100000).is_err());
    assert!(job_range("", 100000).is_err());
    assert!(job_range("5", 0).is_err());
}

#[test]
fn test_job_range_is_pure_and_exact() {
    for size in [1u64, 7, 10000, 100000] {
        for id in [0u64, 1, 6, 7, 9999, 10000, 123456, 99999999] {
            let s = id.to_string();
            let a = job_range(&s, size).unwrap();
            let b = job_range(&s, size).unwrap();
            assert!(a == b);
            assert!(a.high - a.low + 1 == size);
            assert!(a.low <= id && id <= a.high);
        }
    }
}

#[test]
fn test_group_by_range() {
    let ids = ["100001", "5", "100002[1]", "bogus", "100003"];
    let groups = group_by_range(ids.iter().copied(), 100000).unwrap();
    assert!(groups.len() == 2);
    let ranges = groups.keys().copied().collect::<Vec<JobRange>>();
    assert!(ranges[0].label() == "0_99999");
    assert!(groups[&ranges[0]] == vec!["5".to_string()]);
    assert!(
        groups[&ranges[1]]
            == vec![
                "100001".to_string(),
                "100002[1]".to_string(),
                "100003".to_string()
            ]
    );
    assert!(group_by_range(ids.iter().copied(), 0).is_err());
}
