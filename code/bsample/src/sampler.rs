/// Drive the sampling passes.
///
/// A pass runs every selected kind on its own thread and waits for all of them.  The kinds share
/// nothing but the read-only configuration and command runner, so a kind that fails (its command
/// is broken, its shard is locked) is logged and the others carry on.  In periodic mode the pass
/// is repeated forever with a fixed sleep in between; the process is stopped from outside.
use crate::kinds::{sample_kind, Kind};

use anyhow::{bail, Result};
use log::{error, info};
use lsflog::{probe_detail_parser, DetailParser};
use rustutils::{now, CommandRunner, MonitorConfig};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Once,
    Periodic(Duration),
}

impl Mode {
    /// 0 is one pass, N > 0 is a pass every N seconds, negative is an error.

    pub fn from_interval(seconds: i64) -> Result<Mode> {
        if seconds < 0 {
            bail!("Interval {seconds}: must not be negative");
        }
        if seconds == 0 {
            Ok(Mode::Once)
        } else {
            Ok(Mode::Periodic(Duration::from_secs(seconds as u64)))
        }
    }
}

#[derive(Debug)]
pub struct KindResult {
    pub kind: Kind,
    pub result: Result<usize>,
}

/// The state kept across passes: the job detail parser, chosen by probing the scheduler the first
/// time jobs are sampled.  A failed probe is retried on the next pass.

pub struct Sampler<'a> {
    kinds: &'a [Kind],
    config: &'a MonitorConfig,
    runner: &'a dyn CommandRunner,
    parser: Option<Box<dyn DetailParser>>,
}

impl<'a> Sampler<'a> {
    pub fn new(
        kinds: &'a [Kind],
        config: &'a MonitorConfig,
        runner: &'a dyn CommandRunner,
    ) -> Sampler<'a> {
        Sampler {
            kinds,
            config,
            runner,
            parser: None,
        }
    }

    pub fn pass(&mut self) -> Vec<KindResult> {
        if self.parser.is_none() && self.kinds.contains(&Kind::Job) {
            match probe_detail_parser(self.runner, &self.config.commands) {
                Ok(p) => {
                    info!("Reading job details in the {:?} dialect", p.dialect());
                    self.parser = Some(p);
                }
                Err(e) => error!("job: could not identify the scheduler: {e}"),
            }
        }
        run_pass(self.kinds, self.config, self.runner, self.parser.as_deref())
    }
}

/// One pass over `kinds`, in parallel.  The results are in the order of `kinds`.

pub fn run_pass(
    kinds: &[Kind],
    config: &MonitorConfig,
    runner: &dyn CommandRunner,
    parser: Option<&dyn DetailParser>,
) -> Vec<KindResult> {
    let t = now();
    thread::scope(|s| {
        let workers = kinds
            .iter()
            .map(|&kind| {
                let w = s.spawn(move || sample_kind(kind, config, runner, parser, t));
                (kind, w)
            })
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .map(|(kind, w)| {
                let result = match w.join() {
                    Ok(r) => r,
                    Err(_) => Err(anyhow::anyhow!("Sampler thread for {} panicked", kind.name())),
                };
                KindResult { kind, result }
            })
            .collect::<Vec<KindResult>>()
    })
}

pub fn run(
    mode: Mode,
    kinds: &[Kind],
    config: &MonitorConfig,
    runner: &dyn CommandRunner,
) -> Result<()> {
    if kinds.is_empty() {
        bail!("Nothing to sample");
    }
    let mut sampler = Sampler::new(kinds, config, runner);
    loop {
        for r in sampler.pass() {
            match r.result {
                Ok(n) => info!("{}: {n} sampled", r.kind.name()),
                Err(e) => error!("{}: pass abandoned: {e}", r.kind.name()),
            }
        }
        match mode {
            Mode::Once => return Ok(()),
            Mode::Periodic(interval) => thread::sleep(interval),
        }
    }
}

#[cfg(test)]
use crate::kinds::{shard_path, testing};

#[test]
fn test_mode() {
    assert!(Mode::from_interval(0).unwrap() == Mode::Once);
    assert!(Mode::from_interval(300).unwrap() == Mode::Periodic(Duration::from_secs(300)));
    assert!(Mode::from_interval(-1).is_err());
}

#[test]
fn test_failing_kind_does_not_stop_others() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = testing::config(dir.path());
    let mut runner = testing::FakeRunner::new();
    runner.set("bhosts", 255, "", "LSF is down. Please wait ...\n");

    // Hold the load shard as if another sampler were writing it.
    std::fs::create_dir_all(config.monitor_dir()).unwrap();
    let held = samplestore::ShardLock::try_lock(&shard_path(&config, Kind::Load))
        .unwrap()
        .unwrap();

    let kinds = [Kind::Job, Kind::Queue, Kind::Host, Kind::Load, Kind::User];
    let parser = testing::parser(&runner);
    let results = run_pass(&kinds, &config, &runner, Some(parser.as_ref()));
    assert!(results.len() == 5);
    assert!(results.iter().map(|r| r.kind).collect::<Vec<Kind>>() == kinds.to_vec());
    assert!(results[0].result.is_ok());
    assert!(results[1].result.is_ok());
    assert!(results[2].result.is_err());
    assert!(results[3].result.is_ok());
    assert!(results[4].result.is_ok());

    assert!(shard_path(&config, Kind::Queue).exists());
    assert!(shard_path(&config, Kind::User).exists());
    assert!(!shard_path(&config, Kind::Host).exists());
    assert!(!shard_path(&config, Kind::Load).exists());
    assert!(dir.path().join("monitor/job/0_99999.db").exists());
    drop(held);

    assert!(run(Mode::Once, &kinds, &config, &runner).is_ok());
    assert!(shard_path(&config, Kind::Load).exists());
    assert!(run(Mode::Once, &[], &config, &runner).is_err());
}

#[test]
fn test_scheduler_probed_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = testing::config(dir.path());
    let mut runner = testing::FakeRunner::new();
    runner.set("lsid", 0, "Unknown scheduler\n", "");

    let kinds = [Kind::Job, Kind::Queue];
    {
        let mut sampler = Sampler::new(&kinds, &config, &runner);
        let results = sampler.pass();
        assert!(results[0].result.is_err());
        assert!(results[1].result.is_ok());
    }
    assert!(runner.calls("lsid") == 1);
    assert!(runner.calls("bjobs") == 0);

    runner.set("lsid", 0, testing::LSID, "");
    let mut sampler = Sampler::new(&kinds, &config, &runner);
    for _ in 0..3 {
        assert!(sampler.pass().iter().all(|r| r.result.is_ok()));
    }
    assert!(runner.calls("lsid") == 2);
    assert!(runner.calls("badmin") == 1);
    assert!(runner.calls("bjobs") == 3);

    // No jobs, no probe.
    let mut sampler = Sampler::new(&kinds[1..], &config, &runner);
    sampler.pass();
    assert!(runner.calls("lsid") == 2);
}
