//! In-memory collaborators for engine tests

use crate::context::{
    AddressBook, BuildBackend, ConfirmCallback, DeployBackend, DeployObserver, RemoteChannel,
    RollbackBackend,
};
use crate::types::{
    CommandOutput, DeployAction, DeploymentStatus, HostAddresses, HostCategory, HostId, HostRecord,
};
use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Unprobed record addressed by its own name
pub fn record(name: &str) -> HostRecord {
    HostRecord::unprobed(HostId::from(name), HostCategory::Other, name)
}

/// Address book where the primary address is the host id
#[derive(Default)]
pub struct FakeBook {
    secondary: HashMap<String, String>,
    local: HashSet<String>,
    categories: HashMap<String, HostCategory>,
}

impl FakeBook {
    pub fn with_secondary(mut self, host: &str, address: &str) -> Self {
        self.secondary.insert(host.into(), address.into());
        self
    }

    pub fn with_local(mut self, host: &str) -> Self {
        self.local.insert(host.into());
        self
    }

    pub fn with_category(mut self, host: &str, category: HostCategory) -> Self {
        self.categories.insert(host.into(), category);
        self
    }
}

impl AddressBook for FakeBook {
    fn addresses(&self, host: &HostId) -> HostAddresses {
        if self.local.contains(host.as_str()) {
            return HostAddresses::local(host.as_str());
        }
        HostAddresses::remote(host.as_str(), self.secondary.get(host.as_str()).cloned())
    }

    fn category(&self, host: &HostId) -> HostCategory {
        self.categories
            .get(host.as_str())
            .copied()
            .unwrap_or_else(|| crate::classify::classify(host.as_str()))
    }
}

/// Channel answering only the addresses it was told about
#[derive(Default)]
pub struct FakeChannel {
    answers: HashMap<String, (String, i32)>,
    attempts: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<Duration>>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, address: &str, stdout: &str) -> Self {
        self.answer_with_code(address, stdout, 0)
    }

    pub fn answer_with_code(mut self, address: &str, stdout: &str, code: i32) -> Self {
        self.answers.insert(address.into(), (stdout.into(), code));
        self
    }

    /// Addresses tried, in order
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    /// Connect timeouts passed with each attempt
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

impl RemoteChannel for FakeChannel {
    fn execute(
        &self,
        address: &str,
        _command: &[&str],
        connect_timeout: Duration,
    ) -> Result<CommandOutput> {
        self.attempts.lock().unwrap().push(address.to_string());
        self.timeouts.lock().unwrap().push(connect_timeout);
        match self.answers.get(address) {
            Some((stdout, code)) => Ok(CommandOutput {
                exit_code: *code,
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
            }),
            None => bail!("connection to {address} timed out"),
        }
    }
}

/// Builder that succeeds unless told otherwise
#[derive(Default)]
pub struct FakeBuilder {
    failing: HashSet<String>,
    erroring: HashSet<String>,
    panicking: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeBuilder {
    pub fn failing(mut self, host: &str) -> Self {
        self.failing.insert(host.into());
        self
    }

    pub fn erroring(mut self, host: &str) -> Self {
        self.erroring.insert(host.into());
        self
    }

    pub fn panicking(mut self, host: &str) -> Self {
        self.panicking.insert(host.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BuildBackend for FakeBuilder {
    fn build(&self, host: &HostId, log: &mut dyn Write) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        writeln!(log, "building {host}")?;
        if self.panicking.contains(host.as_str()) {
            panic!("builder exploded on {host}");
        }
        if self.erroring.contains(host.as_str()) {
            bail!("nix not found");
        }
        Ok(!self.failing.contains(host.as_str()))
    }
}

/// Deployer that records calls and its own concurrency
#[derive(Default)]
pub struct FakeDeployer {
    failing: HashSet<String>,
    erroring: HashSet<String>,
    panicking: HashSet<String>,
    delay: Duration,
    host_delay: HashMap<String, Duration>,
    started: Mutex<Vec<HostId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeDeployer {
    /// Exit with code 1
    pub fn failing(mut self, host: &str) -> Self {
        self.failing.insert(host.into());
        self
    }

    pub fn erroring(mut self, host: &str) -> Self {
        self.erroring.insert(host.into());
        self
    }

    pub fn panicking(mut self, host: &str) -> Self {
        self.panicking.insert(host.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_host_delay(mut self, host: &str, delay: Duration) -> Self {
        self.host_delay.insert(host.into(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    /// Hosts in the order their apply began
    pub fn started(&self) -> Vec<HostId> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_seen_deploying(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl DeployBackend for FakeDeployer {
    fn apply(
        &self,
        host: &HostId,
        address: &str,
        action: DeployAction,
        log: &mut dyn Write,
    ) -> Result<i32> {
        self.started.lock().unwrap().push(host.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        writeln!(log, "{action} {host} on {address}")?;
        let delay = self.host_delay.get(host.as_str()).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(host.as_str()) {
            panic!("deployer exploded on {host}");
        }
        if self.erroring.contains(host.as_str()) {
            bail!("ssh: connect to host {address}: Connection refused");
        }
        Ok(i32::from(self.failing.contains(host.as_str())))
    }
}

/// Rollback backend with per-host failures
#[derive(Default)]
pub struct FakeRollback {
    failing: HashSet<String>,
    calls: Mutex<Vec<HostId>>,
}

impl FakeRollback {
    pub fn failing(mut self, host: &str) -> Self {
        self.failing.insert(host.into());
        self
    }

    pub fn calls(&self) -> Vec<HostId> {
        self.calls.lock().unwrap().clone()
    }
}

impl RollbackBackend for FakeRollback {
    fn rollback(&self, host: &HostId, address: &str, log: &mut dyn Write) -> Result<i32> {
        self.calls.lock().unwrap().push(host.clone());
        writeln!(log, "rollback {host} on {address}")?;
        Ok(if self.failing.contains(host.as_str()) { 2 } else { 0 })
    }
}

/// Observer that keeps wave labels and completion counts
#[derive(Default)]
pub struct RecordingObserver {
    waves: Mutex<Vec<(String, Instant)>>,
    completed: AtomicUsize,
}

impl RecordingObserver {
    pub fn waves(&self) -> Vec<String> {
        self.waves.lock().unwrap().iter().map(|(label, _)| label.clone()).collect()
    }

    /// When each wave started, in order
    pub fn wave_starts(&self) -> Vec<Instant> {
        self.waves.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl DeployObserver for RecordingObserver {
    fn on_wave_start(&self, label: &str, _hosts: &[HostId]) {
        self.waves.lock().unwrap().push((label.to_string(), Instant::now()));
    }

    fn on_host_start(&self, _host: &HostId) {}

    fn on_host_complete(&self, _host: &HostId, _status: DeploymentStatus) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_wave_complete(&self, _label: &str) {}
}

/// Confirmation answering from a script, declining once it runs out
pub struct ScriptedConfirm {
    answers: Vec<bool>,
    prompts: Vec<String>,
}

impl ScriptedConfirm {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers,
            prompts: Vec::new(),
        }
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl ConfirmCallback for ScriptedConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let answer = self.answers.get(self.prompts.len()).copied().unwrap_or(false);
        self.prompts.push(prompt.to_string());
        Ok(answer)
    }
}
