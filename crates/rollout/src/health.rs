//! Pre-flight health probing
//!
//! Each probe is a `df -P /` through the execution channel. The channel
//! bounds every attempt by the probe timeout, and a host gets at most two
//! attempts (primary, then secondary address), so a fleet-wide scan never
//! hangs on a dead host.

use crate::context::{AddressBook, RemoteChannel};
use crate::types::{HostId, HostRecord};
use anyhow::Result;
use rayon::prelude::*;
use std::time::Duration;

/// Default probe timeout per attempt
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Shortest timeout a probe may use
pub const MIN_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of probing one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub reachable: bool,
    pub disk_pressure: Option<u8>,
    /// Address that answered
    pub address: Option<String>,
}

impl ProbeResult {
    fn unreachable() -> Self {
        Self {
            reachable: false,
            disk_pressure: None,
            address: None,
        }
    }
}

/// Result of probing a host set
#[derive(Debug, Clone, Default)]
pub struct Preflight {
    /// Hosts that answered, in inventory order
    pub reachable: Vec<HostRecord>,
    /// Hosts excluded from the run
    pub unreachable: Vec<HostRecord>,
}

impl Preflight {
    /// Reachable hosts at or above the disk pressure threshold
    pub fn disk_warnings(&self, threshold: u8) -> Vec<&HostRecord> {
        self.reachable
            .iter()
            .filter(|r| r.disk_pressure.is_some_and(|p| p >= threshold))
            .collect()
    }
}

/// Probes hosts through a remote channel
pub struct HealthProber<'a> {
    channel: &'a dyn RemoteChannel,
    book: &'a dyn AddressBook,
    timeout: Duration,
}

impl<'a> HealthProber<'a> {
    pub fn new(channel: &'a dyn RemoteChannel, book: &'a dyn AddressBook) -> Self {
        Self {
            channel,
            book,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Set the per-attempt timeout (never below [`MIN_PROBE_TIMEOUT`])
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(MIN_PROBE_TIMEOUT);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe a single host
    pub fn probe(&self, host: &HostId) -> ProbeResult {
        let addresses = self.book.addresses(host);

        if addresses.local {
            let disk = self
                .attempt(&addresses.primary)
                .ok()
                .and_then(|(_, disk)| disk);
            return ProbeResult {
                reachable: true,
                disk_pressure: disk,
                address: Some(addresses.primary),
            };
        }

        let mut candidates = vec![addresses.primary];
        candidates.extend(addresses.secondary);

        for address in candidates {
            match self.attempt(&address) {
                Ok((_, disk)) => {
                    log::debug!("{host} answered on {address}");
                    return ProbeResult {
                        reachable: true,
                        disk_pressure: disk,
                        address: Some(address),
                    };
                }
                Err(e) => log::debug!("{host} did not answer on {address}: {e:#}"),
            }
        }

        ProbeResult::unreachable()
    }

    fn attempt(&self, address: &str) -> Result<(i32, Option<u8>)> {
        let output = self
            .channel
            .execute(address, &["df", "-P", "/"], self.timeout)?;
        let disk = if output.success() {
            parse_df_capacity(&output.stdout_str())
        } else {
            None
        };
        Ok((output.exit_code, disk))
    }

    /// Probe hosts concurrently, keeping inventory order
    pub fn preflight(&self, hosts: &[HostId], jobs: usize) -> Result<Preflight> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create probe thread pool: {}", e))?;

        let records: Vec<HostRecord> = pool.install(|| {
            hosts
                .par_iter()
                .map(|host| {
                    let result = self.probe(host);
                    HostRecord {
                        id: host.clone(),
                        reachable: result.reachable,
                        disk_pressure: result.disk_pressure,
                        category: self.book.category(host),
                        address: result.address,
                    }
                })
                .collect()
        });

        let (reachable, unreachable): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| r.reachable);

        if !unreachable.is_empty() {
            log::warn!(
                "Excluding {} unreachable host(s): {}",
                unreachable.len(),
                unreachable
                    .iter()
                    .map(|r| r.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Ok(Preflight {
            reachable,
            unreachable,
        })
    }
}

/// Parse the `Capacity` column of `df -P` output
pub fn parse_df_capacity(output: &str) -> Option<u8> {
    let line = output.lines().skip(1).find(|l| !l.trim().is_empty())?;
    let field = line.split_whitespace().nth(4)?;
    field.trim_end_matches('%').parse::<u8>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeBook, FakeChannel};
    use crate::types::HostCategory;

    const DF_OUTPUT: &str = "Filesystem     1024-blocks     Used Available Capacity Mounted on\n\
                             /dev/nvme0n1p2   479151816 45123456 409633296      10% /\n";

    #[test]
    fn test_parse_df_capacity() {
        assert_eq!(parse_df_capacity(DF_OUTPUT), Some(10));
        assert_eq!(parse_df_capacity(""), None);
        assert_eq!(parse_df_capacity("header only\n"), None);
        assert_eq!(parse_df_capacity("h\n/dev/sda1 1 2 3 full /\n"), None);
    }

    #[test]
    fn test_probe_primary() {
        let channel = FakeChannel::new().answer("web1", DF_OUTPUT);
        let book = FakeBook::default();
        let prober = HealthProber::new(&channel, &book);

        let result = prober.probe(&"web1".into());
        assert!(result.reachable);
        assert_eq!(result.disk_pressure, Some(10));
        assert_eq!(result.address.as_deref(), Some("web1"));
    }

    #[test]
    fn test_probe_falls_back_to_secondary() {
        let channel = FakeChannel::new().answer("web1.local", DF_OUTPUT);
        let book = FakeBook::default().with_secondary("web1", "web1.local");
        let prober = HealthProber::new(&channel, &book);

        let result = prober.probe(&"web1".into());
        assert!(result.reachable);
        assert_eq!(result.address.as_deref(), Some("web1.local"));
        assert_eq!(channel.attempts(), vec!["web1", "web1.local"]);
    }

    #[test]
    fn test_probe_unreachable_after_two_attempts() {
        let channel = FakeChannel::new();
        let book = FakeBook::default().with_secondary("web1", "web1.local");
        let prober = HealthProber::new(&channel, &book);

        let result = prober.probe(&"web1".into());
        assert!(!result.reachable);
        assert!(result.address.is_none());
        assert_eq!(channel.attempts().len(), 2);
    }

    #[test]
    fn test_probe_unknown_disk_when_df_fails() {
        let channel = FakeChannel::new().answer_with_code("web1", "", 1);
        let book = FakeBook::default();
        let prober = HealthProber::new(&channel, &book);

        let result = prober.probe(&"web1".into());
        assert!(result.reachable);
        assert_eq!(result.disk_pressure, None);
    }

    #[test]
    fn test_local_host_is_reachable_without_answer() {
        let channel = FakeChannel::new();
        let book = FakeBook::default().with_local("laptop");
        let prober = HealthProber::new(&channel, &book);

        let result = prober.probe(&"laptop".into());
        assert!(result.reachable);
    }

    #[test]
    fn test_timeout_is_clamped() {
        let channel = FakeChannel::new();
        let book = FakeBook::default();
        let prober = HealthProber::new(&channel, &book).with_timeout(Duration::from_millis(50));
        assert_eq!(prober.timeout(), MIN_PROBE_TIMEOUT);
    }

    #[test]
    fn test_preflight_partitions_and_keeps_order() {
        let channel = FakeChannel::new()
            .answer("c", DF_OUTPUT)
            .answer("a", "h\n/dev/sda 1 1 1 95% /\n");
        let book = FakeBook::default();
        let prober = HealthProber::new(&channel, &book);

        let hosts: Vec<HostId> = vec!["c".into(), "b".into(), "a".into()];
        let preflight = prober.preflight(&hosts, 4).unwrap();

        let reachable: Vec<&str> = preflight.reachable.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(reachable, vec!["c", "a"]);
        assert_eq!(preflight.unreachable.len(), 1);
        assert_eq!(preflight.unreachable[0].id.as_str(), "b");

        let warnings = preflight.disk_warnings(90);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].id.as_str(), "a");
    }

    #[test]
    fn test_preflight_uses_book_category() {
        let channel = FakeChannel::new().answer("gandalf", DF_OUTPUT);
        let book = FakeBook::default().with_category("gandalf", HostCategory::Server);
        let prober = HealthProber::new(&channel, &book);

        let preflight = prober.preflight(&["gandalf".into()], 1).unwrap();
        assert_eq!(preflight.reachable[0].category, HostCategory::Server);
    }
}
