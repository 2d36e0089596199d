//! Network bandwidth sampler.
//!
//! Samples an interface's transmit/receive byte counters twice, one second
//! apart, and reports the rates in megabits per second. The sysfs base path
//! is a parameter so the counter plumbing is testable without real
//! interfaces.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::NetworkBandwidth;

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

const SYSFS_NET_BASE: &str = "/sys/class/net";

/// Picks the wired interface to monitor: the configured default when it is
/// present, otherwise the first `e*`-prefixed interface. None when the host
/// has no such interface.
pub fn pick_interface(base: &Path, default: &str) -> Option<String> {
    let mut candidates: Vec<String> = std::fs::read_dir(base)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with('e'))
        .collect();
    candidates.sort();

    if candidates.iter().any(|name| name == default) {
        Some(default.to_owned())
    } else {
        candidates.into_iter().next()
    }
}

/// Byte-count delta over one sample interval, in megabits per second.
pub fn rate_mbps(before: u64, after: u64) -> f32 {
    after.saturating_sub(before) as f32 * 8.0 / 1_000_000.0
}

#[derive(Debug)]
pub struct BandwidthSampler {
    base: PathBuf,
    iface: String,
}

impl BandwidthSampler {
    pub fn new(iface: &str) -> Self {
        Self::with_base(SYSFS_NET_BASE, iface)
    }

    pub fn with_base(base: impl Into<PathBuf>, iface: &str) -> Self {
        Self { base: base.into(), iface: iface.to_owned() }
    }

    pub fn iface(&self) -> &str {
        &self.iface
    }

    fn read_counter(&self, counter: &str) -> io::Result<u64> {
        let path = self
            .base
            .join(&self.iface)
            .join("statistics")
            .join(format!("{counter}_bytes"));
        let data = std::fs::read_to_string(path)?;
        data.trim()
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "malformed byte counter"))
    }

    /// Current (tx, rx) byte counters.
    pub fn read_counters(&self) -> io::Result<(u64, u64)> {
        Ok((self.read_counter("tx")?, self.read_counter("rx")?))
    }

    /// One two-point bandwidth sample: read, wait the sample interval,
    /// read again.
    pub async fn sample(&self) -> io::Result<NetworkBandwidth> {
        let (tx1, rx1) = self.read_counters()?;
        tokio::time::sleep(SAMPLE_INTERVAL).await;
        let (tx2, rx2) = self.read_counters()?;
        Ok(NetworkBandwidth {
            tx_mbps: rate_mbps(tx1, tx2),
            rx_mbps: rate_mbps(rx1, rx2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_sysfs(test: &str, ifaces: &[(&str, u64, u64)]) -> PathBuf {
        let base = std::env::temp_dir().join(format!("roverbus-netmon-{}-{test}", std::process::id()));
        let _ = std::fs::remove_dir_all(&base);
        for (iface, tx, rx) in ifaces {
            let stats = base.join(iface).join("statistics");
            std::fs::create_dir_all(&stats).unwrap();
            std::fs::write(stats.join("tx_bytes"), format!("{tx}\n")).unwrap();
            std::fs::write(stats.join("rx_bytes"), format!("{rx}\n")).unwrap();
        }
        base
    }

    #[test]
    fn test_rate_math_matches_mbps() {
        // 125_000 bytes in one second is exactly 1 Mbps
        assert_eq!(rate_mbps(0, 125_000), 1.0);
        assert_eq!(rate_mbps(1_000, 1_000), 0.0);
        // Counter reset (e.g. interface bounce) must not go negative
        assert_eq!(rate_mbps(5_000, 1_000), 0.0);
    }

    #[test]
    fn test_read_counters_from_sysfs_layout() {
        let base = scratch_sysfs("read", &[("eth0", 1234, 5678)]);
        let sampler = BandwidthSampler::with_base(&base, "eth0");
        assert_eq!(sampler.read_counters().unwrap(), (1234, 5678));
        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_pick_interface_prefers_default() {
        let base = scratch_sysfs("prefer", &[("eth0", 0, 0), ("enp3s0", 0, 0), ("wlan0", 0, 0)]);
        assert_eq!(pick_interface(&base, "enp3s0"), Some("enp3s0".into()));
        // Unknown default falls back to the first wired interface
        assert_eq!(pick_interface(&base, "eth9"), Some("enp3s0".into()));
        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_pick_interface_ignores_wireless_only_hosts() {
        let base = scratch_sysfs("wireless", &[("wlan0", 0, 0), ("lo", 0, 0)]);
        assert_eq!(pick_interface(&base, "eth0"), None);
        std::fs::remove_dir_all(&base).unwrap();
    }
}
