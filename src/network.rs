//! Host and network adapter information shown alongside a measurement.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use sysinfo::{Networks, System};
use tracing::{debug, info, warn};

use crate::history::TIMESTAMP_FORMAT;

/// One network adapter as reported by the OS.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkAdapterSnapshot {
    pub name: String,
    pub ipv4: Option<Ipv4Addr>,
    pub netmask: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub mac: Option<String>,
    /// Whether the OS reports traffic counters for the adapter. Zero
    /// counters still count as active.
    pub active: bool,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl NetworkAdapterSnapshot {
    /// Adapters are only listed when they have both an IPv4 and a hardware address.
    pub fn is_addressable(&self) -> bool {
        self.ipv4.is_some() && self.mac.is_some()
    }
}

/// Source of adapter snapshots.
pub trait AdapterSource {
    fn adapters(&self) -> Result<Vec<NetworkAdapterSnapshot>>;
}

/// Adapter enumeration backed by `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoAdapters;

impl AdapterSource for SysinfoAdapters {
    fn adapters(&self) -> Result<Vec<NetworkAdapterSnapshot>> {
        let networks = Networks::new_with_refreshed_list();
        let mut adapters = Vec::new();

        for (name, data) in &networks {
            let mac = data.mac_address();
            // Every interface sysinfo lists comes with I/O counters.
            let mut snapshot = NetworkAdapterSnapshot {
                name: name.clone(),
                mac: (!mac.is_unspecified()).then(|| mac.to_string()),
                active: true,
                bytes_sent: data.total_transmitted(),
                bytes_received: data.total_received(),
                ..Default::default()
            };

            for network in data.ip_networks() {
                match network.addr {
                    IpAddr::V4(v4) if snapshot.ipv4.is_none() => {
                        snapshot.ipv4 = Some(v4);
                        snapshot.netmask = Some(prefix_to_netmask(network.prefix));
                    }
                    IpAddr::V6(v6) if snapshot.ipv6.is_none() => snapshot.ipv6 = Some(v6),
                    _ => {}
                }
            }
            adapters.push(snapshot);
        }

        adapters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(adapters)
    }
}

/// Host summary with its addressable adapters.
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub computer_name: String,
    pub system: String,
    pub time: String,
    pub adapters: Vec<NetworkAdapterSnapshot>,
    /// Set when adapter enumeration failed; `adapters` is then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Collect host information. Never fails: enumeration errors are reported
/// in [`HostInfo::error`].
pub fn host_info(source: &dyn AdapterSource) -> HostInfo {
    let computer_name = System::host_name().unwrap_or_else(|| "unknown".to_string());
    let system = format!(
        "{} {}",
        System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        System::os_version().unwrap_or_default()
    )
    .trim()
    .to_string();
    info!(%computer_name, "collecting network information");

    let (adapters, error) = match source.adapters() {
        Ok(all) => {
            let listed: Vec<_> = all.into_iter().filter(|a| a.is_addressable()).collect();
            for adapter in &listed {
                debug!(adapter = %adapter.name, ip = ?adapter.ipv4, "found adapter");
            }
            if listed.is_empty() {
                warn!("no network adapters with both IP and MAC addresses found");
            }
            (listed, None)
        }
        Err(e) => {
            warn!(error = ?e, "could not enumerate network adapters");
            (Vec::new(), Some(format!("{e:#}")))
        }
    };

    HostInfo {
        computer_name,
        system,
        time: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        adapters,
        error,
    }
}

/// The adapter carrying the most received traffic among active,
/// addressable adapters. Ties go to the first one listed.
pub fn select_active(adapters: &[NetworkAdapterSnapshot]) -> Option<&NetworkAdapterSnapshot> {
    adapters
        .iter()
        .filter(|a| a.active && a.is_addressable())
        .rev()
        .max_by_key(|a| a.bytes_received)
}

fn prefix_to_netmask(prefix: u8) -> Ipv4Addr {
    let prefix = u32::from(prefix.min(32));
    if prefix == 0 {
        return Ipv4Addr::UNSPECIFIED;
    }
    Ipv4Addr::from(u32::MAX << (32 - prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, ip: Option<&str>, mac: Option<&str>, rx: u64) -> NetworkAdapterSnapshot {
        NetworkAdapterSnapshot {
            name: name.to_string(),
            ipv4: ip.map(|s| s.parse().unwrap()),
            mac: mac.map(str::to_string),
            active: true,
            bytes_received: rx,
            ..Default::default()
        }
    }

    struct FixedAdapters(Vec<NetworkAdapterSnapshot>);

    impl AdapterSource for FixedAdapters {
        fn adapters(&self) -> Result<Vec<NetworkAdapterSnapshot>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenAdapters;

    impl AdapterSource for BrokenAdapters {
        fn adapters(&self) -> Result<Vec<NetworkAdapterSnapshot>> {
            anyhow::bail!("Test exception")
        }
    }

    #[test]
    fn test_select_active_prefers_most_received() {
        let adapters = vec![
            adapter("en0", Some("192.168.1.10"), Some("00:11:22:33:44:55"), 5000),
            adapter("en1", Some("192.168.2.10"), Some("AA:BB:CC:DD:EE:FF"), 2000),
        ];
        let active = select_active(&adapters).unwrap();
        assert_eq!(active.name, "en0");
        assert_eq!(active.bytes_received, 5000);
    }

    #[test]
    fn test_select_active_skips_unaddressable_and_inactive() {
        let mut idle = adapter("en2", Some("10.0.0.2"), Some("AA:AA:AA:AA:AA:AA"), 9000);
        idle.active = false;
        let adapters = vec![
            adapter("utun0", Some("10.8.0.1"), None, 100_000),
            idle,
            adapter("en0", Some("192.168.1.10"), Some("00:11:22:33:44:55"), 10),
        ];
        assert_eq!(select_active(&adapters).unwrap().name, "en0");
        assert!(select_active(&[]).is_none());
    }

    #[test]
    fn test_select_active_tie_goes_to_first() {
        let adapters = vec![
            adapter("a", Some("10.0.0.1"), Some("01:01:01:01:01:01"), 7),
            adapter("b", Some("10.0.0.2"), Some("02:02:02:02:02:02"), 7),
        ];
        assert_eq!(select_active(&adapters).unwrap().name, "a");
    }

    #[test]
    fn test_host_info_filters_adapters() {
        let source = FixedAdapters(vec![
            adapter("en0", Some("192.168.1.10"), Some("00:11:22:33:44:55"), 1),
            adapter("awdl0", None, Some("66:77:88:99:AA:BB"), 1),
        ]);
        let info = host_info(&source);
        assert_eq!(info.adapters.len(), 1);
        assert_eq!(info.adapters[0].name, "en0");
        assert!(info.error.is_none());
        assert!(!info.computer_name.is_empty());
    }

    #[test]
    fn test_host_info_reports_enumeration_error() {
        let info = host_info(&BrokenAdapters);
        assert!(info.adapters.is_empty());
        assert_eq!(info.error.as_deref(), Some("Test exception"));
    }

    #[test]
    fn test_prefix_to_netmask() {
        assert_eq!(prefix_to_netmask(24), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix_to_netmask(8), Ipv4Addr::new(255, 0, 0, 0));
        assert_eq!(prefix_to_netmask(32), Ipv4Addr::BROADCAST);
        assert_eq!(prefix_to_netmask(0), Ipv4Addr::UNSPECIFIED);
        assert_eq!(prefix_to_netmask(40), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_sysinfo_adapters_are_active_even_when_idle() {
        let adapters = SysinfoAdapters.adapters().unwrap();
        assert!(adapters.iter().all(|a| a.active));
    }

    #[test]
    fn test_idle_adapter_can_be_active_one() {
        let adapters = vec![adapter("en0", Some("192.168.1.10"), Some("00:11:22:33:44:55"), 0)];
        assert_eq!(select_active(&adapters).unwrap().name, "en0");
    }
}
