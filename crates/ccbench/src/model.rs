//! Shared types: IP versions and the per-run metric record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Address family a benchmark run is carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    #[serde(rename = "IPv4")]
    V4,
    #[serde(rename = "IPv6")]
    V6,
}

impl IpVersion {
    pub const ALL: [IpVersion; 2] = [IpVersion::V4, IpVersion::V6];

    /// Display label, as stored in the `IP Version` column.
    pub fn label(self) -> &'static str {
        match self {
            IpVersion::V4 => "IPv4",
            IpVersion::V6 => "IPv6",
        }
    }

    /// Lowercase form used in dataset file names.
    pub fn slug(self) -> &'static str {
        match self {
            IpVersion::V4 => "ipv4",
            IpVersion::V6 => "ipv6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for IpVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipv4" | "v4" | "4" => Ok(IpVersion::V4),
            "ipv6" | "v6" | "6" => Ok(IpVersion::V6),
            other => Err(format!("unknown IP version '{other}'")),
        }
    }
}

/// One benchmark run: a (variant, IP version, repetition) tuple.
///
/// Field order and column names match the dataset CSV layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "TCP Version")]
    pub tcp_variant: String,
    #[serde(rename = "IP Version")]
    pub ip_version: IpVersion,
    #[serde(rename = "Throughput (Gbps)")]
    pub throughput_gbps: f64,
    #[serde(rename = "Packet Loss (%)")]
    pub packet_loss_percent: f64,
    #[serde(rename = "Total Recovery Time (s)")]
    pub recovery_time_s: f64,
    #[serde(rename = "Mean RTT (ms)")]
    pub mean_rtt_ms: f64,
    #[serde(rename = "RTT Variance (ms)")]
    pub rtt_variance_ms: f64,
    #[serde(rename = "Maximum RTT (ms)")]
    pub max_rtt_ms: f64,
    #[serde(rename = "Retransmissions")]
    pub retransmissions: u64,
    #[serde(rename = "Total Packets Sent")]
    pub total_packets_sent: f64,
    #[serde(rename = "Bandwidth Efficiency (%)")]
    pub bandwidth_efficiency_percent: f64,
    #[serde(rename = "Max cwnd (bytes)")]
    pub max_cwnd_bytes: u64,
    #[serde(rename = "CPU Sender (%)")]
    pub cpu_sender_percent: f64,
    #[serde(rename = "CPU Receiver (%)")]
    pub cpu_receiver_percent: f64,
    #[serde(rename = "CPU Usage Local (%)")]
    pub cpu_local_percent: f64,
}

impl MetricRecord {
    /// CSV header row, in field order.
    pub const HEADERS: [&'static str; 16] = [
        "ID",
        "TCP Version",
        "IP Version",
        "Throughput (Gbps)",
        "Packet Loss (%)",
        "Total Recovery Time (s)",
        "Mean RTT (ms)",
        "RTT Variance (ms)",
        "Maximum RTT (ms)",
        "Retransmissions",
        "Total Packets Sent",
        "Bandwidth Efficiency (%)",
        "Max cwnd (bytes)",
        "CPU Sender (%)",
        "CPU Receiver (%)",
        "CPU Usage Local (%)",
    ];
}
