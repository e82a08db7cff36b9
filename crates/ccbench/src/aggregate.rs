//! Per-group means and confidence intervals over all dataset rows.

use std::collections::BTreeMap;

use crate::model::{IpVersion, MetricRecord};

/// z-score of a two-sided 95% normal interval.
pub const Z_95: f64 = 1.96;

/// Metrics that get charts, in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Throughput,
    MeanRtt,
    PacketLoss,
    Retransmissions,
    CpuLocal,
}

impl Metric {
    pub const CHARTED: [Metric; 5] = [
        Metric::Throughput,
        Metric::MeanRtt,
        Metric::PacketLoss,
        Metric::Retransmissions,
        Metric::CpuLocal,
    ];

    /// Dataset column name, also used as the axis label.
    pub fn column(self) -> &'static str {
        match self {
            Metric::Throughput => "Throughput (Gbps)",
            Metric::MeanRtt => "Mean RTT (ms)",
            Metric::PacketLoss => "Packet Loss (%)",
            Metric::Retransmissions => "Retransmissions",
            Metric::CpuLocal => "CPU Usage Local (%)",
        }
    }

    /// Output folder under the charts directory.
    pub fn folder(self) -> &'static str {
        match self {
            Metric::Throughput => "Throughput",
            Metric::MeanRtt => "RTT",
            Metric::PacketLoss => "Packet_Loss",
            Metric::Retransmissions => "Retransmissions",
            Metric::CpuLocal => "CPU_Usage",
        }
    }

    pub fn value(self, record: &MetricRecord) -> f64 {
        match self {
            Metric::Throughput => record.throughput_gbps,
            Metric::MeanRtt => record.mean_rtt_ms,
            Metric::PacketLoss => record.packet_loss_percent,
            Metric::Retransmissions => record.retransmissions as f64,
            Metric::CpuLocal => record.cpu_local_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupKey {
    pub tcp_variant: String,
    pub ip_version: IpVersion,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: GroupKey,
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub ci: ConfidenceInterval,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// `mean ± 1.96 · s/√n`. Collapses to `(mean, mean)` below two samples.
pub fn confidence_interval(values: &[f64]) -> ConfidenceInterval {
    let m = mean(values);
    if values.len() < 2 {
        return ConfidenceInterval { lower: m, upper: m };
    }
    let half = Z_95 * sample_std_dev(values) / (values.len() as f64).sqrt();
    ConfidenceInterval {
        lower: m - half,
        upper: m + half,
    }
}

/// Groups records by (variant, IP version) and summarises one metric.
/// Output is sorted by variant, then IP version.
pub fn summarize(records: &[MetricRecord], metric: Metric) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for record in records {
        groups
            .entry(GroupKey {
                tcp_variant: record.tcp_variant.clone(),
                ip_version: record.ip_version,
            })
            .or_default()
            .push(metric.value(record));
    }

    groups
        .into_iter()
        .map(|(key, values)| GroupSummary {
            key,
            n: values.len(),
            mean: mean(&values),
            std_dev: sample_std_dev(&values),
            ci: confidence_interval(&values),
        })
        .collect()
}
