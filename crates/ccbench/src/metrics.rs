//! Turns an iperf3 report into a [`MetricRecord`].

use crate::model::{IpVersion, MetricRecord};
use crate::report::{IperfReport, ReportError};

/// Identifies the run a report belongs to, plus the figures that come
/// from outside the report.
#[derive(Debug, Clone)]
pub struct RunContext<'a> {
    pub id: u32,
    pub tcp_variant: &'a str,
    pub ip_version: IpVersion,
    /// Configured bottleneck bandwidth in bits per second.
    pub max_bandwidth_bps: f64,
    pub local_cpu_percent: f64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Retransmissions as a percentage of estimated packets sent.
pub fn packet_loss_percent(retransmissions: u64, packets_sent: f64) -> f64 {
    if packets_sent > 0.0 {
        retransmissions as f64 / packets_sent * 100.0
    } else {
        0.0
    }
}

/// Population variance of the RTT samples, rounded to two decimals.
pub fn rtt_variance(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    round2(variance)
}

/// Achieved throughput as a percentage of the configured bandwidth.
pub fn bandwidth_efficiency(throughput_bps: f64, max_bandwidth_bps: f64) -> f64 {
    if max_bandwidth_bps > 0.0 {
        throughput_bps / max_bandwidth_bps * 100.0
    } else {
        0.0
    }
}

fn usec_to_ms(usec: f64) -> f64 {
    usec / 1000.0
}

/// Extracts one metric row.
///
/// iperf3 reports RTTs in microseconds; the record stores milliseconds.
pub fn extract_record(
    report: &IperfReport,
    ctx: &RunContext<'_>,
) -> Result<MetricRecord, ReportError> {
    let sender = report.first_sender()?;
    let sent = &report.end.sum_sent;

    let throughput_bps = report.end.sum_received.bits_per_second;
    let mss = report.start.tcp_mss_default;
    let total_packets_sent = if mss > 0 {
        round2(sent.bytes as f64 / mss as f64)
    } else {
        0.0
    };

    let rtt_samples_ms: Vec<f64> = report.rtt_samples().map(usec_to_ms).collect();
    let cpu = &report.end.cpu_utilization_percent;

    Ok(MetricRecord {
        id: ctx.id,
        tcp_variant: ctx.tcp_variant.to_string(),
        ip_version: ctx.ip_version,
        throughput_gbps: round2(throughput_bps / 1e9),
        packet_loss_percent: round2(packet_loss_percent(sent.retransmits, total_packets_sent)),
        recovery_time_s: round2(sent.seconds),
        mean_rtt_ms: usec_to_ms(sender.mean_rtt),
        rtt_variance_ms: rtt_variance(&rtt_samples_ms),
        max_rtt_ms: usec_to_ms(sender.max_rtt),
        retransmissions: sent.retransmits,
        total_packets_sent,
        bandwidth_efficiency_percent: round2(bandwidth_efficiency(
            throughput_bps,
            ctx.max_bandwidth_bps,
        )),
        max_cwnd_bytes: sender.max_snd_cwnd,
        cpu_sender_percent: round2(cpu.host_total),
        cpu_receiver_percent: round2(cpu.remote_total),
        cpu_local_percent: round2(ctx.local_cpu_percent),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::parse_report;
    use crate::report::tests::SAMPLE;

    fn ctx() -> RunContext<'static> {
        RunContext {
            id: 2,
            tcp_variant: "cubic",
            ip_version: IpVersion::V6,
            max_bandwidth_bps: 10e9,
            local_cpu_percent: 17.456,
        }
    }

    #[test]
    fn packet_loss_is_zero_without_packets() {
        assert_eq!(packet_loss_percent(0, 0.0), 0.0);
        assert_eq!(packet_loss_percent(42, 0.0), 0.0);
        assert_eq!(round2(packet_loss_percent(5, 1000.0)), 0.5);
    }

    #[test]
    fn rtt_variance_of_single_sample_is_zero() {
        assert_eq!(rtt_variance(&[12.5]), 0.0);
        assert_eq!(rtt_variance(&[]), 0.0);
    }

    #[test]
    fn rtt_variance_is_population_variance() {
        // sample variance would be 2.5
        assert_eq!(rtt_variance(&[1.0, 2.0, 3.0, 4.0, 5.0]), 2.0);
        assert_eq!(rtt_variance(&[1.0, 2.0]), 0.25);
    }

    #[test]
    fn bandwidth_efficiency_against_configured_rate() {
        assert_eq!(bandwidth_efficiency(5e8, 1e9), 50.0);
        assert_eq!(bandwidth_efficiency(5e8, 0.0), 0.0);
    }

    #[test]
    fn extracts_sample_record() {
        let report = parse_report(SAMPLE).unwrap();
        let record = extract_record(&report, &ctx()).unwrap();

        assert_eq!(record.id, 2);
        assert_eq!(record.tcp_variant, "cubic");
        assert_eq!(record.ip_version, IpVersion::V6);
        assert_eq!(record.throughput_gbps, 3.5);
        assert_eq!(record.total_packets_sent, 1000.0);
        assert_eq!(record.packet_loss_percent, 1.0);
        assert_eq!(record.recovery_time_s, 3.0);
        assert_eq!(record.mean_rtt_ms, 2.0);
        assert_eq!(record.max_rtt_ms, 3.0);
        // samples 1, 3, 2 ms
        assert_eq!(record.rtt_variance_ms, 0.67);
        assert_eq!(record.retransmissions, 10);
        assert_eq!(record.bandwidth_efficiency_percent, 35.0);
        assert_eq!(record.max_cwnd_bytes, 80000);
        assert_eq!(record.cpu_sender_percent, 12.35);
        assert_eq!(record.cpu_receiver_percent, 45.68);
        assert_eq!(record.cpu_local_percent, 17.46);
    }

    #[test]
    fn zero_mss_yields_zero_loss() {
        let raw = SAMPLE.replace(r#""tcp_mss_default": 1448"#, r#""tcp_mss_default": 0"#);
        let record = extract_record(&parse_report(&raw).unwrap(), &ctx()).unwrap();
        assert_eq!(record.total_packets_sent, 0.0);
        assert_eq!(record.packet_loss_percent, 0.0);
    }
}
