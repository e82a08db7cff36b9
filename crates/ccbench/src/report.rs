//! Typed view of the `iperf3 -J` report.
//!
//! Only the fields the metric extractor reads are modelled. Per-stream RTT
//! and cwnd figures are optional in iperf3 output (they depend on the
//! platform exposing `TCP_INFO`), so those default to zero; everything else
//! is required and its absence surfaces as [`ReportError::MissingField`].

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    /// Output is not JSON at all.
    #[error("malformed iperf3 output: {0}")]
    Malformed(#[source] serde_json::Error),
    /// JSON parsed but an expected field is absent or mistyped.
    #[error("missing field in iperf3 result: {field}")]
    MissingField {
        field: String,
        /// iperf3's own `error` string, when the run reported one.
        tool_error: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct IperfReport {
    pub start: Start,
    pub intervals: Vec<Interval>,
    pub end: End,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Start {
    pub tcp_mss_default: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interval {
    pub streams: Vec<IntervalStream>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntervalStream {
    /// Smoothed RTT in microseconds.
    #[serde(default)]
    pub rtt: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct End {
    pub streams: Vec<EndStream>,
    pub sum_sent: SumSent,
    pub sum_received: SumReceived,
    pub cpu_utilization_percent: CpuUtilization,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndStream {
    pub sender: StreamSender,
}

/// Sender-side stream summary. RTT figures are in microseconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamSender {
    pub mean_rtt: f64,
    pub max_rtt: f64,
    pub max_snd_cwnd: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SumSent {
    pub seconds: f64,
    pub bytes: u64,
    pub retransmits: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SumReceived {
    pub bits_per_second: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuUtilization {
    pub host_total: f64,
    pub remote_total: f64,
}

impl IperfReport {
    /// Sender summary of the first stream.
    pub fn first_sender(&self) -> Result<&StreamSender, ReportError> {
        self.end
            .streams
            .first()
            .map(|s| &s.sender)
            .ok_or_else(|| ReportError::MissingField {
                field: "end.streams[0]".into(),
                tool_error: self.error.clone(),
            })
    }

    /// Every per-interval, per-stream RTT sample, in microseconds.
    pub fn rtt_samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.intervals
            .iter()
            .flat_map(|i| i.streams.iter())
            .filter_map(|s| s.rtt)
    }
}

/// Parses raw `iperf3 -J` output.
pub fn parse_report(raw: &str) -> Result<IperfReport, ReportError> {
    let value: Value = serde_json::from_str(raw).map_err(ReportError::Malformed)?;
    let tool_error = value
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_owned);
    serde_json::from_value(value).map_err(|e| ReportError::MissingField {
        field: e.to_string(),
        tool_error,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Trimmed-down report shaped like real iperf3 3.x output.
    pub(crate) const SAMPLE: &str = r#"{
        "start": { "tcp_mss_default": 1448, "version": "iperf 3.12" },
        "intervals": [
            { "streams": [ { "socket": 5, "rtt": 1000, "snd_cwnd": 64000 } ], "sum": {} },
            { "streams": [ { "socket": 5, "rtt": 3000, "snd_cwnd": 72000 } ], "sum": {} },
            { "streams": [ { "socket": 5, "rtt": 2000, "snd_cwnd": 80000 } ], "sum": {} }
        ],
        "end": {
            "streams": [ { "sender": { "mean_rtt": 2000, "max_rtt": 3000, "min_rtt": 1000, "max_snd_cwnd": 80000 } } ],
            "sum_sent": { "seconds": 3.004, "bytes": 1448000, "retransmits": 10 },
            "sum_received": { "bits_per_second": 3500000000.0 },
            "cpu_utilization_percent": { "host_total": 12.3456, "remote_total": 45.678 }
        }
    }"#;

    #[test]
    fn parses_sample() {
        let report = parse_report(SAMPLE).unwrap();
        assert_eq!(report.start.tcp_mss_default, 1448);
        assert_eq!(report.end.sum_sent.retransmits, 10);
        assert_eq!(report.rtt_samples().collect::<Vec<_>>(), vec![1000.0, 3000.0, 2000.0]);
        assert_eq!(report.first_sender().unwrap().max_snd_cwnd, 80000);
    }

    #[test]
    fn missing_summary_is_missing_field() {
        let raw = r#"{
            "start": { "tcp_mss_default": 1448 },
            "intervals": [],
            "end": {},
            "error": "unable to connect to server: Connection refused"
        }"#;
        match parse_report(raw) {
            Err(ReportError::MissingField { field, tool_error }) => {
                assert!(field.contains("streams") || field.contains("sum_sent"), "{field}");
                assert_eq!(
                    tool_error.as_deref(),
                    Some("unable to connect to server: Connection refused")
                );
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn rtt_fields_are_optional() {
        let raw = SAMPLE
            .replace(r#""mean_rtt": 2000, "max_rtt": 3000, "min_rtt": 1000, "max_snd_cwnd": 80000"#, "")
            .replace(r#""rtt": 1000, "#, "");
        let report = parse_report(&raw).unwrap();
        let sender = report.first_sender().unwrap();
        assert_eq!(sender.mean_rtt, 0.0);
        assert_eq!(sender.max_snd_cwnd, 0);
        assert_eq!(report.rtt_samples().count(), 2);
    }

    #[test]
    fn empty_stream_list_is_missing_field() {
        let raw = SAMPLE.replace(
            r#"[ { "sender": { "mean_rtt": 2000, "max_rtt": 3000, "min_rtt": 1000, "max_snd_cwnd": 80000 } } ]"#,
            "[]",
        );
        let report = parse_report(&raw).unwrap();
        assert!(matches!(
            report.first_sender(),
            Err(ReportError::MissingField { .. })
        ));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            parse_report("iperf3: error - unable to connect"),
            Err(ReportError::Malformed(_))
        ));
    }
}
