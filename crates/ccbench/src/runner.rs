//! Sequential benchmark driver.
//!
//! For each variant, IP version and repetition: build a fresh testbed,
//! run one iperf3 transfer, record its metrics, and tear everything down.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::process::Child;
use std::thread;

use anyhow::Context;
use ccbench_sim::topology::{host_sysctl, privileged, set_host_sysctl, Namespace};

use crate::config::BenchConfig;
use crate::cpu::CpuSampler;
use crate::dataset;
use crate::metrics::{extract_record, RunContext};
use crate::model::{IpVersion, MetricRecord};
use crate::params::BenchParams;
use crate::report::{parse_report, ReportError};
use crate::topology::{LinkShape, Testbed};

/// Counts of a finished campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub recorded: usize,
    pub dropped: usize,
}

/// iperf3 server process, killed when dropped.
struct ServerGuard(Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

pub fn server_args(ip_version: IpVersion, port: u16) -> Vec<String> {
    let mut args = vec!["-s".to_string()];
    if ip_version == IpVersion::V6 {
        args.push("-6".into());
    }
    args.extend(["-p".into(), port.to_string()]);
    args
}

pub fn client_args(ip_version: IpVersion, port: u16, duration_secs: u64) -> Vec<String> {
    let mut args = vec![
        "-c".to_string(),
        Testbed::server_address(ip_version).to_string(),
    ];
    if ip_version == IpVersion::V6 {
        args.push("-6".into());
    }
    args.extend([
        "-p".into(),
        port.to_string(),
        "-t".into(),
        duration_secs.to_string(),
        "-J".into(),
    ]);
    args
}

fn as_strs(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}

/// Loads `tcp_<variant>` if the kernel builds it as a module.
fn load_variant_module(variant: &str) {
    let module = format!("tcp_{variant}");
    match privileged("modprobe").arg(&module).output() {
        Ok(out) if out.status.success() => tracing::debug!(%module, "kernel module loaded"),
        Ok(out) => tracing::debug!(
            %module,
            stderr = %String::from_utf8_lossy(&out.stderr).trim(),
            "modprobe failed, assuming built-in"
        ),
        Err(e) => tracing::debug!(%module, "modprobe unavailable: {e}"),
    }
}

const ALLOWED_CONGESTION: &str = "net.ipv4.tcp_allowed_congestion_control";

/// `allowed` with `variant` appended unless already listed.
fn with_allowed(allowed: &str, variant: &str) -> String {
    if allowed.split_whitespace().any(|v| v == variant) {
        return allowed.to_string();
    }
    let mut list: Vec<&str> = allowed.split_whitespace().collect();
    list.push(variant);
    list.join(" ")
}

/// Widens the host's allowed congestion control list for the duration of a
/// campaign and restores it on drop.
///
/// Non-initial namespaces may only select algorithms on that list, even
/// when the algorithm itself is loaded.
struct AllowedCongestion {
    original: String,
}

impl AllowedCongestion {
    fn widen(variants: &[String]) -> io::Result<Self> {
        let original = host_sysctl(ALLOWED_CONGESTION)?;
        let guard = Self {
            original: original.clone(),
        };
        let mut allowed = original;
        for variant in variants {
            let next = with_allowed(&allowed, variant);
            if next == allowed {
                continue;
            }
            match set_host_sysctl(ALLOWED_CONGESTION, &next) {
                Ok(()) => allowed = next,
                Err(e) => tracing::warn!(%variant, "cannot allow congestion control: {e}"),
            }
        }
        tracing::debug!(%allowed, "allowed congestion control");
        Ok(guard)
    }
}

impl Drop for AllowedCongestion {
    fn drop(&mut self) {
        let current = host_sysctl(ALLOWED_CONGESTION).unwrap_or_default();
        if current == self.original {
            return;
        }
        if let Err(e) = set_host_sysctl(ALLOWED_CONGESTION, &self.original) {
            tracing::warn!("restoring allowed congestion control failed: {e}");
        }
    }
}

fn configure_variant(ns: &Namespace, variant: &str) -> anyhow::Result<()> {
    ns.sysctl("net.ipv4.tcp_congestion_control", variant)
        .with_context(|| format!("selecting congestion control '{variant}' in {}", ns.name))
}

/// Logs the raw client output, extracts its record and appends it to the
/// dataset.
///
/// A report lacking a required field is noted in the log and dropped; the
/// dataset file is still created with its header. Output that is not JSON
/// at all is an error.
pub fn record_result<W: Write>(
    raw: &str,
    ctx: &RunContext<'_>,
    log: &mut W,
    dataset_path: &Path,
) -> anyhow::Result<Option<MetricRecord>> {
    writeln!(log, "{raw}")?;

    let record = match parse_report(raw).and_then(|report| extract_record(&report, ctx)) {
        Ok(record) => {
            tracing::info!(
                throughput_gbps = record.throughput_gbps,
                retransmissions = record.retransmissions,
                mean_rtt_ms = record.mean_rtt_ms,
                "test complete"
            );
            Some(record)
        }
        Err(ReportError::MissingField { field, tool_error }) => {
            writeln!(log, "Error: Missing key {field} in iperf result.")?;
            tracing::warn!(
                %field,
                tool_error = tool_error.as_deref().unwrap_or("-"),
                variant = ctx.tcp_variant,
                ip_version = %ctx.ip_version,
                test = ctx.id,
                "iperf3 result incomplete, record dropped"
            );
            None
        }
        Err(e) => return Err(e).context("parsing iperf3 output"),
    };

    dataset::append_records(dataset_path, record.as_slice())?;
    tracing::info!(path = %dataset_path.display(), "metrics saved");
    Ok(record)
}

/// Raw client output and the CPU load sampled around it.
struct Measurement {
    raw: String,
    local_cpu_percent: f64,
}

pub struct Runner<'a> {
    config: &'a BenchConfig,
    params: BenchParams,
    cpu: CpuSampler,
    log: File,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a BenchConfig, params: BenchParams) -> anyhow::Result<Self> {
        let log_path = &config.paths.output_log;
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("opening run log {}", log_path.display()))?;

        Ok(Self {
            config,
            params,
            cpu: CpuSampler::new(),
            log,
        })
    }

    /// Runs the whole variant × IP version × repetition grid.
    pub fn run_grid(&mut self) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        let config = self.config;

        for variant in &config.variants {
            load_variant_module(variant);
        }
        let _allowed = AllowedCongestion::widen(&config.variants)
            .context("reading allowed congestion control")?;

        for variant in &config.variants {
            for &ip_version in &config.ip_versions {
                for id in 1..=self.params.repetitions {
                    tracing::info!(test = id, %variant, %ip_version, "starting test");
                    match self.run_once(variant, ip_version, id)? {
                        Some(_) => summary.recorded += 1,
                        None => summary.dropped += 1,
                    }
                }
            }
        }

        tracing::info!(
            recorded = summary.recorded,
            dropped = summary.dropped,
            "all tests finished"
        );
        Ok(summary)
    }

    /// One iteration on a fresh testbed. Returns `None` when the report
    /// lacked a field and the record was dropped.
    pub fn run_once(
        &mut self,
        variant: &str,
        ip_version: IpVersion,
        id: u32,
    ) -> anyhow::Result<Option<MetricRecord>> {
        let shape = LinkShape::from(&self.params);
        let testbed = Testbed::build(&self.config.namespace_prefix, &shape)
            .context("building network topology")?;

        let measurement = self.measure(&testbed, variant, ip_version);
        tracing::info!("stopping network");
        drop(testbed);
        let measurement = measurement?;

        let ctx = RunContext {
            id,
            tcp_variant: variant,
            ip_version,
            max_bandwidth_bps: self.params.max_bandwidth_bps(),
            local_cpu_percent: measurement.local_cpu_percent,
        };
        let path = dataset::dataset_path(&self.config.paths.dataset_dir, ip_version, variant);
        record_result(&measurement.raw, &ctx, &mut self.log, &path)
    }

    fn measure(
        &mut self,
        testbed: &Testbed,
        variant: &str,
        ip_version: IpVersion,
    ) -> anyhow::Result<Measurement> {
        configure_variant(&testbed.h1, variant)?;
        configure_variant(&testbed.h2, variant)?;

        let iperf = &self.config.iperf;
        let port = iperf.port(ip_version);

        let server = testbed
            .h2
            .spawn("iperf3", &as_strs(&server_args(ip_version, port)))
            .context("starting iperf3 server")?;
        let _server = ServerGuard(server);
        thread::sleep(iperf.server_startup);

        writeln!(
            self.log,
            "Running iperf test for {variant} with {ip_version}..."
        )?;

        let cpu_before = self.cpu.sample(iperf.cpu_sample);
        let output = testbed
            .h1
            .exec(
                "iperf3",
                &as_strs(&client_args(ip_version, port, iperf.duration.as_secs())),
            )
            .context("running iperf3 client")?;
        let cpu_after = self.cpu.sample(iperf.cpu_sample);

        Ok(Measurement {
            raw: String::from_utf8_lossy(&output.stdout).into_owned(),
            local_cpu_percent: (f64::from(cpu_before) + f64::from(cpu_after)) / 2.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::SAMPLE;
    use ccbench_sim::test_util::{check_privileges, unique_prefix};

    fn ctx(variant: &str) -> RunContext<'_> {
        RunContext {
            id: 1,
            tcp_variant: variant,
            ip_version: IpVersion::V4,
            max_bandwidth_bps: 1e9,
            local_cpu_percent: 12.5,
        }
    }

    #[test]
    fn allowed_list_is_extended_once() {
        assert_eq!(with_allowed("reno cubic", "bbr"), "reno cubic bbr");
        assert_eq!(with_allowed("reno cubic", "cubic"), "reno cubic");
        assert_eq!(with_allowed("", "vegas"), "vegas");
    }

    #[test]
    fn complete_report_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset_ipv4_reno.csv");
        let mut log = Vec::new();

        let record = record_result(SAMPLE, &ctx("reno"), &mut log, &path)
            .unwrap()
            .expect("record kept");
        assert_eq!(record.tcp_variant, "reno");

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(String::from_utf8(log).unwrap().contains("tcp_mss_default"));
    }

    #[test]
    fn missing_field_drops_record_and_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset_ipv4_bbr.csv");
        let mut log = Vec::new();
        let raw = r#"{
            "start": { "tcp_mss_default": 1448 },
            "intervals": [],
            "end": {},
            "error": "unable to connect to server: Connection refused"
        }"#;

        let record = record_result(raw, &ctx("bbr"), &mut log, &path).unwrap();
        assert!(record.is_none());

        let log = String::from_utf8(log).unwrap();
        assert!(log.contains("Connection refused"), "{log}");
        assert!(log.contains("Error: Missing key "), "{log}");
        assert!(log.trim_end().ends_with("in iperf result."), "{log}");

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec![MetricRecord::HEADERS.join(",")]);
    }

    #[test]
    fn non_json_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset_ipv4_cubic.csv");
        let mut log = Vec::new();

        let err = record_result("iperf3: error", &ctx("cubic"), &mut log, &path).unwrap_err();
        assert!(err.to_string().contains("parsing iperf3 output"));
        assert!(!path.exists());
        assert_eq!(String::from_utf8(log).unwrap(), "iperf3: error\n");
    }

    #[test]
    fn selects_allowed_non_default_variant() {
        if !check_privileges() {
            eprintln!("Skipping test, insufficient privileges or missing tools");
            return;
        }

        let ns = Namespace::new(&unique_prefix("cbv")).expect("Failed to create ns");
        let current = ns
            .exec_checked("sysctl", &["-n", "net.ipv4.tcp_congestion_control"])
            .expect("Failed to read congestion control");
        let current = String::from_utf8_lossy(&current.stdout).trim().to_string();
        let available = host_sysctl("net.ipv4.tcp_available_congestion_control")
            .expect("Failed to read available congestion control");
        let Some(variant) = available
            .split_whitespace()
            .find(|v| *v != current)
            .map(str::to_string)
        else {
            eprintln!("Skipping test, only '{current}' is available");
            return;
        };

        let original = host_sysctl(ALLOWED_CONGESTION).unwrap();
        {
            let _allowed = AllowedCongestion::widen(std::slice::from_ref(&variant)).unwrap();
            configure_variant(&ns, &variant).expect("Failed to select variant");
            let selected = ns
                .exec_checked("sysctl", &["-n", "net.ipv4.tcp_congestion_control"])
                .unwrap();
            assert_eq!(String::from_utf8_lossy(&selected.stdout).trim(), variant);
        }
        assert_eq!(host_sysctl(ALLOWED_CONGESTION).unwrap(), original);
    }

    #[test]
    fn server_args_per_family() {
        assert_eq!(server_args(IpVersion::V4, 5201), vec!["-s", "-p", "5201"]);
        assert_eq!(
            server_args(IpVersion::V6, 5202),
            vec!["-s", "-6", "-p", "5202"]
        );
    }

    #[test]
    fn client_args_target_h2() {
        assert_eq!(
            client_args(IpVersion::V4, 5201, 3).join(" "),
            "-c 10.0.2.2 -p 5201 -t 3 -J"
        );
        assert_eq!(
            client_args(IpVersion::V6, 5202, 3).join(" "),
            "-c 2001:db8:0:2::2 -6 -p 5202 -t 3 -J"
        );
    }

    #[test]
    fn runner_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BenchConfig::default();
        config.paths.output_log = dir.path().join("output/full_output.log");
        let params = BenchParams {
            bandwidth_gbps: 1.0,
            loss_percent: 0.0,
            delay_ms: 0.0,
            repetitions: 1,
        };
        let _runner = Runner::new(&config, params).unwrap();
        assert!(config.paths.output_log.exists());
    }
}
