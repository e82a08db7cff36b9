use crate::topology::Namespace;
use std::io;

/// Largest frame a veth link carries with the default MTU.
const MTU_BYTES: u64 = 1500;

/// Link shaping parameters applied via `tc netem`.
///
/// All fields are optional; only non-`None` parameters are passed to netem.
/// If all fields are `None`, any existing qdisc is removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImpairmentConfig {
    pub delay_ms: Option<f64>,
    pub loss_percent: Option<f64>,
    pub rate_kbit: Option<u64>,
    /// Override the netem queue `limit` (in packets). When `None` and
    /// `rate_kbit` is set, the limit is derived from the bandwidth-delay
    /// product (~2× BDP) so excess packets are dropped at the bottleneck.
    pub netem_limit: Option<u32>,
}

impl ImpairmentConfig {
    fn is_empty(&self) -> bool {
        self.delay_ms.is_none() && self.loss_percent.is_none() && self.rate_kbit.is_none()
    }

    /// Queue limit in packets, explicit or BDP-derived.
    pub fn queue_limit(&self) -> Option<u32> {
        if let Some(explicit) = self.netem_limit {
            return Some(explicit);
        }
        let rate = self.rate_kbit?;
        // one-way delay doubled for the round trip, at least 1 ms
        let rtt_ms = (self.delay_ms.unwrap_or(0.0) * 2.0).max(1.0);
        let bdp_bytes = rate as f64 * 1000.0 / 8.0 * rtt_ms / 1000.0;
        let bdp_packets = (bdp_bytes / MTU_BYTES as f64).ceil() as u64;
        Some(bdp_packets.saturating_mul(2).clamp(100, u32::MAX as u64) as u32)
    }
}

/// Builds the `tc` argument list installing netem on `interface`.
pub fn netem_args(interface: &str, config: &ImpairmentConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "qdisc".into(),
        "add".into(),
        "dev".into(),
        interface.into(),
        "root".into(),
        "netem".into(),
    ];

    if let Some(limit) = config.queue_limit() {
        args.push("limit".into());
        args.push(limit.to_string());
    }
    if let Some(delay) = config.delay_ms {
        args.push("delay".into());
        args.push(format!("{delay}ms"));
    }
    if let Some(loss) = config.loss_percent {
        args.push("loss".into());
        args.push(format!("{loss}%"));
    }
    if let Some(rate) = config.rate_kbit {
        args.push("rate".into());
        args.push(format!("{rate}kbit"));
    }
    args
}

/// Applies shaping to an interface inside a namespace using `tc netem`.
///
/// Removes any existing root qdisc first, then installs netem with the
/// configured delay, loss, and rate.
pub fn apply_impairment(
    ns: &Namespace,
    interface: &str,
    config: &ImpairmentConfig,
) -> io::Result<()> {
    let _ = ns.exec("tc", &["qdisc", "del", "dev", interface, "root"]);

    if config.is_empty() {
        return Ok(());
    }

    let args_storage = netem_args(interface, config);
    let args: Vec<&str> = args_storage.iter().map(|s| s.as_str()).collect();
    let output = ns.exec("tc", &args)?;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "Failed to apply tc netem: {}\nCommand: tc {}",
            String::from_utf8_lossy(&output.stderr),
            args.join(" ")
        )));
    }
    tracing::debug!(netns = %ns.name, interface, cmd = %args.join(" "), "netem applied");

    Ok(())
}
