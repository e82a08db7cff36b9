//! The fixed two-router testbed.
//!
//! ```text
//!  h1 ── r1 ══════ r2 ── h2
//!          shaped link
//! ```
//!
//! Host links are unshaped; the `r1`/`r2` link carries the configured
//! bandwidth, loss and delay on both ends.

use std::io;

use ccbench_sim::impairment::{apply_impairment, ImpairmentConfig};
use ccbench_sim::topology::Namespace;

use crate::model::IpVersion;
use crate::params::BenchParams;

/// Shaping applied to the inter-router link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkShape {
    pub bandwidth_mbps: f64,
    pub loss_percent: f64,
    pub delay_ms: f64,
}

impl LinkShape {
    pub fn impairment(&self) -> ImpairmentConfig {
        ImpairmentConfig {
            delay_ms: Some(self.delay_ms),
            loss_percent: Some(self.loss_percent),
            rate_kbit: Some((self.bandwidth_mbps * 1000.0).round().max(1.0) as u64),
            netem_limit: None,
        }
    }
}

impl From<&BenchParams> for LinkShape {
    fn from(p: &BenchParams) -> Self {
        Self {
            bandwidth_mbps: p.bandwidth_mbps(),
            loss_percent: p.loss_percent,
            delay_ms: p.delay_ms,
        }
    }
}

/// One interface of the address plan.
struct Iface {
    name: &'static str,
    v4: &'static str,
    v6: &'static str,
}

const H1_ETH0: Iface = Iface {
    name: "h1-eth0",
    v4: "10.0.1.2/24",
    v6: "2001:db8:0:1::2/64",
};
const R1_ETH0: Iface = Iface {
    name: "r1-eth0",
    v4: "10.0.1.1/24",
    v6: "2001:db8:0:1::1/64",
};
const R1_ETH1: Iface = Iface {
    name: "r1-eth1",
    v4: "192.168.1.1/30",
    v6: "2001:db8:1::1/64",
};
const R2_ETH1: Iface = Iface {
    name: "r2-eth1",
    v4: "192.168.1.2/30",
    v6: "2001:db8:1::2/64",
};
const R2_ETH0: Iface = Iface {
    name: "r2-eth0",
    v4: "10.0.2.1/24",
    v6: "2001:db8:0:2::1/64",
};
const H2_ETH0: Iface = Iface {
    name: "h2-eth0",
    v4: "10.0.2.2/24",
    v6: "2001:db8:0:2::2/64",
};

fn host(cidr: &str) -> &str {
    cidr.split('/').next().unwrap_or(cidr)
}

/// Network namespaces of one benchmark iteration.
///
/// Dropping the testbed kills every process inside it and deletes the
/// namespaces, which also removes their veth pairs.
#[derive(Debug)]
pub struct Testbed {
    pub h1: Namespace,
    pub h2: Namespace,
    pub r1: Namespace,
    pub r2: Namespace,
}

impl Testbed {
    /// Address `h1` connects to for the given family.
    pub fn server_address(ip_version: IpVersion) -> &'static str {
        match ip_version {
            IpVersion::V4 => host(H2_ETH0.v4),
            IpVersion::V6 => host(H2_ETH0.v6),
        }
    }

    pub fn build(prefix: &str, shape: &LinkShape) -> io::Result<Self> {
        tracing::info!(
            bandwidth_mbps = shape.bandwidth_mbps,
            loss_percent = shape.loss_percent,
            delay_ms = shape.delay_ms,
            "creating network topology"
        );

        let bed = Self {
            h1: Namespace::new(&format!("{prefix}-h1"))?,
            h2: Namespace::new(&format!("{prefix}-h2"))?,
            r1: Namespace::new(&format!("{prefix}-r1"))?,
            r2: Namespace::new(&format!("{prefix}-r2"))?,
        };

        link(&bed.h1, &H1_ETH0, &bed.r1, &R1_ETH0)?;
        link(&bed.h2, &H2_ETH0, &bed.r2, &R2_ETH0)?;
        link(&bed.r1, &R1_ETH1, &bed.r2, &R2_ETH1)?;

        let impairment = shape.impairment();
        apply_impairment(&bed.r1, R1_ETH1.name, &impairment)?;
        apply_impairment(&bed.r2, R2_ETH1.name, &impairment)?;

        bed.h1.add_route("default", host(R1_ETH0.v4))?;
        bed.h1.add_route("default", host(R1_ETH0.v6))?;
        bed.h2.add_route("default", host(R2_ETH0.v4))?;
        bed.h2.add_route("default", host(R2_ETH0.v6))?;

        bed.r1.enable_forwarding()?;
        bed.r2.enable_forwarding()?;
        bed.r1.add_route("10.0.2.0/24", host(R2_ETH1.v4))?;
        bed.r2.add_route("10.0.1.0/24", host(R1_ETH1.v4))?;
        bed.r1.add_route("2001:db8:0:2::/64", host(R2_ETH1.v6))?;
        bed.r2.add_route("2001:db8:0:1::/64", host(R1_ETH1.v6))?;

        Ok(bed)
    }
}

fn link(a: &Namespace, a_if: &Iface, b: &Namespace, b_if: &Iface) -> io::Result<()> {
    a.add_veth_link(b, a_if.name, b_if.name)?;
    for (ns, iface) in [(a, a_if), (b, b_if)] {
        ns.add_address(iface.name, iface.v4)?;
        ns.add_address(iface.name, iface.v6)?;
    }
    Ok(())
}
