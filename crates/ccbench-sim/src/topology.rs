use std::fs;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};

/// Builds a command that runs with root privileges.
///
/// Prefixes `sudo` unless the current process already runs as root.
pub fn privileged(program: &str) -> Command {
    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } == 0 {
        Command::new(program)
    } else {
        let mut cmd = Command::new("sudo");
        cmd.arg(program);
        cmd
    }
}

/// Turns a non-zero exit status into an `io::Error` carrying stderr.
fn check(output: Output, what: &str) -> io::Result<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(io::Error::other(format!(
            "{what}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Reads a sysctl of the network namespace this process runs in.
pub fn host_sysctl(key: &str) -> io::Result<String> {
    let path = Path::new("/proc/sys").join(key.replace('.', "/"));
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// Sets a sysctl of the network namespace this process runs in.
pub fn set_host_sysctl(key: &str, value: &str) -> io::Result<()> {
    let setting = format!("{key}={value}");
    let output = privileged("sysctl").args(["-w", &setting]).output()?;
    check(output, &format!("`sysctl -w {setting}` failed"))?;
    Ok(())
}

fn is_ipv6(addr: &str) -> bool {
    addr.contains(':')
}

/// A Linux network namespace managed via `ip netns`.
///
/// Creates the namespace on construction, initializes loopback, and
/// deletes the namespace on drop after killing every process left
/// inside it.
#[derive(Debug)]
pub struct Namespace {
    pub name: String,
}

impl Namespace {
    pub fn new(name: &str) -> io::Result<Self> {
        // cleanup any namespace left behind by an aborted run
        let _ = privileged("ip").args(["netns", "del", name]).output();

        let output = privileged("ip").args(["netns", "add", name]).output()?;
        check(output, "Failed to create netns")?;

        let ns = Self {
            name: name.to_string(),
        };
        ns.exec_checked("ip", &["link", "set", "lo", "up"])?;
        tracing::debug!(netns = %ns.name, "namespace created");
        Ok(ns)
    }

    pub fn exec(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        privileged("ip")
            .args(["netns", "exec", &self.name, cmd])
            .args(args)
            .output()
    }

    /// Like [`exec`](Self::exec) but fails on a non-zero exit status.
    pub fn exec_checked(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        let output = self.exec(cmd, args)?;
        check(
            output,
            &format!("`{} {}` failed in {}", cmd, args.join(" "), self.name),
        )
    }

    /// Starts a long-running process inside the namespace.
    ///
    /// Output is discarded; the caller owns the child.
    pub fn spawn(&self, cmd: &str, args: &[&str]) -> io::Result<Child> {
        privileged("ip")
            .args(["netns", "exec", &self.name, cmd])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }

    /// Creates a veth pair with one end in `self` and the other in `other`,
    /// and brings both ends up.
    ///
    /// Both ends are created directly inside their namespaces, so the
    /// interface names only need to be unique per namespace.
    pub fn add_veth_link(
        &self,
        other: &Namespace,
        veth_name_local: &str,
        veth_name_peer: &str,
    ) -> io::Result<()> {
        let output = privileged("ip")
            .args([
                "link",
                "add",
                veth_name_local,
                "netns",
                &self.name,
                "type",
                "veth",
                "peer",
                "name",
                veth_name_peer,
                "netns",
                &other.name,
            ])
            .output()?;
        check(output, "Failed to create veth pair")?;

        self.exec_checked("ip", &["link", "set", veth_name_local, "up"])?;
        other.exec_checked("ip", &["link", "set", veth_name_peer, "up"])?;
        Ok(())
    }

    /// Assigns an address in CIDR form. IPv6 addresses skip duplicate
    /// address detection so they are usable immediately.
    pub fn add_address(&self, interface: &str, cidr: &str) -> io::Result<()> {
        if is_ipv6(cidr) {
            self.exec_checked(
                "ip",
                &["-6", "addr", "add", cidr, "dev", interface, "nodad"],
            )?;
        } else {
            self.exec_checked("ip", &["addr", "add", cidr, "dev", interface])?;
        }
        Ok(())
    }

    /// Adds a static route. `destination` may be `default`.
    pub fn add_route(&self, destination: &str, via: &str) -> io::Result<()> {
        if is_ipv6(via) {
            self.exec_checked("ip", &["-6", "route", "add", destination, "via", via])?;
        } else {
            self.exec_checked("ip", &["route", "add", destination, "via", via])?;
        }
        Ok(())
    }

    pub fn sysctl(&self, key: &str, value: &str) -> io::Result<()> {
        self.exec_checked("sysctl", &["-w", &format!("{key}={value}")])?;
        Ok(())
    }

    /// Turns the namespace into a router for both address families.
    pub fn enable_forwarding(&self) -> io::Result<()> {
        self.sysctl("net.ipv4.ip_forward", "1")?;
        self.sysctl("net.ipv6.conf.all.forwarding", "1")
    }

    /// PIDs of every process currently running inside the namespace.
    pub fn pids(&self) -> io::Result<Vec<u32>> {
        let output = privileged("ip")
            .args(["netns", "pids", &self.name])
            .output()?;
        let output = check(output, "Failed to list netns pids")?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .filter_map(|pid| pid.parse().ok())
            .collect())
    }

    /// Kills every process left inside the namespace.
    pub fn kill_all(&self) -> io::Result<()> {
        let pids = self.pids()?;
        if pids.is_empty() {
            return Ok(());
        }
        let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
        tracing::debug!(netns = %self.name, pids = %pids.join(","), "killing leftover processes");
        let output = privileged("kill").arg("-9").args(&pids).output()?;
        check(output, "Failed to kill netns processes")?;
        Ok(())
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        if let Err(e) = self.kill_all() {
            tracing::warn!(netns = %self.name, "cleanup failed: {e}");
        }
        let _ = privileged("ip")
            .args(["netns", "del", &self.name])
            .status();
        tracing::debug!(netns = %self.name, "namespace deleted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{check_privileges, unique_prefix};

    #[test]
    fn ipv6_detection() {
        assert!(is_ipv6("2001:db8:0:1::2/64"));
        assert!(!is_ipv6("10.0.1.2/24"));
        assert!(!is_ipv6("default"));
    }

    #[test]
    fn check_reports_stderr() {
        let output = Command::new("sh")
            .args(["-c", "echo boom >&2; exit 3"])
            .output()
            .expect("sh available");
        let err = check(output, "step").unwrap_err();
        assert_eq!(err.to_string(), "step: boom");
    }

    #[test]
    fn host_sysctl_reads_proc() {
        assert_eq!(host_sysctl("kernel.ostype").unwrap(), "Linux");
        assert!(host_sysctl("net.ipv4.no_such_key").is_err());
    }

    #[test]
    fn test_create_namespace() {
        if !check_privileges() {
            eprintln!("Skipping test, insufficient privileges or missing tools");
            return;
        }

        let ns = Namespace::new(&unique_prefix("cbn")).expect("Failed to create ns");
        let out = ns.exec("ip", &["link"]).expect("Failed to exec ip link");
        assert!(String::from_utf8_lossy(&out.stdout).contains("lo"));
        assert!(ns.pids().expect("pids").is_empty());
    }

    #[test]
    fn test_veth_link_v4_and_v6() {
        if !check_privileges() {
            eprintln!("Skipping test, insufficient privileges or missing tools");
            return;
        }

        let prefix = unique_prefix("cbl");
        let a = Namespace::new(&format!("{prefix}a")).expect("Failed to create ns a");
        let b = Namespace::new(&format!("{prefix}b")).expect("Failed to create ns b");

        a.add_veth_link(&b, "a-eth0", "b-eth0")
            .expect("Failed to create veth link");
        a.add_address("a-eth0", "10.210.1.1/24").unwrap();
        b.add_address("b-eth0", "10.210.1.2/24").unwrap();
        a.add_address("a-eth0", "2001:db8:99::1/64").unwrap();
        b.add_address("b-eth0", "2001:db8:99::2/64").unwrap();

        let out = a
            .exec("ping", &["-c", "1", "-W", "1", "10.210.1.2"])
            .expect("Failed to exec ping");
        let stderr = String::from_utf8_lossy(&out.stderr);
        if stderr.contains("No such file") || stderr.contains("not found") {
            eprintln!("Skipping test, ping not available: {}", stderr.trim());
            return;
        }
        assert!(
            out.status.success(),
            "IPv4 ping failed: {}",
            String::from_utf8_lossy(&out.stdout)
        );

        let out = a
            .exec("ping", &["-6", "-c", "1", "-W", "1", "2001:db8:99::2"])
            .expect("Failed to exec ping");
        assert!(
            out.status.success(),
            "IPv6 ping failed: {}",
            String::from_utf8_lossy(&out.stdout)
        );
    }
}
