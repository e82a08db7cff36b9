//! Network emulation toolkit for the benchmark driver.
//!
//! Provides Linux network namespace management, veth wiring, and
//! `tc netem` shaping for the emulated links under test.

pub mod impairment;
pub mod topology;

pub mod test_util;
