//! TCP congestion-control benchmarking over an emulated two-router network.
//!
//! The driver builds a namespace testbed per run, measures one iperf3
//! transfer, appends the extracted metrics to a CSV dataset, and finally
//! charts per-group means and confidence intervals for a small web viewer.

pub mod aggregate;
pub mod charts;
pub mod config;
pub mod cpu;
pub mod dataset;
pub mod metrics;
pub mod model;
pub mod params;
pub mod report;
pub mod runner;
pub mod topology;
pub mod web;
