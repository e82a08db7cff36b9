//! Interactive benchmark parameters.

use std::io::{BufRead, Write};
use std::str::FromStr;

use anyhow::bail;
use crossterm::style::{StyledContent, Stylize};

/// Link shaping and repetition count for one campaign.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchParams {
    pub bandwidth_gbps: f64,
    pub loss_percent: f64,
    pub delay_ms: f64,
    pub repetitions: u32,
}

impl BenchParams {
    pub fn bandwidth_mbps(&self) -> f64 {
        self.bandwidth_gbps * 1e3
    }

    pub fn max_bandwidth_bps(&self) -> f64 {
        self.bandwidth_gbps * 1e9
    }
}

fn positive(v: &f64) -> Result<(), &'static str> {
    if v.is_finite() && *v > 0.0 {
        Ok(())
    } else {
        Err("must be greater than zero")
    }
}

fn percentage(v: &f64) -> Result<(), &'static str> {
    if (0.0..=100.0).contains(v) {
        Ok(())
    } else {
        Err("must be between 0 and 100")
    }
}

fn non_negative(v: &f64) -> Result<(), &'static str> {
    if v.is_finite() && *v >= 0.0 {
        Ok(())
    } else {
        Err("must not be negative")
    }
}

fn at_least_one(v: &u32) -> Result<(), &'static str> {
    if *v >= 1 {
        Ok(())
    } else {
        Err("must be at least 1")
    }
}

/// Asks until the answer parses and passes `check`.
fn prompt_value<T, R, W>(
    input: &mut R,
    out: &mut W,
    label: StyledContent<&str>,
    check: impl Fn(&T) -> Result<(), &'static str>,
) -> anyhow::Result<T>
where
    T: FromStr,
    R: BufRead,
    W: Write,
{
    loop {
        write!(out, "{label}")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("input closed before all parameters were entered");
        }
        let answer = line.trim().replace(',', ".");
        match answer.parse::<T>() {
            Ok(value) => match check(&value) {
                Ok(()) => return Ok(value),
                Err(why) => writeln!(out, "{}", format!("'{answer}' {why}").yellow())?,
            },
            Err(_) => writeln!(out, "{}", format!("'{answer}' is not a number").yellow())?,
        }
    }
}

/// Prompts for bandwidth (Gbps), loss (%), delay (ms) and repetitions.
pub fn prompt_params<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> anyhow::Result<BenchParams> {
    writeln!(out)?;
    let bandwidth_gbps = prompt_value(input, out, "Bandwidth (Gbps): ".blue(), positive)?;
    let loss_percent = prompt_value(input, out, "Packet loss (%): ".green(), percentage)?;
    let delay_ms = prompt_value(input, out, "Delay (ms): ".red(), non_negative)?;
    let repetitions = prompt_value(input, out, "Repetitions: ".cyan(), at_least_one)?;

    Ok(BenchParams {
        bandwidth_gbps,
        loss_percent,
        delay_ms,
        repetitions,
    })
}
