//! Append-only CSV datasets, one file per (IP version, variant) pair.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::model::{IpVersion, MetricRecord};

/// `<dir>/dataset_<ipver>_<variant>.csv`
pub fn dataset_path(dir: &Path, ip_version: IpVersion, tcp_variant: &str) -> PathBuf {
    dir.join(format!(
        "dataset_{}_{}.csv",
        ip_version.slug(),
        tcp_variant.to_ascii_lowercase()
    ))
}

/// Appends records to a dataset file, creating it and its directory if
/// needed. The header is written only when the file is empty, so an empty
/// `records` slice still leaves a file with a header behind.
pub fn append_records(path: &Path, records: &[MetricRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating dataset directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening dataset {}", path.display()))?;
    let is_empty = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if is_empty {
        writer.write_record(MetricRecord::HEADERS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads every `*.csv` in `dir`, in file-name order.
pub fn load_all(dir: &Path) -> anyhow::Result<Vec<MetricRecord>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading dataset directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();

    let mut records = Vec::new();
    for path in &files {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening dataset {}", path.display()))?;
        for row in reader.deserialize() {
            let record: MetricRecord =
                row.with_context(|| format!("parsing dataset {}", path.display()))?;
            records.push(record);
        }
    }
    tracing::debug!(files = files.len(), records = records.len(), "datasets loaded");
    Ok(records)
}
