//! PNG bar charts and summary tables.
//!
//! For every charted metric: `<charts>/<Folder>/mean.png`,
//! `<charts>/<Folder>/confidence_interval.png` and `<tables>/<Folder>.png`.
//! Bars are grouped by variant on the x axis, one series per IP version.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Context;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::aggregate::{summarize, GroupSummary, Metric};
use crate::model::{IpVersion, MetricRecord};

const CHART_SIZE: (u32, u32) = (1000, 600);
const TABLE_WIDTH: u32 = 1000;
const TABLE_ROW_HEIGHT: u32 = 32;
const TABLE_COLUMNS: [&str; 7] = [
    "TCP Version",
    "IP Version",
    "n",
    "Mean",
    "Std Dev",
    "CI Lower",
    "CI Upper",
];

/// Bars laid out on a unit-width slot per variant.
pub struct BarGrid<'a> {
    pub variants: Vec<&'a str>,
    pub ip_versions: Vec<IpVersion>,
    cells: BTreeMap<(usize, usize), &'a GroupSummary>,
}

impl<'a> BarGrid<'a> {
    /// Expects summaries sorted by variant then IP version.
    pub fn new(summaries: &'a [GroupSummary]) -> Self {
        let mut variants: Vec<&str> = summaries.iter().map(|s| s.key.tcp_variant.as_str()).collect();
        variants.dedup();
        let mut ip_versions: Vec<IpVersion> = summaries.iter().map(|s| s.key.ip_version).collect();
        ip_versions.sort();
        ip_versions.dedup();

        let mut cells = BTreeMap::new();
        for s in summaries {
            let v = variants.iter().position(|name| *name == s.key.tcp_variant);
            let i = ip_versions.iter().position(|ip| *ip == s.key.ip_version);
            if let (Some(v), Some(i)) = (v, i) {
                cells.insert((v, i), s);
            }
        }
        Self {
            variants,
            ip_versions,
            cells,
        }
    }

    pub fn bar(&self, variant: usize, series: usize) -> Option<&'a GroupSummary> {
        self.cells.get(&(variant, series)).copied()
    }

    /// Horizontal extent of one bar. Bars fill the middle 80% of the slot.
    pub fn bar_span(&self, variant: usize, series: usize) -> (f64, f64) {
        let width = 0.8 / self.ip_versions.len().max(1) as f64;
        let left = variant as f64 + 0.1 + series as f64 * width;
        (left, left + width)
    }

    /// Y axis range covering every bar (and error bar), with headroom.
    pub fn y_range(&self, with_errors: bool) -> Range<f64> {
        let (mut lo, mut hi) = (0.0f64, 0.0f64);
        for s in self.cells.values() {
            let (low, high) = if with_errors {
                (s.ci.lower, s.ci.upper)
            } else {
                (s.mean, s.mean)
            };
            lo = lo.min(low);
            hi = hi.max(high);
        }
        let span = hi - lo;
        if span <= 0.0 {
            return lo..lo + 1.0;
        }
        let lo = if lo < 0.0 { lo - span * 0.1 } else { lo };
        lo..hi + span * 0.1
    }
}

/// Formatted cells of the summary table, one row per group.
pub fn table_rows(summaries: &[GroupSummary]) -> Vec<[String; 7]> {
    summaries
        .iter()
        .map(|s| {
            [
                s.key.tcp_variant.clone(),
                s.key.ip_version.label().to_string(),
                s.n.to_string(),
                format!("{:.3}", s.mean),
                format!("{:.3}", s.std_dev),
                format!("{:.3}", s.ci.lower),
                format!("{:.3}", s.ci.upper),
            ]
        })
        .collect()
}

/// Renders every chart and table. Returns the files written.
pub fn render_all(
    records: &[MetricRecord],
    charts_dir: &Path,
    tables_dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if records.is_empty() {
        tracing::warn!("no records to chart");
        return Ok(written);
    }

    fs::create_dir_all(tables_dir)
        .with_context(|| format!("creating tables directory {}", tables_dir.display()))?;

    for metric in Metric::CHARTED {
        let summaries = summarize(records, metric);
        let grid = BarGrid::new(&summaries);

        let dir = charts_dir.join(metric.folder());
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating chart directory {}", dir.display()))?;

        let mean_path = dir.join("mean.png");
        draw_bar_chart(&mean_path, &format!("Mean {}", metric.column()), metric, &grid, false)
            .with_context(|| format!("rendering {}", mean_path.display()))?;
        written.push(mean_path);

        let ci_path = dir.join("confidence_interval.png");
        draw_bar_chart(
            &ci_path,
            &format!("95% confidence interval of {}", metric.column()),
            metric,
            &grid,
            true,
        )
        .with_context(|| format!("rendering {}", ci_path.display()))?;
        written.push(ci_path);

        let table_path = tables_dir.join(format!("{}.png", metric.folder()));
        draw_table(&table_path, metric, &summaries)
            .with_context(|| format!("rendering {}", table_path.display()))?;
        written.push(table_path);

        tracing::debug!(metric = metric.column(), groups = summaries.len(), "charts rendered");
    }

    tracing::info!(files = written.len(), "charts generated");
    Ok(written)
}

fn draw_bar_chart(
    path: &Path,
    title: &str,
    metric: Metric,
    grid: &BarGrid<'_>,
    with_errors: bool,
) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let x_range = 0.0..grid.variants.len().max(1) as f64;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range, grid.y_range(with_errors))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|_: &f64| String::new())
        .x_desc("TCP Version")
        .y_desc(metric.column())
        .draw()?;

    for (series, ip) in grid.ip_versions.iter().enumerate() {
        let color = Palette99::pick(series).mix(0.75);
        let bars: Vec<_> = (0..grid.variants.len())
            .filter_map(|v| {
                let s = grid.bar(v, series)?;
                let (left, right) = grid.bar_span(v, series);
                Some(Rectangle::new([(left, 0.0), (right, s.mean)], color.filled()))
            })
            .collect();
        chart
            .draw_series(bars)?
            .label(ip.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 14, y + 6)], color.filled()));

        let outlines = (0..grid.variants.len()).filter_map(|v| {
            let s = grid.bar(v, series)?;
            let (left, right) = grid.bar_span(v, series);
            Some(Rectangle::new([(left, 0.0), (right, s.mean)], BLACK.stroke_width(1)))
        });
        chart.draw_series(outlines)?;

        if with_errors {
            let errors = (0..grid.variants.len()).filter_map(|v| {
                let s = grid.bar(v, series)?;
                let (left, right) = grid.bar_span(v, series);
                Some(ErrorBar::new_vertical(
                    (left + right) / 2.0,
                    s.ci.lower,
                    s.mean,
                    s.ci.upper,
                    BLACK.filled(),
                    8,
                ))
            });
            chart.draw_series(errors)?;
        }
    }

    // variant names centred under each slot
    let label_style = TextStyle::from(("sans-serif", 18).into_font())
        .pos(Pos::new(HPos::Center, VPos::Top));
    let y_base = chart.y_range().start;
    for (v, name) in grid.variants.iter().enumerate() {
        let (px, py) = chart.backend_coord(&(v as f64 + 0.5, y_base));
        root.draw(&Text::new(name.to_string(), (px, py + 8), label_style.clone()))?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_table(path: &Path, metric: Metric, summaries: &[GroupSummary]) -> anyhow::Result<()> {
    let rows = table_rows(summaries);
    let height = 70 + TABLE_ROW_HEIGHT * (rows.len() as u32 + 1);
    let root = BitMapBackend::new(path, (TABLE_WIDTH, height)).into_drawing_area();
    root.fill(&WHITE)?;

    let title_style = TextStyle::from(("sans-serif", 24).into_font());
    let header_style = TextStyle::from(("sans-serif", 18).into_font().style(FontStyle::Bold));
    let cell_style = TextStyle::from(("sans-serif", 18).into_font());

    root.draw(&Text::new(metric.column().to_string(), (20, 16), title_style))?;

    let column_width = (TABLE_WIDTH as i32 - 40) / TABLE_COLUMNS.len() as i32;
    let row_top = |row: usize| 60 + row as i32 * TABLE_ROW_HEIGHT as i32;

    for (c, name) in TABLE_COLUMNS.iter().enumerate() {
        root.draw(&Text::new(
            name.to_string(),
            (20 + c as i32 * column_width, row_top(0) + 6),
            header_style.clone(),
        ))?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            root.draw(&Text::new(
                cell.clone(),
                (20 + c as i32 * column_width, row_top(r + 1) + 6),
                cell_style.clone(),
            ))?;
        }
    }
    for r in 0..=rows.len() + 1 {
        let y = row_top(r);
        root.draw(&PathElement::new(
            vec![(20, y), (TABLE_WIDTH as i32 - 20, y)],
            RGBColor(200, 200, 200),
        ))?;
    }

    root.present()?;
    Ok(())
}
