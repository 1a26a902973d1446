use anyhow::Result;
use colored::Colorize;
use pullsim_engine::numbers::ceil_to_multiple;
use pullsim_engine::{AggregateStatistics, FrequencyTable, Summary};
use serde::Serialize;
use std::io::Write;

const BAR_WIDTH: u64 = 40;

/// One policy's statistics, labelled for output.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyRun {
    pub label: String,
    pub statistics: AggregateStatistics,
}

/// Presentation switches shared by every format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub histogram: bool,
    pub round_to: Option<u64>,
}

impl ReportOptions {
    fn percentile(self, value: f64) -> f64 {
        self.round_to
            .map_or(value, |step| ceil_to_multiple(value, step))
    }

    fn summary(self, summary: &Summary) -> Summary {
        Summary {
            p5: self.percentile(summary.p5),
            p95: self.percentile(summary.p95),
            ..*summary
        }
    }
}

fn distributions(stats: &AggregateStatistics) -> [(&'static str, Option<&Summary>, &FrequencyTable); 2] {
    [
        (
            "total_pulls",
            Some(&stats.total_pulls),
            &stats.total_pulls_histogram,
        ),
        (
            "first_rate_up_pull",
            stats.first_rate_up_pull.as_ref(),
            &stats.first_rate_up_histogram,
        ),
    ]
}

pub fn generate_console_report(
    out: &mut dyn Write,
    runs: &[PolicyRun],
    options: ReportOptions,
) -> Result<()> {
    for run in runs {
        let stats = &run.statistics;
        writeln!(out)?;
        writeln!(out, "{}", format!("🎲 {}", run.label).bright_cyan().bold())?;
        writeln!(out, "{}", "=".repeat(32).cyan())?;
        writeln!(
            out,
            "Experiments: {}   Seed: {:#x}",
            stats.experiments, stats.master_seed
        )?;
        for (name, summary, table) in distributions(stats) {
            match summary {
                Some(summary) => {
                    let s = options.summary(summary);
                    writeln!(
                        out,
                        "{:<20} mean {:>8.2}  p5 {:>8.1}  p95 {:>8.1}  min {:>6}  max {:>6}",
                        name.bold(),
                        s.mean,
                        s.p5,
                        s.p95,
                        s.min,
                        s.max
                    )?;
                }
                None => writeln!(out, "{:<20} {}", name.bold(), "no samples".yellow())?,
            }
            if options.histogram {
                write_console_histogram(out, table)?;
            }
        }
        writeln!(
            out,
            "Lost first split: {} ({:.2}%)",
            stats.lost_first_split.to_string().yellow(),
            stats.lost_first_split_rate * 100.0
        )?;
        writeln!(
            out,
            "Expected pulls per hit (curve): {:.2}",
            stats.expected_pulls_per_hit
        )?;
    }
    Ok(())
}

fn write_console_histogram(out: &mut dyn Write, table: &FrequencyTable) -> Result<()> {
    let rows = table.dense();
    let peak = rows.iter().map(|&(_, count)| count).max().unwrap_or(0).max(1);
    for (bucket, count) in rows {
        let width = usize::try_from(count * BAR_WIDTH / peak).unwrap_or(0);
        writeln!(
            out,
            "  {:>6}-{:<6} {:>7} {}",
            bucket,
            bucket + table.bin_width - 1,
            count,
            "#".repeat(width).green()
        )?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    label: &'a str,
    #[serde(flatten)]
    statistics: AggregateStatistics,
}

pub fn generate_json_report(
    out: &mut dyn Write,
    runs: &[PolicyRun],
    options: ReportOptions,
) -> Result<()> {
    let entries: Vec<JsonEntry<'_>> = runs
        .iter()
        .map(|run| {
            let mut statistics = run.statistics.clone();
            statistics.total_pulls = options.summary(&statistics.total_pulls);
            statistics.first_rate_up_pull =
                statistics.first_rate_up_pull.map(|s| options.summary(&s));
            if !options.histogram {
                statistics.total_pulls_histogram.buckets.clear();
                statistics.first_rate_up_histogram.buckets.clear();
            }
            JsonEntry {
                label: &run.label,
                statistics,
            }
        })
        .collect();
    serde_json::to_writer_pretty(&mut *out, &entries)?;
    writeln!(out)?;
    Ok(())
}

pub fn generate_markdown_report(
    out: &mut dyn Write,
    runs: &[PolicyRun],
    options: ReportOptions,
) -> Result<()> {
    writeln!(out, "# Pull Simulation Results\n")?;
    writeln!(
        out,
        "| Policy | Distribution | Trials | Mean | P5 | P95 | Min | Max |"
    )?;
    writeln!(out, "|---|---|---|---|---|---|---|---|")?;
    for run in runs {
        for (name, summary, _) in distributions(&run.statistics) {
            if let Some(summary) = summary {
                let s = options.summary(summary);
                writeln!(
                    out,
                    "| {} | {} | {} | {:.2} | {:.1} | {:.1} | {} | {} |",
                    run.label, name, s.count, s.mean, s.p5, s.p95, s.min, s.max
                )?;
            }
        }
    }
    writeln!(out)?;
    writeln!(out, "## Details\n")?;
    for run in runs {
        let stats = &run.statistics;
        writeln!(out, "### {}\n", run.label)?;
        writeln!(out, "- **Seed**: `{:#x}`", stats.master_seed)?;
        writeln!(
            out,
            "- **Lost first split**: {} ({:.2}%)",
            stats.lost_first_split,
            stats.lost_first_split_rate * 100.0
        )?;
        writeln!(
            out,
            "- **Expected pulls per hit**: {:.2}\n",
            stats.expected_pulls_per_hit
        )?;
        if options.histogram {
            for (name, _, table) in distributions(stats) {
                writeln!(out, "#### {name}\n")?;
                writeln!(out, "| Bucket | Count |")?;
                writeln!(out, "|---|---|")?;
                for (bucket, count) in table.dense() {
                    writeln!(out, "| {bucket} | {count} |")?;
                }
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

/// One row per (policy, distribution, bucket).
pub fn generate_csv_report(out: &mut dyn Write, runs: &[PolicyRun]) -> Result<()> {
    writeln!(out, "policy,distribution,bucket,count")?;
    for run in runs {
        for (name, _, table) in distributions(&run.statistics) {
            for (bucket, count) in table.dense() {
                writeln!(out, "{},{name},{bucket},{count}", run.label)?;
            }
        }
    }
    Ok(())
}
