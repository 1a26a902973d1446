mod reports;
mod util;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use log::info;
use pullsim_engine::{Aggregator, Execution, ExperimentPlan, Preset};
use std::fs::{self, File};
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use reports::{PolicyRun, ReportOptions};
use util::{parse_seed, split_csv};

#[derive(Debug, Parser)]
#[command(name = "pullsim", version)]
#[command(about = "Monte Carlo simulation of pity and guarantee driven pull banners")]
struct Args {
    /// Presets to run (comma-separated, or `all`)
    #[arg(long)]
    preset: Option<String>,

    /// Policy document (JSON) to run instead of presets
    #[arg(long, conflicts_with = "preset")]
    policy: Option<PathBuf>,

    /// List all available presets and exit
    #[arg(long)]
    list_presets: bool,

    /// Trials per policy (overrides the document)
    #[arg(long)]
    experiments: Option<u64>,

    /// Master seed, decimal or 0x-prefixed hex (overrides the document)
    #[arg(long, value_parser = parse_seed)]
    seed: Option<u64>,

    /// Worker threads for parallel runs
    #[arg(long, conflicts_with = "sequential")]
    threads: Option<usize>,

    /// Run trials on the calling thread
    #[arg(long)]
    sequential: bool,

    /// Frequency table bucket width (overrides the document)
    #[arg(long)]
    bin_width: Option<u64>,

    /// Include frequency tables in the report
    #[arg(long)]
    histogram: bool,

    /// Round displayed percentiles up to a multiple of this value
    #[arg(long)]
    round_to: Option<u64>,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if maybe_list_presets(&args)? {
        return Ok(());
    }

    let start_time = Instant::now();
    let plans = load_plans(&args)?;
    let execution = execution_mode(&args);

    let mut runs = Vec::with_capacity(plans.len());
    for (label, plan) in plans {
        let plan = apply_overrides(&args, plan);
        let aggregator = Aggregator::new(plan, execution)
            .with_context(|| format!("invalid run parameters for {label}"))?;
        let batch = aggregator
            .run()
            .with_context(|| format!("simulation of {label} failed"))?;
        info!(
            "{label}: {} trials in {:?}",
            batch.statistics.experiments,
            start_time.elapsed()
        );
        runs.push(PolicyRun {
            label,
            statistics: batch.statistics,
        });
    }

    write_reports(&args, &runs)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn maybe_list_presets(args: &Args) -> Result<bool> {
    if !args.list_presets {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available presets:")?;
    for preset in Preset::ALL {
        writeln!(
            output_target.writer(),
            "  {:22} - {}",
            preset.key(),
            preset.description()
        )?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn expand_presets(preset_arg: &str) -> Result<Vec<Preset>> {
    let mut presets = Vec::new();
    for token in split_csv(preset_arg) {
        let selected = if token.eq_ignore_ascii_case("all") {
            Preset::ALL.to_vec()
        } else {
            vec![token.parse::<Preset>()?]
        };
        for preset in selected {
            if !presets.contains(&preset) {
                presets.push(preset);
            }
        }
    }
    if presets.is_empty() {
        bail!("no presets selected");
    }
    Ok(presets)
}

fn load_plans(args: &Args) -> Result<Vec<(String, ExperimentPlan)>> {
    if let Some(path) = &args.policy {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let plan = ExperimentPlan::from_json_str(&raw)
            .with_context(|| format!("invalid policy document {}", path.display()))?;
        return Ok(vec![(plan.policy.name().to_string(), plan)]);
    }
    let selection = args.preset.as_deref().unwrap_or("all");
    expand_presets(selection)?
        .into_iter()
        .map(|preset| -> Result<(String, ExperimentPlan)> {
            let plan = preset
                .plan()
                .with_context(|| format!("embedded preset {preset} is invalid"))?;
            Ok((preset.key().to_string(), plan))
        })
        .collect()
}

fn apply_overrides(args: &Args, mut plan: ExperimentPlan) -> ExperimentPlan {
    if let Some(experiments) = args.experiments {
        plan.experiments_count = experiments;
    }
    if args.seed.is_some() {
        plan.seed = args.seed;
    }
    if args.bin_width.is_some() {
        plan.bin_width = args.bin_width;
    }
    plan
}

const fn execution_mode(args: &Args) -> Execution {
    if args.sequential {
        Execution::Sequential
    } else {
        Execution::Parallel {
            threads: args.threads,
        }
    }
}

fn announce_banner(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "{}", "🎰 Pull Simulation Report".bright_cyan().bold())?;
    writeln!(out, "{}", "================================".cyan())
}

fn write_reports(args: &Args, runs: &[PolicyRun]) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    let options = ReportOptions {
        histogram: args.histogram,
        round_to: args.round_to,
    };

    match args.report.as_str() {
        "json" => reports::generate_json_report(&mut output_target, runs, options)?,
        "markdown" => reports::generate_markdown_report(&mut output_target, runs, options)?,
        "csv" => reports::generate_csv_report(&mut output_target, runs)?,
        _ => {
            announce_banner(&mut output_target)?;
            reports::generate_console_report(&mut output_target, runs, options)?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            preset: None,
            policy: None,
            list_presets: false,
            experiments: None,
            seed: None,
            threads: None,
            sequential: false,
            bin_width: None,
            histogram: false,
            round_to: None,
            report: "console".to_string(),
            verbose: false,
            output: None,
        }
    }

    #[test]
    fn all_expands_to_every_preset_once() {
        let presets = expand_presets("all").unwrap();
        assert_eq!(presets, Preset::ALL.to_vec());
        let presets = expand_presets("wuwa-character,hoyo-character,all").unwrap();
        assert_eq!(presets.len(), Preset::ALL.len());
        assert_eq!(&presets[..2], &[Preset::WuwaCharacter, Preset::HoyoCharacter]);
        let presets = expand_presets("wuwa-character,hoyo-character").unwrap();
        assert_eq!(presets, vec![Preset::WuwaCharacter, Preset::HoyoCharacter]);
        assert!(expand_presets("gacha").is_err());
        assert!(expand_presets(" , ").is_err());
    }

    #[test]
    fn overrides_replace_document_values() {
        let args = Args {
            experiments: Some(50),
            seed: Some(9),
            bin_width: Some(5),
            ..base_args()
        };
        let plan = apply_overrides(&args, Preset::WuwaCharacter.plan().unwrap());
        assert_eq!(plan.experiments_count, 50);
        assert_eq!(plan.seed, Some(9));
        assert_eq!(plan.bin_width, Some(5));

        let untouched = apply_overrides(&base_args(), Preset::WuwaCharacter.plan().unwrap());
        assert_eq!(untouched.seed, Some(42));
    }

    #[test]
    fn execution_follows_flags() {
        let args = Args {
            sequential: true,
            ..base_args()
        };
        assert_eq!(execution_mode(&args), Execution::Sequential);
        let args = Args {
            threads: Some(2),
            ..base_args()
        };
        assert_eq!(
            execution_mode(&args),
            Execution::Parallel { threads: Some(2) }
        );
    }

    #[test]
    fn args_parse_hex_seed() {
        let args = Args::try_parse_from(["pullsim", "--preset", "all", "--seed", "0x10"]).unwrap();
        assert_eq!(args.seed, Some(16));
    }
}
