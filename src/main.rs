use anyhow::Result;
use clap::Parser;
use shee::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "shee",
    version,
    about = "Charts and cross-host aggregates from dstat captures"
)]
struct Args {
    #[arg(short = 'i', long = "input", help = "Directory holding the captures")]
    input_dir: Option<PathBuf>,

    #[arg(short = 'f', long, help = "Evaluate only this capture file name")]
    file: Option<String>,

    #[arg(short = 'o', long = "output", help = "Output root [default: working directory]")]
    output_dir: Option<PathBuf>,

    #[arg(short = 'P', long, help = "Show charts instead of saving them")]
    plot: bool,

    #[arg(short = 'u', long, help = "Evaluate total cpu")]
    cpu: bool,

    #[arg(short = 'n', long, help = "Evaluate total network")]
    network: bool,

    #[arg(short = 'm', long, help = "Evaluate total memory")]
    memory: bool,

    #[arg(short = 'd', long, help = "Evaluate total disk")]
    disk: bool,

    #[arg(short = 'p', long, help = "Evaluate one cpu core")]
    processor: Option<u32>,

    #[arg(short = 'e', long, help = "Evaluate one network interface (ethN)")]
    eth: Option<u32>,

    #[arg(short = 'D', long, help = "Evaluate one disk by letter (sdX)")]
    sd: Option<char>,

    #[arg(
        short = 'c',
        long = "compare",
        num_args = 2..=3,
        help = "Compare 2 or 3 column groups, e.g. -c \"total cpu usage\" net/total"
    )]
    comparison: Vec<String>,

    #[arg(short = 'T', long, help = "Ask for a time window for every table")]
    time_window: bool,

    #[arg(
        long,
        num_args = 2,
        value_names = ["START", "END"],
        conflicts_with = "time_window",
        help = "Apply one HH:MM:SS window to every table"
    )]
    window: Option<Vec<String>>,

    #[arg(short = 'N', long, help = "Skip per-file evaluation")]
    no_parse: bool,

    #[arg(short = 'a', long, help = "Aggregate the captures of the input directory")]
    aggregate: bool,

    #[arg(long, help = "Aggregate every sub-directory as one run of a benchmark suite")]
    suite: bool,

    #[arg(short = 's', long, help = "Export aggregate tables as csv")]
    save: bool,

    #[arg(
        short = 'F',
        long = "file-agg",
        help = "Re-render charts of an aggregate exported with -s (path of any of its csv files)"
    )]
    file_agg: Option<PathBuf>,

    #[arg(long, help = "Config file [default: $SHEE_CONFIG or shee.toml]")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let args = Args::parse();
    let app_config = match &args.config {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };

    let mut opts = run::RunOptions::from_config(&app_config);
    if let Some(dir) = args.input_dir {
        opts.input_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        opts.output_dir = dir;
    }
    opts.file = args.file;
    if args.plot {
        opts.output = charts::Output::Interactive;
    }
    opts.selection = run::Selection {
        cpu: args.cpu,
        network: args.network,
        memory: args.memory,
        disk: args.disk,
        core: args.processor,
        interface: args.eth,
        disk_letter: args.sd,
        comparison: args.comparison,
    };
    opts.window = match args.window {
        Some(bounds) if bounds.len() == 2 => run::WindowMode::Fixed {
            start: bounds[0].clone(),
            end: bounds[1].clone(),
        },
        _ if args.time_window => run::WindowMode::Interactive,
        _ => run::WindowMode::Off,
    };
    if opts.window != run::WindowMode::Off {
        opts.ticks = charts::TickGranularity::Seconds;
    }
    opts.skip_frames = args.no_parse;
    opts.aggregate = (args.aggregate || args.suite) && app_config.aggregation.enabled;
    opts.suite = args.suite;
    opts.save_csv |= args.save;
    opts.saved_aggregate = args.file_agg;

    tracing::info!(
        input = %opts.input_dir.display(),
        output = %opts.output_dir.display(),
        "starting analysis"
    );
    let mut sink = charts::DataExportSink::new();
    let summary = run::run(&opts, &mut sink)?;
    tracing::info!(
        files = summary.files_evaluated,
        failed = summary.files_failed,
        charts = summary.charts,
        aggregates = summary.aggregates.len(),
        "analysis finished"
    );
    Ok(())
}
