//! Command-line front end: CSV candle ingestion, YAML config, replay /
//! time-shift / indicator-dump subcommands, JSON and CSV export.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use chrono::{Duration, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use cb_core::{
    indicators, run_combined, run_time_shifted, Candle, SessionReport, StrategyParams,
    TimeShiftParams,
};

#[derive(Parser)]
#[command(name = "cb", version, about = "Dual-direction RSI/EMA cycle backtester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the combined long + short strategy over a candle CSV.
    Replay(ReplayArgs),
    /// Replay with the deposit split into staggered tranches.
    TimeShift(TimeShiftArgs),
    /// Compute RSI/EMA over the series and dump them as CSV.
    DumpIndicators(DumpArgs),
}

#[derive(clap::Args)]
struct ReplayArgs {
    /// Candle CSV: timestamp_ms,open,high,low,close,volume
    #[arg(long)]
    candles: PathBuf,
    /// YAML config with `strategy:` and `time_shift:` sections
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the full run (cycles, trades, logs) as JSON
    #[arg(long)]
    json_out: Option<PathBuf>,
    /// Write the per-cycle breakdown as CSV
    #[arg(long)]
    cycles_csv: Option<PathBuf>,
    /// Print every cycle's audit log to stdout
    #[arg(long)]
    show_log: bool,
}

#[derive(clap::Args)]
struct TimeShiftArgs {
    #[arg(long)]
    candles: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the number of deposit tranches
    #[arg(long)]
    parts: Option<usize>,
    /// Override the tranche entry spacing in days
    #[arg(long)]
    interval_days: Option<f64>,
    #[arg(long)]
    json_out: Option<PathBuf>,
}

#[derive(clap::Args)]
struct DumpArgs {
    #[arg(long)]
    candles: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output path; stdout when omitted
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    strategy: StrategyParams,
    time_shift: TimeShiftParams,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay(args) => cmd_replay(args),
        Commands::TimeShift(args) => cmd_time_shift(args),
        Commands::DumpIndicators(args) => cmd_dump_indicators(args),
    }
}

fn cmd_replay(args: ReplayArgs) {
    let config = load_config(args.config.as_deref());
    let mut candles = load_candles(&args.candles);
    indicators::enrich(&mut candles, &config.strategy);

    let run = match run_combined(&candles, &config.strategy) {
        Ok(run) => run,
        Err(e) => fail(&e.to_string()),
    };
    let report = SessionReport::from_run(&run);
    print!("{}", report.summary());

    if args.show_log {
        for cycle in &run.cycles {
            println!("--- cycle {} ---", cycle.id);
            for entry in &cycle.logs {
                println!(
                    "{} {:?} {} [realized {:+.4}%] open: {}",
                    entry.time, entry.action, entry.detail, entry.realized_pnl, entry.open_positions
                );
            }
        }
    }

    if let Some(path) = &args.json_out {
        write_json(path, &run);
        eprintln!("[cb] run written to {}", path.display());
    }
    if let Some(path) = &args.cycles_csv {
        write_file(path, &report.cycles_csv());
        eprintln!("[cb] cycle table written to {}", path.display());
    }
}

fn cmd_time_shift(args: TimeShiftArgs) {
    let config = load_config(args.config.as_deref());
    let mut shift = config.time_shift;
    shift.enabled = true;
    if let Some(parts) = args.parts {
        shift.deposit_parts = parts;
    }
    if let Some(days) = args.interval_days {
        shift.entry_interval_days = days;
    }

    let mut candles = load_candles(&args.candles);
    indicators::enrich(&mut candles, &config.strategy);

    let run = match run_time_shifted(&candles, &config.strategy, &shift) {
        Ok(run) => run,
        Err(e) => fail(&e.to_string()),
    };

    println!(
        "tranches: {} active of {} requested, {:.1} trading days",
        run.active_parts, shift.deposit_parts, run.trading_days
    );
    for part in &run.parts {
        println!(
            "  part {} @ {} (+{:.1}d, weight {:.3}): {:+.4}% realized, {} trades, {} cycles",
            part.part_id,
            part.start_time,
            part.start_offset_days,
            part.deposit_fraction,
            part.run.realized_pnl,
            part.run.all_closed.len(),
            part.run.cycles.len(),
        );
    }
    println!(
        "weighted pnl: {:+.4}% realized, {:+.4}% unrealized, {:+.4}% total",
        run.realized_pnl, run.unrealized_pnl, run.total_pnl
    );
    println!(
        "weighted average return: {:+.4}%",
        run.weighted_average_return
    );
    println!(
        "cycles: {} total, {} closed, {} forced closures",
        run.total_cycles, run.closed_cycles, run.forced_closures
    );

    if let Some(path) = &args.json_out {
        write_json(path, &run);
        eprintln!("[cb] run written to {}", path.display());
    }
}

fn cmd_dump_indicators(args: DumpArgs) {
    let config = load_config(args.config.as_deref());
    let mut candles = load_candles(&args.candles);
    indicators::enrich(&mut candles, &config.strategy);

    let mut out = String::from("timestamp_ms,display_time,close,rsi,ema\n");
    for c in &candles {
        let rsi = c.rsi.map(|v| format!("{v:.6}")).unwrap_or_default();
        let ema = c.ema.map(|v| format!("{v:.6}")).unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            c.timestamp_ms, c.display_time, c.close, rsi, ema
        ));
    }
    match &args.out {
        Some(path) => {
            write_file(path, &out);
            eprintln!("[cb] indicators written to {}", path.display());
        }
        None => print!("{out}"),
    }
}

// --- input -----------------------------------------------------------------

fn load_config(path: Option<&Path>) -> FileConfig {
    let Some(path) = path else {
        return FileConfig::default();
    };
    let raw = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(&format!("cannot read config {}: {e}", path.display())));
    serde_yaml::from_str(&raw)
        .unwrap_or_else(|e| fail(&format!("cannot parse config {}: {e}", path.display())))
}

fn load_candles(path: &Path) -> Vec<Candle> {
    let raw = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(&format!("cannot read candles {}: {e}", path.display())));

    let mut candles = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 6 {
            fail(&format!(
                "{}:{}: expected 6 fields, got {}",
                path.display(),
                lineno + 1,
                fields.len()
            ));
        }
        // header row
        if lineno == 0 && fields[0].parse::<i64>().is_err() {
            continue;
        }
        let ts: i64 = parse_field(path, lineno, fields[0]);
        candles.push(Candle::new(
            ts,
            display_time(ts),
            parse_field(path, lineno, fields[1]),
            parse_field(path, lineno, fields[2]),
            parse_field(path, lineno, fields[3]),
            parse_field(path, lineno, fields[4]),
            parse_field(path, lineno, fields[5]),
        ));
    }
    if candles.is_empty() {
        fail(&format!("{}: no candles parsed", path.display()));
    }
    candles
}

fn parse_field<T: std::str::FromStr>(path: &Path, lineno: usize, raw: &str) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        fail(&format!(
            "{}:{}: cannot parse field {raw:?}",
            path.display(),
            lineno + 1
        ))
    })
}

/// Exchange-local display time: UTC+2, `YYYY-MM-DD HH:MM:SS`.
fn display_time(ts_ms: i64) -> String {
    match Utc.timestamp_millis_opt(ts_ms) {
        chrono::LocalResult::Single(dt) => (dt + Duration::hours(2))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        _ => ts_ms.to_string(),
    }
}

// --- output ----------------------------------------------------------------

fn write_json<T: serde::Serialize>(path: &Path, value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| fail(&format!("cannot serialize result: {e}")));
    write_file(path, &json);
}

fn write_file(path: &Path, contents: &str) {
    fs::write(path, contents)
        .unwrap_or_else(|e| fail(&format!("cannot write {}: {e}", path.display())));
}

fn fail(msg: &str) -> ! {
    eprintln!("[cb] error: {msg}");
    process::exit(1);
}

// ---------------------------------------------------------------------------
