/// `LogLens` - log investigation from the command line
///
/// Copyright (C) 2026 LogLens contributors
///
/// This program is free software: you can redistribute it and/or modify
/// it under the terms of the GNU General Public License as published by
/// the Free Software Foundation, either version 3 of the License, or
/// (at your option) any later version.
///
/// This program is distributed in the hope that it will be useful,
/// but WITHOUT ANY WARRANTY; without even the implied warranty of
/// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
/// GNU General Public License for more details.
///
/// You should have received a copy of the GNU General Public License
/// along with this program.  If not, see <https://www.gnu.org/licenses/>.
use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use loglens::anomaly::TemplateGroup;
use loglens::core::{
    AnalysisMode, AnalysisReport, FileSource, FilterRule, InspectSession, LineStore, SourceReader,
    StdinSource,
};
use loglens::parser::{LogLine, ParserRegistry};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AnalyzeArg {
    Templates,
    Fields,
}

#[derive(Parser, Debug)]
#[command(name = "loglens")]
#[command(version)]
#[command(about = "Inspect log files: parse, filter, group and score against a baseline", long_about = None)]
struct Args {
    /// Log file(s) to inspect; several files merge by timestamp.
    /// Omit to read from a pipe on stdin.
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Follow the file for new lines after the initial load
    #[arg(short, long)]
    tail: bool,

    /// Baseline log file for anomaly detection
    #[arg(short, long, value_name = "FILE")]
    baseline: Option<PathBuf>,

    /// Force a specific format parser instead of auto-detection
    #[arg(short, long, value_name = "NAME")]
    parser: Option<String>,

    /// JSON file with a saved filter rule list
    #[arg(short, long, value_name = "FILE")]
    filters: Option<PathBuf>,

    /// Print an analysis instead of the lines themselves
    #[arg(long, value_enum, value_name = "MODE")]
    analyze: Option<AnalyzeArg>,

    /// Print the anomaly report (requires --baseline)
    #[arg(long)]
    anomalies: bool,

    /// Emit lines as JSON objects instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "loglens starting");

    let registry = Arc::new(build_registry(args.parser.as_deref())?);
    let store = LineStore::new();
    let mut reader = SourceReader::new(Arc::clone(&store), Arc::clone(&registry));

    if args.tail && args.files.len() > 1 {
        bail!("--tail is only supported with a single file");
    }

    let tailing = if args.files.is_empty() {
        if std::io::stdin().is_terminal() {
            bail!("provide a file or pipe input");
        }
        reader.stream(Box::new(StdinSource::new()))?;
        true
    } else if args.files.len() > 1 {
        let report = reader.load_merged(&args.files)?;
        for (path, err) in &report.failed {
            eprintln!("warning: skipped {}: {err}", path.display());
        }
        if report.loaded == 0 && !report.failed.is_empty() {
            bail!("no source could be read");
        }
        false
    } else if args.tail {
        reader.tail_file(&args.files[0])?;
        true
    } else {
        reader.load_auto(&args.files[0])?;
        while !store.progress().complete {
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    };

    let mut session = InspectSession::new(Arc::clone(&store), registry);

    if let Some(path) = &args.filters {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading filter file {}", path.display()))?;
        let rules: Vec<FilterRule> = serde_json::from_str(&text)
            .with_context(|| format!("parsing filter file {}", path.display()))?;
        for error in session.set_filter_rules(rules) {
            eprintln!("warning: filter rule disabled: {error}");
        }
    }

    if let Some(path) = &args.baseline {
        let source = FileSource::open(path)?;
        let drained = session.load_baseline(Box::new(source))?;
        info!(lines = drained, path = %path.display(), "baseline loaded");
    }

    if args.anomalies {
        if session.anomaly_result().is_none() {
            bail!("--anomalies requires --baseline");
        }
        print_anomalies(&mut session);
        return Ok(());
    }

    if let Some(mode) = args.analyze {
        let mode = match mode {
            AnalyzeArg::Templates => AnalysisMode::Templates,
            AnalyzeArg::Fields => AnalysisMode::Fields,
        };
        print_analysis(&session.analyze(mode));
        return Ok(());
    }

    let printed = print_lines(&mut session, args.json)?;

    if tailing {
        follow(&mut session, printed, args.json)?;
    }
    Ok(())
}

fn build_registry(parser: Option<&str>) -> anyhow::Result<ParserRegistry> {
    let registry = ParserRegistry::with_default_formats();
    if let Some(name) = parser {
        if registry.find(name).is_none() {
            let known: Vec<&str> = registry.parsers().map(|p| p.name()).collect();
            bail!("unknown parser `{name}` (known: {})", known.join(", "));
        }
        // A forced parser narrows the registry to that one dialect
        let mut narrowed = ParserRegistry::new();
        for candidate in ParserRegistry::with_default_formats().into_parsers() {
            if candidate.name() == name {
                narrowed.register(candidate);
            }
        }
        return Ok(narrowed);
    }
    Ok(registry)
}

/// Print the filtered snapshot; returns the snapshot length so a
/// follow-up tail knows where to pick up.
fn print_lines(session: &mut InspectSession, json: bool) -> anyhow::Result<usize> {
    let total = session.total_lines();
    let indices = session.apply_filters();
    for index in indices {
        if let Some(line) = session.line(index) {
            print_line(&line, json)?;
        }
    }
    Ok(total)
}

fn print_line(line: &LogLine, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(line)?);
    } else {
        println!("{}", line.raw);
    }
    Ok(())
}

/// Poll the store and print lines as the tail appends them.
fn follow(session: &mut InspectSession, from: usize, json: bool) -> anyhow::Result<()> {
    let mut printed = from;
    loop {
        let progress = session.progress();
        while printed < session.total_lines() {
            if let Some(line) = session.line(printed) {
                if session.check_line(&line) {
                    print_line(&line, json)?;
                }
            }
            printed += 1;
        }
        if progress.complete {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

fn print_analysis(report: &AnalysisReport) {
    match report {
        AnalysisReport::Templates(groups) => {
            for group in groups {
                let level = group
                    .level
                    .map_or_else(|| "-".to_string(), |l| l.to_string());
                println!("{:>8}  {:<5}  {}", group.count, level, group.display);
            }
        }
        AnalysisReport::Fields(groups) => {
            for group in groups {
                println!("{:>8}  {}", group.count, group.display);
            }
        }
    }
}

fn print_anomalies(session: &mut InspectSession) {
    let spike_multiplier = session.anomaly_config().spike_multiplier;
    let Some(result) = session.anomaly_result() else {
        return;
    };
    println!(
        "{} anomalous lines ({} novel templates, {} spikes over {spike_multiplier}x)",
        result.anomaly_count,
        result.novel_templates.len(),
        result.frequency_spikes.len(),
    );
    if !result.novel_templates.is_empty() {
        println!("\nnovel templates:");
        for group in &result.novel_templates {
            print_template(group);
        }
    }
    if !result.frequency_spikes.is_empty() {
        println!("\nfrequency spikes:");
        for spike in &result.frequency_spikes {
            println!(
                "{:>8}  (baseline {})  {}",
                spike.current_count, spike.baseline_count, spike.template.display
            );
        }
    }
    if !result.disappeared_templates.is_empty() {
        println!("\ndisappeared templates:");
        for template in &result.disappeared_templates {
            println!("          {template}");
        }
    }
}

fn print_template(group: &TemplateGroup) {
    println!("{:>8}  {}", group.count, group.display);
}
