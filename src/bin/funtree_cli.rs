// src/bin/funtree_cli.rs
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use funtree::config::{load_config, RunConfig};
use funtree::errors::Result;
use funtree::run_tree_interpretation;
use funtree::taxdb::parse_genus_list;
use funtree::types::Dataset;

#[derive(Parser, Debug)]
#[command(name = "funtree", version, about = "Interpret built gene trees into species assignments")]
struct Args {
    /// Dataset registry (JSON) with samples and their group/gene partitions
    #[arg(short, long)]
    dataset: PathBuf,

    /// Run configuration (TOML); defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Genus list, one genus per line
    #[arg(short, long)]
    genus_list: Option<PathBuf>,

    /// Worker threads, overrides the config
    #[arg(short, long)]
    thread: Option<usize>,

    /// Write the dataset with folded-in assignments here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// -v debug logging, -vv sequential execution
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn spinner(color: &str, message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{}}} {{msg}}", color);
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner
}

fn run(args: &Args) -> Result<()> {
    // 1. Load configuration and dataset
    let loading = spinner("blue", "Loading configuration and dataset...");
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RunConfig::default(),
    };
    if let Some(thread) = args.thread {
        config.thread = thread;
    }
    config.verbose = config.verbose.max(1 + args.verbose);

    let mut dataset = Dataset::load_json(&args.dataset)?;
    if let Some(path) = &args.genus_list {
        dataset.genera = parse_genus_list(path)?;
    }
    loading.finish_with_message(format!(
        "Loaded {} samples in {} groups.",
        dataset.funinfo.len(),
        dataset.partitions.len()
    ));

    // 2. Interpret, synchronize, visualize
    let working = spinner("green", "Interpreting trees...");
    let results = run_tree_interpretation(&mut dataset, &config)?;
    working.finish_with_message(format!(
        "Interpreted {} trees.",
        results.tree_results.len()
    ));

    // 3. Write outputs
    let writing = spinner("yellow", "Writing report...");
    let report_path = config.report_path();
    if let Some(dir) = report_path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&report_path, results.get_report_text())?;

    if let Some(path) = &args.output {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &dataset)?;
    }
    writing.finish_with_message(format!("Report written to {}", report_path.display()));

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_fatal_defect() {
                log::error!("Internal error, please report it: {}", e);
            } else {
                log::error!("{}", e);
            }
            eprintln!("funtree: {}", e);
            ExitCode::FAILURE
        }
    }
}
