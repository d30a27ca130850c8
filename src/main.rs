use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Arg, ArgAction, Command};
use log::info;

use egress_core::config::{PipelineConfig, app_name, version};
use egress_core::output::naming::{IdentitySeed, prepare_output};
use egress_core::pipeline::{Bin, Engine, ErrorReporter, MemoryEngine, PipelineCoordinator};

fn print_bin(bin: &Bin, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{}/", indent, bin.name());
    for stage in bin.stages() {
        print!("{}  {} ({})", indent, stage.name(), stage.factory());
        for key in stage.factory().properties() {
            if let Some(value) = stage.property(key) {
                print!(" {}={}", key, value);
            }
        }
        println!();
    }
    for child in bin.bins() {
        print_bin(child, depth + 1);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let app_name = app_name();

    let matches = Command::new(app_name)
        .version(version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("request")
                .value_name("REQUEST")
                .help("Path to the JSON session request.")
                .required(true),
        )
        .arg(
            Arg::new("tmp-dir")
                .long("tmp-dir")
                .value_name("DIR")
                .help("Local working directory for the session.")
                .required(false),
        )
        .arg(
            Arg::new("print-graph")
                .long("print-graph")
                .help("Print the resulting graph.")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let request = matches
        .get_one::<String>("request")
        .context("missing request path")?;
    let mut conf = PipelineConfig::load(request)
        .with_context(|| format!("failed to load request {}", request))?;
    if let Some(dir) = matches.get_one::<String>("tmp-dir") {
        conf.tmp_dir = PathBuf::from(dir);
    }

    let seed = IdentitySeed::from_config(&conf, Utc::now());
    let plan = prepare_output(&conf, &seed)
        .with_context(|| format!("failed to prepare {}", conf.tmp_dir.display()))?;
    if let Some(plan) = &plan {
        println!("{}", serde_json::to_string_pretty(plan)?);
    }

    let engine = Arc::new(MemoryEngine::new());
    let (errors, mut rx) = ErrorReporter::new();
    let coordinator = PipelineCoordinator::build(
        engine.clone() as Arc<dyn Engine>,
        Arc::new(conf),
        plan.as_ref(),
        errors,
    )?;
    coordinator.start()?;
    info!("{} {} ready ({})", app_name, version(), coordinator.state());

    if matches.get_flag("print-graph") {
        print_bin(&engine.snapshot(), 0);
    }
    while let Ok(report) = rx.try_recv() {
        eprintln!("{}", report);
    }
    Ok(())
}
