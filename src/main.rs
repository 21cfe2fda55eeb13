//! Entry point for the memory-forensics analysis pipeline.

use clap::Parser;
use memforensics::cli::args::{Cli, ReportFormatArg};
use memforensics::driver::catalogue::CATALOGUE;
use memforensics::error::AnalysisError;
use memforensics::orchestrator::Orchestrator;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if cli.list_plugins {
        println!("windows.info.Info (always run first)");
        for entry in CATALOGUE {
            match entry.skip_reason {
                Some(reason) => println!("{} (skipped: {})", entry.name, reason),
                None => println!("{}", entry.name),
            }
        }
        return ExitCode::SUCCESS;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(cli.engine.clone(), cli.concurrency);
    match orchestrator.run(&cli.dump, &cli.output) {
        Ok(handle) => {
            println!("wrote {}", handle.json_path.display());
            println!("wrote {}", handle.markdown_path.display());
            match cli.format {
                ReportFormatArg::Text => println!("\n{}", handle.markdown),
                ReportFormatArg::Json => {
                    println!("\n{}", serde_json::to_string_pretty(&handle.summary)?)
                }
            }
            Ok(())
        }
        Err(AnalysisError::ImageNotFound(path)) => {
            Err(anyhow::anyhow!("memory image not found: {}", path.display()))
        }
        Err(other) => Err(other.into()),
    }
}
