//! junos-push - push set-format configuration to Junos device pairs
//!
//! This is the main entry point for the junos-push CLI.

mod cli;

use anyhow::Result;
use cli::output::OutputFormatter;
use cli::Cli;
use is_terminal::IsTerminal;
use junos_push::device::JunosCliTransport;
use junos_push::error::Error;
use junos_push::runner::PushRunner;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbosity());

    if cli.verbosity() >= 2 {
        eprintln!("junos-push v{}", VERSION);
    }

    let output = OutputFormatter::new(
        !cli.no_color && std::io::stdout().is_terminal(),
        cli.is_json(),
        cli.verbosity(),
    );

    let runner = PushRunner::new(Arc::new(JunosCliTransport::new()));
    let options = cli.run_options();

    let prepared = match runner.prepare(&options) {
        Ok(prepared) => prepared,
        Err(e) => {
            output.error(&e.to_string());
            if let Error::Validation { problems, .. } = &e {
                for problem in problems {
                    output.error(problem);
                }
            }
            std::process::exit(1);
        }
    };

    output.banner(&format!(
        "{} [{}]",
        prepared.request.kind.as_str().to_uppercase(),
        prepared.request.group.name
    ));
    for device in prepared.request.group.iter() {
        output.info(&format!("{}", device));
    }
    if let Some(validated) = &prepared.validated {
        output.validation(validated);
    }
    if prepared.request.flags.dry_run {
        output.warning("dry run: no configuration will be loaded or committed");
    }

    let spinner = output.create_spinner(&format!(
        "Running {} on {}",
        prepared.request.kind,
        prepared
            .request
            .group
            .iter()
            .map(|d| d.host.as_str())
            .collect::<Vec<_>>()
            .join(" and ")
    ));
    let mut result = runner.execute(&prepared).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    result.report.observe_commit_windows(chrono::Utc::now());

    if cli.is_json() {
        output.json(&result)?;
    } else {
        if let Some(preflight) = &result.preflight {
            output.preflight(preflight);
        }
        output.recap(&result.report);
    }

    std::process::exit(result.report.exit_code());
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity >= 2),
        )
        .with(env_filter)
        .init();
}
