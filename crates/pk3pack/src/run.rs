use std::process::ExitCode;

use anyhow::Context;
use packer::{pack, PackOptions, PackSummary};
use pakfs::CancelToken;
use tracing_subscriber::EnvFilter;

use crate::cli::Args;

/// Interrupted runs exit like a SIGINT-terminated process.
const EXIT_CANCELED: u8 = 130;
const EXIT_FAILURE: u8 = 2;

pub fn run(args: Args) -> ExitCode {
    initialise_tracing(args.verbose);

    let cancel = CancelToken::new();
    if let Err(error) = install_interrupt_handler(&cancel) {
        tracing::warn!(%error, "failed to install interrupt handler");
    }

    let options = PackOptions {
        map_file: args.map_file,
        output: args.output,
        overwrite: args.overwrite,
        dry_run: args.dry_run,
        use_shaderlist: !args.no_shaderlist,
        include_source: args.include_source,
        require_all_assets: args.require_all,
        load_archives: args.load_pk3s,
        exclude_sources: args.exclude_sources,
        ignore_sources: args.ignore_sources,
    };

    match pack(&options, &cancel) {
        Ok(summary) => {
            report(&summary);
            ExitCode::SUCCESS
        }
        Err(error) if error.is_canceled() => {
            eprintln!("operation canceled");
            ExitCode::from(EXIT_CANCELED)
        }
        Err(error) => {
            let error = anyhow::Error::new(error);
            tracing::error!("{error:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn initialise_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn install_interrupt_handler(cancel: &CancelToken) -> anyhow::Result<()> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || cancel.cancel()).context("registering Ctrl-C handler")?;
    Ok(())
}

fn report(summary: &PackSummary) {
    if summary.dry_run {
        tracing::info!(
            entries = summary.entries.len(),
            warnings = summary.warnings,
            "dry run complete; nothing written"
        );
        for entry in &summary.entries {
            tracing::info!(entry = %entry, "would pack");
        }
    } else {
        tracing::info!(
            entries = summary.entries.len(),
            warnings = summary.warnings,
            output = %summary.output.display(),
            "wrote archive"
        );
    }
}
