//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{default_workers, BatchOptions, CurationParams, Rotation};
use anyhow::{Context, Result};

/// Convert CLI arguments to validated curation parameters and batch options
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `CurationParams` from CLI arguments
    pub(crate) fn params_from_cli(cli: &Cli) -> Result<CurationParams> {
        let rotation = Rotation::try_from(cli.rotate).context("Invalid --rotate value")?;

        CurationParams::builder()
            .stride(cli.interval)
            .sharpness_threshold(cli.sharpness)
            .duplicate_threshold(cli.duplicate)
            .rotation(rotation)
            .dry_run(cli.dry_run)
            .build()
            .context("Invalid curation parameters")
    }

    /// Build `BatchOptions` from CLI arguments
    ///
    /// A worker count of 0 means one worker per available CPU, and a limit
    /// of 0 means no limit.
    pub(crate) fn options_from_cli(cli: &Cli) -> Result<BatchOptions> {
        let workers = if cli.workers == 0 {
            default_workers()
        } else {
            cli.workers
        };
        let limit = cli.limit.filter(|&limit| limit > 0);

        let options = BatchOptions::new(workers).with_limit(limit);
        options.validate().context("Invalid batch options")?;
        Ok(options)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        Self::params_from_cli(cli)?;
        Self::options_from_cli(cli)?;

        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid --pattern '{pattern}'"))?;
        }

        Ok(())
    }
}
