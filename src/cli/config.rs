//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliModel, CliOutputFormat, CliPrecision};
use crate::config::{OutputFormat, PipelineOptions, Precision, SubjectModel};
use anyhow::{Context, Result};
use std::time::Duration;

/// Convert CLI arguments to `PipelineOptions`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build options from the JSON file (if any) with CLI flags layered on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineOptions> {
        let mut options = match &cli.config {
            Some(path) => PipelineOptions::from_json_file(path)
                .with_context(|| format!("Failed to load options from {}", path.display()))?,
            None => PipelineOptions::default(),
        };

        if let Some(model) = cli.model {
            options.model = model.into();
        }
        if let Some(precision) = cli.precision {
            options.precision = precision.into();
        }
        if let Some(level) = cli.edge_smoothing {
            options.edge_smoothing = level;
        }
        if let Some(format) = cli.format {
            options.output_format = format.into();
        }
        if let Some(seed) = cli.seed {
            options.seed = Some(seed);
        }

        options.validate().context("Invalid configuration")?;
        Ok(options)
    }

    /// Validate argument combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.jobs == 0 {
            anyhow::bail!("--jobs must be at least 1");
        }
        if cli.timeout_ms == Some(0) {
            anyhow::bail!("--timeout-ms must be greater than 0");
        }
        if let Some(ref pattern) = cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern '{}'", pattern))?;
        }
        let stdin_inputs = cli.input.iter().filter(|i| *i == "-").count();
        if stdin_inputs > 0 && cli.input.len() > 1 {
            anyhow::bail!("stdin (-) cannot be combined with other inputs");
        }
        Ok(())
    }

    pub(crate) fn timeout(cli: &Cli) -> Option<Duration> {
        cli.timeout_ms.map(Duration::from_millis)
    }
}

impl From<CliModel> for SubjectModel {
    fn from(model: CliModel) -> Self {
        match model {
            CliModel::Person => Self::Person,
            CliModel::Product => Self::Product,
            CliModel::Animal => Self::Animal,
            CliModel::Car => Self::Car,
            CliModel::Building => Self::Building,
            CliModel::General => Self::General,
        }
    }
}

impl From<CliPrecision> for Precision {
    fn from(precision: CliPrecision) -> Self {
        match precision {
            CliPrecision::Fast => Self::Fast,
            CliPrecision::Balanced => Self::Balanced,
            CliPrecision::Precise => Self::Precise,
        }
    }
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Webp => Self::WebP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("offline-bgremove").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults_without_flags() {
        let cli = parse(&["in.png"]);
        let options = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(options, PipelineOptions::default());
        assert!(CliConfigBuilder::timeout(&cli).is_none());
    }

    #[test]
    fn test_flags_override_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"model":"car","precision":"fast","edge_smoothing":4,"seed":5}}"#)
            .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = parse(&["in.png", "--config", &path, "--precision", "precise", "--seed", "9"]);
        let options = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(options.model, SubjectModel::Car);
        assert_eq!(options.precision, Precision::Precise);
        assert_eq!(options.edge_smoothing, 4);
        assert_eq!(options.seed, Some(9));
    }

    #[test]
    fn test_edge_smoothing_range_enforced_by_parser() {
        let result = Cli::try_parse_from(["offline-bgremove", "in.png", "--edge-smoothing", "6"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_cli_rejects_bad_combinations() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["-", "other.png"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["in.png", "--jobs", "0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["in.png", "--timeout-ms", "0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["dir", "--pattern", "*.png"])).is_ok());
    }
}
