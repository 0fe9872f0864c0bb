//! Cadence CLI command.
//!
//! Prints the configured regime bands, or resolves a single indicator value
//! to its band and polling interval. Useful when tuning band boundaries.

use anyhow::Result;
use clap::Args;
use optdesk_core::CadenceConfig;
use optdesk_scheduler::{CadenceBand, CadenceController, CadenceTable};

use super::ConfigArgs;

/// Arguments for the cadence command.
#[derive(Args, Debug, Clone)]
pub struct CadenceArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Indicator value to resolve (e.g. a VIX level). Omit to print the table.
    #[arg(long)]
    pub value: Option<f64>,
}

fn format_bound(bound: f64) -> String {
    if bound.is_finite() {
        format!("{bound}")
    } else if bound > 0.0 {
        "+inf".to_string()
    } else {
        "-inf".to_string()
    }
}

fn format_band(band: &CadenceBand) -> String {
    format!(
        "{:<10} ({}, {}]  every {}s",
        band.label,
        format_bound(band.lower),
        format_bound(band.upper),
        band.interval.as_secs()
    )
}

/// One line per band, or the single band `value` falls into.
///
/// # Errors
/// Returns an error if the band table is malformed.
pub fn describe(config: &CadenceConfig, value: Option<f64>) -> Result<Vec<String>> {
    let controller = CadenceController::new(CadenceTable::from_config(config)?);
    Ok(match value {
        Some(value) => vec![format!("{value} -> {}", format_band(controller.band_for(value)))],
        None => controller.table().bands().iter().map(format_band).collect(),
    })
}

/// Runs the cadence command.
///
/// # Errors
/// Returns an error if configuration cannot be loaded or the band table is malformed.
pub fn run_cadence(args: &CadenceArgs) -> Result<()> {
    let config = args.config.load()?;
    for line in describe(&config.cadence, args.value)? {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lists_every_band() {
        let lines = describe(&CadenceConfig::default(), None).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("LOW"));
        assert!(lines[0].contains("(-inf, 20]"));
        assert!(lines[2].contains("+inf"));
    }

    #[test]
    fn test_value_resolves_to_band() {
        let lines = describe(&CadenceConfig::default(), Some(22.0)).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("MEDIUM"));
        assert!(lines[0].contains("every 1800s"));
    }

    #[test]
    fn test_boundary_value_takes_calmer_band() {
        let lines = describe(&CadenceConfig::default(), Some(20.0)).unwrap();
        assert!(lines[0].contains("LOW"));
    }

    #[test]
    fn test_malformed_table_rejected() {
        let config = CadenceConfig { bands: Vec::new() };
        assert!(describe(&config, None).is_err());
    }
}
