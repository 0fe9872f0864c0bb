//! Regime bands: a step function from indicator value to polling interval.

use std::time::Duration;

use optdesk_core::{BandConfig, CadenceConfig};
use serde::Serialize;

use crate::error::CadenceError;

/// One contiguous range `(lower, upper]` of indicator values.
///
/// The first band's lower bound is `-inf` and the last band's upper bound is
/// `+inf`, so a validated table covers every real value exactly once. A value
/// sitting on a boundary belongs to the band below it (the calmer regime).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CadenceBand {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub interval: Duration,
}

impl CadenceBand {
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value > self.lower && value <= self.upper
    }
}

/// Ordered, validated band table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CadenceTable {
    bands: Vec<CadenceBand>,
}

impl CadenceTable {
    /// Builds a table from `(label, up_to, interval)` rows, calmest first.
    /// The final row must have `up_to = None`.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError`] if the rows are empty, unsorted, have a zero
    /// interval, or do not end in exactly one catch-all.
    pub fn new<I, S>(rows: I) -> Result<Self, CadenceError>
    where
        I: IntoIterator<Item = (S, Option<f64>, Duration)>,
        S: Into<String>,
    {
        let rows: Vec<(String, Option<f64>, Duration)> = rows
            .into_iter()
            .map(|(label, up_to, interval)| (label.into(), up_to, interval))
            .collect();
        if rows.is_empty() {
            return Err(CadenceError::Empty);
        }

        let last = rows.len() - 1;
        let mut lower = f64::NEG_INFINITY;
        let mut bands = Vec::with_capacity(rows.len());

        for (index, (label, up_to, interval)) in rows.into_iter().enumerate() {
            if interval.is_zero() {
                return Err(CadenceError::ZeroInterval { label });
            }
            let upper = match (up_to, index == last) {
                (None, true) => f64::INFINITY,
                (None, false) => return Err(CadenceError::CatchAllNotLast { label }),
                (Some(_), true) => return Err(CadenceError::MissingCatchAll),
                (Some(bound), false) if !bound.is_finite() => {
                    return Err(CadenceError::NonFiniteBound { label })
                }
                (Some(bound), false) if bound <= lower => {
                    return Err(CadenceError::NotIncreasing {
                        label,
                        previous: lower,
                        upper: bound,
                    })
                }
                (Some(bound), false) => bound,
            };
            bands.push(CadenceBand {
                label,
                lower,
                upper,
                interval,
            });
            lower = upper;
        }

        Ok(Self { bands })
    }

    /// # Errors
    ///
    /// See [`CadenceTable::new`].
    pub fn from_config(config: &CadenceConfig) -> Result<Self, CadenceError> {
        Self::new(config.bands.iter().map(|BandConfig { label, up_to, interval_secs }| {
            (label.clone(), *up_to, Duration::from_secs(*interval_secs))
        }))
    }

    #[must_use]
    pub fn bands(&self) -> &[CadenceBand] {
        &self.bands
    }
}

/// Maps indicator values onto polling intervals.
///
/// Pure: the result depends only on the band table and the input.
#[derive(Debug, Clone, PartialEq)]
pub struct CadenceController {
    table: CadenceTable,
}

impl CadenceController {
    #[must_use]
    pub const fn new(table: CadenceTable) -> Self {
        Self { table }
    }

    /// The band `value` falls into. NaN maps to the calmest band.
    #[must_use]
    pub fn band_for(&self, value: f64) -> &CadenceBand {
        let bands = self.table.bands();
        bands
            .iter()
            .find(|band| band.contains(value))
            .unwrap_or(&bands[0])
    }

    #[must_use]
    pub fn interval_for(&self, value: f64) -> Duration {
        self.band_for(value).interval
    }

    #[must_use]
    pub const fn table(&self) -> &CadenceTable {
        &self.table
    }
}
