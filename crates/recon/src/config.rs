use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

// ---------------------------------------------------------------------------
// Import context
// ---------------------------------------------------------------------------

/// Settings threaded through one import run. Not persisted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportContext {
    /// Scopes every lead created or updated by the run.
    pub subsidiary: String,
    /// Gates the mission aggregator.
    #[serde(default)]
    pub import_missions: bool,
    /// When set, the first failing record aborts the rest of its subject.
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default)]
    pub sales: SalesConfig,
}

fn default_fail_fast() -> bool {
    true
}

fn default_currency_symbol() -> String {
    "€".to_string()
}

impl ImportContext {
    pub fn new(subsidiary: impl Into<String>) -> Self {
        Self {
            subsidiary: subsidiary.into(),
            import_missions: false,
            fail_fast: default_fail_fast(),
            currency_symbol: default_currency_symbol(),
            sales: SalesConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sales scale
// ---------------------------------------------------------------------------

/// Conversion of raw currency sums into the sales scale.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SalesConfig {
    /// Raw currency sums are divided by this. 1000 yields thousands.
    #[serde(default = "default_divisor")]
    pub divisor: Decimal,
    #[serde(default)]
    pub rounding: Rounding,
    /// Decimal places kept by the rounding modes.
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_divisor() -> Decimal {
    Decimal::ONE_THOUSAND
}

fn default_decimals() -> u32 {
    3
}

impl Default for SalesConfig {
    fn default() -> Self {
        Self {
            divisor: default_divisor(),
            rounding: Rounding::default(),
            decimals: default_decimals(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Keep every digit produced by the division.
    #[default]
    Exact,
    /// Banker's rounding at `decimals` places.
    HalfEven,
    /// Ties away from zero at `decimals` places.
    HalfUp,
}

impl SalesConfig {
    /// Scale a raw currency sum. Only valid after [`ImportContext::validate`].
    /// `None` when the quotient does not fit a `Decimal`.
    pub fn scale(&self, raw: Decimal) -> Option<Decimal> {
        let scaled = raw.checked_div(self.divisor)?;
        let rounded = match self.rounding {
            Rounding::Exact => scaled,
            Rounding::HalfEven => {
                scaled.round_dp_with_strategy(self.decimals, RoundingStrategy::MidpointNearestEven)
            }
            Rounding::HalfUp => {
                scaled.round_dp_with_strategy(self.decimals, RoundingStrategy::MidpointAwayFromZero)
            }
        };
        Some(rounded.normalize())
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ImportContext {
    pub fn from_toml(input: &str) -> Result<Self, ImportError> {
        let ctx: ImportContext =
            toml::from_str(input).map_err(|e| ImportError::ConfigParse(e.to_string()))?;
        ctx.validate()?;
        Ok(ctx)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.subsidiary.trim().is_empty() {
            return Err(ImportError::ConfigValidation(
                "subsidiary must not be empty".into(),
            ));
        }

        if self.sales.divisor <= Decimal::ZERO {
            return Err(ImportError::ConfigValidation(format!(
                "sales.divisor must be positive, got {}",
                self.sales.divisor
            )));
        }

        // Decimal carries at most 28 fractional digits
        if self.sales.decimals > 28 {
            return Err(ImportError::ConfigValidation(format!(
                "sales.decimals must be at most 28, got {}",
                self.sales.decimals
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
