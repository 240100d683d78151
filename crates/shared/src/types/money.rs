//! Currencies and their minor-unit precision.
//!
//! Amounts are always `rust_decimal::Decimal`; floats never touch money.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Integer digits of a stored amount; amount columns are `DECIMAL(19, 4)`.
pub const AMOUNT_INTEGER_DIGITS: u32 = 15;

/// Returns true if `amount` fits a `DECIMAL(19, 4)` amount column.
#[must_use]
pub fn fits_amount_column(amount: Decimal) -> bool {
    amount.abs() < Decimal::from(10_i64.pow(AMOUNT_INTEGER_DIGITS))
}

/// ISO 4217 currency codes a branch can book in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Philippine Peso
    #[default]
    Php,
    /// US Dollar
    Usd,
    /// Euro
    Eur,
    /// Indonesian Rupiah
    Idr,
    /// Singapore Dollar
    Sgd,
    /// Japanese Yen
    Jpy,
}

impl Currency {
    /// Number of decimal places of the currency's minor unit.
    #[must_use]
    pub const fn minor_units(self) -> u32 {
        match self {
            Self::Jpy => 0,
            Self::Php | Self::Usd | Self::Eur | Self::Idr | Self::Sgd => 2,
        }
    }

    /// Returns true if `amount` carries no more precision than the minor unit allows.
    #[must_use]
    pub fn fits_precision(self, amount: Decimal) -> bool {
        amount.normalize().scale() <= self.minor_units()
    }

    /// Returns the ISO 4217 code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Php => "PHP",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Idr => "IDR",
            Self::Sgd => "SGD",
            Self::Jpy => "JPY",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PHP" => Ok(Self::Php),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "IDR" => Ok(Self::Idr),
            "SGD" => Ok(Self::Sgd),
            "JPY" => Ok(Self::Jpy),
            _ => Err(format!("Unknown currency: {s}")),
        }
    }
}
