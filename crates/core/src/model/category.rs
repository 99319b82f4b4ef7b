use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Practice category an exercise belongs to.
///
/// The persisted key (`key()`) is the stable identity; adding a variant here
/// is picked up by the loader's repair pass on the next start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Addition,
    Subtraction,
    MultBreakdown,
    MultNear,
    Division,
    Fractions,
    Estimation,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Addition,
        Category::Subtraction,
        Category::MultBreakdown,
        Category::MultNear,
        Category::Division,
        Category::Fractions,
        Category::Estimation,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Category::Addition => "ADDITION",
            Category::Subtraction => "SUBTRACTION",
            Category::MultBreakdown => "MULT_BREAKDOWN",
            Category::MultNear => "MULT_NEAR",
            Category::Division => "DIVISION",
            Category::Fractions => "FRACTIONS",
            Category::Estimation => "ESTIMATION",
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Category::Addition => "Bigger Addition",
            Category::Subtraction => "Multi-Step Subtraction",
            Category::MultBreakdown => "Mental Breakdown",
            Category::MultNear => "Near-10 Mastery",
            Category::Division => "Division Explorer",
            Category::Fractions => "Fraction Power",
            Category::Estimation => "Estimation Champ",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category: {raw}")]
pub struct ParseCategoryError {
    raw: String,
}

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.key() == normalized)
            .ok_or_else(|| ParseCategoryError { raw: s.to_owned() })
    }
}
