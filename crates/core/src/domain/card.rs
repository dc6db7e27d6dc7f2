use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MASKED_LENGTH: usize = 16;

/// Last four digits of a payment card, the only card reference that leaves the router.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardLastFour(String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CardIdentifierError {
    #[error("card identifier is empty")]
    Empty,
    #[error("card identifier must contain only digits")]
    NonNumeric,
    #[error("card identifier must have at least 4 digits")]
    TooShort,
}

impl CardLastFour {
    /// Accepts `4444`, a full number, or a grouped number like `4111-1111-1111-4444`.
    pub fn parse(raw: &str) -> Result<Self, CardIdentifierError> {
        let compact =
            raw.chars().filter(|ch| !ch.is_whitespace() && *ch != '-').collect::<String>();
        if compact.is_empty() {
            return Err(CardIdentifierError::Empty);
        }
        if !compact.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(CardIdentifierError::NonNumeric);
        }
        if compact.len() < 4 {
            return Err(CardIdentifierError::TooShort);
        }
        Ok(Self(compact[compact.len() - 4..].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        format!("{}{}", "*".repeat(MASKED_LENGTH - 4), self.0)
    }
}

impl fmt::Display for CardLastFour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Masks whatever the caller passed as a card reference, for logs and API responses.
pub fn mask_card_identifier(raw: &str) -> String {
    match CardLastFour::parse(raw) {
        Ok(last_four) => last_four.masked(),
        Err(_) => "****".to_string(),
    }
}
