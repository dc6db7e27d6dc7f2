use std::collections::BTreeMap;

use finagent_core::config::CardApiConfig;
use finagent_core::domain::card::CardLastFour;
use finagent_core::domain::intent::ActionDetails;

/// A card action that passed the policy and may be sent to the card service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovedCardAction {
    pub action: String,
    pub card: CardLastFour,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow(ApprovedCardAction),
    Deny { reason_code: &'static str, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardActionPolicy {
    allowed_actions: Vec<String>,
}

impl Default for CardActionPolicy {
    fn default() -> Self {
        Self::new(["activate", "deactivate"])
    }
}

impl CardActionPolicy {
    pub fn new<I, S>(allowed_actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_actions: allowed_actions
                .into_iter()
                .map(|action| action.into().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &CardApiConfig) -> Self {
        Self::new(config.allowed_actions.iter().cloned())
    }

    pub fn allowed_actions(&self) -> &[String] {
        &self.allowed_actions
    }

    pub fn evaluate(&self, details: &ActionDetails) -> GuardrailDecision {
        let action = details.action.trim().to_ascii_lowercase();
        if !self.allowed_actions.contains(&action) {
            return GuardrailDecision::Deny {
                reason_code: "unsupported_action",
                reason: format!(
                    "Unsupported card action '{}'. Supported actions: {}",
                    details.action.trim(),
                    self.allowed_actions.join(", ")
                ),
            };
        }

        let card = match CardLastFour::parse(&details.card_identifier) {
            Ok(card) => card,
            Err(error) => {
                return GuardrailDecision::Deny {
                    reason_code: "invalid_card_identifier",
                    reason: format!("Invalid card identifier: {error}"),
                }
            }
        };

        if let Some(cvv) = details.parameters.get("cvv") {
            if !is_valid_cvv(cvv) {
                return GuardrailDecision::Deny {
                    reason_code: "invalid_cvv",
                    reason: "CVV must be 3 or 4 digits".to_string(),
                };
            }
        }

        if let Some(expiry) = details.parameters.get("expiryDate") {
            if !is_valid_expiry(expiry) {
                return GuardrailDecision::Deny {
                    reason_code: "invalid_expiry_date",
                    reason: "Expiry date must be in MM/YY or MM/YYYY format".to_string(),
                };
            }
        }

        GuardrailDecision::Allow(ApprovedCardAction {
            action,
            card,
            parameters: details.parameters.clone(),
        })
    }
}

fn is_valid_cvv(cvv: &str) -> bool {
    let cvv = cvv.trim();
    matches!(cvv.len(), 3 | 4) && cvv.chars().all(|ch| ch.is_ascii_digit())
}

fn is_valid_expiry(expiry: &str) -> bool {
    let Some((month, year)) = expiry.trim().split_once('/') else {
        return false;
    };
    let month_ok = month.len() == 2
        && month.chars().all(|ch| ch.is_ascii_digit())
        && month.parse::<u8>().map(|value| (1..=12).contains(&value)).unwrap_or(false);
    let year_ok = matches!(year.len(), 2 | 4) && year.chars().all(|ch| ch.is_ascii_digit());
    month_ok && year_ok
}

#[cfg(test)]
mod tests {
    use finagent_core::domain::intent::ActionDetails;

    use super::{CardActionPolicy, GuardrailDecision};

    fn deny_reason(decision: GuardrailDecision) -> (&'static str, String) {
        match decision {
            GuardrailDecision::Deny { reason_code, reason } => (reason_code, reason),
            GuardrailDecision::Allow(_) => ("", String::new()),
        }
    }

    #[test]
    fn allowed_action_is_normalised() {
        let decision = CardActionPolicy::default().evaluate(
            &ActionDetails::new(" Activate ", "4111 1111 1111 4444")
                .with_parameter("cvv", "123")
                .with_parameter("expiryDate", "05/26"),
        );

        let approved = match decision {
            GuardrailDecision::Allow(approved) => approved,
            GuardrailDecision::Deny { reason, .. } => panic!("unexpected deny: {reason}"),
        };
        assert_eq!(approved.action, "activate");
        assert_eq!(approved.card.as_str(), "4444");
        assert_eq!(approved.parameters.len(), 2);
    }

    #[test]
    fn unknown_action_is_denied() {
        let (code, reason) = deny_reason(
            CardActionPolicy::default().evaluate(&ActionDetails::new("freeze", "4444")),
        );

        assert_eq!(code, "unsupported_action");
        assert_eq!(
            reason,
            "Unsupported card action 'freeze'. Supported actions: activate, deactivate"
        );
    }

    #[test]
    fn configured_allow_list_extends_actions() {
        let policy = CardActionPolicy::new(["activate", "deactivate", "Freeze"]);
        let decision = policy.evaluate(&ActionDetails::new("freeze", "4444"));
        assert!(matches!(decision, GuardrailDecision::Allow(_)));
    }

    #[test]
    fn malformed_identifier_and_parameters_are_denied() {
        let policy = CardActionPolicy::default();

        let (code, _) = deny_reason(policy.evaluate(&ActionDetails::new("activate", "44")));
        assert_eq!(code, "invalid_card_identifier");

        let (code, _) = deny_reason(
            policy.evaluate(&ActionDetails::new("activate", "4444").with_parameter("cvv", "12")),
        );
        assert_eq!(code, "invalid_cvv");

        let (code, _) = deny_reason(policy.evaluate(
            &ActionDetails::new("activate", "4444").with_parameter("expiryDate", "13/26"),
        ));
        assert_eq!(code, "invalid_expiry_date");

        for expiry in ["+5/26", "5/26", "05-26", "00/26", "05/2"] {
            let (code, _) = deny_reason(policy.evaluate(
                &ActionDetails::new("activate", "4444").with_parameter("expiryDate", expiry),
            ));
            assert_eq!(code, "invalid_expiry_date", "expiry `{expiry}` should be rejected");
        }

        let decision = policy.evaluate(
            &ActionDetails::new("deactivate", "4444").with_parameter("expiryDate", "05/2027"),
        );
        assert!(matches!(decision, GuardrailDecision::Allow(_)));
    }
}
