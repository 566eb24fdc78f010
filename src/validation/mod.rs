//! Input validation for staking requests
//!
//! Validators are pure: the same input always yields the same result.
//! Errors accumulate so a caller can show every problem at once.

mod amount;
mod rules;

pub use amount::{format_btc, parse_amount, AmountSyntax, ParsedAmount, SATS_DECIMALS};

use crate::config::StakingConfig;
use crate::errors::{XonoraError, XonoraResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Upper bound on sanitized input length
pub const MAX_INPUT_LEN: usize = 1000;

const USER_ID_MIN_LEN: usize = 10;
const USER_ID_MAX_LEN: usize = 63;

static USER_ID_CHARSET: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").ok());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
    }

    pub fn merge(&mut self, other: ValidationResult) {
        for error in other.errors {
            self.push(error);
        }
    }

    /// Turn a failed result into `XonoraError::Validation`
    pub fn into_result(self) -> XonoraResult<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(XonoraError::validation(self.errors))
        }
    }
}

/// Errors joined with ", "; empty for a valid result
pub fn error_message(result: &ValidationResult) -> String {
    if result.is_valid {
        String::new()
    } else {
        result.errors.join(", ")
    }
}

/// Trim, strip angle brackets and cap the length
pub fn sanitize(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .take(MAX_INPUT_LEN)
        .collect()
}

/// Validators bound to the configured staking limits
#[derive(Debug, Clone)]
pub struct Validator {
    limits: StakingConfig,
}

impl Validator {
    pub fn new(limits: StakingConfig) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &StakingConfig {
        &self.limits
    }

    /// Amount given as a decimal ckBTC string
    pub fn validate_stake_amount(&self, amount: &str) -> ValidationResult {
        let mut result = ValidationResult::ok();

        let parsed = match parse_amount(amount) {
            Ok(parsed) => parsed,
            Err(AmountSyntax::NotANumber) => {
                result.push("Amount must be a valid number");
                return result;
            }
            Err(AmountSyntax::Negative) => {
                result.push("Amount must be greater than 0");
                return result;
            }
        };

        let min = self.limits.min_stake_sats;
        let max = self.limits.max_stake_sats;
        if parsed.sats == 0 && !parsed.sub_sat_remainder {
            result.push("Amount must be greater than 0");
        } else if parsed.sats < min {
            result.push(format!("Minimum stake amount is {} ckBTC", format_btc(min)));
        } else if parsed.sats > max || (parsed.sats == max && parsed.sub_sat_remainder) {
            result.push(format!("Maximum stake amount is {} ckBTC", format_btc(max)));
        }

        if parsed.decimals > self.limits.max_decimals as usize {
            result.push(format!(
                "Amount cannot have more than {} decimal places",
                self.limits.max_decimals
            ));
        }

        result
    }

    /// Validate and convert to satoshis in one step
    pub fn stake_amount_sats(&self, amount: &str) -> XonoraResult<u64> {
        self.validate_stake_amount(amount).into_result()?;
        parse_amount(amount)
            .map(|parsed| parsed.sats)
            .map_err(|_| XonoraError::validation(vec!["Amount must be a valid number".into()]))
    }

    pub fn validate_pool_id(&self, pool_id: &str) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if pool_id.is_empty() {
            result.push("Pool ID is required");
        } else if pool_id.trim().is_empty() {
            result.push("Pool ID cannot be empty");
        } else if !self.limits.pool_ids.iter().any(|id| id == pool_id) {
            result.push(format!(
                "Invalid pool ID. Must be one of: {}",
                self.limits.pool_ids.join(", ")
            ));
        }
        result
    }

    pub fn validate_user_id(&self, user_id: &str) -> ValidationResult {
        let mut result = ValidationResult::ok();
        let charset_ok = USER_ID_CHARSET
            .as_ref()
            .map(|re| re.is_match(user_id))
            .unwrap_or(false);

        if user_id.is_empty() {
            result.push("User ID is required");
        } else if user_id.trim().is_empty() {
            result.push("User ID cannot be empty");
        } else if !charset_ok {
            result.push("Invalid user ID format");
        } else if !(USER_ID_MIN_LEN..=USER_ID_MAX_LEN).contains(&user_id.len()) {
            result.push(format!(
                "User ID must be between {} and {} characters",
                USER_ID_MIN_LEN, USER_ID_MAX_LEN
            ));
        }
        result
    }

    /// Stake id as typed by the user
    pub fn validate_stake_id(&self, stake_id: &str) -> ValidationResult {
        let mut result = ValidationResult::ok();
        let text = stake_id.trim();

        if text.parse::<u64>().is_ok() {
            return result;
        }
        if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
            result.push(format!("Stake ID cannot exceed {}", u64::MAX));
            return result;
        }
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() && value < 0.0 => {
                result.push("Stake ID must be non-negative")
            }
            Ok(value) if value.is_finite() => result.push("Stake ID must be an integer"),
            _ => result.push("Stake ID must be a valid number"),
        }
        result
    }

    /// Parse a stake id, failing with the validation errors
    pub fn parse_stake_id(&self, stake_id: &str) -> XonoraResult<u64> {
        self.validate_stake_id(stake_id).into_result()?;
        stake_id
            .trim()
            .parse::<u64>()
            .map_err(|_| XonoraError::validation(vec!["Stake ID must be a valid number".into()]))
    }

    /// Sanitize, then validate amount, pool and user together
    pub fn validate_staking_inputs(
        &self,
        amount: &str,
        pool_id: &str,
        user_id: &str,
    ) -> ValidationResult {
        let pool_id = sanitize(pool_id);
        let user_id = sanitize(user_id);

        let mut result = self.validate_stake_amount(amount);
        result.merge(self.validate_pool_id(&pool_id));
        result.merge(self.validate_user_id(&user_id));
        result
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(StakingConfig::default())
    }
}
