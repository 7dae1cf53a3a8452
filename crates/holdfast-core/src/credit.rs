//! # Retry-Credit Policy
//!
//! Maps a customer's retry-credit ("hearts") balance to how long a new
//! reservation may hold stock, and decides what an expiry costs.
//!
//! ## Default Table
//! ```text
//! ┌──────────────┬──────────────────────┐
//! │   balance    │  reservation TTL     │
//! ├──────────────┼──────────────────────┤
//! │      3       │  24h                 │
//! │      2       │  12h                 │
//! │      1       │   6h                 │
//! │  ≤ 0 / > 3   │  InvalidCredit       │
//! └──────────────┴──────────────────────┘
//!
//! Expiry: balance - 1, never below `floor` (0).
//! ```
//!
//! A customer at the floor cannot check out until the balance is replenished
//! (replenishment is not done by this engine).

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};

/// One row of the TTL table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTier {
    pub balance: i64,
    pub ttl_hours: i64,
}

/// Balance → TTL table plus the penalty floor.
///
/// ## Example
/// ```rust
/// use holdfast_core::credit::CreditPolicy;
///
/// let policy = CreditPolicy::default();
/// assert_eq!(policy.ttl_for(3).unwrap().num_hours(), 24);
/// assert!(policy.ttl_for(0).is_err());
/// assert_eq!(policy.penalized(1), 0);
/// assert_eq!(policy.penalized(0), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPolicy {
    /// Lowest balance an expiry penalty can reach.
    #[serde(default)]
    pub floor: i64,

    #[serde(default = "default_tiers")]
    pub tiers: Vec<CreditTier>,
}

fn default_tiers() -> Vec<CreditTier> {
    vec![
        CreditTier { balance: 3, ttl_hours: 24 },
        CreditTier { balance: 2, ttl_hours: 12 },
        CreditTier { balance: 1, ttl_hours: 6 },
    ]
}

impl Default for CreditPolicy {
    fn default() -> Self {
        CreditPolicy {
            tiers: default_tiers(),
            floor: 0,
        }
    }
}

impl CreditPolicy {
    /// Returns the reservation TTL for `balance`.
    ///
    /// ## Returns
    /// * `Ok(Duration)` - balance has a row in the table
    /// * `Err(CoreError::InvalidCredit)` - anything else, including the floor
    pub fn ttl_for(&self, balance: i64) -> CoreResult<Duration> {
        self.tiers
            .iter()
            .find(|tier| tier.balance == balance)
            .map(|tier| Duration::hours(tier.ttl_hours))
            .ok_or(CoreError::InvalidCredit { balance })
    }

    /// Balance after one expiry penalty.
    ///
    /// Balances already at or below the floor are left untouched.
    pub fn penalized(&self, balance: i64) -> i64 {
        if balance <= self.floor {
            balance
        } else {
            balance - 1
        }
    }

    /// Highest balance with a TTL (the value new customers start at).
    pub fn max_balance(&self) -> i64 {
        self.tiers
            .iter()
            .map(|tier| tier.balance)
            .max()
            .unwrap_or(self.floor)
    }

    /// Checks the table is usable.
    ///
    /// ## Rules
    /// - At least one tier
    /// - Every TTL is positive
    /// - Balances are unique and above the floor
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tiers.is_empty() {
            return Err(ValidationError::Required {
                field: "credit.tiers".to_string(),
            });
        }

        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.ttl_hours <= 0 {
                return Err(ValidationError::OutOfRange {
                    field: "credit.tiers.ttl_hours".to_string(),
                    min: 1,
                    max: i64::MAX,
                });
            }
            if tier.balance <= self.floor {
                return Err(ValidationError::OutOfRange {
                    field: "credit.tiers.balance".to_string(),
                    min: self.floor + 1,
                    max: i64::MAX,
                });
            }
            if self.tiers[..i].iter().any(|t| t.balance == tier.balance) {
                return Err(ValidationError::InvalidFormat {
                    field: "credit.tiers".to_string(),
                    reason: format!("balance {} listed twice", tier.balance),
                });
            }
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
