//! Entitlement gate for batch generation
//!
//! Pure read-side evaluation over the durable role, subscription, and
//! purchase records. The gate never mutates entitlement state and holds no
//! cache: every call re-reads the records, so a purchase completed elsewhere
//! is visible on the next check.

use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;
use crate::types::{Actor, TOP_ANNUAL_TIER};

/// Which rule granted access, for logging and upgrade-path display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSource {
    /// Owner flag on the role record
    Owner,
    /// Active top annual subscription tier
    AnnualSubscription,
    /// Paid one-time generator purchase
    Purchase,
}

/// Gate consulted before starting a generation job
pub struct EntitlementGate {
    db: Arc<Database>,
}

impl EntitlementGate {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Whether the actor may start a generation job
    pub fn can_use_generation(&self, actor: &Actor) -> Result<bool> {
        Ok(self.evaluate(actor)?.is_some())
    }

    /// Evaluate the access rules in strict order, stopping at the first match:
    /// owner flag, then annual tier, then paid purchase. Returns the rule that
    /// granted access, or `None` for a denial.
    pub fn evaluate(&self, actor: &Actor) -> Result<Option<AccessSource>> {
        if let Some(role) = self.db.get_role(&actor.user_id)? {
            if role.is_owner {
                tracing::debug!(user_id = %actor.user_id, "Generation access via owner role");
                return Ok(Some(AccessSource::Owner));
            }
        }

        if let Some(sub) = self.db.get_subscription(&actor.user_id)? {
            if sub.tier.as_deref() == Some(TOP_ANNUAL_TIER) {
                tracing::debug!(user_id = %actor.user_id, "Generation access via annual tier");
                return Ok(Some(AccessSource::AnnualSubscription));
            }
        }

        // Purchase match: owner id first, contact address only when no id
        // match exists at all.
        let purchase = match self.db.get_purchase_by_user(&actor.user_id)? {
            Some(p) => Some(p),
            None => match &actor.email {
                Some(email) => self.db.get_purchase_by_email(email)?,
                None => None,
            },
        };

        if let Some(purchase) = purchase {
            if purchase.paid {
                tracing::debug!(user_id = %actor.user_id, "Generation access via purchase");
                return Ok(Some(AccessSource::Purchase));
            }
        }

        Ok(None)
    }
}
