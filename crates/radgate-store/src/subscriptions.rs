//! Subscriptions and payment grace periods

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

/// Subscription state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Paid up
    Active,
    /// Past due, still within the grace window
    GracePeriod,
    /// Grace expired; service cut
    Suspended,
}

/// A subscriber's plan subscription
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Subscription id
    pub id: Uuid,
    /// Subscriber username
    pub username: String,
    /// Plan name
    pub plan: String,
    /// Paid-through date
    pub expires_at: DateTime<Utc>,
    /// End of the grace window, once entered
    pub grace_period_ends_at: Option<DateTime<Utc>>,
    /// State
    pub status: SubscriptionStatus,
    /// Last days-remaining value a warning was emitted for
    pub last_warned_days: Option<i64>,
}

/// Per-partition subscription store
pub struct SubscriptionStore {
    subs: DashMap<String, Subscription>,
}

impl SubscriptionStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            subs: DashMap::new(),
        }
    }

    /// Create a subscription for a username
    pub fn create(&self, username: &str, plan: &str, expires_at: DateTime<Utc>) -> Subscription {
        let sub = Subscription {
            id: Uuid::new_v4(),
            username: username.to_string(),
            plan: plan.to_string(),
            expires_at,
            grace_period_ends_at: None,
            status: SubscriptionStatus::Active,
            last_warned_days: None,
        };
        self.subs.insert(username.to_string(), sub.clone());
        sub
    }

    /// Move a past-due subscription into its grace window
    pub fn enter_grace(&self, username: &str, grace_ends: DateTime<Utc>) -> bool {
        match self.subs.get_mut(username) {
            Some(mut sub) => {
                sub.status = SubscriptionStatus::GracePeriod;
                sub.grace_period_ends_at = Some(grace_ends);
                sub.last_warned_days = None;
                info!(username = %username, grace_ends = %grace_ends, "subscription entered grace period");
                true
            }
            None => false,
        }
    }

    /// Subscriptions currently in their grace window
    pub fn in_grace(&self) -> Vec<Subscription> {
        self.subs
            .iter()
            .filter(|s| s.status == SubscriptionStatus::GracePeriod)
            .map(|s| s.clone())
            .collect()
    }

    /// Grace-period subscriptions whose window has closed
    pub fn grace_expired(&self, now: DateTime<Utc>) -> Vec<Subscription> {
        self.subs
            .iter()
            .filter(|s| {
                s.status == SubscriptionStatus::GracePeriod
                    && s.grace_period_ends_at.map(|end| end <= now).unwrap_or(false)
            })
            .map(|s| s.clone())
            .collect()
    }

    /// Remember that a warning for `days_remaining` went out, so the
    /// hourly sweep does not repeat it.
    pub fn mark_warned(&self, username: &str, days_remaining: i64) {
        if let Some(mut sub) = self.subs.get_mut(username) {
            sub.last_warned_days = Some(days_remaining);
        }
    }

    /// Suspend after grace expiry
    pub fn suspend(&self, username: &str) {
        if let Some(mut sub) = self.subs.get_mut(username) {
            sub.status = SubscriptionStatus::Suspended;
            info!(username = %username, "subscription suspended");
        }
    }

    /// Payment received: back to Active on the new plan
    pub fn reactivate(&self, username: &str, plan: &str, expires_at: DateTime<Utc>) -> bool {
        match self.subs.get_mut(username) {
            Some(mut sub) => {
                sub.status = SubscriptionStatus::Active;
                sub.plan = plan.to_string();
                sub.expires_at = expires_at;
                sub.grace_period_ends_at = None;
                sub.last_warned_days = None;
                info!(username = %username, plan = %plan, "subscription reactivated");
                true
            }
            None => false,
        }
    }

    /// Subscription for a username
    pub fn get(&self, username: &str) -> Option<Subscription> {
        self.subs.get(username).map(|s| s.clone())
    }
}

impl Default for SubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}
