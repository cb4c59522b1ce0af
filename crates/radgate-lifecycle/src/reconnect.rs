//! Provisioning and reconnection flows
//!
//! The operations a billing or provisioning front end calls into:
//! creating and revoking subscriber credentials, changing plans, and
//! the payment-received path that restores service after a grace
//! suspension. All of them take an explicit partition handle; the
//! caller resolves the username first.

use crate::LifecycleError;
use radgate_nas::{DisconnectRequest, NasDirectory};
use radgate_store::{Operator, StoreRoot};
use radgate_tenant::{IdentityMapping, IdentityResolver, PartitionName, TenantId, UserRole};
use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// What a plan grants a subscriber; turned into RADIUS reply items at
/// provisioning time.
#[derive(Debug, Clone)]
pub struct PlanSpec {
    /// Plan name
    pub name: String,
    /// Session-Timeout reply item, seconds
    pub session_timeout: Option<u32>,
    /// Cumulative byte cap, if metered
    pub data_limit: Option<u64>,
    /// Entitlement length from activation
    pub valid_for_days: i64,
}

impl PlanSpec {
    fn reply_items(&self) -> Vec<(String, Operator, String)> {
        let mut items = Vec::new();
        if let Some(timeout) = self.session_timeout {
            items.push(("Session-Timeout".to_string(), Operator::SetEqual, timeout.to_string()));
        }
        items
    }
}

/// Provisioning operations over the partitioned stores
pub struct Provisioner {
    root: Arc<StoreRoot>,
    resolver: Arc<IdentityResolver>,
    nas: Arc<NasDirectory>,
}

impl Provisioner {
    /// Provisioner over the given stores, resolver, and NAS directory
    pub fn new(
        root: Arc<StoreRoot>,
        resolver: Arc<IdentityResolver>,
        nas: Arc<NasDirectory>,
    ) -> Self {
        Self { root, resolver, nas }
    }

    /// Create a subscriber: identity mapping, check/reply rows,
    /// subscription, and a pending session slot.
    pub fn credential_provisioned(
        &self,
        partition: &PartitionName,
        tenant_id: TenantId,
        username: &str,
        password: &str,
        plan: &PlanSpec,
    ) -> Result<(), LifecycleError> {
        let part = self.root.partition(partition)?;
        let expected_end = Utc::now() + chrono::Duration::days(plan.valid_for_days);

        part.credentials
            .add_check_item(username, "Cleartext-Password", Operator::SetEqual, password);
        part.credentials.replace_reply_items(username, plan.reply_items());
        part.subscriptions.create(username, &plan.name, expected_end);
        part.sessions
            .provision(tenant_id, username, &plan.name, expected_end, plan.data_limit);

        self.resolver.provision(IdentityMapping {
            username: username.to_string(),
            partition: partition.clone(),
            tenant_id: Some(tenant_id),
            role: UserRole::Subscriber,
            active: true,
        });
        info!(username = %username, partition = %partition, plan = %plan.name, "subscriber provisioned");
        Ok(())
    }

    /// Remove a subscriber's ability to authenticate. Accounting and
    /// audit rows are left in place.
    pub fn credential_revoked(
        &self,
        partition: &PartitionName,
        username: &str,
    ) -> Result<(), LifecycleError> {
        let part = self.root.partition(partition)?;
        part.credentials.remove_user(username);
        self.resolver.revoke(username);
        info!(username = %username, partition = %partition, "subscriber credentials revoked");
        Ok(())
    }

    /// Move a subscriber to a new plan. The live session's entitlement
    /// window and cap follow the new plan immediately.
    pub fn plan_changed(
        &self,
        partition: &PartitionName,
        username: &str,
        plan: &PlanSpec,
    ) -> Result<(), LifecycleError> {
        let part = self.root.partition(partition)?;
        let expected_end = Utc::now() + chrono::Duration::days(plan.valid_for_days);

        part.credentials.replace_reply_items(username, plan.reply_items());
        part.sessions
            .update_plan(username, &plan.name, expected_end, plan.data_limit);
        info!(username = %username, plan = %plan.name, "plan changed");
        Ok(())
    }

    /// Payment received for a suspended or grace-period subscriber:
    /// restore the subscription and session, then nudge the NAS so the
    /// client re-authenticates without waiting for its next attempt.
    /// The nudge is best effort; service is restored either way.
    pub async fn payment_received(
        &self,
        partition: &PartitionName,
        username: &str,
        plan: &PlanSpec,
    ) -> Result<(), LifecycleError> {
        let part = self.root.partition(partition)?;
        let expected_end = Utc::now() + chrono::Duration::days(plan.valid_for_days);

        part.credentials.replace_reply_items(username, plan.reply_items());
        part.subscriptions.reactivate(username, &plan.name, expected_end);
        let session = part
            .sessions
            .reactivate(username, &plan.name, expected_end, plan.data_limit);
        info!(username = %username, plan = %plan.name, "service restored after payment");

        if let Some(session) = session {
            if let Some(nas_ip) = session.nas_ip {
                self.nudge(IpAddr::from(nas_ip), username, session.mac.clone()).await;
            }
        }
        Ok(())
    }

    async fn nudge(&self, nas_ip: IpAddr, username: &str, mac: Option<String>) {
        let client = match self.nas.client_for(&nas_ip) {
            Ok(client) => client,
            Err(e) => {
                debug!(username = %username, nas = %nas_ip, error = %e, "no client for reauth nudge");
                return;
            }
        };
        let req = DisconnectRequest {
            username: username.to_string(),
            mac,
            nas_session_id: None,
        };
        if let Err(e) = client.nudge_reauth(&req).await {
            debug!(username = %username, nas = %nas_ip, error = %e, "reauth nudge failed");
        }
    }
}
