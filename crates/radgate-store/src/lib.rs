//! Partition-scoped storage
//!
//! Every per-tenant table lives behind an explicit partition handle
//! obtained from [`StoreRoot::partition`]. There is no ambient
//! "current partition" anywhere: a caller that has not resolved a
//! username to a partition cannot touch tenant data at all, which is
//! what makes cross-tenant isolation structural rather than
//! disciplinary.

#![warn(missing_docs)]

pub mod accounting;
pub mod credentials;
pub mod partition;
pub mod postauth;
pub mod sessions;
pub mod subscriptions;

pub use accounting::{
    AccountingRecord, AccountingStore, CounterUpdate, InterimOutcome, NasEvent, NasEventLog,
};
pub use credentials::{CredentialEntry, CredentialStore, Operator};
pub use partition::{PartitionStore, StoreError, StoreRoot};
pub use postauth::{AuthOutcome, PostAuthEntry, PostAuthStore};
pub use sessions::{
    CapBreach, DisconnectStatus, Session, SessionDisconnection, SessionStatus, SessionStore,
};
pub use subscriptions::{Subscription, SubscriptionStatus, SubscriptionStore};
