//! Tenant registry and identity resolution
//!
//! The two platform-level, concurrently-read tables of the system:
//! which tenants exist (and which isolated partition each one owns),
//! and which partition owns a given RADIUS username. Everything else
//! in radgate is partition-scoped.

#![warn(missing_docs)]

pub mod model;
pub mod registry;
pub mod resolver;

pub use model::{PartitionName, Tenant, TenantId, TenantStatus, UserRole, PLATFORM_PARTITION};
pub use registry::{RegistryError, TenantRegistry};
pub use resolver::{IdentityMapping, IdentityResolver, ResolveError, Resolution};
