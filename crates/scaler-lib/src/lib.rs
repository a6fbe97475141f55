//! Day/night capacity scaling for ECS environments
//!
//! This crate provides the core functionality for:
//! - Environment discovery from stack names
//! - Resolving declared capacity from configuration records
//! - Planning and applying scaling group, service and alarm changes
//! - Notifications and observability

pub mod discovery;
pub mod error;
pub mod models;
pub mod notify;
pub mod observability;
pub mod platform;
pub mod policy;
pub mod reconcile;
pub mod resolve;
pub mod schedule;

pub use error::{Disposition, Result, ScalingError};
pub use models::*;
pub use observability::{RunMetrics, StructuredLogger};
pub use platform::{AwsPlatform, ControlPlane, InMemoryPlatform};
pub use policy::PolicyConfig;
pub use reconcile::{Mode, Outcome, Reconciler, RunReport, Variant};
pub use schedule::TimePeriod;
