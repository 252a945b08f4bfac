//! Core domain models, storage, and pipeline extension points.
//!
//! Provides strongly-typed domain primitives, the Postgres repository
//! layer, clock abstractions, and the hook registry for the page creation
//! gateway. The API and delivery crates build on these foundations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod hooks;
pub mod models;
pub mod sanitize;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use hooks::{HookRegistry, NoOpHook, PipelineEvent, PipelineHook};
pub use models::{
    AuditEntry, AuthMode, CreatedPage, Credential, CredentialId, CredentialStatus, DeliveryStatus,
    ItemError, PageId, RateDecision, RateWindow, RequestId, RequestResult, WebhookDelivery,
};
pub use storage::{run_migrations, Storage};
pub use time::{Clock, RealClock, TestClock};
