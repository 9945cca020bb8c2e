//! # revship-sync
//!
//! Branch-scoped synchronisation of a local output tree with a remote
//! object store.
//!
//! Call [`pipeline::plan`] to compute what a publish would do, or
//! [`pipeline::publish`] to execute it and persist the upload cache.

pub mod cache;
pub mod error;
pub mod groups;
pub mod pipeline;
pub mod planner;
pub mod publisher;
pub mod store;

pub use error::{StoreError, SyncError};
pub use groups::GroupMatcher;
pub use pipeline::{PlanOutcome, PublishOutcome, PublishRequest};
pub use planner::{LocalObject, SyncPlan, UploadKind};
pub use publisher::{ObjectOutcome, PublishCounts, PublishOptions, PublishReport, RetryPolicy};
pub use store::{ObjectMeta, ObjectStore, RemoteObject};
