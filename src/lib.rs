//! Client-side core of a feature flagging SDK.
//!
//! # Overview
//!
//! The SDK keeps a local replica of flag ("split") and segment definitions served by the control
//! plane, and evaluates flags against it without any I/O on the caller's thread. Evaluating a flag
//! for a [`Key`] produces a *treatment*: a string outcome, optionally with a configuration payload.
//!
//! [`Client`] is the entry point. Create one from a [`ClientConfig`], start synchronization, and
//! wait for the client to become ready:
//!
//! ```no_run
//! # use std::{collections::HashMap, time::Duration};
//! # fn main() -> splitio::Result<()> {
//! let client = splitio::ClientConfig::from_api_key("api-key").to_client();
//! client.start_synchronization()?;
//! client.block_until_ready(Duration::from_secs(10))?;
//!
//! let treatment = client.get_treatment("user-1", "new-checkout", &HashMap::new());
//! # Ok(())
//! # }
//! ```
//!
//! Synchronization runs on background threads: a poller reconciling the whole replica
//! periodically, and one worker per entity kind applying push [`Notification`]s handed to the
//! [`NotificationQueue`] returned by [`Client::start_synchronization`]. Change numbers only move
//! forward: stale or duplicate notifications are dropped.
//!
//! An [`ImpressionListener`] can be provided to record which key received which treatment.
//!
//! # Error Handling
//!
//! Evaluation calls never fail. Unknown flags, invalid input, and faults while interpreting a
//! definition all produce the `control` treatment, and the problem is logged. Lifecycle operations
//! (starting synchronization, waiting for readiness) return [`Result`] with the [`Error`] enum.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with target `"splitio"`
//! and structured key-values. Consider integrating a `log`-compatible logger implementation for
//! better visibility into SDK operations.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod attributes;
mod client;
mod config;
mod error;
mod flag;
mod impressions;
mod matchers;
mod readiness;
mod splitter;
mod sync_manager;
mod validation;

pub mod evaluator;
pub mod fetcher;
pub mod models;
pub mod notification;
pub mod poller;
pub mod store;
pub mod synchronizer;
pub mod worker;

/// Treatment served when a flag cannot be evaluated.
pub const CONTROL_TREATMENT: &str = "control";

pub use attributes::{AttributeValue, Attributes, Key};
pub use client::{Client, SplitResult};
pub use config::ClientConfig;
pub use error::{Error, EvaluationError, Result};
pub use evaluator::{EvaluationResult, Evaluator};
pub use fetcher::{ChangeFetcher, FetchOptions, HttpChangeFetcher};
pub use flag::{Flag, Partition};
pub use impressions::{Impression, ImpressionListener};
pub use notification::{Notification, NotificationQueue};
pub use poller::{PollerConfig, PollerThread};
pub use readiness::ReadinessGate;
pub use splitter::{Algorithm, BucketHasher, LegacyHasher, Murmur3Hasher};
pub use sync_manager::SyncManager;
pub use validation::MAX_KEY_LENGTH;
