//! Service contains the business logic of the application.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod config;
pub mod domain;
mod effect;
pub mod infra;
pub mod query;
pub mod read;
#[cfg(all(test, feature = "in-memory"))]
mod testing;

use std::sync::Arc;

use crate::infra::{
    DocumentGenerator, Ledger, Notifier, ObjectStorage, PaymentGateway,
};
#[cfg(doc)]
use crate::infra::Database;

pub use self::{command::Command, config::Config, query::Query};

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Db> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Database`] of this [`Service`].
    database: Db,

    /// External [`Collaborators`] of this [`Service`].
    collaborators: Collaborators,
}

impl<Db> Service<Db> {
    /// Creates a new [`Service`] with the provided parameters.
    pub fn new(
        config: Config,
        database: Db,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            database,
            collaborators,
        }
    }

    /// Returns [`Config`] of this [`Service`].
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Database`] of this [`Service`].
    #[must_use]
    pub fn database(&self) -> &Db {
        &self.database
    }

    /// Returns the [`PaymentGateway`] of this [`Service`].
    #[must_use]
    pub fn payments(&self) -> &Arc<dyn PaymentGateway> {
        &self.collaborators.payments
    }

    /// Returns the [`ObjectStorage`] of this [`Service`].
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.collaborators.storage
    }

    /// Returns the [`DocumentGenerator`] of this [`Service`].
    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentGenerator> {
        &self.collaborators.documents
    }

    /// Returns the [`Notifier`] of this [`Service`].
    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.collaborators.notifier
    }

    /// Returns the [`Ledger`] of this [`Service`].
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.collaborators.ledger
    }
}

/// External collaborators consumed by a [`Service`].
///
/// All of them are best-effort or retryable seams: none of them owns the
/// primary state, which lives in the [`Database`] only.
#[derive(Clone, Debug)]
pub struct Collaborators {
    /// Payment processor gateway.
    pub payments: Arc<dyn PaymentGateway>,

    /// Object storage for signature images and rendered documents.
    pub storage: Arc<dyn ObjectStorage>,

    /// Agreement document generator.
    pub documents: Arc<dyn DocumentGenerator>,

    /// Notification dispatcher.
    pub notifier: Arc<dyn Notifier>,

    /// Internal reward/ledger events sink.
    pub ledger: Arc<dyn Ledger>,
}
