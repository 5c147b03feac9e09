//! Infrastructure layer.

pub mod database;
pub mod documents;
pub mod ledger;
pub mod notifications;
pub mod payments;
pub mod storage;

pub use self::{
    database::Database, documents::DocumentGenerator, ledger::Ledger,
    notifications::Notifier, payments::PaymentGateway,
    storage::ObjectStorage,
};
#[cfg(feature = "in-memory")]
pub use self::database::InMemory;
