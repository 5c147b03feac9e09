//! Internal reward/ledger collaborator definitions.

use std::fmt;

use async_trait::async_trait;
use common::{define_kind, DateTime};
use derive_more::{Display, Error as StdError};
use tracerr::Traced;

use crate::domain::contract;
#[cfg(doc)]
use crate::domain::Contract;

/// Internal ledger recording reward-relevant platform events.
///
/// Recording is fire-and-forget: failures are logged and never roll back
/// the originating state change.
#[async_trait]
pub trait Ledger: fmt::Debug + Send + Sync {
    /// Records the provided [`Entry`].
    ///
    /// # Errors
    ///
    /// If the [`Entry`] cannot be recorded.
    async fn record(&self, entry: Entry) -> Result<(), Traced<Error>>;
}

/// Entry of the internal [`Ledger`].
#[derive(Clone, Copy, Debug)]
pub struct Entry {
    /// [`Kind`] of this [`Entry`].
    pub kind: Kind,

    /// ID of the [`Contract`] this [`Entry`] relates to.
    pub contract_id: contract::Id,

    /// [`DateTime`] when the event occurred.
    pub occurred_at: DateTime,
}

define_kind! {
    #[doc = "Kind of a [`Ledger`] [`Entry`]."]
    enum Kind {
        #[doc = "Both parties signed a [`Contract`]."]
        ContractFullySigned = 1,

        #[doc = "Both escrow obligations of a [`Contract`] were settled."]
        EscrowFunded = 2,
    }
}

/// [`Ledger`] error.
#[derive(Debug, Display, StdError)]
#[display("`Ledger` is unavailable: {_0}")]
pub struct Error(#[error(not(source))] pub String);

#[cfg(feature = "in-memory")]
pub use self::mock::MockLedger;

#[cfg(feature = "in-memory")]
mod mock {
    //! Mock [`Ledger`] implementation.

    use std::sync::{Mutex, MutexGuard};

    use async_trait::async_trait;
    use tracerr::Traced;

    use super::{Entry, Error, Ledger};

    /// [`Ledger`] collecting recorded entries in memory.
    #[derive(Debug, Default)]
    pub struct MockLedger {
        /// Recorded entries.
        entries: Mutex<Vec<Entry>>,
    }

    impl MockLedger {
        /// Creates a new empty [`MockLedger`].
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Returns all the recorded entries.
        #[must_use]
        pub fn entries(&self) -> Vec<Entry> {
            self.lock().clone()
        }

        /// Locks and returns the recorded entries.
        fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
            self.entries.lock().expect("non-poisoned `Mutex`")
        }
    }

    #[async_trait]
    impl Ledger for MockLedger {
        async fn record(&self, entry: Entry) -> Result<(), Traced<Error>> {
            self.lock().push(entry);
            Ok(())
        }
    }
}
