//! In-memory [`Database`] implementation.
//!
//! Reference backend for tests and embedding: the engine itself relies on
//! the abstract operation contracts only, so any transactional store can
//! take its place.

mod impls;

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard},
};

use derive_more::{Display, Error as StdError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracerr::Traced;

use crate::{
    domain::{
        checklist, contract, key_collection, payment, realty, user,
        Checklist, Contract, KeyCollection, Payment, Realty, User,
    },
    infra::database,
};
#[cfg(doc)]
use crate::infra::Database;
#[cfg(doc)]
use common::operations::Commit;

/// In-memory [`Database`] client.
#[derive(Clone, Debug, Default)]
pub struct InMemory<T = NonTx>(T);

impl InMemory {
    /// Creates a new empty [`InMemory`] client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whole dataset of an [`InMemory`] database.
#[derive(Clone, Debug, Default)]
pub struct State {
    /// Stored [`Contract`]s by their IDs.
    contracts: HashMap<contract::Id, Contract>,

    /// Stored [`Payment`]s by their IDs.
    payments: HashMap<payment::Id, Payment>,

    /// Stored [`Checklist`]s by their IDs.
    checklists: HashMap<checklist::Id, Checklist>,

    /// Stored [`checklist::Template`]s by their IDs.
    templates: HashMap<checklist::template::Id, checklist::Template>,

    /// Stored [`KeyCollection`]s by their IDs.
    key_collections: HashMap<key_collection::Id, KeyCollection>,

    /// Stored [`Realty`] entities by their IDs.
    realties: HashMap<realty::Id, Realty>,

    /// Stored [`User`]s by their IDs.
    users: HashMap<user::Id, User>,
}

/// Non-transactional [`InMemory`] client.
#[derive(Clone, Debug, Default)]
pub struct NonTx {
    /// Shared [`State`] of the database.
    state: Arc<Mutex<State>>,
}

impl NonTx {
    /// Begins a new transaction over the shared [`State`].
    async fn begin(&self) -> Tx {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let draft = guard.clone();
        Tx {
            inner: StdMutex::new(TxInner {
                guard,
                draft,
                committed: false,
            }),
        }
    }
}

/// Transactional [`InMemory`] client.
///
/// Holds an exclusive lock over the whole [`State`] for its entire
/// lifetime, applying operations to a draft copy that replaces the shared
/// [`State`] on [`Commit`]. Dropping the transaction without committing
/// discards the draft.
#[derive(Debug)]
pub struct Tx {
    /// Inner state of this transaction.
    inner: StdMutex<TxInner>,
}

/// Inner state of a [`Tx`].
#[derive(Debug)]
struct TxInner {
    /// Exclusively locked shared [`State`].
    guard: OwnedMutexGuard<State>,

    /// Draft copy of the [`State`] operations are applied to.
    draft: State,

    /// Indicator whether the transaction is committed already.
    committed: bool,
}

impl Tx {
    /// Commits the draft [`State`] of this transaction.
    fn commit(&self) -> Result<(), Traced<database::Error>> {
        let mut inner = self.lock();
        if inner.committed {
            return Err(tracerr::new!(database::Error::from(
                Error::TransactionClosed,
            )));
        }
        inner.committed = true;
        let draft = inner.draft.clone();
        *inner.guard = draft;
        Ok(())
    }

    /// Locks and returns the [`TxInner`] of this transaction.
    fn lock(&self) -> StdMutexGuard<'_, TxInner> {
        self.inner.lock().expect("non-poisoned `Mutex`")
    }
}

/// Access to a [`State`], shared by [`NonTx`] and [`Tx`] clients.
pub trait Store {
    /// Runs the provided function over the [`State`].
    ///
    /// # Errors
    ///
    /// If the [`State`] is not accessible anymore.
    fn with<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> impl Future<Output = Result<R, Traced<database::Error>>>;
}

impl Store for NonTx {
    async fn with<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> Result<R, Traced<database::Error>> {
        let mut state = self.state.lock().await;
        Ok(f(&mut state))
    }
}

impl Store for Tx {
    async fn with<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> Result<R, Traced<database::Error>> {
        let mut inner = self.lock();
        if inner.committed {
            return Err(tracerr::new!(database::Error::from(
                Error::TransactionClosed,
            )));
        }
        Ok(f(&mut inner.draft))
    }
}

/// [`InMemory`] database [`Error`].
#[derive(Clone, Copy, Debug, Display, StdError)]
pub enum Error {
    /// Operation was executed on a committed transaction.
    #[display("transaction is committed already")]
    TransactionClosed,
}
