//! [`Database`] implementations.

mod checklist;
mod contract;
mod key_collection;
mod payment;
mod realty;
mod user;

use common::operations::{By, Commit, Lock, Transact};
use tracerr::Traced;

use crate::infra::{database, Database};

use super::{InMemory, NonTx, Store, Tx};

impl Database<Transact> for InMemory<NonTx> {
    type Ok = InMemory<Tx>;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(InMemory(self.0.begin().await))
    }
}

impl Database<Commit> for InMemory<Tx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Commit) -> Result<Self::Ok, Self::Err> {
        self.0.commit()
    }
}

// A transaction holds an exclusive lock over the whole `State` for its
// entire lifetime, so row-level locks have nothing left to exclude.
impl<S, W, B> Database<Lock<By<W, B>>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Lock<By<W, B>>) -> Result<Self::Ok, Self::Err> {
        self.0.with(|_| ()).await
    }
}
