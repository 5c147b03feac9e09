//! [`Command`] for cancelling a [`KeyCollection`] handover.

use common::operations::{
    By, Commit, Lock, Select, Transact, Transacted, Update,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{
        contract, key_collection, user, Contract, KeyCollection,
    },
    effect::Effects,
    infra::{
        database,
        notifications::{Kind, Link, Notification},
        Database,
    },
    Service,
};

#[cfg(doc)]
use crate::domain::User;

use super::Command;

/// [`Command`] for cancelling a proposed [`KeyCollection`] handover that
/// has not happened.
#[derive(Clone, Copy, Debug)]
pub struct CancelKeyCollection {
    /// ID of the [`KeyCollection`] to cancel.
    pub key_collection_id: key_collection::Id,

    /// ID of the [`User`] who cancels the handover.
    pub initiator_id: user::Id,
}

impl<Db> Command<CancelKeyCollection> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<KeyCollection>, key_collection::Id>>,
            Ok = Option<KeyCollection>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Contract, contract::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<KeyCollection>, key_collection::Id>>,
            Ok = Option<KeyCollection>,
            Err = Traced<database::Error>,
        > + Database<Update<KeyCollection>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = KeyCollection;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CancelKeyCollection,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CancelKeyCollection {
            key_collection_id,
            initiator_id,
        } = cmd;

        let key_collection = self
            .database()
            .execute(Select(By::<Option<KeyCollection>, _>::new(
                key_collection_id,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::KeyCollectionNotExists(key_collection_id))
            .map_err(tracerr::wrap!())?;

        let contract = self
            .database()
            .execute(Select(By::<Option<Contract>, _>::new(
                key_collection.contract_id,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(key_collection.contract_id))
            .map_err(tracerr::wrap!())?;

        contract
            .party_role(initiator_id)
            .ok_or(E::NotAParty(initiator_id))
            .map_err(tracerr::wrap!())
            .map(drop)?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent actions upon the same `Contract`.
        tx.execute(Lock(By::new(contract.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut key_collection = tx
            .execute(Select(By::<Option<KeyCollection>, _>::new(
                key_collection_id,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::KeyCollectionNotExists(key_collection_id))
            .map_err(tracerr::wrap!())?;

        if key_collection.is_terminal() {
            return Err(tracerr::new!(E::AlreadyClosed(
                key_collection.status,
            )));
        }

        key_collection.status = key_collection::Status::Cancelled;

        tx.execute(Update(key_collection.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut effects = Effects::new();
        for party in [contract.landlord_id, contract.tenant_id] {
            effects.notify(
                self.notifier(),
                party,
                Notification::new(
                    Kind::KeyCollectionCancelled,
                    "Key collection cancelled",
                    "The scheduled keys handover is cancelled.",
                )
                .with_link(Link::key_collection(key_collection.id)),
            );
        }
        effects.run().await;

        Ok(key_collection)
    }
}

/// Error of [`CancelKeyCollection`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`KeyCollection`] reached a terminal status already.
    #[display("`KeyCollection` in `{_0}` status cannot be cancelled")]
    AlreadyClosed(#[error(not(source))] key_collection::Status),

    /// [`Contract`] of the [`KeyCollection`] does not exist.
    #[display("`Contract(id: {_0})` does not exist")]
    ContractNotExists(#[error(not(source))] contract::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`KeyCollection`] with the provided ID does not exist.
    #[display("`KeyCollection(id: {_0})` does not exist")]
    KeyCollectionNotExists(#[error(not(source))] key_collection::Id),

    /// [`User`] is not a party of the [`Contract`].
    #[display("`User(id: {_0})` is not a party of the `Contract`")]
    NotAParty(#[error(not(source))] user::Id),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_) | Self::KeyCollectionNotExists(_) => {
                C::NotFound
            }
            Self::NotAParty(_) => C::Forbidden,
            Self::AlreadyClosed(_) => C::PreconditionFailed,
            Self::Db(_) => C::UpstreamFailure,
        }
    }
}
