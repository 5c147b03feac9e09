//! [`Command`] for confirming a [`KeyCollection`] handover.

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

/// [`Command`] for confirming a proposed [`KeyCollection`] handover by one
/// of the [`Contract`] parties.
///
/// Once both parties confirm, the [`KeyCollection`] becomes
/// [`key_collection::Status::Confirmed`]. Re-confirming is a no-op.
#[derive(Clone, Copy, Debug)]
pub struct ConfirmKeyCollection {
    /// ID of the [`KeyCollection`] to confirm.
    pub key_collection_id: key_collection::Id,

    /// ID of the [`User`] who confirms the handover.
    pub party_id: user::Id,
}

impl<Db> Command<ConfirmKeyCollection> for Service<Db>
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
        cmd: ConfirmKeyCollection,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ConfirmKeyCollection {
            key_collection_id,
            party_id,
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

        let role = contract
            .party_role(party_id)
            .ok_or(E::NotAParty(party_id))
            .map_err(tracerr::wrap!())?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent confirmations upon the same `Contract`.
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

        *key_collection.confirmation_mut(role) = true;
        if key_collection.both_confirmed() {
            key_collection.status = key_collection::Status::Confirmed;
        }

        tx.execute(Update(key_collection.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let other_party = match role {
            contract::Role::Landlord => contract.tenant_id,
            contract::Role::Tenant => contract.landlord_id,
        };
        let mut effects = Effects::new();
        effects.notify(
            self.notifier(),
            other_party,
            Notification::new(
                Kind::KeyCollectionConfirmed,
                "Key collection confirmed",
                "The other party confirmed the keys handover.",
            )
            .with_link(Link::key_collection(key_collection.id)),
        );
        effects.run().await;

        Ok(key_collection)
    }
}

/// Error of [`ConfirmKeyCollection`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`KeyCollection`] reached a terminal status.
    #[display("`KeyCollection` in `{_0}` status cannot be confirmed")]
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

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::Handler as _;

    use crate::{
        command::ConfirmKeyCollection, domain::key_collection,
        testing::Harness,
    };

    #[tokio::test]
    async fn both_confirmations_yield_confirmed_status() {
        let h = Harness::new().await;
        let contract = h.escrowed().await;
        let kc = h.key_collection_of(contract.id).await.unwrap();

        let after_one = h
            .service
            .execute(ConfirmKeyCollection {
                key_collection_id: kc.id,
                party_id: h.landlord.id,
            })
            .await
            .unwrap();
        assert_eq!(after_one.status, key_collection::Status::Scheduled);
        assert!(after_one.landlord_confirmed);
        assert!(!after_one.tenant_confirmed);

        let after_both = h
            .service
            .execute(ConfirmKeyCollection {
                key_collection_id: kc.id,
                party_id: h.tenant.id,
            })
            .await
            .unwrap();
        assert_eq!(after_both.status, key_collection::Status::Confirmed);
    }
}
