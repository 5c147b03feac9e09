//! [`Command`] for completing a [`KeyCollection`] handover.

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    DateTime,
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

/// [`Command`] for completing a confirmed [`KeyCollection`] handover.
///
/// Terminal: flips the [`Contract`]'s keys-collected flag and promotes it
/// into [`contract::Status::Active`]. This is the only way a [`Contract`]
/// leaves [`contract::Status::FullySigned`] forward.
#[derive(Clone, Copy, Debug)]
pub struct CompleteKeyCollection {
    /// ID of the [`KeyCollection`] to complete.
    pub key_collection_id: key_collection::Id,

    /// ID of the [`User`] who marks the handover as happened.
    pub initiator_id: user::Id,
}

impl<Db> Command<CompleteKeyCollection> for Service<Db>
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
        > + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<Update<KeyCollection>, Err = Traced<database::Error>>
        + Database<Update<Contract>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Contract;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CompleteKeyCollection,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CompleteKeyCollection {
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

        // Avoid concurrent completions upon the same `Contract`.
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

        if key_collection.status != key_collection::Status::Confirmed {
            return Err(tracerr::new!(E::NotConfirmed(
                key_collection.status,
            )));
        }

        let mut contract = tx
            .execute(Select(By::<Option<Contract>, _>::new(contract.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract.id))
            .map_err(tracerr::wrap!())?;

        key_collection.status = key_collection::Status::Completed;
        key_collection.completed_at = Some(DateTime::now().coerce());
        contract.keys_collected = true;
        contract.sync_status();

        tx.execute(Update(key_collection.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        tx.execute(Update(contract.clone()))
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
                    Kind::KeysHandedOver,
                    "Keys handed over",
                    "The keys are handed over and the tenancy is active.",
                )
                .with_link(Link::contract(contract.id)),
            );
        }
        effects.run().await;

        Ok(contract)
    }
}

/// Error of [`CompleteKeyCollection`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
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

    /// [`KeyCollection`] is not confirmed by both parties.
    #[display("`KeyCollection` in `{_0}` status cannot be completed")]
    NotConfirmed(#[error(not(source))] key_collection::Status),

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
            Self::NotConfirmed(_) => C::PreconditionFailed,
            Self::Db(_) => C::UpstreamFailure,
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::Handler as _;

    use crate::{
        command::{CompleteKeyCollection, ConfirmKeyCollection},
        domain::{contract, key_collection},
        testing::Harness,
    };

    use super::{Classify as _, ErrorClass};

    #[tokio::test]
    async fn completion_promotes_contract_to_active() {
        let h = Harness::new().await;
        let contract = h.escrowed().await;
        let kc = h.key_collection_of(contract.id).await.unwrap();

        for party in [h.landlord.id, h.tenant.id] {
            drop(
                h.service
                    .execute(ConfirmKeyCollection {
                        key_collection_id: kc.id,
                        party_id: party,
                    })
                    .await
                    .unwrap(),
            );
        }

        let active = h
            .service
            .execute(CompleteKeyCollection {
                key_collection_id: kc.id,
                initiator_id: h.landlord.id,
            })
            .await
            .unwrap();

        assert!(active.keys_collected);
        assert_eq!(active.status, contract::Status::Active);

        let kc = h.key_collection_of(contract.id).await.unwrap();
        assert_eq!(kc.status, key_collection::Status::Completed);
        assert!(kc.completed_at.is_some());
    }

    #[tokio::test]
    async fn unconfirmed_handover_cannot_be_completed() {
        let h = Harness::new().await;
        let contract = h.escrowed().await;
        let kc = h.key_collection_of(contract.id).await.unwrap();

        let err = h
            .service
            .execute(CompleteKeyCollection {
                key_collection_id: kc.id,
                initiator_id: h.landlord.id,
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::PreconditionFailed);
    }
}
