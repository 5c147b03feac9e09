//! [`Command`] for terminating a [`Contract`].

use common::{
    operations::{
        By, Commit, Delete, Lock, Select, Transact, Transacted, Update,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{
        checklist, contract, key_collection, realty, user, Checklist,
        Contract, KeyCollection, Realty,
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

/// [`Command`] for terminating a [`Contract`].
///
/// Returns the [`Realty`] to the searchable status and removes the linked
/// [`Checklist`], so a fresh tenancy may start from a clean one.
#[derive(Clone, Copy, Debug)]
pub struct TerminateContract {
    /// ID of the [`Contract`] to terminate.
    pub contract_id: contract::Id,

    /// ID of the [`User`] who terminates the [`Contract`].
    pub initiator_id: user::Id,

    /// [`DateTime`] the termination takes effect at.
    ///
    /// Must lie in the future.
    pub effective_on: contract::TerminationDateTime,
}

impl<Db> Command<TerminateContract> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Contract, contract::Id>>,
            Err = Traced<database::Error>,
        > + Database<Lock<By<Realty, realty::Id>>, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Realty>, realty::Id>>,
            Ok = Option<Realty>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<KeyCollection>, contract::Id>>,
            Ok = Option<KeyCollection>,
            Err = Traced<database::Error>,
        > + Database<Update<Contract>, Err = Traced<database::Error>>
        + Database<Update<Realty>, Err = Traced<database::Error>>
        + Database<Update<KeyCollection>, Err = Traced<database::Error>>
        + Database<
            Delete<By<Checklist, checklist::Id>>,
            Err = Traced<database::Error>,
        > + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Contract;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: TerminateContract,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let TerminateContract {
            contract_id,
            initiator_id,
            effective_on,
        } = cmd;

        if effective_on.coerce::<()>() <= DateTime::now() {
            return Err(tracerr::new!(E::EffectiveDateNotInFuture));
        }

        let contract = self
            .database()
            .execute(Select(By::<Option<Contract>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract_id))
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

        // Avoid concurrent actions upon the same `Realty`.
        tx.execute(Lock(By::new(contract.realty_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        tx.execute(Lock(By::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut contract = tx
            .execute(Select(By::<Option<Contract>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract_id))
            .map_err(tracerr::wrap!())?;

        if contract.terminated_at.is_some() || contract.expired_at.is_some() {
            return Err(tracerr::new!(E::AlreadyClosed(contract.status)));
        }

        contract.terminated_at = Some(effective_on);
        if let Some(link) = contract.checklist.take() {
            tx.execute(Delete(By::<Checklist, _>::new(link.id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }
        contract.sync_status();

        tx.execute(Update(contract.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        // Cancel a handover that never happened.
        let key_collection = tx
            .execute(Select(By::<Option<KeyCollection>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if let Some(mut kc) = key_collection.filter(|kc| !kc.is_terminal()) {
            kc.status = key_collection::Status::Cancelled;
            tx.execute(Update(kc))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }

        // Return the `Realty` to the search.
        let realty = tx
            .execute(Select(By::<Option<Realty>, _>::new(contract.realty_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if let Some(mut realty) = realty {
            realty.status = realty::Status::Active;
            tx.execute(Update(realty))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }

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
                    Kind::ContractTerminated,
                    "Contract terminated",
                    "The rental contract is terminated.",
                )
                .with_link(Link::contract(contract.id)),
            );
        }
        effects.run().await;

        Ok(contract)
    }
}

/// Error of [`TerminateContract`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Contract`] is terminated or expired already.
    #[display("`Contract` in `{_0}` status cannot be terminated")]
    AlreadyClosed(#[error(not(source))] contract::Status),

    /// [`Contract`] with the provided ID does not exist.
    #[display("`Contract(id: {_0})` does not exist")]
    ContractNotExists(#[error(not(source))] contract::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Termination date is not in the future.
    #[display("termination date must lie in the future")]
    EffectiveDateNotInFuture,

    /// [`User`] is not a party of the [`Contract`].
    #[display("`User(id: {_0})` is not a party of the `Contract`")]
    NotAParty(#[error(not(source))] user::Id),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_) => C::NotFound,
            Self::NotAParty(_) => C::Forbidden,
            Self::AlreadyClosed(_) | Self::EffectiveDateNotInFuture => {
                C::PreconditionFailed
            }
            Self::Db(_) => C::UpstreamFailure,
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use std::time::Duration;

    use common::{
        operations::{By, Select},
        DateTime, Handler as _,
    };

    use crate::{
        command::{AttachChecklist, TerminateContract},
        domain::{contract, realty, Checklist, Realty},
        testing::Harness,
    };

    use super::{Classify as _, ErrorClass};

    #[tokio::test]
    async fn termination_frees_realty_and_removes_checklist() {
        let h = Harness::new().await;
        let contract = h.active().await;
        let template_id = h.seed_template().await;
        let checklist = h
            .service
            .execute(AttachChecklist {
                contract_id: contract.id,
                template_id,
                initiator_id: h.landlord.id,
            })
            .await
            .unwrap();

        let terminated = h
            .service
            .execute(TerminateContract {
                contract_id: contract.id,
                initiator_id: h.landlord.id,
                effective_on: (DateTime::now()
                    + Duration::from_secs(24 * 3600))
                .coerce(),
            })
            .await
            .unwrap();

        assert_eq!(terminated.status, contract::Status::Terminated);
        assert!(terminated.checklist.is_none());

        let realty = h
            .service
            .database()
            .execute(Select(By::<Option<Realty>, _>::new(h.realty.id)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(realty.status, realty::Status::Active);

        let gone = h
            .service
            .database()
            .execute(Select(By::<Option<Checklist>, _>::new(checklist.id)))
            .await
            .unwrap();
        assert!(gone.is_none(), "checklist must be removed on termination");
    }

    #[tokio::test]
    async fn past_effective_date_is_rejected() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;

        let err = h
            .service
            .execute(TerminateContract {
                contract_id: contract.id,
                initiator_id: h.landlord.id,
                effective_on: (DateTime::now()
                    - Duration::from_secs(24 * 3600))
                .coerce(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::PreconditionFailed);
    }
}
