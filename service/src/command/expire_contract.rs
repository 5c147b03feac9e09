//! [`Command`] for expiring a [`Contract`].

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{contract, realty, user, Contract, Realty},
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

/// [`Command`] for expiring a [`Contract`] whose lease period has ended.
///
/// Returns the [`Realty`] to the searchable status. Unlike termination,
/// expiry keeps the linked checklist intact: the tenancy record stays
/// complete.
#[derive(Clone, Copy, Debug)]
pub struct ExpireContract {
    /// ID of the [`Contract`] to expire.
    pub contract_id: contract::Id,

    /// ID of the [`User`] who expires the [`Contract`].
    pub initiator_id: user::Id,
}

impl<Db> Command<ExpireContract> for Service<Db>
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
        > + Database<Update<Contract>, Err = Traced<database::Error>>
        + Database<Update<Realty>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Contract;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: ExpireContract,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ExpireContract {
            contract_id,
            initiator_id,
        } = cmd;

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

        if contract.ends_on.coerce::<()>() > DateTime::now() {
            return Err(tracerr::new!(E::LeaseNotEnded(contract_id)));
        }

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

        contract.expired_at = Some(DateTime::now().coerce());
        contract.sync_status();

        tx.execute(Update(contract.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

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
                    Kind::ContractExpired,
                    "Contract expired",
                    "The rental contract lease period has ended.",
                )
                .with_link(Link::contract(contract.id)),
            );
        }
        effects.run().await;

        Ok(contract)
    }
}

/// Error of [`ExpireContract`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Contract`] is terminated or expired already.
    #[display("`Contract` in `{_0}` status cannot be expired")]
    AlreadyClosed(#[error(not(source))] contract::Status),

    /// [`Contract`] with the provided ID does not exist.
    #[display("`Contract(id: {_0})` does not exist")]
    ContractNotExists(#[error(not(source))] contract::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Lease period of the [`Contract`] has not ended yet.
    #[display("`Contract(id: {_0})` lease period has not ended yet")]
    LeaseNotEnded(#[error(not(source))] contract::Id),

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
            Self::AlreadyClosed(_) | Self::LeaseNotEnded(_) => {
                C::PreconditionFailed
            }
            Self::Db(_) => C::UpstreamFailure,
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::{
        operations::{By, Select},
        Handler as _,
    };

    use crate::{
        command::{AttachChecklist, ExpireContract},
        domain::{contract, realty, Checklist, Realty},
        testing::Harness,
    };

    #[tokio::test]
    async fn expiry_frees_realty_but_keeps_checklist() {
        let h = Harness::new().await;
        let contract = h.active_with_ended_lease().await;
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

        let expired = h
            .service
            .execute(ExpireContract {
                contract_id: contract.id,
                initiator_id: h.landlord.id,
            })
            .await
            .unwrap();

        assert_eq!(expired.status, contract::Status::Expired);

        let realty = h
            .service
            .database()
            .execute(Select(By::<Option<Realty>, _>::new(h.realty.id)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(realty.status, realty::Status::Active);

        let kept = h
            .service
            .database()
            .execute(Select(By::<Option<Checklist>, _>::new(checklist.id)))
            .await
            .unwrap();
        assert!(kept.is_some(), "checklist must survive expiry");
    }
}
