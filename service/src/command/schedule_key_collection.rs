//! [`Command`] re-evaluating the [`KeyCollection`] auto-scheduling.

use std::sync::Arc;

use common::{
    operations::{By, Commit, Insert, Lock, Select, Transact, Transacted},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{
        contract, key_collection, realty, Contract, KeyCollection, Realty,
    },
    effect::Effects,
    infra::{
        database, ledger,
        notifications::{Kind, Link, Notification},
        Database,
    },
    Service,
};

use super::Command;

/// [`Command`] re-evaluating the [`KeyCollection`] auto-scheduling of a
/// [`Contract`].
///
/// Invoked at the tail of every escrow completion, whatever the
/// settlement path. Once both obligations are settled and the keys are
/// not collected yet, proposes a handover one configured lead before the
/// lease start, at the [`Realty`]'s registered address. Idempotent: an
/// already existing [`KeyCollection`] is never doubled.
///
/// The proposal is all this scheduler creates: the [`Contract`] moves to
/// [`contract::Status::Active`] only when the handover itself is
/// completed later.
#[derive(Clone, Copy, Debug)]
pub struct ScheduleKeyCollection {
    /// ID of the [`Contract`] to re-evaluate.
    pub contract_id: contract::Id,
}

impl<Db> Command<ScheduleKeyCollection> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<KeyCollection>, contract::Id>>,
            Ok = Option<KeyCollection>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Contract, contract::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<KeyCollection>, contract::Id>>,
            Ok = Option<KeyCollection>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Realty>, realty::Id>>,
            Ok = Option<Realty>,
            Err = Traced<database::Error>,
        > + Database<Insert<KeyCollection>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Option<KeyCollection>;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: ScheduleKeyCollection,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ScheduleKeyCollection { contract_id } = cmd;

        let contract = self
            .database()
            .execute(Select(By::<Option<Contract>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract_id))
            .map_err(tracerr::wrap!())?;

        if !contract.escrow_settled() || contract.keys_collected {
            return Ok(None);
        }
        if self
            .database()
            .execute(Select(By::<Option<KeyCollection>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .is_some()
        {
            return Ok(None);
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid double-scheduling by concurrent escrow completions.
        tx.execute(Lock(By::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let contract = tx
            .execute(Select(By::<Option<Contract>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract_id))
            .map_err(tracerr::wrap!())?;
        if !contract.escrow_settled() || contract.keys_collected {
            return Ok(None);
        }
        if tx
            .execute(Select(By::<Option<KeyCollection>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .is_some()
        {
            return Ok(None);
        }

        let realty = tx
            .execute(Select(By::<Option<Realty>, _>::new(contract.realty_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::RealtyNotExists(contract.realty_id))
            .map_err(tracerr::wrap!())?;

        let config = self.config().key_collection;
        let scheduled_at = (contract.starts_on.coerce::<()>() - config.lead)
            .at_hour(config.hour)
            .ok_or(E::InvalidHandoverHour(config.hour))
            .map_err(tracerr::wrap!())?;

        let key_collection = KeyCollection {
            id: key_collection::Id::new(),
            contract_id,
            scheduled_at: scheduled_at.coerce(),
            location: realty.address.into(),
            landlord_confirmed: false,
            tenant_confirmed: false,
            status: key_collection::Status::Scheduled,
            completed_at: None,
            created_at: DateTime::now().coerce(),
        };
        tx.execute(Insert(key_collection.clone()))
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
                    Kind::KeyCollectionScheduled,
                    "Key collection scheduled",
                    format!(
                        "Keys handover is proposed on {} at {}.",
                        key_collection.scheduled_at.coerce::<()>()
                            .to_rfc3339(),
                        key_collection.location,
                    ),
                )
                .with_link(Link::key_collection(key_collection.id)),
            );
        }
        {
            let ledger = Arc::clone(self.ledger());
            let entry = ledger::Entry {
                kind: ledger::Kind::EscrowFunded,
                contract_id,
                occurred_at: DateTime::now(),
            };
            effects.push("record ledger entry", async move {
                ledger.record(entry).await
            });
        }
        effects.run().await;

        Ok(Some(key_collection))
    }
}

/// Error of [`ScheduleKeyCollection`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Contract`] with the provided ID does not exist.
    #[display("`Contract(id: {_0})` does not exist")]
    ContractNotExists(#[error(not(source))] contract::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Configured handover hour is out of range.
    #[display("configured handover hour `{_0}` is out of range")]
    InvalidHandoverHour(#[error(not(source))] u8),

    /// [`Realty`] of the [`Contract`] does not exist.
    #[display("`Realty(id: {_0})` does not exist")]
    RealtyNotExists(#[error(not(source))] realty::Id),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_) | Self::RealtyNotExists(_) => {
                C::NotFound
            }
            Self::InvalidHandoverHour(_) => C::PreconditionFailed,
            Self::Db(_) => C::UpstreamFailure,
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use std::time::Duration;

    use common::Handler as _;

    use crate::{
        command::ScheduleKeyCollection,
        domain::{key_collection, payment},
        testing::Harness,
    };

    #[tokio::test]
    async fn schedules_day_before_lease_start_at_noon() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;
        drop(h.escrow(contract.id, payment::Kind::Deposit).await);
        drop(h.escrow(contract.id, payment::Kind::Rent).await);

        let kc = h.key_collection_of(contract.id).await.unwrap();

        assert_eq!(kc.status, key_collection::Status::Scheduled);
        let expected = (contract.starts_on.coerce::<()>()
            - Duration::from_secs(24 * 3600))
        .at_hour(12)
        .unwrap();
        assert_eq!(kc.scheduled_at.coerce::<()>(), expected);
        assert_eq!(kc.location.to_string(), h.realty.address.to_string());
    }

    #[tokio::test]
    async fn single_settlement_is_not_enough() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;
        drop(h.escrow(contract.id, payment::Kind::Deposit).await);

        assert!(h.key_collection_of(contract.id).await.is_none());
    }

    #[tokio::test]
    async fn existing_collection_is_never_doubled() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;
        drop(h.escrow(contract.id, payment::Kind::Deposit).await);
        drop(h.escrow(contract.id, payment::Kind::Rent).await);

        let first = h.key_collection_of(contract.id).await.unwrap();

        // Freshly re-set payment flags must not reschedule.
        let rescheduled = h
            .service
            .execute(ScheduleKeyCollection {
                contract_id: contract.id,
            })
            .await
            .unwrap();

        assert!(rescheduled.is_none());
        let second = h.key_collection_of(contract.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            first.created_at.coerce::<()>(),
            second.created_at.coerce::<()>(),
        );
    }
}
