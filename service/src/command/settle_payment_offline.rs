//! [`Command`] for recording an offline escrow settlement.

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{
        schedule_key_collection, Classify, ErrorClass,
        ScheduleKeyCollection,
    },
    domain::{
        contract::{self, settlement, Settlement},
        payment, user, Contract, KeyCollection,
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

/// [`Command`] for recording a cash or bank-transfer settlement of an
/// escrow obligation, with no processor round trip.
///
/// Converges on exactly the same [`Contract`]-side effects as the
/// processor-driven path, so the key collection auto-scheduler cannot
/// distinguish the payment origin.
#[derive(Clone, Debug)]
pub struct SettlePaymentOffline {
    /// ID of the [`Contract`] the obligation belongs to.
    pub contract_id: contract::Id,

    /// ID of the [`User`] who records the settlement.
    pub initiator_id: user::Id,

    /// [`payment::Kind`] of the settled obligation.
    pub kind: payment::Kind,

    /// Offline [`settlement::Method`] the obligation was settled with.
    pub method: settlement::Method,

    /// External reference of the settlement, if any.
    pub reference: Option<settlement::Reference>,
}

impl<Db> Command<SettlePaymentOffline> for Service<Db>
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
        > + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<Update<Contract>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Self: Command<
        ScheduleKeyCollection,
        Ok = Option<KeyCollection>,
        Err = Traced<schedule_key_collection::ExecutionError>,
    >,
{
    type Ok = Contract;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: SettlePaymentOffline,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let SettlePaymentOffline {
            contract_id,
            initiator_id,
            kind,
            method,
            reference,
        } = cmd;

        if method == settlement::Method::Card {
            return Err(tracerr::new!(E::NotAnOfflineMethod));
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

        if !contract.is_fully_signed() {
            return Err(tracerr::new!(E::NotFullySigned(contract_id)));
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent completions upon the same `Contract`.
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

        let settled = contract.settle(
            kind,
            Settlement {
                method,
                reference,
                paid_at: DateTime::now().coerce(),
            },
        );
        if !settled {
            return Err(tracerr::new!(E::AlreadySettled(kind)));
        }
        contract.sync_status();

        tx.execute(Update(contract.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        // Re-evaluate the key collection auto-scheduling: both the
        // automated and the manual settlement paths converge here.
        self.execute(ScheduleKeyCollection {
            contract_id: contract.id,
        })
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))
        .map(drop)?;

        let amount = match kind {
            payment::Kind::Deposit => contract.security_deposit,
            payment::Kind::Rent => contract.monthly_rent,
        };
        let mut effects = Effects::new();
        effects.notify(
            self.notifier(),
            contract.tenant_id,
            Notification::new(
                Kind::PaymentCompleted,
                "Payment completed",
                format!("Your {kind} payment of {amount} is completed."),
            )
            .with_link(Link::contract(contract.id)),
        );
        effects.notify(
            self.notifier(),
            contract.landlord_id,
            Notification::new(
                Kind::PaymentReceived,
                "Payment received",
                format!("A {kind} payment of {amount} is received."),
            )
            .with_link(Link::contract(contract.id)),
        );
        effects.run().await;

        Ok(contract)
    }
}

/// Error of [`SettlePaymentOffline`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// Escrow obligation is settled already.
    #[display("`{_0}` obligation is settled already")]
    AlreadySettled(#[error(not(source))] payment::Kind),

    /// [`Contract`] with the provided ID does not exist.
    #[display("`Contract(id: {_0})` does not exist")]
    ContractNotExists(#[error(not(source))] contract::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Provided settlement method is not an offline one.
    #[display("card settlements must go through the payment processor")]
    NotAnOfflineMethod,

    /// [`Contract`] is not signed by both parties yet.
    #[display("`Contract(id: {_0})` is not fully signed yet")]
    NotFullySigned(#[error(not(source))] contract::Id),

    /// [`User`] is not a party of the [`Contract`].
    #[display("`User(id: {_0})` is not a party of the `Contract`")]
    NotAParty(#[error(not(source))] user::Id),

    /// Key collection auto-scheduling failed.
    #[display("key collection auto-scheduling failed: {_0}")]
    #[from]
    Schedule(schedule_key_collection::ExecutionError),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_) => C::NotFound,
            Self::NotAParty(_) => C::Forbidden,
            Self::AlreadySettled(_)
            | Self::NotAnOfflineMethod
            | Self::NotFullySigned(_) => C::PreconditionFailed,
            Self::Db(_) => C::UpstreamFailure,
            Self::Schedule(e) => e.class(),
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::Handler as _;

    use crate::{
        command::SettlePaymentOffline,
        domain::{contract::settlement, payment},
        testing::Harness,
    };

    #[tokio::test]
    async fn offline_and_processor_paths_converge() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;

        // Deposit in cash, first month rent through the processor.
        let settled = h
            .service
            .execute(SettlePaymentOffline {
                contract_id: contract.id,
                initiator_id: h.landlord.id,
                kind: payment::Kind::Deposit,
                method: settlement::Method::Cash,
                reference: None,
            })
            .await
            .unwrap();
        assert!(settled.deposit_paid());
        assert!(h.key_collection_of(contract.id).await.is_none());

        drop(h.escrow(contract.id, payment::Kind::Rent).await);

        let kc = h.key_collection_of(contract.id).await;
        assert!(
            kc.is_some(),
            "mixed settlement paths must still trigger the scheduler",
        );
    }

    #[tokio::test]
    async fn card_method_is_rejected_offline() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;

        let err = h
            .service
            .execute(SettlePaymentOffline {
                contract_id: contract.id,
                initiator_id: h.tenant.id,
                kind: payment::Kind::Deposit,
                method: settlement::Method::Card,
                reference: None,
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("processor"));
    }
}
