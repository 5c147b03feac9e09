//! [`Command`] for confirming an escrow [`Payment`] intent.

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
        payment, Contract, KeyCollection, Payment,
    },
    effect::Effects,
    infra::{
        database,
        notifications::{Kind, Link, Notification},
        Database,
    },
    Service,
};

use super::Command;

/// [`Command`] for confirming an escrow [`Payment`] intent, client-driven.
///
/// Marks the matching [`Payment`] as completed, mirrors the settlement
/// onto the owning [`Contract`] and re-evaluates the key collection
/// auto-scheduling. Idempotent: confirming an already completed reference
/// is a no-op.
#[derive(Clone, Debug)]
pub struct ConfirmPayment {
    /// Processor reference of the [`Payment`] to confirm.
    pub reference: payment::ProcessorReference,
}

impl<Db> Command<ConfirmPayment> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Payment>, payment::ProcessorReference>>,
            Ok = Option<Payment>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Contract, contract::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Payment>, payment::ProcessorReference>>,
            Ok = Option<Payment>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<Update<Payment>, Err = Traced<database::Error>>
        + Database<Update<Contract>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Self: Command<
        ScheduleKeyCollection,
        Ok = Option<KeyCollection>,
        Err = Traced<schedule_key_collection::ExecutionError>,
    >,
{
    type Ok = Payment;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: ConfirmPayment,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ConfirmPayment { reference } = cmd;

        let payment = self
            .database()
            .execute(Select(By::<Option<Payment>, _>::new(reference.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| E::PaymentNotExists(reference.clone()))
            .map_err(tracerr::wrap!())?;

        // A duplicate confirmation of a completed `Payment` is a no-op,
        // not an error.
        if payment.status == payment::Status::Completed {
            return Ok(payment);
        }
        if !payment.status.allows(payment::Status::Completed) {
            return Err(tracerr::new!(E::NotCompletable(payment.status)));
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent completions upon the same `Contract`.
        tx.execute(Lock(By::new(payment.contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut payment = tx
            .execute(Select(By::<Option<Payment>, _>::new(reference.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| E::PaymentNotExists(reference.clone()))
            .map_err(tracerr::wrap!())?;
        if payment.status == payment::Status::Completed {
            return Ok(payment);
        }

        let mut contract = tx
            .execute(Select(By::<Option<Contract>, _>::new(
                payment.contract_id,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(payment.contract_id))
            .map_err(tracerr::wrap!())?;

        let now = DateTime::now();
        let _ = payment.complete(now.coerce());
        let _ = contract.settle(
            payment.kind,
            Settlement {
                method: settlement::Method::Card,
                reference: Some(settlement::Reference::from(String::from(
                    reference,
                ))),
                paid_at: now.coerce(),
            },
        );
        contract.sync_status();

        tx.execute(Update(payment.clone()))
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

        // Re-evaluate the key collection auto-scheduling: both the
        // automated and the manual settlement paths converge here.
        self.execute(ScheduleKeyCollection {
            contract_id: contract.id,
        })
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))
        .map(drop)?;

        let mut effects = Effects::new();
        effects.notify(
            self.notifier(),
            payment.payer_id,
            Notification::new(
                Kind::PaymentCompleted,
                "Payment completed",
                format!("Your {} payment of {} is completed.",
                    payment.kind, payment.amount),
            )
            .with_link(Link::contract(contract.id)),
        );
        effects.notify(
            self.notifier(),
            contract.landlord_id,
            Notification::new(
                Kind::PaymentReceived,
                "Payment received",
                format!(
                    "A {} payment of {} is received in escrow.",
                    payment.kind, payment.amount,
                ),
            )
            .with_link(Link::contract(contract.id)),
        );
        effects.run().await;

        Ok(payment)
    }
}

/// Error of [`ConfirmPayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Contract`] of the [`Payment`] does not exist.
    #[display("`Contract(id: {_0})` does not exist")]
    ContractNotExists(#[error(not(source))] contract::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Payment`] reached a state disallowing completion.
    #[display("`Payment` in `{_0}` status cannot be completed")]
    NotCompletable(#[error(not(source))] payment::Status),

    /// No [`Payment`] carries the provided processor reference.
    #[display("no `Payment` carries the `{_0}` reference")]
    PaymentNotExists(#[error(not(source))] payment::ProcessorReference),

    /// Key collection auto-scheduling failed.
    #[display("key collection auto-scheduling failed: {_0}")]
    #[from]
    Schedule(schedule_key_collection::ExecutionError),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_) | Self::PaymentNotExists(_) => {
                C::NotFound
            }
            Self::NotCompletable(_) => C::PreconditionFailed,
            Self::Db(_) => C::UpstreamFailure,
            Self::Schedule(e) => e.class(),
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::Handler as _;

    use crate::{
        command::ConfirmPayment,
        domain::{contract, payment},
        infra::notifications,
        testing::Harness,
    };

    #[tokio::test]
    async fn confirmation_settles_contract_and_notifies_both_sides() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;
        let intent = h.intent(contract.id, payment::Kind::Deposit).await;

        let completed = h
            .service
            .execute(ConfirmPayment {
                reference: intent.payment.reference.clone().unwrap(),
            })
            .await
            .unwrap();

        assert_eq!(completed.status, payment::Status::Completed);
        assert!(completed.paid_at.is_some());

        let contract = h.contract(contract.id).await.unwrap();
        assert!(contract.deposit_paid());
        assert!(!contract.first_month_rent_paid());
        assert_eq!(contract.status, contract::Status::FullySigned);

        assert_eq!(
            h.notifier
                .recipients_of(notifications::Kind::PaymentCompleted),
            vec![h.tenant.id],
        );
        assert_eq!(
            h.notifier
                .recipients_of(notifications::Kind::PaymentReceived),
            vec![h.landlord.id],
        );
    }

    #[tokio::test]
    async fn both_confirmations_schedule_exactly_one_key_collection() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;

        let deposit = h.intent(contract.id, payment::Kind::Deposit).await;
        let rent = h.intent(contract.id, payment::Kind::Rent).await;
        for intent in [&deposit, &rent] {
            drop(
                h.service
                    .execute(ConfirmPayment {
                        reference: intent
                            .payment
                            .reference
                            .clone()
                            .unwrap(),
                    })
                    .await
                    .unwrap(),
            );
        }

        assert!(h.key_collection_of(contract.id).await.is_some());

        // A duplicate confirmation must change nothing.
        let again = h
            .service
            .execute(ConfirmPayment {
                reference: rent.payment.reference.clone().unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(again.status, payment::Status::Completed);

        let payments = h.payments_of(contract.id).await;
        let completed_rents = payments
            .iter()
            .filter(|p| {
                p.kind == payment::Kind::Rent
                    && p.status == payment::Status::Completed
            })
            .count();
        assert_eq!(completed_rents, 1);
        assert_eq!(
            h.notifier
                .recipients_of(notifications::Kind::KeyCollectionScheduled)
                .len(),
            2,
            "the key collection must be scheduled exactly once",
        );
    }
}
