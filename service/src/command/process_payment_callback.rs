//! [`Command`] for processing an asynchronous payment processor callback.

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    DateTime, Money,
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
        payment, user, Contract, KeyCollection, Payment,
    },
    effect::Effects,
    infra::{
        database,
        notifications::{Kind, Link, Notification},
        payments::Metadata,
        Database,
    },
    read::payment::Pending,
    Service,
};

use super::Command;

/// [`Command`] for processing an inbound processor callback reporting a
/// successful charge.
///
/// Locates the matching [`Payment`] by the processor reference, falling
/// back to a `(contract, payer, amount, pending)` tuple match against the
/// echoed [`Metadata`] in case the reference was never attached, and
/// applies exactly the same effects as a client-driven confirmation.
/// Duplicate callbacks are no-ops.
#[derive(Clone, Debug)]
pub struct ProcessPaymentCallback {
    /// Processor reference of the succeeded charge.
    pub reference: payment::ProcessorReference,

    /// [`Metadata`] echoed back by the processor.
    pub metadata: Metadata,
}

impl<Db> Command<ProcessPaymentCallback> for Service<Db>
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
            Select<
                By<
                    Option<Pending<Payment>>,
                    (contract::Id, user::Id, Money),
                >,
            >,
            Ok = Option<Pending<Payment>>,
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
        cmd: ProcessPaymentCallback,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ProcessPaymentCallback {
            reference,
            metadata,
        } = cmd;

        let known = self
            .database()
            .execute(Select(By::<Option<Payment>, _>::new(reference.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if let Some(payment) =
            known.filter(|p| p.status == payment::Status::Completed)
        {
            // A duplicate callback for a completed `Payment` is a no-op.
            return Ok(payment);
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent completions upon the same `Contract`.
        tx.execute(Lock(By::new(metadata.contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let located = tx
            .execute(Select(By::<Option<Payment>, _>::new(reference.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        let mut payment = match located {
            Some(payment) => payment,
            None => {
                // The reference was never attached: fall back to matching
                // a pending row by the echoed metadata.
                let amount = Money::new(
                    metadata.platform_fee.amount + metadata.net_amount.amount,
                    metadata.platform_fee.currency,
                );
                let Pending(mut payment) = tx
                    .execute(Select(By::<Option<Pending<Payment>>, _>::new((
                        metadata.contract_id,
                        metadata.payer_id,
                        amount,
                    ))))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
                    .ok_or_else(|| E::PaymentNotExists(reference.clone()))
                    .map_err(tracerr::wrap!())?;
                payment.reference = Some(reference.clone());
                payment
            }
        };

        if payment.status == payment::Status::Completed {
            return Ok(payment);
        }
        if !payment.status.allows(payment::Status::Completed) {
            return Err(tracerr::new!(E::NotCompletable(payment.status)));
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

/// Error of [`ProcessPaymentCallback`] [`Command`] execution.
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

    /// No [`Payment`] matches the callback.
    #[display("no `Payment` matches the `{_0}` reference callback")]
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
    use common::{operations::Update, Handler as _};

    use crate::{
        command::ProcessPaymentCallback,
        domain::payment,
        infra::payments::Metadata,
        testing::Harness,
    };

    #[tokio::test]
    async fn callback_completes_payment_by_reference() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;
        let intent = h.intent(contract.id, payment::Kind::Deposit).await;
        let reference = intent.payment.reference.clone().unwrap();

        let completed = h
            .service
            .execute(ProcessPaymentCallback {
                reference,
                metadata: Metadata {
                    contract_id: contract.id,
                    payer_id: h.tenant.id,
                    kind: payment::Kind::Deposit,
                    platform_fee: intent.payment.platform_fee,
                    net_amount: intent.payment.net_amount,
                },
            })
            .await
            .unwrap();

        assert_eq!(completed.status, payment::Status::Completed);
        assert!(h.contract(contract.id).await.unwrap().deposit_paid());
    }

    #[tokio::test]
    async fn callback_falls_back_to_tuple_match() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;
        let intent = h.intent(contract.id, payment::Kind::Deposit).await;

        // Detach the reference, as if the processor called back before it
        // was attached to the row.
        let mut detached = intent.payment.clone();
        detached.reference = None;
        h.service
            .database()
            .execute(Update(detached))
            .await
            .unwrap();

        let completed = h
            .service
            .execute(ProcessPaymentCallback {
                reference: payment::ProcessorReference::from(
                    "pi_late".to_owned(),
                ),
                metadata: Metadata {
                    contract_id: contract.id,
                    payer_id: h.tenant.id,
                    kind: payment::Kind::Deposit,
                    platform_fee: intent.payment.platform_fee,
                    net_amount: intent.payment.net_amount,
                },
            })
            .await
            .unwrap();

        assert_eq!(completed.status, payment::Status::Completed);
        assert_eq!(
            completed.reference,
            Some(payment::ProcessorReference::from("pi_late".to_owned())),
        );
    }

    #[tokio::test]
    async fn duplicate_callback_is_a_no_op() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;
        let intent = h.intent(contract.id, payment::Kind::Rent).await;
        let reference = intent.payment.reference.clone().unwrap();

        let callback = || ProcessPaymentCallback {
            reference: reference.clone(),
            metadata: Metadata {
                contract_id: contract.id,
                payer_id: h.tenant.id,
                kind: payment::Kind::Rent,
                platform_fee: intent.payment.platform_fee,
                net_amount: intent.payment.net_amount,
            },
        };
        let first = h.service.execute(callback()).await.unwrap();
        let second = h.service.execute(callback()).await.unwrap();

        assert_eq!(first.paid_at, second.paid_at);
        let completed = h
            .payments_of(contract.id)
            .await
            .into_iter()
            .filter(|p| p.status == payment::Status::Completed)
            .count();
        assert_eq!(completed, 1);
    }
}
