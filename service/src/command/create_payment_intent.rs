//! [`Command`] for creating an escrow [`Payment`] intent.

use common::{
    operations::{By, Commit, Insert, Select, Transact, Transacted},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{contract, payment, user, Contract, Payment},
    infra::{
        database,
        payments::{self, ChargeIntentRequest, ClientSecret, Metadata},
        Database,
    },
    Service,
};

#[cfg(doc)]
use crate::domain::User;

use super::Command;

/// [`Command`] for creating an escrow [`Payment`] intent.
///
/// Opens a processor-side charge intent and persists a
/// [`payment::Status::Pending`] row carrying the processor reference and
/// the fee split frozen at this very moment. A processor failure leaves no
/// row behind: retrying simply creates a fresh intent.
#[derive(Clone, Copy, Debug)]
pub struct CreatePaymentIntent {
    /// ID of the [`Contract`] to charge against.
    pub contract_id: contract::Id,

    /// ID of the [`User`] who pays.
    pub payer_id: user::Id,

    /// [`payment::Kind`] of the escrow obligation to charge.
    pub kind: payment::Kind,
}

/// Result of a [`CreatePaymentIntent`] [`Command`] execution.
#[derive(Clone, Debug)]
pub struct PaymentIntent {
    /// Persisted pending [`Payment`].
    pub payment: Payment,

    /// Opaque [`ClientSecret`] for completing the charge off-path.
    pub client_secret: ClientSecret,
}

impl<Db> Command<CreatePaymentIntent> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<Insert<Payment>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = PaymentIntent;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CreatePaymentIntent,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreatePaymentIntent {
            contract_id,
            payer_id,
            kind,
        } = cmd;

        let contract = self
            .database()
            .execute(Select(By::<Option<Contract>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract_id))
            .map_err(tracerr::wrap!())?;

        match contract.party_role(payer_id) {
            Some(contract::Role::Tenant) => {}
            Some(contract::Role::Landlord) | None => {
                return Err(tracerr::new!(E::NotThePayer(payer_id)));
            }
        }

        if !contract.is_fully_signed() {
            return Err(tracerr::new!(E::NotFullySigned(contract_id)));
        }
        if contract.settlement(kind).is_some() {
            return Err(tracerr::new!(E::AlreadySettled(kind)));
        }

        let amount = match kind {
            payment::Kind::Deposit => contract.security_deposit,
            payment::Kind::Rent => contract.monthly_rent,
        };
        // The commission is read here, at intent creation time, and frozen
        // into the `Payment` row: later configuration changes must never
        // alter an already created split.
        let split = amount.split(self.config().commission);

        let intent = self
            .payments()
            .create_charge_intent(ChargeIntentRequest {
                amount,
                metadata: Metadata {
                    contract_id,
                    payer_id,
                    kind,
                    platform_fee: split.platform_fee,
                    net_amount: split.net,
                },
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let payment = Payment {
            id: payment::Id::new(),
            contract_id,
            payer_id,
            kind,
            amount,
            platform_fee: split.platform_fee,
            net_amount: split.net,
            status: payment::Status::Pending,
            reference: Some(intent.id),
            due_at: Some(contract.starts_on.coerce()),
            paid_at: None,
            created_at: DateTime::now().coerce(),
        };

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        tx.execute(Insert(payment.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(PaymentIntent {
            payment,
            client_secret: intent.client_secret,
        })
    }
}

/// Error of [`CreatePaymentIntent`] [`Command`] execution.
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

    /// [`Contract`] is not signed by both parties yet.
    #[display("`Contract(id: {_0})` is not fully signed yet")]
    NotFullySigned(#[error(not(source))] contract::Id),

    /// [`User`] is not the paying party of the [`Contract`].
    #[display("`User(id: {_0})` is not the tenant of the `Contract`")]
    NotThePayer(#[error(not(source))] user::Id),

    /// Payment processor error. Retryable.
    #[display("`PaymentGateway` operation failed: {_0}")]
    #[from]
    Processor(payments::Error),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_) => C::NotFound,
            Self::NotThePayer(_) => C::Forbidden,
            Self::AlreadySettled(_) | Self::NotFullySigned(_) => {
                C::PreconditionFailed
            }
            Self::Db(_) | Self::Processor(_) => C::UpstreamFailure,
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::{money::Currency, Handler as _, Money};

    use crate::{
        command::CreatePaymentIntent,
        domain::payment,
        testing::Harness,
    };

    use super::{Classify as _, ErrorClass};

    #[tokio::test]
    async fn deposit_intent_carries_frozen_fee_split() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;

        let intent = h
            .service
            .execute(CreatePaymentIntent {
                contract_id: contract.id,
                payer_id: h.tenant.id,
                kind: payment::Kind::Deposit,
            })
            .await
            .unwrap();

        // 5% of 1200.00 is 60.00, leaving 1140.00 to the landlord.
        assert_eq!(intent.payment.amount, Money::new(120_000, Currency::Usd));
        assert_eq!(
            intent.payment.platform_fee,
            Money::new(6000, Currency::Usd),
        );
        assert_eq!(
            intent.payment.net_amount,
            Money::new(114_000, Currency::Usd),
        );
        assert_eq!(intent.payment.status, payment::Status::Pending);
        assert!(intent.payment.reference.is_some());
        assert_eq!(h.payments.issued(), 1);
    }

    #[tokio::test]
    async fn unsigned_contract_cannot_be_charged() {
        let h = Harness::new().await;
        let contract = h.create_draft().await;

        let err = h
            .service
            .execute(CreatePaymentIntent {
                contract_id: contract.id,
                payer_id: h.tenant.id,
                kind: payment::Kind::Rent,
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::PreconditionFailed);
    }

    #[tokio::test]
    async fn processor_failure_is_retryable_and_leaves_no_row() {
        let h = Harness::with_unavailable_processor().await;
        let contract = h.fully_signed().await;

        let err = h
            .service
            .execute(CreatePaymentIntent {
                contract_id: contract.id,
                payer_id: h.tenant.id,
                kind: payment::Kind::Deposit,
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::UpstreamFailure);
        assert!(h.payments_of(contract.id).await.is_empty());
    }

    #[tokio::test]
    async fn landlord_cannot_pay() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;

        let err = h
            .service
            .execute(CreatePaymentIntent {
                contract_id: contract.id,
                payer_id: h.landlord.id,
                kind: payment::Kind::Deposit,
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::Forbidden);
    }
}
