//! Payment processor gateway definitions.

use std::fmt;

use async_trait::async_trait;
use common::Money;
use derive_more::{AsRef, Display, Error as StdError, From, Into};
use tracerr::Traced;

use crate::domain::{contract, payment, user};

/// Payment processor gateway opening card charge intents.
///
/// The processor later reports charge success asynchronously, echoing the
/// attached [`Metadata`] back for reconciliation.
#[async_trait]
pub trait PaymentGateway: fmt::Debug + Send + Sync {
    /// Opens a new processor-side charge intent.
    ///
    /// # Errors
    ///
    /// If the processor rejects the intent or is unavailable. Such errors
    /// are retryable: no processor-side state is assumed to persist.
    async fn create_charge_intent(
        &self,
        request: ChargeIntentRequest,
    ) -> Result<ChargeIntent, Traced<Error>>;
}

/// Request to open a processor-side charge intent.
#[derive(Clone, Debug)]
pub struct ChargeIntentRequest {
    /// Gross amount to charge.
    pub amount: Money,

    /// [`Metadata`] to attach to the intent.
    pub metadata: Metadata,
}

/// Metadata attached to a charge intent and echoed back by the processor
/// in its asynchronous success callback.
#[derive(Clone, Copy, Debug)]
pub struct Metadata {
    /// ID of the contract the charge belongs to.
    pub contract_id: contract::Id,

    /// ID of the user being charged.
    pub payer_id: user::Id,

    /// Kind of the escrow obligation being charged.
    pub kind: payment::Kind,

    /// Commission retained by the platform.
    pub platform_fee: Money,

    /// Amount payable to the landlord.
    pub net_amount: Money,
}

/// Opened processor-side charge intent.
#[derive(Clone, Debug)]
pub struct ChargeIntent {
    /// Processor-side reference of the intent.
    pub id: payment::ProcessorReference,

    /// Opaque [`ClientSecret`] for completing the charge off-path.
    pub client_secret: ClientSecret,
}

/// Opaque secret letting a client complete a charge intent off-path.
#[derive(AsRef, Clone, Debug, Eq, From, Into, PartialEq)]
#[as_ref(str, String)]
pub struct ClientSecret(String);

/// [`PaymentGateway`] error.
#[derive(Debug, Display, StdError)]
pub enum Error {
    /// The processor is unreachable or failed internally.
    #[display("payment processor is unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),

    /// The processor rejected the charge intent.
    #[display("charge intent was rejected by the processor: {_0}")]
    Rejected(#[error(not(source))] String),
}

#[cfg(feature = "in-memory")]
pub use self::mock::MockPaymentGateway;

#[cfg(feature = "in-memory")]
mod mock {
    //! Mock [`PaymentGateway`] implementation.

    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use tracerr::Traced;

    use crate::domain::payment;

    use super::{
        ChargeIntent, ChargeIntentRequest, ClientSecret, Error,
        PaymentGateway,
    };

    /// [`PaymentGateway`] issuing sequential mock charge intents.
    #[derive(Debug, Default)]
    pub struct MockPaymentGateway {
        /// Counter of issued intents.
        issued: AtomicU64,

        /// Indicator whether every request should fail.
        unavailable: bool,
    }

    impl MockPaymentGateway {
        /// Creates a new operational [`MockPaymentGateway`].
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a [`MockPaymentGateway`] failing every request.
        #[must_use]
        pub fn unavailable() -> Self {
            Self {
                issued: AtomicU64::new(0),
                unavailable: true,
            }
        }

        /// Returns the number of issued intents.
        #[must_use]
        pub fn issued(&self) -> u64 {
            self.issued.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentGateway for MockPaymentGateway {
        async fn create_charge_intent(
            &self,
            _: ChargeIntentRequest,
        ) -> Result<ChargeIntent, Traced<Error>> {
            if self.unavailable {
                return Err(tracerr::new!(Error::Unavailable(
                    "mock processor is down".into(),
                )));
            }

            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ChargeIntent {
                id: payment::ProcessorReference::from(format!("pi_mock_{n}")),
                client_secret: ClientSecret::from(format!(
                    "pi_mock_{n}_secret",
                )),
            })
        }
    }
}
