//! [`Command`] definition.

pub mod attach_checklist;
pub mod cancel_key_collection;
pub mod complete_checklist;
pub mod complete_key_collection;
pub mod confirm_key_collection;
pub mod confirm_payment;
pub mod create_contract;
pub mod create_payment_intent;
pub mod delete_contract;
pub mod expire_contract;
pub mod process_payment_callback;
pub mod schedule_key_collection;
pub mod send_contract;
pub mod settle_payment_offline;
pub mod sign_contract;
pub mod submit_checklist;
pub mod terminate_contract;

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    attach_checklist::AttachChecklist,
    cancel_key_collection::CancelKeyCollection,
    complete_checklist::CompleteChecklist,
    complete_key_collection::CompleteKeyCollection,
    confirm_key_collection::ConfirmKeyCollection,
    confirm_payment::ConfirmPayment, create_contract::CreateContract,
    create_payment_intent::CreatePaymentIntent,
    delete_contract::DeleteContract, expire_contract::ExpireContract,
    process_payment_callback::ProcessPaymentCallback,
    schedule_key_collection::ScheduleKeyCollection,
    send_contract::SendContract,
    settle_payment_offline::SettlePaymentOffline,
    sign_contract::SignContract, submit_checklist::SubmitChecklist,
    terminate_contract::TerminateContract,
};

/// Classification of a [`Command`] execution error, mirroring the failure
/// taxonomy callers surface verbatim.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Referenced entity does not exist.
    NotFound,

    /// Caller is not a party of the contract or attempts a disallowed
    /// transition.
    Forbidden,

    /// Business rule blocks the action irrespective of the caller's
    /// identity.
    PreconditionFailed,

    /// External collaborator failed. Retryable.
    UpstreamFailure,
}

/// [`Command`] execution error classifiable into an [`ErrorClass`].
pub trait Classify {
    /// Returns the [`ErrorClass`] of this error.
    fn class(&self) -> ErrorClass;
}
