//! [`Payment`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf, Money};
use derive_more::{AsRef, Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{contract, user};
#[cfg(doc)]
use crate::domain::{Contract, User};

/// Escrow obligation charged against a [`Contract`].
#[derive(Clone, Debug)]
pub struct Payment {
    /// ID of this [`Payment`].
    pub id: Id,

    /// ID of the [`Contract`] this [`Payment`] is charged against.
    pub contract_id: contract::Id,

    /// ID of the [`User`] who pays this [`Payment`].
    pub payer_id: user::Id,

    /// [`Kind`] of this [`Payment`].
    pub kind: Kind,

    /// Gross amount of this [`Payment`].
    pub amount: Money,

    /// Commission retained by the platform, frozen into this [`Payment`]
    /// at its creation.
    pub platform_fee: Money,

    /// Amount payable to the landlord, frozen into this [`Payment`] at its
    /// creation.
    pub net_amount: Money,

    /// [`Status`] of this [`Payment`].
    pub status: Status,

    /// Reference of the processor-side charge intent, if attached.
    pub reference: Option<ProcessorReference>,

    /// [`DateTime`] when this [`Payment`] is due, if any.
    pub due_at: Option<DueDateTime>,

    /// [`DateTime`] when this [`Payment`] was settled, if it was.
    pub paid_at: Option<PaidDateTime>,

    /// [`DateTime`] when this [`Payment`] was created.
    pub created_at: CreationDateTime,
}

impl Payment {
    /// Returns whether this [`Payment`] may still be completed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.status, Status::Pending | Status::Processing)
    }

    /// Marks this [`Payment`] as [`Status::Completed`] at the provided
    /// [`DateTime`].
    ///
    /// Returns `false` in case the [`Payment`] is completed already,
    /// leaving it untouched.
    pub fn complete(&mut self, at: PaidDateTime) -> bool {
        if self.status == Status::Completed {
            return false;
        }
        self.status = Status::Completed;
        self.paid_at = Some(at);
        true
    }
}

/// ID of a [`Payment`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random [`Id`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

define_kind! {
    #[doc = "Kind of a [`Payment`]."]
    enum Kind {
        #[doc = "Security deposit escrow obligation."]
        Deposit = 1,

        #[doc = "First month rent escrow obligation."]
        Rent = 2,
    }
}

define_kind! {
    #[doc = "Status of a [`Payment`]."]
    enum Status {
        #[doc = "The [`Payment`] is created and awaits completion."]
        Pending = 1,

        #[doc = "The [`Payment`] is being processed by the processor."]
        Processing = 2,

        #[doc = "The [`Payment`] is settled. Only a refund may follow."]
        Completed = 3,

        #[doc = "The processor reported the charge as failed."]
        Failed = 4,

        #[doc = "The settled [`Payment`] was refunded."]
        Refunded = 5,
    }
}

impl Status {
    /// Checks whether this [`Status`] allows a transition into the `to` one.
    #[must_use]
    pub fn allows(self, to: Self) -> bool {
        use Status as S;

        match self {
            S::Pending => {
                matches!(to, S::Processing | S::Completed | S::Failed)
            }
            S::Processing => matches!(to, S::Completed | S::Failed),
            S::Completed => matches!(to, S::Refunded),
            S::Failed | S::Refunded => false,
        }
    }
}

/// Reference of a processor-side charge intent.
#[derive(
    AsRef, Clone, Debug, Display, Eq, From, Hash, Into, PartialEq,
)]
#[as_ref(str, String)]
pub struct ProcessorReference(String);

/// Marker type indicating a [`Payment`] due date.
#[derive(Clone, Copy, Debug)]
pub struct Due;

/// [`DateTime`] when a [`Payment`] is due.
pub type DueDateTime = DateTimeOf<(Payment, Due)>;

/// [`DateTime`] when a [`Payment`] was settled.
pub type PaidDateTime = DateTimeOf<(Payment, unit::Completion)>;

/// [`DateTime`] when a [`Payment`] was created.
pub type CreationDateTime = DateTimeOf<(Payment, unit::Creation)>;

#[cfg(test)]
mod spec {
    use super::Status;

    #[test]
    fn status_transitions() {
        use Status as S;

        assert!(S::Pending.allows(S::Processing));
        assert!(S::Pending.allows(S::Completed));
        assert!(S::Pending.allows(S::Failed));
        assert!(S::Processing.allows(S::Completed));
        assert!(S::Completed.allows(S::Refunded));

        assert!(!S::Completed.allows(S::Pending));
        assert!(!S::Completed.allows(S::Completed));
        assert!(!S::Refunded.allows(S::Completed));
        assert!(!S::Failed.allows(S::Completed));
    }
}
