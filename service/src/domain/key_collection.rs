//! [`KeyCollection`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf};
use derive_more::{AsRef, Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{contract, realty};
#[cfg(doc)]
use crate::domain::{Contract, Realty};

/// Scheduled handover of the [`Realty`] keys to the tenant.
///
/// At most one [`KeyCollection`] exists per [`Contract`], enforced
/// procedurally: the auto-scheduler never creates a second one.
#[derive(Clone, Debug)]
pub struct KeyCollection {
    /// ID of this [`KeyCollection`].
    pub id: Id,

    /// ID of the [`Contract`] this [`KeyCollection`] belongs to.
    pub contract_id: contract::Id,

    /// [`DateTime`] the handover is scheduled at.
    pub scheduled_at: ScheduledDateTime,

    /// [`Location`] of the handover.
    pub location: Location,

    /// Indicator whether the landlord confirmed the handover.
    pub landlord_confirmed: bool,

    /// Indicator whether the tenant confirmed the handover.
    pub tenant_confirmed: bool,

    /// [`Status`] of this [`KeyCollection`].
    pub status: Status,

    /// [`DateTime`] when the handover happened, if it did.
    pub completed_at: Option<CompletionDateTime>,

    /// [`DateTime`] when this [`KeyCollection`] was created.
    pub created_at: CreationDateTime,
}

impl KeyCollection {
    /// Returns whether both parties confirmed the handover.
    #[must_use]
    pub fn both_confirmed(&self) -> bool {
        self.landlord_confirmed && self.tenant_confirmed
    }

    /// Returns the confirmation flag of the provided party.
    #[must_use]
    pub fn confirmation_mut(&mut self, role: contract::Role) -> &mut bool {
        match role {
            contract::Role::Landlord => &mut self.landlord_confirmed,
            contract::Role::Tenant => &mut self.tenant_confirmed,
        }
    }

    /// Returns whether this [`KeyCollection`] reached a terminal [`Status`].
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, Status::Completed | Status::Cancelled)
    }
}

/// ID of a [`KeyCollection`].
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
    #[doc = "Status of a [`KeyCollection`]."]
    enum Status {
        #[doc = "The handover is proposed and awaits both parties' \
                 confirmations."]
        Scheduled = 1,

        #[doc = "Both parties confirmed the handover."]
        Confirmed = 2,

        #[doc = "The keys were handed over."]
        Completed = 3,

        #[doc = "The handover was cancelled."]
        Cancelled = 4,
    }
}

/// Location of a [`KeyCollection`] handover.
#[derive(AsRef, Clone, Debug, Display, Eq, From, Into, PartialEq)]
#[as_ref(str, String)]
pub struct Location(String);

impl From<realty::Address> for Location {
    fn from(address: realty::Address) -> Self {
        Self(address.into())
    }
}

/// Marker type indicating a scheduled handover.
#[derive(Clone, Copy, Debug)]
pub struct Schedule;

/// [`DateTime`] a [`KeyCollection`] handover is scheduled at.
pub type ScheduledDateTime = DateTimeOf<(KeyCollection, Schedule)>;

/// [`DateTime`] when a [`KeyCollection`] handover happened.
pub type CompletionDateTime = DateTimeOf<(KeyCollection, unit::Completion)>;

/// [`DateTime`] when a [`KeyCollection`] was created.
pub type CreationDateTime = DateTimeOf<(KeyCollection, unit::Creation)>;
