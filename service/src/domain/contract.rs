//! [`Contract`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf, Money};
use derive_more::{AsRef, Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{application, checklist, payment, realty, user},
    infra::storage,
};
#[cfg(doc)]
use crate::domain::{Checklist, Realty, User};

/// Rental agreement between a landlord and a tenant over a [`Realty`].
#[derive(Clone, Debug)]
pub struct Contract {
    /// ID of this [`Contract`].
    pub id: Id,

    /// ID of the [`Realty`] this [`Contract`] rents out.
    pub realty_id: realty::Id,

    /// ID of the [`User`] who rents out the [`Realty`].
    pub landlord_id: user::Id,

    /// ID of the [`User`] who rents the [`Realty`].
    pub tenant_id: user::Id,

    /// ID of the rental application this [`Contract`] originates from,
    /// if any.
    pub application_id: Option<application::Id>,

    /// [`DateTime`] when the lease starts.
    pub starts_on: LeaseStartDateTime,

    /// [`DateTime`] when the lease ends.
    pub ends_on: LeaseEndDateTime,

    /// Monthly rent of the [`Realty`].
    pub monthly_rent: Money,

    /// Security deposit to be escrowed before the keys handover.
    pub security_deposit: Money,

    /// Free-text [`Terms`] of this [`Contract`].
    pub terms: Option<Terms>,

    /// Free-text [`SpecialConditions`] of this [`Contract`].
    pub special_conditions: Option<SpecialConditions>,

    /// [`Signature`] of the landlord, once captured.
    pub landlord_signature: Option<Signature>,

    /// [`Signature`] of the tenant, once captured.
    pub tenant_signature: Option<Signature>,

    /// [`Status`] of this [`Contract`].
    ///
    /// Always kept equal to [`Contract::derive_status()`] output by every
    /// mutating operation.
    pub status: Status,

    /// [`Settlement`] of the security deposit escrow obligation, if settled.
    pub deposit: Option<Settlement>,

    /// [`Settlement`] of the first month rent escrow obligation, if settled.
    pub first_month_rent: Option<Settlement>,

    /// Indicator whether the [`Realty`] keys were handed over to the tenant.
    pub keys_collected: bool,

    /// Move-in [`Checklist`] linkage of this [`Contract`], if any.
    pub checklist: Option<ChecklistLink>,

    /// [`DateTime`] when this [`Contract`] was sent to the tenant, if it was.
    pub sent_at: Option<SentDateTime>,

    /// [`DateTime`] when this [`Contract`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Contract`] was expired, if it was.
    pub expired_at: Option<ExpirationDateTime>,

    /// [`DateTime`] when this [`Contract`] was terminated, if it was.
    pub terminated_at: Option<TerminationDateTime>,
}

impl Contract {
    /// Returns the [`Role`] the provided [`User`] plays in this [`Contract`].
    ///
    /// [`None`] is returned in case the [`User`] is not a party of this
    /// [`Contract`].
    #[must_use]
    pub fn party_role(&self, user_id: user::Id) -> Option<Role> {
        if user_id == self.landlord_id {
            Some(Role::Landlord)
        } else if user_id == self.tenant_id {
            Some(Role::Tenant)
        } else {
            None
        }
    }

    /// Returns the captured [`Signature`] of the provided party, if any.
    #[must_use]
    pub fn signature(&self, role: Role) -> Option<&Signature> {
        match role {
            Role::Landlord => self.landlord_signature.as_ref(),
            Role::Tenant => self.tenant_signature.as_ref(),
        }
    }

    /// Returns the [`Signature`] slot of the provided party.
    #[must_use]
    pub fn signature_mut(&mut self, role: Role) -> &mut Option<Signature> {
        match role {
            Role::Landlord => &mut self.landlord_signature,
            Role::Tenant => &mut self.tenant_signature,
        }
    }

    /// Returns whether both parties have signed this [`Contract`].
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        self.landlord_signature.is_some() && self.tenant_signature.is_some()
    }

    /// Returns the [`Settlement`] of the provided escrow obligation, if any.
    #[must_use]
    pub fn settlement(&self, kind: payment::Kind) -> Option<&Settlement> {
        match kind {
            payment::Kind::Deposit => self.deposit.as_ref(),
            payment::Kind::Rent => self.first_month_rent.as_ref(),
        }
    }

    /// Records the [`Settlement`] of the provided escrow obligation.
    ///
    /// Returns `false` in case the obligation is settled already, leaving
    /// the existing [`Settlement`] untouched.
    pub fn settle(
        &mut self,
        kind: payment::Kind,
        settlement: Settlement,
    ) -> bool {
        let slot = match kind {
            payment::Kind::Deposit => &mut self.deposit,
            payment::Kind::Rent => &mut self.first_month_rent,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(settlement);
        true
    }

    /// Returns whether the security deposit of this [`Contract`] is settled.
    #[must_use]
    pub fn deposit_paid(&self) -> bool {
        self.deposit.is_some()
    }

    /// Returns whether the first month rent of this [`Contract`] is settled.
    #[must_use]
    pub fn first_month_rent_paid(&self) -> bool {
        self.first_month_rent.is_some()
    }

    /// Returns whether both escrow obligations of this [`Contract`] are
    /// settled.
    #[must_use]
    pub fn escrow_settled(&self) -> bool {
        self.deposit_paid() && self.first_month_rent_paid()
    }

    /// Derives the [`Status`] of this [`Contract`] from its signature,
    /// payment and lifecycle fields.
    ///
    /// The stored [`Status`] is a projection of those fields, so every
    /// mutating operation re-derives it via [`Contract::sync_status()`]
    /// instead of trusting any previously stored value.
    #[must_use]
    pub fn derive_status(&self) -> Status {
        use Status as S;

        if self.terminated_at.is_some() {
            return S::Terminated;
        }
        if self.expired_at.is_some() {
            return S::Expired;
        }
        if self.keys_collected {
            return S::Active;
        }
        if self.is_fully_signed() {
            return S::FullySigned;
        }
        if self.tenant_signature.is_some() {
            return S::TenantSigned;
        }
        if self.sent_at.is_some() {
            return S::SentToTenant;
        }
        S::Draft
    }

    /// Re-derives and stores the [`Status`] of this [`Contract`].
    pub fn sync_status(&mut self) {
        self.status = self.derive_status();
    }

    /// Returns whether this [`Contract`] may be deleted.
    ///
    /// Deletion is only permitted before both signatures are captured.
    #[must_use]
    pub fn is_deletable(&self) -> bool {
        matches!(
            self.derive_status(),
            Status::Draft | Status::SentToTenant | Status::TenantSigned,
        )
    }
}

/// ID of a [`Contract`].
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
    #[doc = "Status of a [`Contract`]."]
    enum Status {
        #[doc = "The [`Contract`] is drafted and not sent to the tenant \
                 yet."]
        Draft = 1,

        #[doc = "The [`Contract`] is sent to the tenant for signing."]
        SentToTenant = 2,

        #[doc = "The tenant has signed the [`Contract`], the landlord has \
                 not yet."]
        TenantSigned = 3,

        #[doc = "Both parties have signed the [`Contract`]."]
        FullySigned = 4,

        #[doc = "The keys are handed over and the tenancy is in force."]
        Active = 5,

        #[doc = "The [`Contract`] lease period has ended."]
        Expired = 6,

        #[doc = "The [`Contract`] is terminated."]
        Terminated = 7,
    }
}

define_kind! {
    #[doc = "Role of a [`User`] party in a [`Contract`]."]
    enum Role {
        #[doc = "The [`User`] rents out the [`Realty`]."]
        Landlord = 1,

        #[doc = "The [`User`] rents the [`Realty`]."]
        Tenant = 2,
    }
}

/// Captured signature of a [`Contract`] party.
#[derive(Clone, Debug)]
pub struct Signature {
    /// [`storage::Url`] of the persisted signature image.
    pub image: storage::Url,

    /// [`DateTime`] when this [`Signature`] was captured.
    pub signed_at: SignatureDateTime,
}

/// [`DateTime`] when a [`Signature`] was captured.
pub type SignatureDateTime = DateTimeOf<Signature>;

/// Settlement of an escrow obligation of a [`Contract`].
#[derive(Clone, Debug)]
pub struct Settlement {
    /// [`settlement::Method`] the obligation was settled with.
    pub method: settlement::Method,

    /// External reference of the settlement, if any.
    pub reference: Option<settlement::Reference>,

    /// [`DateTime`] when the obligation was settled.
    pub paid_at: settlement::PaidDateTime,
}

pub mod settlement {
    //! [`Settlement`]-related definitions.

    use common::{define_kind, DateTimeOf};
    use derive_more::{AsRef, Display, From, Into};

    use super::Settlement;

    define_kind! {
        #[doc = "Method an escrow obligation was settled with."]
        enum Method {
            #[doc = "Card charge via the payment processor."]
            Card = 1,

            #[doc = "Cash handed over offline."]
            Cash = 2,

            #[doc = "Offline bank transfer."]
            BankTransfer = 3,
        }
    }

    /// External reference of a [`Settlement`] (processor reference, bank
    /// transfer number and alike).
    #[derive(AsRef, Clone, Debug, Display, Eq, From, Into, PartialEq)]
    #[as_ref(str, String)]
    pub struct Reference(String);

    /// [`DateTime`] when a [`Settlement`] happened.
    ///
    /// [`DateTime`]: common::DateTime
    pub type PaidDateTime = DateTimeOf<Settlement>;
}

/// Move-in [`Checklist`] linkage of a [`Contract`].
#[derive(Clone, Copy, Debug)]
pub struct ChecklistLink {
    /// ID of the linked [`Checklist`].
    pub id: checklist::Id,

    /// [`DateTime`] the linked [`Checklist`] is to be completed by.
    pub deadline: checklist::Deadline,

    /// [`DateTime`] when the linked [`Checklist`] was completed, if it was.
    pub completed_at: Option<checklist::CompletionDateTime>,
}

/// Free-text terms of a [`Contract`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
pub struct Terms(String);

impl Terms {
    /// Creates a new [`Terms`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `terms` is not empty.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(terms: impl Into<String>) -> Self {
        Self(terms.into())
    }

    /// Creates a new [`Terms`] if the given `terms` is valid.
    #[must_use]
    pub fn new(terms: impl Into<String>) -> Option<Self> {
        let terms = terms.into();
        Self::check(&terms).then_some(Self(terms))
    }

    /// Checks whether the given `terms` is a valid [`Terms`].
    fn check(terms: impl AsRef<str>) -> bool {
        let terms = terms.as_ref();
        terms.trim() == terms && !terms.is_empty() && terms.len() <= 8192
    }
}

impl FromStr for Terms {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Terms`")
    }
}

/// Free-text special conditions of a [`Contract`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str, String)]
pub struct SpecialConditions(String);

impl SpecialConditions {
    /// Creates a new [`SpecialConditions`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `conditions` is not empty.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(conditions: impl Into<String>) -> Self {
        Self(conditions.into())
    }

    /// Creates a new [`SpecialConditions`] if the given `conditions` is
    /// valid.
    #[must_use]
    pub fn new(conditions: impl Into<String>) -> Option<Self> {
        let conditions = conditions.into();
        Self::check(&conditions).then_some(Self(conditions))
    }

    /// Checks whether the given `conditions` is a valid
    /// [`SpecialConditions`].
    fn check(conditions: impl AsRef<str>) -> bool {
        let conditions = conditions.as_ref();
        conditions.trim() == conditions
            && !conditions.is_empty()
            && conditions.len() <= 8192
    }
}

impl FromStr for SpecialConditions {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `SpecialConditions`")
    }
}

/// [`DateTime`] when a [`Contract`] was created.
pub type CreationDateTime = DateTimeOf<(Contract, unit::Creation)>;

/// Marker type indicating a [`Contract`] being sent to the tenant.
#[derive(Clone, Copy, Debug)]
pub struct Sending;

/// [`DateTime`] when a [`Contract`] was sent to the tenant.
pub type SentDateTime = DateTimeOf<(Contract, Sending)>;

/// Marker type indicating [`Contract`] expiration.
#[derive(Clone, Copy, Debug)]
pub struct Expiration;

/// [`DateTime`] when a [`Contract`] was expired.
pub type ExpirationDateTime = DateTimeOf<(Contract, Expiration)>;

/// [`DateTime`] when a [`Contract`] was terminated.
pub type TerminationDateTime = DateTimeOf<(Contract, unit::Deletion)>;

/// Marker type indicating a lease start.
#[derive(Clone, Copy, Debug)]
pub struct LeaseStart;

/// [`DateTime`] when a [`Contract`] lease starts.
pub type LeaseStartDateTime = DateTimeOf<(Contract, LeaseStart)>;

/// Marker type indicating a lease end.
#[derive(Clone, Copy, Debug)]
pub struct LeaseEnd;

/// [`DateTime`] when a [`Contract`] lease ends.
pub type LeaseEndDateTime = DateTimeOf<(Contract, LeaseEnd)>;

#[cfg(test)]
mod spec {
    use common::{money::Currency, DateTime, Money};

    use crate::{
        domain::{payment, realty, user},
        infra::storage,
    };

    use super::{
        settlement, Contract, Id, Role, Settlement, Signature, Status,
    };

    fn contract() -> Contract {
        let now = DateTime::now();
        Contract {
            id: Id::new(),
            realty_id: realty::Id::new(),
            landlord_id: user::Id::new(),
            tenant_id: user::Id::new(),
            application_id: None,
            starts_on: now.coerce(),
            ends_on: (now + std::time::Duration::from_secs(365 * 24 * 3600))
                .coerce(),
            monthly_rent: Money::new(120_000, Currency::Usd),
            security_deposit: Money::new(120_000, Currency::Usd),
            terms: None,
            special_conditions: None,
            landlord_signature: None,
            tenant_signature: None,
            status: Status::Draft,
            deposit: None,
            first_month_rent: None,
            keys_collected: false,
            checklist: None,
            sent_at: None,
            created_at: now.coerce(),
            expired_at: None,
            terminated_at: None,
        }
    }

    fn signature() -> Signature {
        Signature {
            image: storage::Url::from("https://storage/sig.png".to_owned()),
            signed_at: DateTime::now().coerce(),
        }
    }

    #[test]
    fn status_derivation_is_order_independent() {
        let mut tenant_first = contract();
        *tenant_first.signature_mut(Role::Tenant) = Some(signature());
        tenant_first.sync_status();
        assert_eq!(tenant_first.status, Status::TenantSigned);
        *tenant_first.signature_mut(Role::Landlord) = Some(signature());
        tenant_first.sync_status();

        let mut landlord_first = contract();
        *landlord_first.signature_mut(Role::Landlord) = Some(signature());
        landlord_first.sync_status();
        assert_eq!(landlord_first.status, Status::Draft);
        *landlord_first.signature_mut(Role::Tenant) = Some(signature());
        landlord_first.sync_status();

        assert_eq!(tenant_first.status, Status::FullySigned);
        assert_eq!(landlord_first.status, Status::FullySigned);
    }

    #[test]
    fn deletable_only_before_full_signature() {
        let mut contract = contract();
        assert!(contract.is_deletable());

        contract.sent_at = Some(DateTime::now().coerce());
        assert!(contract.is_deletable());

        *contract.signature_mut(Role::Tenant) = Some(signature());
        assert!(contract.is_deletable());

        *contract.signature_mut(Role::Landlord) = Some(signature());
        assert!(!contract.is_deletable());
    }

    #[test]
    fn settle_is_idempotent() {
        let mut contract = contract();
        let settlement = || Settlement {
            method: settlement::Method::Cash,
            reference: None,
            paid_at: DateTime::now().coerce(),
        };

        assert!(contract.settle(payment::Kind::Deposit, settlement()));
        assert!(!contract.settle(payment::Kind::Deposit, settlement()));
        assert!(contract.deposit_paid());
        assert!(!contract.escrow_settled());

        assert!(contract.settle(payment::Kind::Rent, settlement()));
        assert!(contract.escrow_settled());
    }
}
