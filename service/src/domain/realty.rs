//! [`Realty`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf};
use derive_more::{AsRef, Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::Contract;

/// Realty listed on the platform for rent.
#[derive(Clone, Debug)]
pub struct Realty {
    /// ID of this [`Realty`].
    pub id: Id,

    /// Registered [`Address`] of this [`Realty`].
    pub address: Address,

    /// Searchability [`Status`] of this [`Realty`].
    pub status: Status,

    /// [`DateTime`] when this [`Realty`] was created.
    pub created_at: CreationDateTime,
}

/// ID of a [`Realty`].
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

/// Registered address of a [`Realty`].
#[derive(AsRef, Clone, Debug, Display, Eq, Into, PartialEq)]
#[as_ref(str, String)]
pub struct Address(String);

impl Address {
    /// Creates a new [`Address`].
    ///
    /// # Safety
    ///
    /// The caller must ensure that the given `address` is not empty.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Creates a new [`Address`] if the given `address` is valid.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Option<Self> {
        let address = address.into();
        Self::check(&address).then_some(Self(address))
    }

    /// Checks whether the given `address` is a valid [`Address`].
    fn check(address: impl AsRef<str>) -> bool {
        let address = address.as_ref();
        address.trim() == address && !address.is_empty() && address.len() <= 512
    }
}

impl FromStr for Address {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Address`")
    }
}

/// [`DateTime`] when a [`Realty`] was created.
pub type CreationDateTime = DateTimeOf<(Realty, unit::Creation)>;

define_kind! {
    #[doc = "Searchability status of a [`Realty`]."]
    enum Status {
        #[doc = "The [`Realty`] is searchable and available for rent."]
        Active = 1,

        #[doc = "The [`Realty`] is rented out under a [`Contract`] in \
                 force and hidden from search."]
        Rented = 2,
    }
}
