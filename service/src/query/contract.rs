//! [`Query`] collection related to a single [`Contract`].

use common::operations::By;

use crate::domain::{contract, Checklist, Contract, KeyCollection};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries a [`Contract`] by its [`contract::Id`].
pub type ById = DatabaseQuery<By<Option<Contract>, contract::Id>>;

/// Queries the move-in [`Checklist`] linked to a [`Contract`].
pub type LinkedChecklist =
    DatabaseQuery<By<Option<Checklist>, contract::Id>>;

/// Queries the [`KeyCollection`] scheduled for a [`Contract`].
pub type ScheduledKeyCollection =
    DatabaseQuery<By<Option<KeyCollection>, contract::Id>>;
