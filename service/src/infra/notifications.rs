//! Notification dispatcher collaborator definitions.

use std::fmt;

use async_trait::async_trait;
use common::define_kind;
use derive_more::{AsRef, Display, Error as StdError, From, Into};
use tracerr::Traced;

use crate::domain::{checklist, contract, key_collection, user};
#[cfg(doc)]
use crate::domain::{Checklist, Contract, KeyCollection, User};

/// Dispatcher delivering [`Notification`]s to [`User`]s.
///
/// Delivery is fire-and-forget: failures are logged and never roll back
/// the originating state change.
#[async_trait]
pub trait Notifier: fmt::Debug + Send + Sync {
    /// Delivers the provided [`Notification`] to the specified [`User`].
    ///
    /// # Errors
    ///
    /// If the notification cannot be delivered.
    async fn notify(
        &self,
        to: user::Id,
        notification: Notification,
    ) -> Result<(), Traced<Error>>;
}

/// Typed payload delivered to a [`User`].
#[derive(Clone, Debug)]
pub struct Notification {
    /// [`Kind`] of this [`Notification`].
    pub kind: Kind,

    /// Short title of this [`Notification`].
    pub title: Title,

    /// Human-readable message of this [`Notification`].
    pub message: Message,

    /// Deep [`Link`] into the platform, if any.
    pub link: Option<Link>,
}

impl Notification {
    /// Creates a new [`Notification`] without a [`Link`].
    #[must_use]
    pub fn new(
        kind: Kind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: Title(title.into()),
            message: Message(message.into()),
            link: None,
        }
    }

    /// Attaches the provided [`Link`] to this [`Notification`].
    #[must_use]
    pub fn with_link(mut self, link: Link) -> Self {
        self.link = Some(link);
        self
    }
}

define_kind! {
    #[doc = "Kind of a [`Notification`]."]
    enum Kind {
        #[doc = "A [`Contract`] was sent to the tenant for signing."]
        ContractSent = 1,

        #[doc = "The tenant signed a [`Contract`]."]
        TenantSigned = 2,

        #[doc = "Both parties signed a [`Contract`]."]
        ContractFullySigned = 3,

        #[doc = "A [`Contract`] was terminated."]
        ContractTerminated = 4,

        #[doc = "A [`Contract`] was expired."]
        ContractExpired = 5,

        #[doc = "An escrow payment of the payer was completed."]
        PaymentCompleted = 6,

        #[doc = "An escrow payment was received in favor of the landlord."]
        PaymentReceived = 7,

        #[doc = "A [`KeyCollection`] handover was scheduled."]
        KeyCollectionScheduled = 8,

        #[doc = "A party confirmed a [`KeyCollection`] handover."]
        KeyCollectionConfirmed = 9,

        #[doc = "A [`KeyCollection`] handover was cancelled."]
        KeyCollectionCancelled = 10,

        #[doc = "The keys were handed over to the tenant."]
        KeysHandedOver = 11,

        #[doc = "A move-in [`Checklist`] was assigned to the tenant."]
        ChecklistAssigned = 12,

        #[doc = "The tenant submitted a move-in [`Checklist`]."]
        ChecklistSubmitted = 13,

        #[doc = "The landlord completed a move-in [`Checklist`]."]
        ChecklistCompleted = 14,
    }
}

/// Short title of a [`Notification`].
#[derive(AsRef, Clone, Debug, Display, Eq, From, Into, PartialEq)]
#[as_ref(str, String)]
pub struct Title(String);

/// Human-readable message of a [`Notification`].
#[derive(AsRef, Clone, Debug, Display, Eq, From, Into, PartialEq)]
#[as_ref(str, String)]
pub struct Message(String);

/// Deep link into the platform.
#[derive(AsRef, Clone, Debug, Display, Eq, From, Into, PartialEq)]
#[as_ref(str, String)]
pub struct Link(String);

impl Link {
    /// Creates a [`Link`] to the provided [`Contract`].
    #[must_use]
    pub fn contract(id: contract::Id) -> Self {
        Self(format!("/contracts/{id}"))
    }

    /// Creates a [`Link`] to the provided [`Checklist`].
    #[must_use]
    pub fn checklist(id: checklist::Id) -> Self {
        Self(format!("/checklists/{id}"))
    }

    /// Creates a [`Link`] to the provided [`KeyCollection`].
    #[must_use]
    pub fn key_collection(id: key_collection::Id) -> Self {
        Self(format!("/key-collections/{id}"))
    }
}

/// [`Notifier`] error.
#[derive(Debug, Display, StdError)]
#[display("notification delivery failed: {_0}")]
pub struct Error(#[error(not(source))] pub String);

#[cfg(feature = "in-memory")]
pub use self::mock::MockNotifier;

#[cfg(feature = "in-memory")]
mod mock {
    //! Mock [`Notifier`] implementation.

    use std::sync::{Mutex, MutexGuard};

    use async_trait::async_trait;
    use tracerr::Traced;

    use crate::domain::user;

    use super::{Error, Kind, Notification, Notifier};

    /// [`Notifier`] collecting delivered notifications in memory.
    #[derive(Debug, Default)]
    pub struct MockNotifier {
        /// Delivered notifications with their recipients.
        delivered: Mutex<Vec<(user::Id, Notification)>>,
    }

    impl MockNotifier {
        /// Creates a new empty [`MockNotifier`].
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Returns all the delivered notifications with their recipients.
        #[must_use]
        pub fn delivered(&self) -> Vec<(user::Id, Notification)> {
            self.lock().clone()
        }

        /// Returns recipients of the delivered notifications of the
        /// provided [`Kind`].
        #[must_use]
        pub fn recipients_of(&self, kind: Kind) -> Vec<user::Id> {
            self.lock()
                .iter()
                .filter(|(_, n)| n.kind == kind)
                .map(|(to, _)| *to)
                .collect()
        }

        /// Locks and returns the delivered notifications.
        fn lock(&self) -> MutexGuard<'_, Vec<(user::Id, Notification)>> {
            self.delivered.lock().expect("non-poisoned `Mutex`")
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify(
            &self,
            to: user::Id,
            notification: Notification,
        ) -> Result<(), Traced<Error>> {
            self.lock().push((to, notification));
            Ok(())
        }
    }
}
