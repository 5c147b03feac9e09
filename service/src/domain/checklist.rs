//! Move-in [`Checklist`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf};
use derive_more::{AsRef, Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{contract, user},
    infra::storage,
};
#[cfg(doc)]
use crate::domain::{Contract, User};

/// Move-in condition checklist of a [`Contract`].
///
/// At most one [`Checklist`] exists per [`Contract`]: attaching a new one
/// replaces the previous one.
#[derive(Clone, Debug)]
pub struct Checklist {
    /// ID of this [`Checklist`].
    pub id: Id,

    /// ID of the [`Contract`] this [`Checklist`] belongs to.
    pub contract_id: contract::Id,

    /// ID of the [`Template`] this [`Checklist`] was instantiated from.
    pub template_id: template::Id,

    /// [`Room`]s of this [`Checklist`].
    pub rooms: Vec<Room>,

    /// [`Status`] of this [`Checklist`].
    pub status: Status,

    /// [`Signature`] of the tenant, once the items are submitted.
    ///
    /// [`Signature`]: contract::Signature
    pub tenant_signature: Option<contract::Signature>,

    /// [`Signature`] of the landlord, once counter-signed.
    ///
    /// [`Signature`]: contract::Signature
    pub landlord_signature: Option<contract::Signature>,

    /// Free-text [`Notes`] left by the landlord on completion.
    pub landlord_notes: Option<Notes>,

    /// [`DateTime`] this [`Checklist`] is to be completed by.
    pub deadline: Deadline,

    /// [`DateTime`] when this [`Checklist`] was completed, if it was.
    pub completed_at: Option<CompletionDateTime>,

    /// [`DateTime`] when this [`Checklist`] was created.
    pub created_at: CreationDateTime,
}

impl Checklist {
    /// Checks whether the provided [`Room`]s carry the same structure (room
    /// and item names, in order) as this [`Checklist`].
    #[must_use]
    pub fn accepts(&self, rooms: &[Room]) -> bool {
        self.rooms.len() == rooms.len()
            && self.rooms.iter().zip(rooms).all(|(own, submitted)| {
                own.name == submitted.name
                    && own.items.len() == submitted.items.len()
                    && own
                        .items
                        .iter()
                        .zip(&submitted.items)
                        .all(|(a, b)| a.name == b.name)
            })
    }
}

/// Room of a [`Checklist`] or a [`Template`].
#[derive(Clone, Debug)]
pub struct Room {
    /// [`Name`] of this [`Room`].
    ///
    /// [`Name`]: room::Name
    pub name: room::Name,

    /// [`Item`]s of this [`Room`].
    pub items: Vec<Item>,
}

/// Inspectable item of a [`Room`].
#[derive(Clone, Debug)]
pub struct Item {
    /// [`Name`] of this [`Item`].
    ///
    /// [`Name`]: item::Name
    pub name: item::Name,

    /// Recorded [`Condition`] of this [`Item`], if inspected.
    pub condition: Option<Condition>,

    /// Free-text [`Notes`] on this [`Item`].
    pub notes: Option<Notes>,

    /// [`storage::Url`]s of photos documenting this [`Item`].
    pub photos: Vec<storage::Url>,
}

pub mod room {
    //! [`Room`]-related definitions.

    use derive_more::{AsRef, Display, From, Into};

    /// Name of a [`Room`].
    ///
    /// [`Room`]: super::Room
    #[derive(AsRef, Clone, Debug, Display, Eq, From, Into, PartialEq)]
    #[as_ref(str, String)]
    pub struct Name(String);
}

pub mod item {
    //! [`Item`]-related definitions.

    use derive_more::{AsRef, Display, From, Into};

    /// Name of an [`Item`].
    ///
    /// [`Item`]: super::Item
    #[derive(AsRef, Clone, Debug, Display, Eq, From, Into, PartialEq)]
    #[as_ref(str, String)]
    pub struct Name(String);
}

define_kind! {
    #[doc = "Recorded condition of an [`Item`]."]
    enum Condition {
        #[doc = "The [`Item`] is in excellent condition."]
        Excellent = 1,

        #[doc = "The [`Item`] is in good condition."]
        Good = 2,

        #[doc = "The [`Item`] is in fair condition."]
        Fair = 3,

        #[doc = "The [`Item`] is in poor condition."]
        Poor = 4,

        #[doc = "The [`Item`] is damaged."]
        Damaged = 5,
    }
}

define_kind! {
    #[doc = "Status of a [`Checklist`]."]
    enum Status {
        #[doc = "The [`Checklist`] is created and awaits the tenant's \
                 submission."]
        Draft = 1,

        #[doc = "The tenant has submitted the items and signed the \
                 [`Checklist`]."]
        TenantSigned = 2,

        #[doc = "The landlord has counter-signed the [`Checklist`]."]
        Completed = 3,
    }
}

/// ID of a [`Checklist`].
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

/// Free-text notes on a [`Checklist`] or its [`Item`].
#[derive(AsRef, Clone, Debug, Display, Eq, From, Into, PartialEq)]
#[as_ref(str, String)]
pub struct Notes(String);

/// Landlord-authored reusable room/item structure [`Checklist`]s are
/// instantiated from.
///
/// A [`Template`] describes structure only and never carries per-instance
/// condition data.
#[derive(Clone, Debug)]
pub struct Template {
    /// ID of this [`Template`].
    pub id: template::Id,

    /// ID of the [`User`] who authored this [`Template`].
    pub landlord_id: user::Id,

    /// [`Name`] of this [`Template`].
    ///
    /// [`Name`]: template::Name
    pub name: template::Name,

    /// [`Room`]s of this [`Template`].
    pub rooms: Vec<Room>,

    /// [`DateTime`] when this [`Template`] was created.
    pub created_at: template::CreationDateTime,
}

impl Template {
    /// Instantiates the [`Room`]s of this [`Template`], resetting every
    /// per-instance field ([`Condition`], [`Notes`], photos) regardless of
    /// what the [`Template`] contains.
    #[must_use]
    pub fn instantiate(&self) -> Vec<Room> {
        self.rooms
            .iter()
            .map(|room| Room {
                name: room.name.clone(),
                items: room
                    .items
                    .iter()
                    .map(|item| Item {
                        name: item.name.clone(),
                        condition: None,
                        notes: None,
                        photos: Vec::new(),
                    })
                    .collect(),
            })
            .collect()
    }
}

pub mod template {
    //! [`Template`]-related definitions.

    use common::{unit, DateTimeOf};
    use derive_more::{AsRef, Display, From, FromStr, Into};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use super::Template;

    /// ID of a [`Template`].
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

    /// Name of a [`Template`].
    #[derive(AsRef, Clone, Debug, Display, Eq, From, Into, PartialEq)]
    #[as_ref(str, String)]
    pub struct Name(String);

    /// [`DateTime`] when a [`Template`] was created.
    ///
    /// [`DateTime`]: common::DateTime
    pub type CreationDateTime = DateTimeOf<(Template, unit::Creation)>;
}

/// [`DateTime`] a [`Checklist`] is to be completed by.
pub type Deadline = DateTimeOf<(Checklist, Expectation)>;

/// Marker type indicating an expected completion.
#[derive(Clone, Copy, Debug)]
pub struct Expectation;

/// [`DateTime`] when a [`Checklist`] was completed.
pub type CompletionDateTime = DateTimeOf<(Checklist, unit::Completion)>;

/// [`DateTime`] when a [`Checklist`] was created.
pub type CreationDateTime = DateTimeOf<(Checklist, unit::Creation)>;

#[cfg(test)]
mod spec {
    use common::DateTime;

    use crate::domain::user;

    use super::{
        item, room, template, Condition, Item, Notes, Room, Template,
    };

    fn template() -> Template {
        Template {
            id: template::Id::new(),
            landlord_id: user::Id::new(),
            name: template::Name::from("Two-room apartment".to_owned()),
            rooms: vec![Room {
                name: room::Name::from("Kitchen".to_owned()),
                items: vec![Item {
                    name: item::Name::from("Sink".to_owned()),
                    condition: Some(Condition::Damaged),
                    notes: Some(Notes::from("chipped".to_owned())),
                    photos: vec!["https://storage/sink.jpg"
                        .to_owned()
                        .into()],
                }],
            }],
            created_at: DateTime::now().coerce(),
        }
    }

    #[test]
    fn instantiation_resets_per_instance_fields() {
        let rooms = template().instantiate();

        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].items.len(), 1);

        let item = &rooms[0].items[0];
        assert_eq!(item.name.to_string(), "Sink");
        assert!(item.condition.is_none());
        assert!(item.notes.is_none());
        assert!(item.photos.is_empty());
    }

    #[test]
    fn instantiation_never_mutates_the_template() {
        let template = template();
        let _rooms = template.instantiate();

        assert!(template.rooms[0].items[0].condition.is_some());
        assert!(template.rooms[0].items[0].notes.is_some());
        assert_eq!(template.rooms[0].items[0].photos.len(), 1);
    }
}
