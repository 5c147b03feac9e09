//! [`User`]-related [`Database`] implementations.

use std::collections::HashMap;

use common::operations::{By, Insert, Select};
use tracerr::Traced;

use crate::{
    domain::{user, User},
    infra::{
        database::{self, in_memory::Store, InMemory},
        Database,
    },
};

impl<S> Database<Select<By<Option<User>, user::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0.with(|state| state.users.get(&id).cloned()).await
    }
}

impl<S, IDs> Database<Select<By<HashMap<user::Id, User>, IDs>>> for InMemory<S>
where
    S: Store,
    IDs: AsRef<[user::Id]>,
{
    type Ok = HashMap<user::Id, User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<HashMap<user::Id, User>, IDs>>,
    ) -> Result<Self::Ok, Self::Err> {
        let ids = by.into_inner();
        let ids: &[user::Id] = ids.as_ref();
        self.0
            .with(|state| {
                ids.iter()
                    .filter_map(|id| {
                        state.users.get(id).map(|u| (*id, u.clone()))
                    })
                    .collect()
            })
            .await
    }
}

impl<S> Database<Insert<User>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(user): Insert<User>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.users.insert(user.id, user));
            })
            .await
    }
}
