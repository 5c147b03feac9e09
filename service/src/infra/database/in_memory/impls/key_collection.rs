//! [`KeyCollection`]-related [`Database`] implementations.

use common::operations::{By, Insert, Select, Update};
use tracerr::Traced;

use crate::{
    domain::{contract, key_collection, KeyCollection},
    infra::{
        database::{self, in_memory::Store, InMemory},
        Database,
    },
};

impl<S> Database<Select<By<Option<KeyCollection>, key_collection::Id>>>
    for InMemory<S>
where
    S: Store,
{
    type Ok = Option<KeyCollection>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<KeyCollection>, key_collection::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0
            .with(|state| state.key_collections.get(&id).cloned())
            .await
    }
}

impl<S> Database<Select<By<Option<KeyCollection>, contract::Id>>>
    for InMemory<S>
where
    S: Store,
{
    type Ok = Option<KeyCollection>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<KeyCollection>, contract::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let contract_id = by.into_inner();
        self.0
            .with(|state| {
                state
                    .key_collections
                    .values()
                    .find(|kc| kc.contract_id == contract_id)
                    .cloned()
            })
            .await
    }
}

impl<S> Database<Insert<KeyCollection>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(key_collection): Insert<KeyCollection>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(
                    state
                        .key_collections
                        .insert(key_collection.id, key_collection),
                );
            })
            .await
    }
}

impl<S> Database<Update<KeyCollection>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(key_collection): Update<KeyCollection>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(
                    state
                        .key_collections
                        .insert(key_collection.id, key_collection),
                );
            })
            .await
    }
}
