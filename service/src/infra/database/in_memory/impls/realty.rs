//! [`Realty`]-related [`Database`] implementations.

use common::operations::{By, Insert, Select, Update};
use tracerr::Traced;

use crate::{
    domain::{realty, Realty},
    infra::{
        database::{self, in_memory::Store, InMemory},
        Database,
    },
};

impl<S> Database<Select<By<Option<Realty>, realty::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = Option<Realty>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Realty>, realty::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0.with(|state| state.realties.get(&id).cloned()).await
    }
}

impl<S> Database<Insert<Realty>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(realty): Insert<Realty>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.realties.insert(realty.id, realty));
            })
            .await
    }
}

impl<S> Database<Update<Realty>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(realty): Update<Realty>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.realties.insert(realty.id, realty));
            })
            .await
    }
}
