//! [`Contract`]-related [`Database`] implementations.

use common::operations::{By, Delete, Insert, Select, Update};
use tracerr::Traced;

use crate::{
    domain::{contract, Contract},
    infra::{
        database::{self, in_memory::Store, InMemory},
        Database,
    },
};

impl<S> Database<Select<By<Option<Contract>, contract::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = Option<Contract>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Contract>, contract::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0
            .with(|state| state.contracts.get(&id).cloned())
            .await
    }
}

impl<S> Database<Insert<Contract>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(contract): Insert<Contract>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.contracts.insert(contract.id, contract));
            })
            .await
    }
}

impl<S> Database<Update<Contract>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(contract): Update<Contract>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.contracts.insert(contract.id, contract));
            })
            .await
    }
}

impl<S> Database<Delete<By<Contract, contract::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Contract, contract::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0
            .with(|state| {
                drop(state.contracts.remove(&id));
            })
            .await
    }
}
