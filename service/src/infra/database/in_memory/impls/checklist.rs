//! [`Checklist`]-related [`Database`] implementations.

use common::operations::{By, Delete, Insert, Select, Update};
use tracerr::Traced;

use crate::{
    domain::{
        checklist::{self, template, Template},
        contract, Checklist,
    },
    infra::{
        database::{self, in_memory::Store, InMemory},
        Database,
    },
};

impl<S> Database<Select<By<Option<Checklist>, checklist::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = Option<Checklist>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Checklist>, checklist::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0
            .with(|state| state.checklists.get(&id).cloned())
            .await
    }
}

impl<S> Database<Select<By<Option<Checklist>, contract::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = Option<Checklist>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Checklist>, contract::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let contract_id = by.into_inner();
        self.0
            .with(|state| {
                state
                    .checklists
                    .values()
                    .find(|c| c.contract_id == contract_id)
                    .cloned()
            })
            .await
    }
}

impl<S> Database<Insert<Checklist>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(checklist): Insert<Checklist>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.checklists.insert(checklist.id, checklist));
            })
            .await
    }
}

impl<S> Database<Update<Checklist>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(checklist): Update<Checklist>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.checklists.insert(checklist.id, checklist));
            })
            .await
    }
}

impl<S> Database<Delete<By<Checklist, checklist::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Checklist, checklist::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0
            .with(|state| {
                drop(state.checklists.remove(&id));
            })
            .await
    }
}

impl<S> Database<Select<By<Option<Template>, template::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = Option<Template>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Template>, template::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0.with(|state| state.templates.get(&id).cloned()).await
    }
}

impl<S> Database<Insert<Template>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(template): Insert<Template>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.templates.insert(template.id, template));
            })
            .await
    }
}
