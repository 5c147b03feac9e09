//! [`Payment`]-related [`Database`] implementations.

use common::{
    operations::{By, Insert, Select, Update},
    Money,
};
use tracerr::Traced;

use crate::{
    domain::{contract, payment, user, Payment},
    infra::{
        database::{self, in_memory::Store, InMemory},
        Database,
    },
    read::payment::Pending,
};

impl<S> Database<Select<By<Option<Payment>, payment::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, payment::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0.with(|state| state.payments.get(&id).cloned()).await
    }
}

impl<S> Database<Select<By<Option<Payment>, payment::ProcessorReference>>>
    for InMemory<S>
where
    S: Store,
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, payment::ProcessorReference>>,
    ) -> Result<Self::Ok, Self::Err> {
        let reference = by.into_inner();
        self.0
            .with(|state| {
                state
                    .payments
                    .values()
                    .find(|p| p.reference.as_ref() == Some(&reference))
                    .cloned()
            })
            .await
    }
}

impl<S>
    Database<
        Select<
            By<Option<Pending<Payment>>, (contract::Id, user::Id, Money)>,
        >,
    > for InMemory<S>
where
    S: Store,
{
    type Ok = Option<Pending<Payment>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Option<Pending<Payment>>, (contract::Id, user::Id, Money)>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let (contract_id, payer_id, amount) = by.into_inner();
        self.0
            .with(|state| {
                let mut matched = state
                    .payments
                    .values()
                    .filter(|p| {
                        p.contract_id == contract_id
                            && p.payer_id == payer_id
                            && p.amount == amount
                            && p.is_pending()
                    })
                    .collect::<Vec<_>>();
                matched.sort_unstable_by_key(|p| p.created_at);
                matched.first().map(|p| Pending((*p).clone()))
            })
            .await
    }
}

impl<S> Database<Select<By<Vec<Payment>, contract::Id>>> for InMemory<S>
where
    S: Store,
{
    type Ok = Vec<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Payment>, contract::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let contract_id = by.into_inner();
        self.0
            .with(|state| {
                let mut payments = state
                    .payments
                    .values()
                    .filter(|p| p.contract_id == contract_id)
                    .cloned()
                    .collect::<Vec<_>>();
                payments.sort_unstable_by_key(|p| p.created_at);
                payments
            })
            .await
    }
}

impl<S> Database<Insert<Payment>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(payment): Insert<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.payments.insert(payment.id, payment));
            })
            .await
    }
}

impl<S> Database<Update<Payment>> for InMemory<S>
where
    S: Store,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(payment): Update<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .with(|state| {
                drop(state.payments.insert(payment.id, payment));
            })
            .await
    }
}
