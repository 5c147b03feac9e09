//! [`Query`] collection related to [`Payment`]s.

use common::{
    operations::{By, Select},
    Money,
};
use tracerr::Traced;

use crate::{
    domain::{contract, payment, Contract, Payment},
    infra::{database, Database},
    Service,
};

use super::{DatabaseQuery, Query};

/// Queries all [`Payment`]s of a [`Contract`], oldest first.
pub type List = DatabaseQuery<By<Vec<Payment>, contract::Id>>;

/// [`Query`] aggregating the escrowed [`Payment`]s of a [`Contract`].
///
/// Only completed rows are trusted: pending rows are inert and never
/// counted.
#[derive(Clone, Copy, Debug)]
pub struct Escrowed {
    /// ID of the [`Contract`] to aggregate the [`Payment`]s of.
    pub contract_id: contract::Id,
}

/// Aggregated escrow totals of a [`Contract`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Totals {
    /// Sum of the completed gross amounts, if any.
    pub gross: Option<Money>,

    /// Sum of the retained platform fees, if any.
    pub platform_fee: Option<Money>,

    /// Sum of the amounts payable to the landlord, if any.
    pub net: Option<Money>,

    /// Number of the completed [`Payment`]s.
    pub count: usize,
}

impl<Db> Query<Escrowed> for Service<Db>
where
    Db: Database<
        Select<By<Vec<Payment>, contract::Id>>,
        Ok = Vec<Payment>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Totals;
    type Err = Traced<database::Error>;

    async fn execute(&self, query: Escrowed) -> Result<Self::Ok, Self::Err> {
        let Escrowed { contract_id } = query;

        let payments = self
            .database()
            .execute(Select(By::<Vec<Payment>, _>::new(contract_id)))
            .await
            .map_err(tracerr::wrap!())?;

        let mut totals = Totals::default();
        for p in payments
            .into_iter()
            .filter(|p| p.status == payment::Status::Completed)
        {
            totals.count += 1;
            totals.gross = Some(add(totals.gross, p.amount));
            totals.platform_fee = Some(add(totals.platform_fee, p.platform_fee));
            totals.net = Some(add(totals.net, p.net_amount));
        }
        Ok(totals)
    }
}

/// Adds the provided [`Money`] to the accumulated one.
///
/// All [`Payment`]s of a single [`Contract`] share its currency by
/// construction.
fn add(acc: Option<Money>, rhs: Money) -> Money {
    match acc {
        Some(acc) => Money::new(acc.amount + rhs.amount, acc.currency),
        None => rhs,
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::{money::Currency, Handler as _, Money};

    use crate::{domain::payment, testing::Harness};

    use super::Escrowed;

    #[tokio::test]
    async fn pending_rows_are_excluded_from_totals() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;

        // A completed deposit and an inert pending rent intent.
        drop(h.escrow(contract.id, payment::Kind::Deposit).await);
        drop(h.intent(contract.id, payment::Kind::Rent).await);

        let totals = h
            .service
            .execute(Escrowed {
                contract_id: contract.id,
            })
            .await
            .unwrap();

        assert_eq!(totals.count, 1);
        assert_eq!(totals.gross, Some(Money::new(120_000, Currency::Usd)));
        assert_eq!(
            totals.platform_fee,
            Some(Money::new(6000, Currency::Usd)),
        );
        assert_eq!(totals.net, Some(Money::new(114_000, Currency::Usd)));
    }
}
