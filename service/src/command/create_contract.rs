//! [`Command`] for creating a new [`Contract`].

use std::collections::HashMap;

use common::{
    operations::{By, Commit, Insert, Lock, Select, Transact, Transacted},
    DateTime, Money,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{application, contract, realty, user, Contract, Realty, User},
    effect::Effects,
    infra::{
        database,
        notifications::{Kind, Link, Notification},
        Database,
    },
    Service,
};

use super::Command;

/// [`Command`] for creating a new [`Contract`].
#[derive(Clone, Debug)]
pub struct CreateContract {
    /// ID of the [`Realty`] to rent out.
    pub realty_id: realty::Id,

    /// ID of the [`User`] who rents out the [`Realty`].
    pub landlord_id: user::Id,

    /// ID of the [`User`] who rents the [`Realty`].
    pub tenant_id: user::Id,

    /// ID of the rental application the new [`Contract`] originates from,
    /// if any.
    pub application_id: Option<application::Id>,

    /// [`DateTime`] when the lease starts.
    pub starts_on: contract::LeaseStartDateTime,

    /// [`DateTime`] when the lease ends.
    pub ends_on: contract::LeaseEndDateTime,

    /// Monthly rent of the [`Realty`].
    pub monthly_rent: Money,

    /// Security deposit to be escrowed before the keys handover.
    pub security_deposit: Money,

    /// Free-text terms of the new [`Contract`].
    pub terms: Option<contract::Terms>,

    /// Free-text special conditions of the new [`Contract`].
    pub special_conditions: Option<contract::SpecialConditions>,

    /// Indicator whether the new [`Contract`] is sent to the tenant
    /// right away.
    pub send_to_tenant: bool,
}

impl<Db> Command<CreateContract> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<HashMap<user::Id, User>, [user::Id; 2]>>,
            Ok = HashMap<user::Id, User>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Realty>, realty::Id>>,
            Ok = Option<Realty>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<Lock<By<Realty, realty::Id>>, Err = Traced<database::Error>>
        + Database<Insert<Contract>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Contract;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CreateContract,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateContract {
            realty_id,
            landlord_id,
            tenant_id,
            application_id,
            starts_on,
            ends_on,
            monthly_rent,
            security_deposit,
            terms,
            special_conditions,
            send_to_tenant,
        } = cmd;

        if landlord_id == tenant_id {
            return Err(tracerr::new!(E::SameParty(landlord_id)));
        }
        if ends_on.coerce::<()>() <= starts_on.coerce() {
            return Err(tracerr::new!(E::InvalidLeasePeriod));
        }
        if monthly_rent.currency != security_deposit.currency {
            return Err(tracerr::new!(E::CurrencyMismatch));
        }

        let users = self
            .database()
            .execute(Select(By::new([landlord_id, tenant_id])))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        users
            .get(&landlord_id)
            .ok_or(E::UserNotExists(landlord_id))
            .map_err(tracerr::wrap!())
            .map(drop)?;
        users
            .get(&tenant_id)
            .ok_or(E::UserNotExists(tenant_id))
            .map_err(tracerr::wrap!())
            .map(drop)?;

        let realty = self
            .database()
            .execute(Select(By::<Option<Realty>, _>::new(realty_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::RealtyNotExists(realty_id))
            .map_err(tracerr::wrap!())?;
        if realty.status != realty::Status::Active {
            return Err(tracerr::new!(E::RealtyNotAvailable(realty.id)));
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent actions upon the same `Realty`.
        tx.execute(Lock(By::new(realty.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut contract = Contract {
            id: contract::Id::new(),
            realty_id: realty.id,
            landlord_id,
            tenant_id,
            application_id,
            starts_on,
            ends_on,
            monthly_rent,
            security_deposit,
            terms,
            special_conditions,
            landlord_signature: None,
            tenant_signature: None,
            status: contract::Status::Draft,
            deposit: None,
            first_month_rent: None,
            keys_collected: false,
            checklist: None,
            sent_at: send_to_tenant.then(|| DateTime::now().coerce()),
            created_at: DateTime::now().coerce(),
            expired_at: None,
            terminated_at: None,
        };
        contract.sync_status();

        tx.execute(Insert(contract.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut effects = Effects::new();
        if send_to_tenant {
            effects.notify(
                self.notifier(),
                tenant_id,
                Notification::new(
                    Kind::ContractSent,
                    "New rental contract",
                    "You received a rental contract to review and sign.",
                )
                .with_link(Link::contract(contract.id)),
            );
        }
        effects.run().await;

        Ok(contract)
    }
}

/// Error of [`CreateContract`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// Monetary terms carry different currencies.
    #[display("`monthly_rent` and `security_deposit` currencies differ")]
    CurrencyMismatch,

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Lease end date is not after its start date.
    #[display("lease end date must be after its start date")]
    InvalidLeasePeriod,

    /// [`Realty`] is not available for rent.
    #[display("`Realty(id: {_0})` is not available for rent")]
    RealtyNotAvailable(#[error(not(source))] realty::Id),

    /// [`Realty`] with the provided ID does not exist.
    #[display("`Realty(id: {_0})` does not exist")]
    RealtyNotExists(#[error(not(source))] realty::Id),

    /// Landlord and tenant are the same [`User`].
    #[display("`User(id: {_0})` cannot be both landlord and tenant")]
    SameParty(#[error(not(source))] user::Id),

    /// [`User`] with the provided ID does not exist.
    #[display("`User(id: {_0})` does not exist")]
    UserNotExists(#[error(not(source))] user::Id),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::RealtyNotExists(_) | Self::UserNotExists(_) => C::NotFound,
            Self::CurrencyMismatch
            | Self::InvalidLeasePeriod
            | Self::RealtyNotAvailable(_)
            | Self::SameParty(_) => C::PreconditionFailed,
            Self::Db(_) => C::UpstreamFailure,
        }
    }
}
