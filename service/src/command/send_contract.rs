//! [`Command`] for sending a [`Contract`] to the tenant.

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{contract, user, Contract},
    effect::Effects,
    infra::{
        database,
        notifications::{Kind, Link, Notification},
        Database,
    },
    Service,
};

#[cfg(doc)]
use crate::domain::User;

use super::Command;

/// [`Command`] for sending a [`Contract`] to the tenant for signing.
///
/// Legal from any pre-signature state, so re-sending a sent [`Contract`]
/// simply refreshes its sent timestamp.
#[derive(Clone, Copy, Debug)]
pub struct SendContract {
    /// ID of the [`Contract`] to send.
    pub contract_id: contract::Id,

    /// ID of the [`User`] who sends the [`Contract`].
    pub initiator_id: user::Id,
}

impl<Db> Command<SendContract> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Contract, contract::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<Update<Contract>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Contract;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: SendContract) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let SendContract {
            contract_id,
            initiator_id,
        } = cmd;

        let contract = self
            .database()
            .execute(Select(By::<Option<Contract>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract_id))
            .map_err(tracerr::wrap!())?;

        match contract.party_role(initiator_id) {
            Some(contract::Role::Landlord) => {}
            Some(contract::Role::Tenant) => {
                return Err(tracerr::new!(E::NotTheLandlord(initiator_id)));
            }
            None => return Err(tracerr::new!(E::NotAParty(initiator_id))),
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent actions upon the same `Contract`.
        tx.execute(Lock(By::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut contract = tx
            .execute(Select(By::<Option<Contract>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract_id))
            .map_err(tracerr::wrap!())?;

        if contract.landlord_signature.is_some()
            || contract.tenant_signature.is_some()
        {
            return Err(tracerr::new!(E::SigningStarted(contract_id)));
        }

        contract.sent_at = Some(DateTime::now().coerce());
        contract.sync_status();

        tx.execute(Update(contract.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut effects = Effects::new();
        effects.notify(
            self.notifier(),
            contract.tenant_id,
            Notification::new(
                Kind::ContractSent,
                "New rental contract",
                "You received a rental contract to review and sign.",
            )
            .with_link(Link::contract(contract.id)),
        );
        effects.run().await;

        Ok(contract)
    }
}

/// Error of [`SendContract`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Contract`] with the provided ID does not exist.
    #[display("`Contract(id: {_0})` does not exist")]
    ContractNotExists(#[error(not(source))] contract::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`User`] is not a party of the [`Contract`].
    #[display("`User(id: {_0})` is not a party of the `Contract`")]
    NotAParty(#[error(not(source))] user::Id),

    /// [`User`] is not the landlord of the [`Contract`].
    #[display("`User(id: {_0})` is not the landlord of the `Contract`")]
    NotTheLandlord(#[error(not(source))] user::Id),

    /// Signing of the [`Contract`] has started already.
    #[display("`Contract(id: {_0})` signing has started already")]
    SigningStarted(#[error(not(source))] contract::Id),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_) => C::NotFound,
            Self::NotAParty(_) | Self::NotTheLandlord(_) => C::Forbidden,
            Self::SigningStarted(_) => C::PreconditionFailed,
            Self::Db(_) => C::UpstreamFailure,
        }
    }
}
