//! [`Command`] for submitting a move-in [`Checklist`] by the tenant.

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{checklist, contract, user, Checklist, Contract},
    effect::Effects,
    infra::{
        database,
        notifications::{Kind, Link, Notification},
        storage, Database,
    },
    Service,
};

#[cfg(doc)]
use crate::domain::User;

use super::Command;

/// [`Command`] for submitting the inspected items of a move-in
/// [`Checklist`] along with the tenant's signature.
///
/// The tenant always signs first: the landlord may only counter-sign an
/// already submitted [`Checklist`].
#[derive(Clone, Debug)]
pub struct SubmitChecklist {
    /// ID of the [`Checklist`] to submit.
    pub checklist_id: checklist::Id,

    /// ID of the [`User`] who submits the [`Checklist`].
    pub tenant_id: user::Id,

    /// Inspected [`checklist::Room`]s, structurally matching the
    /// [`Checklist`].
    pub rooms: Vec<checklist::Room>,

    /// Base64-encoded signature image.
    pub signature_image: storage::Blob,
}

impl<Db> Command<SubmitChecklist> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Checklist>, checklist::Id>>,
            Ok = Option<Checklist>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Contract, contract::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Checklist>, checklist::Id>>,
            Ok = Option<Checklist>,
            Err = Traced<database::Error>,
        > + Database<Update<Checklist>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Checklist;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: SubmitChecklist,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let SubmitChecklist {
            checklist_id,
            tenant_id,
            rooms,
            signature_image,
        } = cmd;

        let checklist = self
            .database()
            .execute(Select(By::<Option<Checklist>, _>::new(checklist_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ChecklistNotExists(checklist_id))
            .map_err(tracerr::wrap!())?;

        let contract = self
            .database()
            .execute(Select(By::<Option<Contract>, _>::new(
                checklist.contract_id,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(checklist.contract_id))
            .map_err(tracerr::wrap!())?;

        match contract.party_role(tenant_id) {
            Some(contract::Role::Tenant) => {}
            Some(contract::Role::Landlord) => {
                return Err(tracerr::new!(E::NotTheTenant(tenant_id)));
            }
            None => return Err(tracerr::new!(E::NotAParty(tenant_id))),
        }

        if checklist.status != checklist::Status::Draft {
            return Err(tracerr::new!(E::AlreadySubmitted(checklist.status)));
        }
        if !checklist.accepts(&rooms) {
            return Err(tracerr::new!(E::StructureMismatch(checklist_id)));
        }

        let image = self
            .storage()
            .store(
                storage::Key::checklist_signature(
                    checklist_id,
                    contract::Role::Tenant,
                ),
                signature_image,
            )
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent submissions upon the same `Contract`.
        tx.execute(Lock(By::new(contract.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let mut checklist = tx
            .execute(Select(By::<Option<Checklist>, _>::new(checklist_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ChecklistNotExists(checklist_id))
            .map_err(tracerr::wrap!())?;
        if checklist.status != checklist::Status::Draft {
            return Err(tracerr::new!(E::AlreadySubmitted(checklist.status)));
        }

        checklist.rooms = rooms;
        checklist.tenant_signature = Some(contract::Signature {
            image,
            signed_at: DateTime::now().coerce(),
        });
        checklist.status = checklist::Status::TenantSigned;

        tx.execute(Update(checklist.clone()))
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
            contract.landlord_id,
            Notification::new(
                Kind::ChecklistSubmitted,
                "Checklist submitted",
                "The tenant submitted the move-in checklist for your \
                 counter-signature.",
            )
            .with_link(Link::checklist(checklist.id)),
        );
        effects.run().await;

        Ok(checklist)
    }
}

/// Error of [`SubmitChecklist`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Checklist`] is submitted already.
    #[display("`Checklist` in `{_0}` status cannot be submitted")]
    AlreadySubmitted(#[error(not(source))] checklist::Status),

    /// [`Checklist`] with the provided ID does not exist.
    #[display("`Checklist(id: {_0})` does not exist")]
    ChecklistNotExists(#[error(not(source))] checklist::Id),

    /// [`Contract`] of the [`Checklist`] does not exist.
    #[display("`Contract(id: {_0})` does not exist")]
    ContractNotExists(#[error(not(source))] contract::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`User`] is not a party of the [`Contract`].
    #[display("`User(id: {_0})` is not a party of the `Contract`")]
    NotAParty(#[error(not(source))] user::Id),

    /// [`User`] is not the tenant of the [`Contract`].
    #[display("`User(id: {_0})` is not the tenant of the `Contract`")]
    NotTheTenant(#[error(not(source))] user::Id),

    /// Signature image persisting failed.
    #[display("`ObjectStorage` operation failed: {_0}")]
    #[from]
    Storage(storage::Error),

    /// Submitted rooms do not match the [`Checklist`] structure.
    #[display("submitted rooms do not match `Checklist(id: {_0})` structure")]
    StructureMismatch(#[error(not(source))] checklist::Id),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ChecklistNotExists(_) | Self::ContractNotExists(_) => {
                C::NotFound
            }
            Self::NotAParty(_) | Self::NotTheTenant(_) => C::Forbidden,
            Self::AlreadySubmitted(_) | Self::StructureMismatch(_) => {
                C::PreconditionFailed
            }
            Self::Db(_) | Self::Storage(_) => C::UpstreamFailure,
        }
    }
}
