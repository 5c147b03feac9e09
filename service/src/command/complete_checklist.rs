//! [`Command`] for completing a move-in [`Checklist`] by the landlord.

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

/// [`Command`] for counter-signing a submitted move-in [`Checklist`] by
/// the landlord, with optional notes.
///
/// Only a tenant-signed [`Checklist`] may be completed: the signing order
/// is strict, unlike the contract signature convergence.
#[derive(Clone, Debug)]
pub struct CompleteChecklist {
    /// ID of the [`Checklist`] to complete.
    pub checklist_id: checklist::Id,

    /// ID of the [`User`] who counter-signs the [`Checklist`].
    pub landlord_id: user::Id,

    /// Free-text notes of the landlord, if any.
    pub notes: Option<checklist::Notes>,

    /// Base64-encoded signature image.
    pub signature_image: storage::Blob,
}

impl<Db> Command<CompleteChecklist> for Service<Db>
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
        > + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<Update<Checklist>, Err = Traced<database::Error>>
        + Database<Update<Contract>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Checklist;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CompleteChecklist,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CompleteChecklist {
            checklist_id,
            landlord_id,
            notes,
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

        match contract.party_role(landlord_id) {
            Some(contract::Role::Landlord) => {}
            Some(contract::Role::Tenant) => {
                return Err(tracerr::new!(E::NotTheLandlord(landlord_id)));
            }
            None => return Err(tracerr::new!(E::NotAParty(landlord_id))),
        }

        match checklist.status {
            checklist::Status::TenantSigned => {}
            checklist::Status::Draft => {
                return Err(tracerr::new!(E::NotSubmittedYet(checklist_id)));
            }
            checklist::Status::Completed => {
                return Err(tracerr::new!(E::AlreadyCompleted(checklist_id)));
            }
        }

        let image = self
            .storage()
            .store(
                storage::Key::checklist_signature(
                    checklist_id,
                    contract::Role::Landlord,
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

        // Avoid concurrent completions upon the same `Contract`.
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
        if checklist.status != checklist::Status::TenantSigned {
            return Err(tracerr::new!(E::NotSubmittedYet(checklist_id)));
        }

        let now = DateTime::now();
        checklist.landlord_signature = Some(contract::Signature {
            image,
            signed_at: now.coerce(),
        });
        checklist.landlord_notes = notes;
        checklist.status = checklist::Status::Completed;
        checklist.completed_at = Some(now.coerce());

        tx.execute(Update(checklist.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        // Mirror the completion onto the owning `Contract` linkage.
        let mut contract = tx
            .execute(Select(By::<Option<Contract>, _>::new(contract.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract.id))
            .map_err(tracerr::wrap!())?;
        if let Some(link) = contract.checklist.as_mut() {
            link.completed_at = Some(now.coerce());
        }
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
                Kind::ChecklistCompleted,
                "Checklist completed",
                "The landlord counter-signed the move-in checklist.",
            )
            .with_link(Link::checklist(checklist.id)),
        );
        effects.run().await;

        Ok(checklist)
    }
}

/// Error of [`CompleteChecklist`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Checklist`] is completed already.
    #[display("`Checklist(id: {_0})` is completed already")]
    AlreadyCompleted(#[error(not(source))] checklist::Id),

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

    /// [`User`] is not the landlord of the [`Contract`].
    #[display("`User(id: {_0})` is not the landlord of the `Contract`")]
    NotTheLandlord(#[error(not(source))] user::Id),

    /// [`Checklist`] is not submitted by the tenant yet.
    #[display("`Checklist(id: {_0})` is not submitted by the tenant yet")]
    NotSubmittedYet(#[error(not(source))] checklist::Id),

    /// Signature image persisting failed.
    #[display("`ObjectStorage` operation failed: {_0}")]
    #[from]
    Storage(storage::Error),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ChecklistNotExists(_) | Self::ContractNotExists(_) => {
                C::NotFound
            }
            Self::NotAParty(_) | Self::NotTheLandlord(_) => C::Forbidden,
            Self::AlreadyCompleted(_) | Self::NotSubmittedYet(_) => {
                C::PreconditionFailed
            }
            Self::Db(_) | Self::Storage(_) => C::UpstreamFailure,
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::Handler as _;

    use crate::{
        command::{
            AttachChecklist, CompleteChecklist, SubmitChecklist,
        },
        domain::checklist,
        testing::Harness,
    };

    use super::{Classify as _, ErrorClass};

    #[tokio::test]
    async fn tenant_then_landlord_completes_the_checklist() {
        let h = Harness::new().await;
        let contract = h.create_draft().await;
        let template_id = h.seed_template().await;
        let checklist = h
            .service
            .execute(AttachChecklist {
                contract_id: contract.id,
                template_id,
                initiator_id: h.landlord.id,
            })
            .await
            .unwrap();

        let submitted = h
            .service
            .execute(SubmitChecklist {
                checklist_id: checklist.id,
                tenant_id: h.tenant.id,
                rooms: h.inspected_rooms(&checklist),
                signature_image: Harness::signature_image(),
            })
            .await
            .unwrap();
        assert_eq!(submitted.status, checklist::Status::TenantSigned);

        let completed = h
            .service
            .execute(CompleteChecklist {
                checklist_id: checklist.id,
                landlord_id: h.landlord.id,
                notes: Some(checklist::Notes::from(
                    "All conditions acknowledged".to_owned(),
                )),
                signature_image: Harness::signature_image(),
            })
            .await
            .unwrap();

        assert_eq!(completed.status, checklist::Status::Completed);
        assert!(completed.completed_at.is_some());
        assert!(completed.tenant_signature.is_some());
        assert!(completed.landlord_signature.is_some());

        let link = h.contract(contract.id).await.unwrap().checklist.unwrap();
        assert!(link.completed_at.is_some());
    }

    #[tokio::test]
    async fn landlord_cannot_sign_before_the_tenant() {
        let h = Harness::new().await;
        let contract = h.create_draft().await;
        let template_id = h.seed_template().await;
        let checklist = h
            .service
            .execute(AttachChecklist {
                contract_id: contract.id,
                template_id,
                initiator_id: h.landlord.id,
            })
            .await
            .unwrap();

        let err = h
            .service
            .execute(CompleteChecklist {
                checklist_id: checklist.id,
                landlord_id: h.landlord.id,
                notes: None,
                signature_image: Harness::signature_image(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::PreconditionFailed);
    }
}
