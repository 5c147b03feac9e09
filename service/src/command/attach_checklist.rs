//! [`Command`] for attaching a move-in [`Checklist`] to a [`Contract`].

use common::{
    operations::{
        By, Commit, Delete, Insert, Lock, Select, Transact, Transacted,
        Update,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{
        checklist::{self, template, Template},
        contract, user, Checklist, Contract,
    },
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

/// [`Command`] for attaching a move-in [`Checklist`] to a [`Contract`],
/// instantiated from a landlord-authored [`Template`].
///
/// Every per-instance field of the [`Template`]'s items is reset: a
/// [`Template`] describes structure, never condition data. A previously
/// linked [`Checklist`] is replaced, not merged.
#[derive(Clone, Copy, Debug)]
pub struct AttachChecklist {
    /// ID of the [`Contract`] to attach the [`Checklist`] to.
    pub contract_id: contract::Id,

    /// ID of the [`Template`] to instantiate.
    pub template_id: template::Id,

    /// ID of the [`User`] who attaches the [`Checklist`].
    pub initiator_id: user::Id,
}

impl<Db> Command<AttachChecklist> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Template>, template::Id>>,
            Ok = Option<Template>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Contract, contract::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Checklist>, contract::Id>>,
            Ok = Option<Checklist>,
            Err = Traced<database::Error>,
        > + Database<Insert<Checklist>, Err = Traced<database::Error>>
        + Database<
            Delete<By<Checklist, checklist::Id>>,
            Err = Traced<database::Error>,
        > + Database<Update<Contract>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Checklist;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: AttachChecklist,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let AttachChecklist {
            contract_id,
            template_id,
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

        let template = self
            .database()
            .execute(Select(By::<Option<Template>, _>::new(template_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::TemplateNotExists(template_id))
            .map_err(tracerr::wrap!())?;
        if template.landlord_id != contract.landlord_id {
            return Err(tracerr::new!(E::ForeignTemplate(template_id)));
        }

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent attachments upon the same `Contract`.
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

        // Replace, not merge.
        if let Some(old) = tx
            .execute(Select(By::<Option<Checklist>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
        {
            tx.execute(Delete(By::<Checklist, _>::new(old.id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }

        let deadline = contract.checklist.map_or_else(
            || (DateTime::now() + self.config().checklist.deadline).coerce(),
            |link| link.deadline,
        );
        let checklist = Checklist {
            id: checklist::Id::new(),
            contract_id,
            template_id,
            rooms: template.instantiate(),
            status: checklist::Status::Draft,
            tenant_signature: None,
            landlord_signature: None,
            landlord_notes: None,
            deadline,
            completed_at: None,
            created_at: DateTime::now().coerce(),
        };
        tx.execute(Insert(checklist.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        contract.checklist = Some(contract::ChecklistLink {
            id: checklist.id,
            deadline,
            completed_at: None,
        });
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
                Kind::ChecklistAssigned,
                "Move-in checklist",
                "Inspect the realty and submit the move-in checklist.",
            )
            .with_link(Link::checklist(checklist.id)),
        );
        effects.run().await;

        Ok(checklist)
    }
}

/// Error of [`AttachChecklist`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Contract`] with the provided ID does not exist.
    #[display("`Contract(id: {_0})` does not exist")]
    ContractNotExists(#[error(not(source))] contract::Id),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Template`] belongs to another landlord.
    #[display("`Template(id: {_0})` belongs to another landlord")]
    ForeignTemplate(#[error(not(source))] template::Id),

    /// [`User`] is not a party of the [`Contract`].
    #[display("`User(id: {_0})` is not a party of the `Contract`")]
    NotAParty(#[error(not(source))] user::Id),

    /// [`User`] is not the landlord of the [`Contract`].
    #[display("`User(id: {_0})` is not the landlord of the `Contract`")]
    NotTheLandlord(#[error(not(source))] user::Id),

    /// [`Template`] with the provided ID does not exist.
    #[display("`Template(id: {_0})` does not exist")]
    TemplateNotExists(#[error(not(source))] template::Id),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_) | Self::TemplateNotExists(_) => {
                C::NotFound
            }
            Self::ForeignTemplate(_)
            | Self::NotAParty(_)
            | Self::NotTheLandlord(_) => C::Forbidden,
            Self::Db(_) => C::UpstreamFailure,
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::Handler as _;

    use crate::{
        command::AttachChecklist, domain::checklist, testing::Harness,
    };

    #[tokio::test]
    async fn instance_is_sanitized_and_linked() {
        let h = Harness::new().await;
        let contract = h.create_draft().await;
        // The seeded template carries pre-filled conditions, notes and
        // photos on purpose.
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

        assert_eq!(checklist.status, checklist::Status::Draft);
        assert!(!checklist.rooms.is_empty());
        for room in &checklist.rooms {
            for item in &room.items {
                assert!(item.condition.is_none());
                assert!(item.notes.is_none());
                assert!(item.photos.is_empty());
            }
        }

        let contract = h.contract(contract.id).await.unwrap();
        let link = contract.checklist.unwrap();
        assert_eq!(link.id, checklist.id);
        assert!(link.completed_at.is_none());
    }

    #[tokio::test]
    async fn reattachment_replaces_the_previous_checklist() {
        let h = Harness::new().await;
        let contract = h.create_draft().await;
        let template_id = h.seed_template().await;

        let attach = || AttachChecklist {
            contract_id: contract.id,
            template_id,
            initiator_id: h.landlord.id,
        };
        let first = h.service.execute(attach()).await.unwrap();
        let second = h.service.execute(attach()).await.unwrap();

        assert_ne!(first.id, second.id);
        let link = h.contract(contract.id).await.unwrap().checklist.unwrap();
        assert_eq!(link.id, second.id);
        // The deadline of the replaced checklist is reused.
        assert_eq!(link.deadline, first.deadline);
    }
}
