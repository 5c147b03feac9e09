//! [`Command`] for deleting a [`Contract`].

use common::operations::{
    By, Commit, Delete, Lock, Select, Transact, Transacted,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{checklist, contract, user, Checklist, Contract},
    infra::{database, Database},
    Service,
};

#[cfg(doc)]
use crate::domain::User;

use super::Command;

/// [`Command`] for deleting a [`Contract`].
///
/// Only permitted before both signatures are captured: a fully signed
/// [`Contract`] is owned by the platform and is never hard-deleted.
/// Deletion cascades onto the linked [`Checklist`].
#[derive(Clone, Copy, Debug)]
pub struct DeleteContract {
    /// ID of the [`Contract`] to delete.
    pub contract_id: contract::Id,

    /// ID of the [`User`] who deletes the [`Contract`].
    pub initiator_id: user::Id,
}

impl<Db> Command<DeleteContract> for Service<Db>
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
        > + Database<
            Delete<By<Contract, contract::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Delete<By<Checklist, checklist::Id>>,
            Err = Traced<database::Error>,
        > + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = ();
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: DeleteContract,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let DeleteContract {
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

        contract
            .party_role(initiator_id)
            .ok_or(E::NotAParty(initiator_id))
            .map_err(tracerr::wrap!())
            .map(drop)?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent deletions.
        tx.execute(Lock(By::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let contract = tx
            .execute(Select(By::<Option<Contract>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract_id))
            .map_err(tracerr::wrap!())?;

        if !contract.is_deletable() {
            return Err(tracerr::new!(E::NotDeletable(contract.status)));
        }

        if let Some(link) = contract.checklist {
            tx.execute(Delete(By::<Checklist, _>::new(link.id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }

        tx.execute(Delete(By::<Contract, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(())
    }
}

/// Error of [`DeleteContract`] [`Command`] execution.
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

    /// [`Contract`] has passed the point of no deletion.
    #[display("`Contract` in `{_0}` status cannot be deleted")]
    NotDeletable(#[error(not(source))] contract::Status),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_) => C::NotFound,
            Self::NotAParty(_) | Self::NotDeletable(_) => C::Forbidden,
            Self::Db(_) => C::UpstreamFailure,
        }
    }
}

#[cfg(all(test, feature = "in-memory"))]
mod spec {
    use common::{operations::{By, Select}, Handler as _};

    use crate::{
        command::{AttachChecklist, DeleteContract},
        domain::Checklist,
        testing::Harness,
    };

    use super::{Classify as _, ErrorClass};

    #[tokio::test]
    async fn draft_deletion_cascades_onto_checklist() {
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

        h.service
            .execute(DeleteContract {
                contract_id: contract.id,
                initiator_id: h.landlord.id,
            })
            .await
            .unwrap();

        let gone = h
            .service
            .database()
            .execute(Select(By::<Option<Checklist>, _>::new(
                checklist.id,
            )))
            .await
            .unwrap();
        assert!(gone.is_none(), "checklist must be cascade-deleted");
        assert!(h.contract(contract.id).await.is_none());
    }

    #[tokio::test]
    async fn fully_signed_contract_is_not_deletable() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;

        let err = h
            .service
            .execute(DeleteContract {
                contract_id: contract.id,
                initiator_id: h.landlord.id,
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::Forbidden);
        assert!(h.contract(contract.id).await.is_some());
    }

    #[tokio::test]
    async fn stranger_cannot_delete() {
        let h = Harness::new().await;
        let contract = h.create_draft().await;

        let err = h
            .service
            .execute(DeleteContract {
                contract_id: contract.id,
                initiator_id: crate::domain::user::Id::new(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::Forbidden);
    }
}
