//! [`Command`] for capturing a party's signature on a [`Contract`].

use std::{collections::HashMap, sync::Arc};

use common::{
    operations::{By, Commit, Lock, Select, Transact, Transacted, Update},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    command::{Classify, ErrorClass},
    domain::{
        contract, realty, user, Checklist, Contract, Realty, User,
    },
    effect::Effects,
    infra::{
        database,
        documents::AgreementRequest,
        ledger,
        notifications::{Kind, Link, Notification},
        storage, Database,
    },
    Service,
};

use super::Command;

/// [`Command`] for capturing a party's signature on a [`Contract`].
///
/// The signer role is derived by matching the caller's identity against
/// the [`Contract`]'s stored party IDs, never from a caller-provided flag.
/// Signatures are commutative: whichever party signs second converges the
/// [`Contract`] into [`contract::Status::FullySigned`].
#[derive(Clone, Debug)]
pub struct SignContract {
    /// ID of the [`Contract`] to sign.
    pub contract_id: contract::Id,

    /// ID of the [`User`] who signs the [`Contract`].
    pub signer_id: user::Id,

    /// Base64-encoded signature image.
    pub signature_image: storage::Blob,
}

impl<Db> Command<SignContract> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<HashMap<user::Id, User>, [user::Id; 2]>>,
            Ok = HashMap<user::Id, User>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Checklist>, contract::Id>>,
            Ok = Option<Checklist>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Contract, contract::Id>>,
            Err = Traced<database::Error>,
        > + Database<Lock<By<Realty, realty::Id>>, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Contract>, contract::Id>>,
            Ok = Option<Contract>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Realty>, realty::Id>>,
            Ok = Option<Realty>,
            Err = Traced<database::Error>,
        > + Database<Update<Contract>, Err = Traced<database::Error>>
        + Database<Update<Realty>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = Contract;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: SignContract) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let SignContract {
            contract_id,
            signer_id,
            signature_image,
        } = cmd;

        let contract = self
            .database()
            .execute(Select(By::<Option<Contract>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ContractNotExists(contract_id))
            .map_err(tracerr::wrap!())?;

        let role = contract
            .party_role(signer_id)
            .ok_or(E::NotAParty(signer_id))
            .map_err(tracerr::wrap!())?;
        if contract.terminated_at.is_some() || contract.expired_at.is_some() {
            return Err(tracerr::new!(E::ContractClosed(contract_id)));
        }

        let users = self
            .database()
            .execute(Select(By::new([
                contract.landlord_id,
                contract.tenant_id,
            ])))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        let landlord = users
            .get(&contract.landlord_id)
            .ok_or(E::UserNotExists(contract.landlord_id))
            .map_err(tracerr::wrap!())?
            .clone();
        let tenant = users
            .get(&contract.tenant_id)
            .ok_or(E::UserNotExists(contract.tenant_id))
            .map_err(tracerr::wrap!())?
            .clone();

        // The image is durably persisted before the signature slot is
        // written, so the stored URL is always retrievable.
        let image = self
            .storage()
            .store(
                storage::Key::signature(contract_id, role),
                signature_image,
            )
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        // Avoid concurrent signing of the same `Contract`: the resulting
        // status is decided from the other party's slot re-read under this
        // lock, never from any client-supplied state.
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

        if contract.signature(role).is_some() {
            return Err(tracerr::new!(E::AlreadySigned(signer_id)));
        }

        *contract.signature_mut(role) = Some(contract::Signature {
            image,
            signed_at: DateTime::now().coerce(),
        });
        contract.sync_status();

        if contract.status == contract::Status::FullySigned {
            // The deal is made: take the `Realty` off the search.
            tx.execute(Lock(By::new(contract.realty_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            let mut realty = tx
                .execute(Select(By::<Option<Realty>, _>::new(
                    contract.realty_id,
                )))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or(E::RealtyNotExists(contract.realty_id))
                .map_err(tracerr::wrap!())?;
            realty.status = realty::Status::Rented;
            tx.execute(Update(realty))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }

        tx.execute(Update(contract.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let checklist = self
            .database()
            .execute(Select(By::<Option<Checklist>, _>::new(contract_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let mut effects = Effects::new();
        {
            let documents = Arc::clone(self.documents());
            let request = AgreementRequest {
                contract: contract.clone(),
                landlord: landlord.clone(),
                tenant: tenant.clone(),
                checklist,
            };
            effects.push("regenerate agreement document", async move {
                documents.render_agreement(request).await.map(drop)
            });
        }
        match contract.status {
            contract::Status::FullySigned => {
                for party in [contract.landlord_id, contract.tenant_id] {
                    effects.notify(
                        self.notifier(),
                        party,
                        Notification::new(
                            Kind::ContractFullySigned,
                            "Contract fully signed",
                            format!(
                                "The rental contract between {} and {} is \
                                 signed by both parties.",
                                landlord.name, tenant.name,
                            ),
                        )
                        .with_link(Link::contract(contract.id)),
                    );
                }
                let ledger = Arc::clone(self.ledger());
                let entry = ledger::Entry {
                    kind: ledger::Kind::ContractFullySigned,
                    contract_id: contract.id,
                    occurred_at: DateTime::now(),
                };
                effects.push("record ledger entry", async move {
                    ledger.record(entry).await
                });
            }
            contract::Status::TenantSigned => {
                effects.notify(
                    self.notifier(),
                    contract.landlord_id,
                    Notification::new(
                        Kind::TenantSigned,
                        "Tenant signed the contract",
                        format!("{} has signed the rental contract.",
                            tenant.name),
                    )
                    .with_link(Link::contract(contract.id)),
                );
            }
            contract::Status::Draft
            | contract::Status::SentToTenant
            | contract::Status::Active
            | contract::Status::Expired
            | contract::Status::Terminated => {}
        }
        effects.run().await;

        Ok(contract)
    }
}

/// Error of [`SignContract`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// Party has signed the [`Contract`] already.
    #[display("`User(id: {_0})` has signed the `Contract` already")]
    AlreadySigned(#[error(not(source))] user::Id),

    /// [`Contract`] is terminated or expired.
    #[display("`Contract(id: {_0})` is closed for signing")]
    ContractClosed(#[error(not(source))] contract::Id),

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

    /// [`Realty`] of the [`Contract`] does not exist.
    #[display("`Realty(id: {_0})` does not exist")]
    RealtyNotExists(#[error(not(source))] realty::Id),

    /// Signature image persisting failed.
    #[display("`ObjectStorage` operation failed: {_0}")]
    #[from]
    Storage(storage::Error),

    /// [`User`] with the provided ID does not exist.
    #[display("`User(id: {_0})` does not exist")]
    UserNotExists(#[error(not(source))] user::Id),
}

impl Classify for ExecutionError {
    fn class(&self) -> ErrorClass {
        use ErrorClass as C;

        match self {
            Self::ContractNotExists(_)
            | Self::RealtyNotExists(_)
            | Self::UserNotExists(_) => C::NotFound,
            Self::NotAParty(_) => C::Forbidden,
            Self::AlreadySigned(_) | Self::ContractClosed(_) => {
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
        command::SignContract,
        domain::contract,
        infra::notifications,
        testing::Harness,
    };

    use super::{Classify as _, ErrorClass};

    #[tokio::test]
    async fn signing_converges_in_either_order() {
        for (first, second) in [("tenant", "landlord"), ("landlord", "tenant")]
        {
            let h = Harness::new().await;
            let contract = h.create_draft().await;

            let signer = |who| match who {
                "tenant" => h.tenant.id,
                _ => h.landlord.id,
            };

            let after_first = h
                .service
                .execute(SignContract {
                    contract_id: contract.id,
                    signer_id: signer(first),
                    signature_image: Harness::signature_image(),
                })
                .await
                .unwrap();
            assert_ne!(after_first.status, contract::Status::FullySigned);

            let after_second = h
                .service
                .execute(SignContract {
                    contract_id: contract.id,
                    signer_id: signer(second),
                    signature_image: Harness::signature_image(),
                })
                .await
                .unwrap();

            assert_eq!(after_second.status, contract::Status::FullySigned);
            assert!(after_second.landlord_signature.is_some());
            assert!(after_second.tenant_signature.is_some());
        }
    }

    #[tokio::test]
    async fn tenant_signature_yields_tenant_signed_status() {
        let h = Harness::new().await;
        let contract = h.create_draft().await;

        let signed = h
            .service
            .execute(SignContract {
                contract_id: contract.id,
                signer_id: h.tenant.id,
                signature_image: Harness::signature_image(),
            })
            .await
            .unwrap();

        assert_eq!(signed.status, contract::Status::TenantSigned);
        assert_eq!(h.storage.len(), 1, "signature image must be persisted");
        assert_eq!(
            h.notifier.recipients_of(notifications::Kind::TenantSigned),
            vec![h.landlord.id],
        );
    }

    #[tokio::test]
    async fn full_signature_notifies_both_and_records_ledger_entry() {
        let h = Harness::new().await;
        let contract = h.fully_signed().await;

        assert_eq!(contract.status, contract::Status::FullySigned);

        let mut notified = h
            .notifier
            .recipients_of(notifications::Kind::ContractFullySigned);
        notified.sort_unstable_by_key(ToString::to_string);
        let mut parties = vec![h.landlord.id, h.tenant.id];
        parties.sort_unstable_by_key(ToString::to_string);
        assert_eq!(notified, parties);

        let entries = h.ledger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].contract_id, contract.id);
    }

    #[tokio::test]
    async fn document_regeneration_failure_never_fails_signing() {
        let h = Harness::with_failing_documents().await;
        let contract = h.fully_signed().await;

        assert_eq!(contract.status, contract::Status::FullySigned);
        assert!(h.documents.rendered().is_empty());
    }

    #[tokio::test]
    async fn stranger_cannot_sign() {
        let h = Harness::new().await;
        let contract = h.create_draft().await;

        let err = h
            .service
            .execute(SignContract {
                contract_id: contract.id,
                signer_id: crate::domain::user::Id::new(),
                signature_image: Harness::signature_image(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::Forbidden);
    }

    #[tokio::test]
    async fn duplicate_signature_is_rejected() {
        let h = Harness::new().await;
        let contract = h.create_draft().await;

        let sign = || SignContract {
            contract_id: contract.id,
            signer_id: h.tenant.id,
            signature_image: Harness::signature_image(),
        };
        drop(h.service.execute(sign()).await.unwrap());
        let err = h.service.execute(sign()).await.unwrap_err();

        assert_eq!(err.as_ref().class(), ErrorClass::PreconditionFailed);
    }
}
