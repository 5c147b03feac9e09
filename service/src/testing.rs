//! Shared harness for exercising [`Command`]s against the in-memory
//! infrastructure.
//!
//! [`Command`]: crate::Command

use std::{sync::Arc, time::Duration};

use common::{
    money::Currency,
    operations::{By, Insert, Select},
    DateTime, Handler as _, Money,
};

use crate::{
    command::{
        create_payment_intent::PaymentIntent, ConfirmKeyCollection,
        ConfirmPayment, CompleteKeyCollection, CreateContract,
        CreatePaymentIntent, SignContract,
    },
    domain::{
        checklist::{self, item, room, template, Item, Room, Template},
        contract, payment, realty, user, Checklist, Contract,
        KeyCollection, Payment, Realty, User,
    },
    infra::{
        documents::MockDocumentGenerator, ledger::MockLedger,
        notifications::MockNotifier, payments::MockPaymentGateway,
        storage::{self, MockObjectStorage},
        InMemory,
    },
    Collaborators, Config, Service,
};

/// Fully wired [`Service`] over the in-memory infrastructure, with the
/// mocks kept accessible for assertions.
pub(crate) struct Harness {
    pub(crate) service: Service<InMemory>,
    pub(crate) payments: Arc<MockPaymentGateway>,
    pub(crate) storage: Arc<MockObjectStorage>,
    pub(crate) documents: Arc<MockDocumentGenerator>,
    pub(crate) notifier: Arc<MockNotifier>,
    pub(crate) ledger: Arc<MockLedger>,
    pub(crate) landlord: User,
    pub(crate) tenant: User,
    pub(crate) realty: Realty,
}

impl Harness {
    /// Creates a [`Harness`] with all the collaborators operational.
    pub(crate) async fn new() -> Self {
        Self::build(
            MockPaymentGateway::new(),
            MockDocumentGenerator::new(),
        )
        .await
    }

    /// Creates a [`Harness`] whose document generator fails every request.
    pub(crate) async fn with_failing_documents() -> Self {
        Self::build(
            MockPaymentGateway::new(),
            MockDocumentGenerator::failing(),
        )
        .await
    }

    /// Creates a [`Harness`] whose payment processor is unavailable.
    pub(crate) async fn with_unavailable_processor() -> Self {
        Self::build(
            MockPaymentGateway::unavailable(),
            MockDocumentGenerator::new(),
        )
        .await
    }

    async fn build(
        payments: MockPaymentGateway,
        documents: MockDocumentGenerator,
    ) -> Self {
        let payments = Arc::new(payments);
        let storage = Arc::new(MockObjectStorage::new());
        let documents = Arc::new(documents);
        let notifier = Arc::new(MockNotifier::new());
        let ledger = Arc::new(MockLedger::new());

        let database = InMemory::new();
        let payments_dyn: Arc<dyn crate::infra::payments::PaymentGateway> =
            payments.clone();
        let storage_dyn: Arc<dyn crate::infra::storage::ObjectStorage> =
            storage.clone();
        let documents_dyn: Arc<dyn crate::infra::documents::DocumentGenerator> =
            documents.clone();
        let notifier_dyn: Arc<dyn crate::infra::notifications::Notifier> =
            notifier.clone();
        let ledger_dyn: Arc<dyn crate::infra::ledger::Ledger> =
            ledger.clone();
        let service = Service::new(
            Config::default(),
            database,
            Collaborators {
                payments: payments_dyn,
                storage: storage_dyn,
                documents: documents_dyn,
                notifier: notifier_dyn,
                ledger: ledger_dyn,
            },
        );

        let landlord = user(
            "Lena Holt",
            "lena.holt@example.com",
        );
        let tenant = user("Tom Avery", "tom.avery@example.com");
        let realty = Realty {
            id: realty::Id::new(),
            address: realty::Address::new("12 Cedar Lane, Springfield")
                .unwrap(),
            status: realty::Status::Active,
            created_at: DateTime::now().coerce(),
        };

        for u in [landlord.clone(), tenant.clone()] {
            service.database().execute(Insert(u)).await.unwrap();
        }
        service
            .database()
            .execute(Insert(realty.clone()))
            .await
            .unwrap();

        Self {
            service,
            payments,
            storage,
            documents,
            notifier,
            ledger,
            landlord,
            tenant,
            realty,
        }
    }

    /// Returns a base64-looking signature image blob.
    pub(crate) fn signature_image() -> storage::Blob {
        storage::Blob::from("iVBORw0KGgoAAAANSUhEUg==".to_owned())
    }

    /// Creates a draft [`Contract`] with a lease starting in 30 days.
    pub(crate) async fn create_draft(&self) -> Contract {
        let now = DateTime::now();
        self.create_draft_with(
            (now + Duration::from_secs(30 * 24 * 3600)).coerce(),
            (now + Duration::from_secs(395 * 24 * 3600)).coerce(),
        )
        .await
    }

    /// Creates a draft [`Contract`] with the provided lease window.
    pub(crate) async fn create_draft_with(
        &self,
        starts_on: contract::LeaseStartDateTime,
        ends_on: contract::LeaseEndDateTime,
    ) -> Contract {
        self.service
            .execute(CreateContract {
                realty_id: self.realty.id,
                landlord_id: self.landlord.id,
                tenant_id: self.tenant.id,
                application_id: None,
                starts_on,
                ends_on,
                monthly_rent: Money::new(120_000, Currency::Usd),
                security_deposit: Money::new(120_000, Currency::Usd),
                terms: None,
                special_conditions: None,
                send_to_tenant: false,
            })
            .await
            .unwrap()
    }

    /// Creates a [`Contract`] and drives it into
    /// [`contract::Status::FullySigned`].
    pub(crate) async fn fully_signed(&self) -> Contract {
        let contract = self.create_draft().await;
        self.sign_by_both(contract.id).await
    }

    /// Signs the [`Contract`] by the tenant, then by the landlord.
    pub(crate) async fn sign_by_both(
        &self,
        contract_id: contract::Id,
    ) -> Contract {
        let mut contract = None;
        for signer in [self.tenant.id, self.landlord.id] {
            contract = Some(
                self.service
                    .execute(SignContract {
                        contract_id,
                        signer_id: signer,
                        signature_image: Self::signature_image(),
                    })
                    .await
                    .unwrap(),
            );
        }
        contract.unwrap()
    }

    /// Opens a payment intent for the provided obligation.
    pub(crate) async fn intent(
        &self,
        contract_id: contract::Id,
        kind: payment::Kind,
    ) -> PaymentIntent {
        self.service
            .execute(CreatePaymentIntent {
                contract_id,
                payer_id: self.tenant.id,
                kind,
            })
            .await
            .unwrap()
    }

    /// Escrows the provided obligation through the processor path.
    pub(crate) async fn escrow(
        &self,
        contract_id: contract::Id,
        kind: payment::Kind,
    ) -> Payment {
        let intent = self.intent(contract_id, kind).await;
        self.service
            .execute(ConfirmPayment {
                reference: intent.payment.reference.clone().unwrap(),
            })
            .await
            .unwrap()
    }

    /// Creates a [`Contract`] with both obligations escrowed and a
    /// [`KeyCollection`] scheduled.
    pub(crate) async fn escrowed(&self) -> Contract {
        let contract = self.fully_signed().await;
        drop(self.escrow(contract.id, payment::Kind::Deposit).await);
        drop(self.escrow(contract.id, payment::Kind::Rent).await);
        self.contract(contract.id).await.unwrap()
    }

    /// Creates a [`Contract`] and drives it all the way into
    /// [`contract::Status::Active`].
    pub(crate) async fn active(&self) -> Contract {
        let contract = self.escrowed().await;
        self.hand_over_keys(contract.id).await
    }

    /// Same as [`Harness::active()`], with a lease window lying wholly in
    /// the past.
    pub(crate) async fn active_with_ended_lease(&self) -> Contract {
        let now = DateTime::now();
        let contract = self
            .create_draft_with(
                (now - Duration::from_secs(395 * 24 * 3600)).coerce(),
                (now - Duration::from_secs(30 * 24 * 3600)).coerce(),
            )
            .await;
        let contract = self.sign_by_both(contract.id).await;
        drop(self.escrow(contract.id, payment::Kind::Deposit).await);
        drop(self.escrow(contract.id, payment::Kind::Rent).await);
        self.hand_over_keys(contract.id).await
    }

    /// Confirms and completes the scheduled [`KeyCollection`].
    async fn hand_over_keys(&self, contract_id: contract::Id) -> Contract {
        let kc = self.key_collection_of(contract_id).await.unwrap();
        for party in [self.landlord.id, self.tenant.id] {
            drop(
                self.service
                    .execute(ConfirmKeyCollection {
                        key_collection_id: kc.id,
                        party_id: party,
                    })
                    .await
                    .unwrap(),
            );
        }
        self.service
            .execute(CompleteKeyCollection {
                key_collection_id: kc.id,
                initiator_id: self.landlord.id,
            })
            .await
            .unwrap()
    }

    /// Fetches the [`Contract`] by its ID.
    pub(crate) async fn contract(
        &self,
        id: contract::Id,
    ) -> Option<Contract> {
        self.service
            .database()
            .execute(Select(By::<Option<Contract>, _>::new(id)))
            .await
            .unwrap()
    }

    /// Fetches all the [`Payment`]s of the [`Contract`].
    pub(crate) async fn payments_of(
        &self,
        id: contract::Id,
    ) -> Vec<Payment> {
        self.service
            .database()
            .execute(Select(By::<Vec<Payment>, _>::new(id)))
            .await
            .unwrap()
    }

    /// Fetches the [`KeyCollection`] of the [`Contract`], if any.
    pub(crate) async fn key_collection_of(
        &self,
        id: contract::Id,
    ) -> Option<KeyCollection> {
        self.service
            .database()
            .execute(Select(By::<Option<KeyCollection>, _>::new(id)))
            .await
            .unwrap()
    }

    /// Seeds a [`Template`] authored by the landlord, with per-instance
    /// fields pre-filled on purpose.
    pub(crate) async fn seed_template(&self) -> template::Id {
        let template = Template {
            id: template::Id::new(),
            landlord_id: self.landlord.id,
            name: template::Name::from("Standard apartment".to_owned()),
            rooms: vec![
                Room {
                    name: room::Name::from("Living room".to_owned()),
                    items: vec![
                        Item {
                            name: item::Name::from("Sofa".to_owned()),
                            condition: Some(checklist::Condition::Poor),
                            notes: Some(checklist::Notes::from(
                                "stained".to_owned(),
                            )),
                            photos: vec![storage::Url::from(
                                "mock://photos/sofa.jpg".to_owned(),
                            )],
                        },
                        Item {
                            name: item::Name::from("Window".to_owned()),
                            condition: None,
                            notes: None,
                            photos: Vec::new(),
                        },
                    ],
                },
                Room {
                    name: room::Name::from("Kitchen".to_owned()),
                    items: vec![Item {
                        name: item::Name::from("Stove".to_owned()),
                        condition: Some(checklist::Condition::Good),
                        notes: None,
                        photos: Vec::new(),
                    }],
                },
            ],
            created_at: DateTime::now().coerce(),
        };
        let id = template.id;
        self.service
            .database()
            .execute(Insert(template))
            .await
            .unwrap();
        id
    }

    /// Returns the [`Checklist`] rooms with every item inspected.
    pub(crate) fn inspected_rooms(&self, checklist: &Checklist) -> Vec<Room> {
        checklist
            .rooms
            .iter()
            .map(|r| Room {
                name: r.name.clone(),
                items: r
                    .items
                    .iter()
                    .map(|i| Item {
                        name: i.name.clone(),
                        condition: Some(checklist::Condition::Good),
                        notes: None,
                        photos: Vec::new(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Creates a [`User`] with the provided name and email.
fn user(name: &str, email: &str) -> User {
    User {
        id: user::Id::new(),
        name: user::Name::new(name).unwrap(),
        email: Some(user::Email::new(email).unwrap()),
        created_at: DateTime::now().coerce(),
    }
}
