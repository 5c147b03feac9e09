//! Document generator collaborator definitions.

use std::fmt;

use async_trait::async_trait;
use derive_more::{Display, Error as StdError};
use tracerr::Traced;

use crate::{
    domain::{Checklist, Contract, User},
    infra::storage,
};

/// Generator rendering durable agreement documents.
///
/// Rendering is always a best-effort side effect: its failures are logged
/// and never fail the originating operation.
#[async_trait]
pub trait DocumentGenerator: fmt::Debug + Send + Sync {
    /// Renders a durable rental agreement document, embedding the captured
    /// signature images and the checklist snapshot, if any.
    ///
    /// # Errors
    ///
    /// If the document cannot be rendered or persisted.
    async fn render_agreement(
        &self,
        request: AgreementRequest,
    ) -> Result<storage::Url, Traced<Error>>;
}

/// Request to render an agreement document.
#[derive(Clone, Debug)]
pub struct AgreementRequest {
    /// [`Contract`] to render.
    pub contract: Contract,

    /// Landlord party of the [`Contract`].
    pub landlord: User,

    /// Tenant party of the [`Contract`].
    pub tenant: User,

    /// Snapshot of the linked [`Checklist`], if any.
    pub checklist: Option<Checklist>,
}

/// [`DocumentGenerator`] error.
#[derive(Debug, Display, StdError)]
#[display("agreement rendering failed: {_0}")]
pub struct Error(#[error(not(source))] pub String);

#[cfg(feature = "in-memory")]
pub use self::mock::MockDocumentGenerator;

#[cfg(feature = "in-memory")]
mod mock {
    //! Mock [`DocumentGenerator`] implementation.

    use std::sync::{Mutex, MutexGuard};

    use async_trait::async_trait;
    use tracerr::Traced;

    use crate::{domain::contract, infra::storage};

    use super::{AgreementRequest, DocumentGenerator, Error};

    /// [`DocumentGenerator`] collecting rendered agreements in memory.
    #[derive(Debug, Default)]
    pub struct MockDocumentGenerator {
        /// IDs of the contracts agreements were rendered for.
        rendered: Mutex<Vec<contract::Id>>,

        /// Indicator whether every request should fail.
        failing: bool,
    }

    impl MockDocumentGenerator {
        /// Creates a new operational [`MockDocumentGenerator`].
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a [`MockDocumentGenerator`] failing every request.
        #[must_use]
        pub fn failing() -> Self {
            Self {
                rendered: Mutex::new(Vec::new()),
                failing: true,
            }
        }

        /// Returns IDs of the contracts agreements were rendered for.
        #[must_use]
        pub fn rendered(&self) -> Vec<contract::Id> {
            self.lock().clone()
        }

        /// Locks and returns the rendered contracts list.
        fn lock(&self) -> MutexGuard<'_, Vec<contract::Id>> {
            self.rendered.lock().expect("non-poisoned `Mutex`")
        }
    }

    #[async_trait]
    impl DocumentGenerator for MockDocumentGenerator {
        async fn render_agreement(
            &self,
            request: AgreementRequest,
        ) -> Result<storage::Url, Traced<Error>> {
            if self.failing {
                return Err(tracerr::new!(Error(
                    "mock renderer is down".into(),
                )));
            }

            let id = request.contract.id;
            self.lock().push(id);
            Ok(storage::Url::from(format!(
                "mock://contracts/{id}/agreement.pdf",
            )))
        }
    }
}
