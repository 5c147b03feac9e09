//! Object storage collaborator definitions.

use std::fmt;

use async_trait::async_trait;
use derive_more::{AsRef, Display, Error as StdError, From, Into};
use tracerr::Traced;

use crate::domain::{checklist, contract};

/// Object storage persisting binary blobs (signature images, rendered
/// documents, photos) and serving them back by [`Url`].
#[async_trait]
pub trait ObjectStorage: fmt::Debug + Send + Sync {
    /// Stores the provided [`Blob`] under the given [`Key`], returning a
    /// retrievable [`Url`].
    ///
    /// # Errors
    ///
    /// If the storage fails to persist the [`Blob`].
    async fn store(&self, key: Key, blob: Blob) -> Result<Url, Traced<Error>>;
}

/// Key an object is stored under.
#[derive(AsRef, Clone, Debug, Display, Eq, From, Hash, Into, PartialEq)]
#[as_ref(str, String)]
pub struct Key(String);

impl Key {
    /// Creates a [`Key`] for a party's signature image of a contract.
    #[must_use]
    pub fn signature(
        contract_id: contract::Id,
        role: contract::Role,
    ) -> Self {
        Self(format!("contracts/{contract_id}/signatures/{role}"))
    }

    /// Creates a [`Key`] for a party's signature image of a checklist.
    #[must_use]
    pub fn checklist_signature(
        checklist_id: checklist::Id,
        role: contract::Role,
    ) -> Self {
        Self(format!("checklists/{checklist_id}/signatures/{role}"))
    }

    /// Creates a [`Key`] for a rendered agreement document of a contract.
    #[must_use]
    pub fn agreement(contract_id: contract::Id) -> Self {
        Self(format!("contracts/{contract_id}/agreement.pdf"))
    }
}

/// Base64-encoded binary blob.
#[derive(AsRef, Clone, Debug, Eq, From, Into, PartialEq)]
#[as_ref(str, String)]
pub struct Blob(String);

/// URL of a stored object.
#[derive(AsRef, Clone, Debug, Display, Eq, From, Hash, Into, PartialEq)]
#[as_ref(str, String)]
pub struct Url(String);

/// [`ObjectStorage`] error.
#[derive(Debug, Display, StdError)]
#[display("`ObjectStorage` is unavailable: {_0}")]
pub struct Error(#[error(not(source))] pub String);

#[cfg(feature = "in-memory")]
pub use self::mock::MockObjectStorage;

#[cfg(feature = "in-memory")]
mod mock {
    //! Mock [`ObjectStorage`] implementation.

    use std::{
        collections::HashMap,
        sync::{Mutex, MutexGuard},
    };

    use async_trait::async_trait;
    use tracerr::Traced;

    use super::{Blob, Error, Key, ObjectStorage, Url};

    /// [`ObjectStorage`] keeping stored objects in memory.
    #[derive(Debug, Default)]
    pub struct MockObjectStorage {
        /// Stored objects by their [`Key`].
        objects: Mutex<HashMap<Key, Blob>>,
    }

    impl MockObjectStorage {
        /// Creates a new empty [`MockObjectStorage`].
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Returns the stored [`Blob`] under the provided [`Key`], if any.
        #[must_use]
        pub fn object(&self, key: &Key) -> Option<Blob> {
            self.objects().get(key).cloned()
        }

        /// Returns the number of stored objects.
        #[must_use]
        pub fn len(&self) -> usize {
            self.objects().len()
        }

        /// Indicates whether no objects are stored.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.objects().is_empty()
        }

        /// Locks and returns the stored objects.
        fn objects(&self) -> MutexGuard<'_, HashMap<Key, Blob>> {
            self.objects.lock().expect("non-poisoned `Mutex`")
        }
    }

    #[async_trait]
    impl ObjectStorage for MockObjectStorage {
        async fn store(
            &self,
            key: Key,
            blob: Blob,
        ) -> Result<Url, Traced<Error>> {
            let url = Url::from(format!("mock://{key}"));
            drop(self.objects().insert(key, blob));
            Ok(url)
        }
    }
}
