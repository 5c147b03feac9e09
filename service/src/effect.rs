//! Post-commit side effects.

use std::{error::Error, fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt as _, TryFutureExt as _};
use tracing as log;

use crate::{
    domain::user,
    infra::{notifications::Notification, Notifier},
};

/// Best-effort side effects to attempt once the primary transaction
/// commits.
///
/// Effects run in order, each isolated: a failed effect is logged and
/// never affects the remaining ones, nor the committed operation itself.
#[derive(Default)]
pub(crate) struct Effects {
    /// Named effects to attempt.
    entries: Vec<Entry>,
}

/// Single named [`Effects`] entry.
type Entry = (
    &'static str,
    BoxFuture<'static, Result<(), Box<dyn Error + Send + Sync>>>,
);

impl Effects {
    /// Creates a new empty [`Effects`] collection.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Schedules the provided effect under the given name.
    pub(crate) fn push<F, E>(&mut self, name: &'static str, effect: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        self.entries.push((
            name,
            effect
                .map_err(|e| -> Box<dyn Error + Send + Sync> { Box::new(e) })
                .boxed(),
        ));
    }

    /// Schedules a [`Notification`] delivery effect.
    pub(crate) fn notify(
        &mut self,
        notifier: &Arc<dyn Notifier>,
        to: user::Id,
        notification: Notification,
    ) {
        let notifier = Arc::clone(notifier);
        self.push("deliver notification", async move {
            notifier.notify(to, notification).await
        });
    }

    /// Attempts all the scheduled effects.
    pub(crate) async fn run(self) {
        for (name, effect) in self.entries {
            if let Err(e) = effect.await {
                log::warn!("`{name}` effect failed: {e}");
            }
        }
    }
}

impl fmt::Debug for Effects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}
