//! [`Handler`] abstractions.

use std::future::Future;

/// Executable handler.
///
/// This is the single executable abstraction commands, queries and database
/// operations are expressed with.
pub trait Handler<Args = ()> {
    /// Type of successful [`Handler`] result.
    type Ok;

    /// Type of this [`Handler`] error.
    type Err;

    /// Executes this [`Handler`] with the provided arguments.
    fn execute(
        &self,
        args: Args,
    ) -> impl Future<Output = Result<Self::Ok, Self::Err>>;
}
