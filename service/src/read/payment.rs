//! [`Payment`] read model definition.

#[cfg(doc)]
use crate::domain::Payment;

/// Wrapper around a [`Payment`] indicating that it [`is_pending()`].
///
/// [`is_pending()`]: Payment::is_pending
#[derive(Clone, Debug)]
pub struct Pending<T>(pub T);
