//! Domain entities definitions.

pub mod application;
pub mod checklist;
pub mod contract;
pub mod key_collection;
pub mod payment;
pub mod realty;
pub mod user;

pub use self::{
    checklist::Checklist, contract::Contract, key_collection::KeyCollection,
    payment::Payment, realty::Realty, user::User,
};
