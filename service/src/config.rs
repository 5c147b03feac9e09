//! [`Config`]-related definitions.

use std::time;

use common::Percent;
use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use rust_decimal::Decimal;
use serde::Deserialize;
use smart_default::SmartDefault;

#[cfg(doc)]
use crate::{domain, Service};

/// [`Service`] configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Config {
    /// Commission [`Percent`] retained by the platform from every escrowed
    /// payment.
    ///
    /// Read at intent creation time and frozen into the created
    /// [`domain::Payment`], so a mid-flight change never alters fee splits
    /// of already created payments.
    #[default(default_commission())]
    pub commission: Percent,

    /// Key collection scheduling configuration.
    pub key_collection: KeyCollection,

    /// Move-in checklist configuration.
    pub checklist: Checklist,
}

impl Config {
    /// Creates a new [`Config`] by:
    /// - loading it from the provided `path` (if any);
    /// - merging it with the environment variables (if any);
    /// - using default values for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("CONF").separator("."))
            .build()?
            .try_deserialize()
    }
}

/// [`domain::KeyCollection`] scheduling configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct KeyCollection {
    /// Lead time before the lease start the handover is proposed at.
    #[default(time::Duration::from_secs(24 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub lead: time::Duration,

    /// UTC hour of day the handover is proposed at.
    #[default(12)]
    pub hour: u8,
}

/// [`domain::Checklist`] configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Checklist {
    /// Default completion deadline, counted from the moment a checklist is
    /// attached to a contract.
    #[default(time::Duration::from_secs(7 * 24 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub deadline: time::Duration,
}

/// Returns the default platform commission of 5%.
fn default_commission() -> Percent {
    Percent::new(Decimal::from(5)).expect("5 is within `[0, 100]`")
}

#[cfg(test)]
mod spec {
    use super::Config;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.commission.to_string(), "5");
        assert_eq!(config.key_collection.lead.as_secs(), 24 * 60 * 60);
        assert_eq!(config.key_collection.hour, 12);
        assert_eq!(config.checklist.deadline.as_secs(), 7 * 24 * 60 * 60);
    }
}
