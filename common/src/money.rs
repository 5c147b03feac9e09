//! [`Money`]-related definitions.

use std::{fmt, str::FromStr};

use rust_decimal::{
    prelude::ToPrimitive as _, Decimal, RoundingStrategy,
};

use crate::{define_kind, Percent};

/// Amount of money in some [`Currency`], counted in integer minor currency
/// units (cents).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Money {
    /// Amount of this [`Money`] in minor currency units.
    pub amount: i64,

    /// [`Currency`] of this amount.
    pub currency: Currency,
}

impl Money {
    /// Creates a new [`Money`] from the provided amount of minor currency
    /// units.
    #[must_use]
    pub const fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Splits this [`Money`] into a platform fee and a net amount, according
    /// to the provided commission [`Percent`].
    ///
    /// The fee is rounded half-up ([`MidpointAwayFromZero`]) to a whole minor
    /// currency unit, and the net amount is the remainder, so
    /// `platform_fee + net == self` always holds.
    ///
    /// [`MidpointAwayFromZero`]: RoundingStrategy::MidpointAwayFromZero
    #[expect(clippy::missing_panics_doc, reason = "cannot overflow")]
    #[must_use]
    pub fn split(self, commission: Percent) -> Split {
        let fee = (Decimal::from(self.amount) * commission.into_decimal()
            / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .expect("fee fits into `i64`");

        Split {
            platform_fee: Self::new(fee, self.currency),
            net: Self::new(self.amount - fee, self.currency),
        }
    }
}

/// Commission split of a [`Money`] amount.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Split {
    /// Commission retained by the platform.
    pub platform_fee: Money,

    /// Remainder payable to the receiving party.
    pub net: Money,
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { amount, currency } = self;
        let (sign, abs) = if *amount < 0 {
            ("-", -amount)
        } else {
            ("", *amount)
        };
        write!(f, "{sign}{}.{:02}{currency}", abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 4 {
            return Err("too short");
        }

        let (amount, currency) = s.split_at(s.len() - 3);
        let amount = Decimal::from_str(amount).map_err(|_| "invalid amount")?
            * Decimal::ONE_HUNDRED;
        if !amount.is_integer() {
            return Err("sub-cent precision");
        }
        let amount = amount.to_i64().ok_or("amount out of range")?;
        let currency =
            Currency::from_str(currency).map_err(|_| "invalid currency")?;

        Ok(Self { amount, currency })
    }
}

define_kind! {
    #[doc = "Currency of a [`Money`] amount."]
    enum Currency {
        #[doc = "US Dollar."]
        Usd = 1,

        #[doc = "Euro."]
        Eur = 2,

        #[doc = "Russian Ruble."]
        Rub = 3,
    }
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use rust_decimal::Decimal;

    use crate::Percent;

    use super::{Currency, Money};

    fn percent(val: i64) -> Percent {
        Percent::new(Decimal::from(val)).unwrap()
    }

    #[test]
    fn from_str() {
        assert_eq!(
            Money::from_str("123.45USD").unwrap(),
            Money::new(12345, Currency::Usd),
        );

        assert_eq!(
            Money::from_str("123.45EUR").unwrap(),
            Money::new(12345, Currency::Eur),
        );

        assert_eq!(
            Money::from_str("123USD").unwrap(),
            Money::new(12300, Currency::Usd),
        );

        assert!(Money::from_str("123.45").is_err());
        assert!(Money::from_str("123.45Us").is_err());
        assert!(Money::from_str("123.456USD").is_err());
    }

    #[test]
    fn to_string() {
        assert_eq!(Money::new(12345, Currency::Usd).to_string(), "123.45USD");
        assert_eq!(Money::new(12300, Currency::Eur).to_string(), "123.00EUR");
        assert_eq!(Money::new(7, Currency::Rub).to_string(), "0.07RUB");
        assert_eq!(Money::new(-150, Currency::Usd).to_string(), "-1.50USD");
    }

    #[test]
    fn split_computes_commission() {
        let split = Money::new(120_000, Currency::Usd).split(percent(5));

        assert_eq!(split.platform_fee, Money::new(6000, Currency::Usd));
        assert_eq!(split.net, Money::new(114_000, Currency::Usd));
    }

    #[test]
    fn split_rounds_half_up() {
        // 5% of 10 cents is 0.5 cents: rounding half-up yields a whole cent,
        // while half-to-even would yield zero.
        let split = Money::new(10, Currency::Usd).split(percent(5));

        assert_eq!(split.platform_fee.amount, 1);
        assert_eq!(split.net.amount, 9);
    }

    #[test]
    fn split_preserves_gross() {
        for gross in [0, 1, 7, 99, 100, 101, 12345, 120_000, 999_999_999] {
            for pct in [0, 1, 3, 5, 33, 50, 99, 100] {
                let split = Money::new(gross, Currency::Usd).split(percent(pct));

                assert_eq!(
                    split.platform_fee.amount + split.net.amount,
                    gross,
                    "split of {gross} at {pct}% must preserve the gross",
                );
                assert!(split.platform_fee.amount >= 0);
                assert!(split.net.amount >= 0);
            }
        }
    }
}
