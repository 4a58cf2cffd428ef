//! Value objects for the order domain.

use serde::{Deserialize, Deserializer, Serialize};

/// Money amount represented in cents to avoid floating point issues.
///
/// Serialized as a bare integer number of cents. Deserializes from that, or
/// from a decimal string in dollars (`"600.00"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a new Money amount from a whole dollar value.
    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.0.abs() % 100
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Applies a rate, rounding half away from zero to the nearest cent.
    pub fn apply_rate(&self, rate: Rate) -> Money {
        let scaled = i128::from(self.0) * i128::from(rate.basis_points());
        let half = i128::from(Rate::SCALE / 2);
        let rounded = if scaled >= 0 {
            (scaled + half) / i128::from(Rate::SCALE)
        } else {
            (scaled - half) / i128::from(Rate::SCALE)
        };
        Money(i64::try_from(rounded).unwrap_or(if rounded > 0 { i64::MAX } else { i64::MIN }))
    }

    /// Multiplies by a fractional factor, rounding to the nearest cent.
    pub fn scale(&self, factor: f64) -> Money {
        // `as` saturates; NaN becomes zero.
        Money((self.0 as f64 * factor).round() as i64)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

// Arithmetic saturates at the i64 bounds.
impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A percentage rate in basis points (800 = 8%).
///
/// Serialized as integer basis points. Deserializes from that, or from a
/// decimal fraction string (`"0.08"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    /// Basis points in 100%.
    pub const SCALE: u32 = 10_000;

    pub const fn from_basis_points(basis_points: u32) -> Self {
        Self(basis_points)
    }

    pub const fn from_percent(percent: u32) -> Self {
        Self(percent * 100)
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Wire form of [`Money`] and [`Rate`]: integer minor units or a decimal string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Amount {
    Units(i64),
    Decimal(String),
}

impl Amount {
    fn into_units<E: serde::de::Error>(self, places: u32) -> Result<i64, E> {
        match self {
            Amount::Units(units) => Ok(units),
            Amount::Decimal(text) => parse_decimal(&text, places)
                .ok_or_else(|| E::custom(format!("invalid decimal amount {text:?}"))),
        }
    }
}

/// Parses `text` as a decimal with at most `places` fractional digits and
/// returns it scaled by `10^places`.
fn parse_decimal(text: &str, places: u32) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty())
        || !all_digits(whole)
        || !all_digits(fraction)
        || fraction.len() > places as usize
    {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: i64 = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<width$}", width = places as usize)
            .parse()
            .ok()?
    };
    let value = whole
        .checked_mul(10_i64.checked_pow(places)?)?
        .checked_add(fraction)?;

    Some(if negative { -value } else { value })
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Amount::deserialize(deserializer)?
            .into_units(2)
            .map(Money)
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let basis_points = Amount::deserialize(deserializer)?.into_units::<D::Error>(4)?;
        u32::try_from(basis_points)
            .map(Rate)
            .map_err(|_| serde::de::Error::custom(format!("rate out of range: {basis_points}")))
    }
}

/// A line in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,

    /// Price per unit.
    pub price: Money,

    pub quantity: u32,
}

impl OrderItem {
    pub fn new(name: impl Into<String>, price: Money, quantity: u32) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
        }
    }

    /// Returns quantity * unit price.
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.dollars(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn test_money_serializes_as_cents() {
        assert_eq!(serde_json::to_string(&Money::from_cents(4800)).unwrap(), "4800");
        let money: Money = serde_json::from_str("60000").unwrap();
        assert_eq!(money, Money::from_dollars(600));
    }

    #[test]
    fn test_money_accepts_decimal_strings() {
        let parse = |json: &str| serde_json::from_str::<Money>(json);

        assert_eq!(parse(r#""600.00""#).unwrap(), Money::from_dollars(600));
        assert_eq!(parse(r#""12.5""#).unwrap(), Money::from_cents(1250));
        assert_eq!(parse(r#""-1.25""#).unwrap(), Money::from_cents(-125));
        assert_eq!(parse(r#"".07""#).unwrap(), Money::from_cents(7));
        assert!(parse(r#""1.234""#).is_err());
        assert!(parse(r#""ten""#).is_err());
        assert!(parse("\"\"").is_err());
    }

    #[test]
    fn test_rate_accepts_integer_or_fraction() {
        let parse = |json: &str| serde_json::from_str::<Rate>(json);

        assert_eq!(parse("800").unwrap(), Rate::from_basis_points(800));
        assert_eq!(parse(r#""0.08""#).unwrap(), Rate::from_basis_points(800));
        assert_eq!(parse(r#""0.0825""#).unwrap(), Rate::from_basis_points(825));
        assert!(parse(r#""-0.08""#).is_err());
        assert!(parse("-800").is_err());
        assert_eq!(serde_json::to_string(&Rate::from_percent(8)).unwrap(), "800");
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        assert_eq!(
            Money::from_dollars(600).apply_rate(Rate::from_basis_points(800)),
            Money::from_dollars(48)
        );
        // 0.05 * 10% = 0.005, rounds to one cent
        assert_eq!(
            Money::from_cents(5).apply_rate(Rate::from_percent(10)),
            Money::from_cents(1)
        );
        assert_eq!(
            Money::from_cents(4).apply_rate(Rate::from_percent(10)),
            Money::zero()
        );
    }

    #[test]
    fn test_scale_rounds_to_cent() {
        assert_eq!(Money::from_cents(200).scale(10.0), Money::from_cents(2000));
        assert_eq!(Money::from_cents(199).scale(1.5), Money::from_cents(299));
        assert_eq!(Money::from_cents(100).scale(f64::NAN), Money::zero());
    }

    #[test]
    fn test_rate_display() {
        assert_eq!(Rate::from_basis_points(800).to_string(), "8.00%");
        assert_eq!(Rate::from_basis_points(825).to_string(), "8.25%");
    }

    #[test]
    fn test_order_item_line_total() {
        let item = OrderItem::new("Widget", Money::from_cents(1000), 3);
        assert_eq!(item.line_total().cents(), 3000);
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [100, 250, 5].into_iter().map(Money::from_cents).sum();
        assert_eq!(total, Money::from_cents(355));
    }
}
