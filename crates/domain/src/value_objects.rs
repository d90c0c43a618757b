//! Value objects shared across the group-buying domain.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Funding goal every group must reach to leave the collecting state.
pub const GROUP_MINIMUM_TOTAL: Money = Money::won(40_000);

/// Smallest total a user's retained orders in one group may sum to.
pub const USER_MINIMUM_TOTAL: Money = Money::won(10_000);

/// Product identifier from the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Money amount in whole won.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from whole won.
    pub const fn won(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in won.
    pub fn amount(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a quantity. Fails instead of wrapping on overflow.
    pub fn multiply(&self, quantity: u32) -> Result<Money, DomainError> {
        self.0
            .checked_mul(i64::from(quantity))
            .map(Money)
            .ok_or_else(|| out_of_range(*self, "×", Money(i64::from(quantity))))
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, DomainError> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or_else(|| out_of_range(self, "+", rhs))
    }

    pub fn checked_sub(self, rhs: Money) -> Result<Money, DomainError> {
        self.0
            .checked_sub(rhs.0)
            .map(Money)
            .ok_or_else(|| out_of_range(self, "-", rhs))
    }

    /// Sums amounts, failing on overflow.
    pub fn try_sum(amounts: impl IntoIterator<Item = Money>) -> Result<Money, DomainError> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

fn out_of_range(lhs: Money, op: &str, rhs: Money) -> DomainError {
    DomainError::Validation(format!("amount out of range: {} {op} {}", lhs.0, rhs.0))
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        if self.0 < 0 {
            write!(f, "-{grouped}원")
        } else {
            write!(f, "{grouped}원")
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Catalog product price snapshot captured when a group is created.
///
/// Never re-read from the catalog afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub product_id: ProductId,
    pub name: String,
    pub sale_price: Money,
    pub list_price: Money,
    /// Discount off the list price, in whole percent.
    pub discount_rate: u8,
}

impl MenuItem {
    /// Snapshots a catalog product, deriving the discount rate from the two prices.
    pub fn snapshot(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        sale_price: Money,
        list_price: Money,
    ) -> Self {
        let discount_rate = if list_price.is_positive() && sale_price < list_price {
            let list = i128::from(list_price.amount());
            let off = (list - i128::from(sale_price.amount())) * 100 / list;
            u8::try_from(off.min(100)).unwrap_or(100)
        } else {
            0
        };

        Self {
            product_id: product_id.into(),
            name: name.into(),
            sale_price,
            list_price,
            discount_rate,
        }
    }
}

/// Delivery details entered by the organizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub address: Option<String>,
    pub address_detail: Option<String>,
    pub expected_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_arithmetic() {
        let a = Money::won(12_000);
        let b = Money::won(3_000);

        assert_eq!(a + b, Money::won(15_000));
        assert_eq!(a - b, Money::won(9_000));
        assert_eq!(b.multiply(4).unwrap(), a);
        assert_eq!(-b, Money::won(-3_000));
        assert_eq!([a, b].iter().sum::<Money>(), Money::won(15_000));
    }

    #[test]
    fn overflowing_arithmetic_is_rejected() {
        let huge = Money::won(i64::MAX / 2);

        assert!(matches!(huge.multiply(4), Err(DomainError::Validation(_))));
        assert!(Money::won(i64::MAX).checked_add(Money::won(1)).is_err());
        assert!(Money::won(i64::MIN).checked_sub(Money::won(1)).is_err());
        assert!(Money::try_sum([huge, huge, huge]).is_err());
        assert_eq!(
            Money::try_sum([Money::won(1), Money::won(2)]).unwrap(),
            Money::won(3)
        );
    }

    #[test]
    fn money_display_groups_thousands() {
        assert_eq!(Money::won(40_000).to_string(), "40,000원");
        assert_eq!(Money::won(999).to_string(), "999원");
        assert_eq!(Money::won(-1_234_567).to_string(), "-1,234,567원");
    }

    #[test]
    fn menu_item_snapshot_derives_discount() {
        let item =
            MenuItem::snapshot("P-1", "Tangerines 5kg", Money::won(15_000), Money::won(20_000));
        assert_eq!(item.discount_rate, 25);

        let no_list = MenuItem::snapshot("P-2", "Kiwi", Money::won(9_000), Money::zero());
        assert_eq!(no_list.discount_rate, 0);
    }

    #[test]
    fn menu_item_snapshot_handles_extreme_prices() {
        let item = MenuItem::snapshot("P-1", "x", Money::won(1), Money::won(i64::MAX));
        assert_eq!(item.discount_rate, 99);

        let negative = MenuItem::snapshot("P-2", "y", Money::won(i64::MIN), Money::won(i64::MAX));
        assert_eq!(negative.discount_rate, 100);
    }

    #[test]
    fn thresholds() {
        assert_eq!(GROUP_MINIMUM_TOTAL.amount(), 40_000);
        assert_eq!(USER_MINIMUM_TOTAL.amount(), 10_000);
    }
}
