use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{GroupId, OrderId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::group::OrderStatus;
use crate::value_objects::{MenuItem, Money, ProductId, USER_MINIMUM_TOTAL};

/// One product selection by one user within one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderId,
    pub group_id: GroupId,
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub user_name: String,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderLine {
    /// Creates a submitted line from a request and the menu item it refers to.
    pub fn submit(
        request: &NewOrderLine,
        item: &MenuItem,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: OrderId::new(),
            group_id: request.group_id,
            transaction_id,
            user_id: request.user_id.clone(),
            user_name: request.user_name.clone(),
            product_id: item.product_id.clone(),
            product_name: item.name.clone(),
            quantity: request.quantity,
            unit_price: request.unit_price,
            total_price: request.line_total()?,
            status: OrderStatus::Submitted,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns true while the owner may still edit or cancel the line.
    pub fn is_submitted(&self) -> bool {
        self.status == OrderStatus::Submitted
    }

    /// Changes quantity and unit price, recomputing the line total.
    pub fn reprice(
        &mut self,
        quantity: u32,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.total_price = unit_price.multiply(quantity)?;
        self.quantity = quantity;
        self.unit_price = unit_price;
        self.updated_at = now;
        Ok(())
    }

    /// JSON view used for audit before/after payloads.
    pub(crate) fn audit_state(&self) -> serde_json::Value {
        serde_json::json!({
            "quantity": self.quantity,
            "unit_price": self.unit_price.amount(),
            "total_price": self.total_price.amount(),
        })
    }
}

/// A line a caller asks to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub user_name: String,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl NewOrderLine {
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.unit_price.multiply(self.quantity)
    }

    pub(crate) fn validate(&self) -> Result<(), DomainError> {
        validate_pricing(self.quantity, self.unit_price)
    }
}

/// Lines a user submitted together, as displayed, edited and cancelled as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTransaction {
    pub transaction_id: TransactionId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub total: Money,
    pub lines: Vec<OrderLine>,
}

impl OrderTransaction {
    /// Clusters lines by transaction id, ordered by the earliest line of each.
    pub fn group_lines(lines: impl IntoIterator<Item = OrderLine>) -> Vec<OrderTransaction> {
        let mut clusters: BTreeMap<TransactionId, Vec<OrderLine>> = BTreeMap::new();
        for line in lines {
            clusters.entry(line.transaction_id).or_default().push(line);
        }

        let mut transactions: Vec<_> = clusters
            .into_iter()
            .filter_map(|(transaction_id, mut lines)| {
                lines.sort_by_key(|l| l.created_at);
                let first = lines.first()?;
                Some(OrderTransaction {
                    transaction_id,
                    group_id: first.group_id,
                    user_id: first.user_id.clone(),
                    total: lines.iter().map(|l| l.total_price).sum(),
                    lines,
                })
            })
            .collect();
        transactions.sort_by_key(|t| t.lines.first().map(|l| l.created_at));
        transactions
    }
}

/// Sum of a user's submitted line totals among `lines`.
pub fn submitted_total<'a>(lines: impl IntoIterator<Item = &'a OrderLine>, user: &UserId) -> Money {
    lines
        .into_iter()
        .filter(|l| &l.user_id == user && l.is_submitted())
        .map(|l| l.total_price)
        .sum()
}

/// Fails unless a user's retained total meets the per-user minimum.
pub fn ensure_user_minimum(total: Money, user: &UserId) -> Result<(), DomainError> {
    if total >= USER_MINIMUM_TOTAL {
        Ok(())
    } else {
        Err(DomainError::ThresholdViolation(format!(
            "orders of {user} would total {total}, below the per-user minimum of {USER_MINIMUM_TOTAL}"
        )))
    }
}

pub(crate) fn validate_pricing(quantity: u32, unit_price: Money) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::Validation("quantity must be at least 1".into()));
    }
    if !unit_price.is_positive() {
        return Err(DomainError::Validation(
            "unit price must be at least 1".into(),
        ));
    }
    unit_price.multiply(quantity)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item() -> MenuItem {
        MenuItem::snapshot("P-1", "Hallabong 3kg", Money::won(12_000), Money::won(15_000))
    }

    fn request(user: &str, quantity: u32) -> NewOrderLine {
        NewOrderLine {
            group_id: GroupId::new(),
            user_id: UserId::new(user),
            user_name: user.to_string(),
            product_id: ProductId::new("P-1"),
            quantity,
            unit_price: Money::won(12_000),
        }
    }

    fn submit_new(request: &NewOrderLine) -> OrderLine {
        OrderLine::submit(request, &item(), TransactionId::new(), Utc::now()).unwrap()
    }

    #[test]
    fn submit_takes_name_from_menu_and_computes_total() {
        let line = submit_new(&request("u1", 2));

        assert_eq!(line.product_name, "Hallabong 3kg");
        assert_eq!(line.total_price, Money::won(24_000));
        assert!(line.is_submitted());
    }

    #[test]
    fn reprice_recomputes_total() {
        let mut line = submit_new(&request("u1", 1));
        line.reprice(3, Money::won(5_000), Utc::now()).unwrap();
        assert_eq!(line.total_price, Money::won(15_000));
    }

    #[test]
    fn submitted_total_counts_only_that_users_submitted_lines() {
        let now = Utc::now();
        let tx = TransactionId::new();
        let a = OrderLine::submit(&request("u1", 1), &item(), tx, now).unwrap();
        let b = OrderLine::submit(&request("u2", 1), &item(), tx, now).unwrap();
        let mut c = OrderLine::submit(&request("u1", 1), &item(), tx, now).unwrap();
        c.status = OrderStatus::Confirmed;

        let lines = [a, b, c];
        assert_eq!(submitted_total(&lines, &UserId::new("u1")), Money::won(12_000));
    }

    #[test]
    fn user_minimum_boundary() {
        let user = UserId::new("u1");
        assert!(ensure_user_minimum(Money::won(10_000), &user).is_ok());
        assert!(matches!(
            ensure_user_minimum(Money::won(9_999), &user),
            Err(DomainError::ThresholdViolation(_))
        ));
    }

    #[test]
    fn validation_rejects_zero_quantity_and_price() {
        assert!(request("u1", 0).validate().is_err());

        let mut free = request("u1", 1);
        free.unit_price = Money::zero();
        assert!(free.validate().is_err());
    }

    #[test]
    fn overflowing_line_total_is_rejected() {
        let mut huge = request("u1", 4);
        huge.unit_price = Money::won(i64::MAX / 2);

        assert!(matches!(huge.validate(), Err(DomainError::Validation(_))));
        assert!(OrderLine::submit(&huge, &item(), TransactionId::new(), Utc::now()).is_err());

        let mut line = submit_new(&request("u1", 1));
        assert!(line.reprice(4, Money::won(i64::MAX / 2), Utc::now()).is_err());
        assert_eq!(line.quantity, 1);
        assert_eq!(line.total_price, Money::won(12_000));
    }

    #[test]
    fn group_lines_clusters_by_transaction() {
        let now = Utc::now();
        let first = TransactionId::new();
        let second = TransactionId::new();

        let lines = vec![
            OrderLine::submit(&request("u1", 1), &item(), second, now + Duration::seconds(5))
                .unwrap(),
            OrderLine::submit(&request("u1", 1), &item(), first, now).unwrap(),
            OrderLine::submit(&request("u1", 2), &item(), first, now).unwrap(),
        ];

        let transactions = OrderTransaction::group_lines(lines);
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].transaction_id, first);
        assert_eq!(transactions[0].lines.len(), 2);
        assert_eq!(transactions[0].total, Money::won(36_000));
        assert_eq!(transactions[1].transaction_id, second);
    }
}
