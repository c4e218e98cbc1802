use serde::Serialize;

use crate::api::{ApiError, FisteinApi};
use crate::listing::{expenses_for_group, expenses_total, filter_and_sort_expenses, ExpenseQuery};
use crate::schemas::{Balance, BalanceDetail, Expense, Group, GroupBalance, GroupId, User};
use crate::split::round_to_cents;

const RECENT_EXPENSES: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Standing {
    /// Owed money by others.
    Creditor,
    /// Owes money to others.
    Debtor,
    Settled,
}

impl Standing {
    // Anything under half a cent reads as settled.
    pub fn of(amount: f64) -> Self {
        let amount = round_to_cents(amount);
        if amount > 0.0 {
            Standing::Creditor
        } else if amount < 0.0 {
            Standing::Debtor
        } else {
            Standing::Settled
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceLine {
    pub user: User,
    pub amount: f64,
    pub standing: Standing,
}

impl From<BalanceDetail> for BalanceLine {
    fn from(detail: BalanceDetail) -> Self {
        Self {
            standing: Standing::of(detail.amount),
            user: detail.user,
            amount: detail.amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub total: f64,
    pub standing: Standing,
    pub details: Vec<BalanceLine>,
}

impl From<Balance> for BalanceView {
    fn from(balance: Balance) -> Self {
        Self {
            total: balance.total_balance,
            standing: Standing::of(balance.total_balance),
            details: balance.balance_details.into_iter().map(BalanceLine::from).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBalanceView {
    pub group_id: GroupId,
    pub group_name: String,
    pub lines: Vec<BalanceLine>,
}

impl From<GroupBalance> for GroupBalanceView {
    fn from(balance: GroupBalance) -> Self {
        Self {
            group_id: balance.group_id,
            group_name: balance.group_name,
            lines: balance.balances.into_iter().map(BalanceLine::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub user: User,
    pub balance: BalanceView,
    pub groups: Vec<Group>,
    pub recent_expenses: Vec<Expense>,
}

pub async fn load_dashboard(
    api: &dyn FisteinApi,
    token: &str,
    user: User,
) -> Result<Dashboard, ApiError> {
    let (balance, groups, expenses) =
        futures::try_join!(api.user_balance(token), api.groups(token), api.expenses(token))?;

    let mut recent_expenses = filter_and_sort_expenses(expenses, &ExpenseQuery::default());
    recent_expenses.truncate(RECENT_EXPENSES);
    Ok(Dashboard {
        user,
        balance: balance.into(),
        groups,
        recent_expenses,
    })
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOverview {
    pub group: Group,
    pub balance: GroupBalanceView,
    pub expenses: Vec<Expense>,
    pub total_spent: f64,
}

pub async fn load_group_overview(
    api: &dyn FisteinApi,
    token: &str,
    id: GroupId,
) -> Result<GroupOverview, ApiError> {
    let (group, balance, expenses) =
        futures::try_join!(api.group(token, id), api.group_balance(token, id), api.expenses(token))?;

    let expenses = filter_and_sort_expenses(expenses_for_group(expenses, id), &ExpenseQuery::default());
    Ok(GroupOverview {
        total_spent: expenses_total(&expenses),
        group,
        balance: balance.into(),
        expenses,
    })
}
