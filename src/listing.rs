//! Search, filter and sort for the group and expense lists.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::schemas::{Expense, Group, GroupId};

/// Expenses shown per group in the grouped summary.
const GROUP_PREVIEW_LEN: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupFilter {
    #[default]
    All,
    Admin,
    Member,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GroupQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub filter: GroupFilter,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

pub fn filter_groups(groups: Vec<Group>, query: &GroupQuery) -> Vec<Group> {
    let needle = query.search.trim().to_lowercase();
    groups
        .into_iter()
        .filter(|group| {
            needle.is_empty()
                || contains_ignore_case(&group.name, &needle)
                || group
                    .description
                    .as_deref()
                    .is_some_and(|description| contains_ignore_case(description, &needle))
        })
        .filter(|group| match query.filter {
            GroupFilter::All => true,
            GroupFilter::Admin => group.is_user_admin == Some(true),
            GroupFilter::Member => group.is_user_admin == Some(false),
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Date,
    Amount,
    Title,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExpenseQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub group: Option<GroupId>,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub order: SortOrder,
}

pub fn filter_and_sort_expenses(expenses: Vec<Expense>, query: &ExpenseQuery) -> Vec<Expense> {
    let needle = query.search.trim().to_lowercase();
    let mut matching: Vec<Expense> = expenses
        .into_iter()
        .filter(|expense| {
            needle.is_empty()
                || contains_ignore_case(&expense.title, &needle)
                || expense
                    .description
                    .as_deref()
                    .is_some_and(|description| contains_ignore_case(description, &needle))
        })
        .filter(|expense| query.group.map_or(true, |id| expense.group.id == id))
        .collect();

    matching.sort_by(|a, b| {
        let ordering = match query.sort {
            SortKey::Date => a.created_at.cmp(&b.created_at),
            SortKey::Amount => a.amount.partial_cmp(&b.amount).unwrap_or(Ordering::Equal),
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        };
        match query.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    matching
}

pub fn expenses_total(expenses: &[Expense]) -> f64 {
    expenses.iter().map(|expense| expense.amount).sum()
}

pub fn expenses_for_group(expenses: Vec<Expense>, group: GroupId) -> Vec<Expense> {
    expenses
        .into_iter()
        .filter(|expense| expense.group.id == group)
        .collect()
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupExpenseSummary {
    pub group_id: GroupId,
    pub group_name: String,
    pub count: usize,
    pub total: f64,
    pub preview: Vec<Expense>,
    /// Expenses left out of `preview`.
    pub more: usize,
}

/// Per-group summary in first-seen order. Keeps the input ordering within a group.
pub fn expenses_by_group(expenses: &[Expense]) -> Vec<GroupExpenseSummary> {
    let mut order = Vec::new();
    let mut buckets: BTreeMap<GroupId, Vec<&Expense>> = BTreeMap::new();
    for expense in expenses {
        let bucket = buckets.entry(expense.group.id).or_default();
        if bucket.is_empty() {
            order.push(expense.group.id);
        }
        bucket.push(expense);
    }

    order
        .into_iter()
        .filter_map(|id| buckets.remove(&id))
        .map(|bucket| GroupExpenseSummary {
            group_id: bucket[0].group.id,
            group_name: bucket[0].group.name.clone(),
            count: bucket.len(),
            total: bucket.iter().map(|expense| expense.amount).sum(),
            preview: bucket
                .iter()
                .take(GROUP_PREVIEW_LEN)
                .map(|expense| (*expense).clone())
                .collect(),
            more: bucket.len().saturating_sub(GROUP_PREVIEW_LEN),
        })
        .collect()
}
