//! In-memory backend and fixtures for tests

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{ApiError, FisteinApi};
use crate::config::Config;
use crate::schemas::{
    AuthResponse, Balance, BalanceDetail, CreateExpenseRequest, CreateGroupRequest, Expense,
    ExpenseId, ExpenseShare, GoogleLoginRequest, Group, GroupBalance, GroupId, GroupMember,
    LoginRequest, RegisterRequest, UpdateExpenseRequest, UpdateGroupRequest, User,
};

pub fn config() -> Config {
    Config {
        port: 0,
        api_base_url: "http://127.0.0.1:9/api".to_string(),
        allowed_origin: "http://localhost:5173".to_string(),
        request_timeout: Duration::from_secs(1),
        default_currency: "TRY".to_string(),
        session_secret: "test-secret".to_string(),
    }
}

pub fn user(id: u64, username: &str) -> User {
    User {
        id,
        username: username.to_string(),
        email: format!("{username}@example.com"),
        full_name: format!("{username} test"),
        created_at: None,
    }
}

pub fn group_with_members(id: GroupId, name: &str, member_ids: &[u64]) -> Group {
    Group {
        id,
        name: name.to_string(),
        description: None,
        created_by: None,
        created_at: None,
        members: member_ids
            .iter()
            .enumerate()
            .map(|(idx, member_id)| GroupMember {
                id: idx as u64 + 1,
                user: user(*member_id, &format!("user{member_id}")),
                joined_at: None,
                is_admin: Some(idx == 0),
            })
            .collect(),
        is_user_admin: None,
    }
}

/// An expense created on 2024-05-`day` at noon.
pub fn expense(id: ExpenseId, title: &str, amount: f64, group: &Group, day: u32) -> Expense {
    let created_at = NaiveDate::from_ymd_opt(2024, 5, day)
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .unwrap();
    Expense {
        id,
        title: title.to_string(),
        description: None,
        amount,
        currency: "TRY".to_string(),
        group: group.clone(),
        paid_by: user(1, "user1"),
        created_at,
        expense_shares: vec![],
    }
}

#[derive(Default)]
struct FakeData {
    users: HashMap<String, User>,
    passwords: HashMap<String, (String, String)>,
    groups: Vec<Group>,
    expenses: Vec<Expense>,
    balance: Option<Balance>,
    created: Vec<CreateExpenseRequest>,
    added_members: Vec<(GroupId, String)>,
}

/// Backend stand-in keyed by bearer token.
#[derive(Default)]
pub struct FakeApi {
    data: Mutex<FakeData>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, token: &str, user: User) -> Self {
        self.data
            .lock()
            .unwrap()
            .users
            .insert(token.to_string(), user);
        self
    }

    /// Lets `email`/`password` log in as the user behind `token`.
    pub fn with_login(self, email: &str, password: &str, token: &str) -> Self {
        self.data
            .lock()
            .unwrap()
            .passwords
            .insert(email.to_string(), (password.to_string(), token.to_string()));
        self
    }

    pub fn with_group(self, group: Group) -> Self {
        self.data.lock().unwrap().groups.push(group);
        self
    }

    pub fn with_expense(self, expense: Expense) -> Self {
        self.data.lock().unwrap().expenses.push(expense);
        self
    }

    pub fn with_balance(self, balance: Balance) -> Self {
        self.data.lock().unwrap().balance = Some(balance);
        self
    }

    /// Forgets a token, as the backend does when it expires.
    pub fn revoke(&self, token: &str) {
        self.data.lock().unwrap().users.remove(token);
    }

    pub fn created_expenses(&self) -> Vec<CreateExpenseRequest> {
        self.data.lock().unwrap().created.clone()
    }

    pub fn added_members(&self) -> Vec<(GroupId, String)> {
        self.data.lock().unwrap().added_members.clone()
    }

    fn authorize(&self, token: &str) -> Result<User, ApiError> {
        self.data
            .lock()
            .unwrap()
            .users
            .get(token)
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }

    fn auth_response(&self, token: &str) -> Result<AuthResponse, ApiError> {
        Ok(AuthResponse {
            token: token.to_string(),
            user: self.authorize(token)?,
        })
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        message: format!("{what} not found"),
    }
}

#[async_trait]
impl FisteinApi for FakeApi {
    async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let login = self
            .data
            .lock()
            .unwrap()
            .passwords
            .get(&credentials.email)
            .cloned();
        match login {
            Some((password, token)) if password == credentials.password => self.auth_response(&token),
            _ => Err(ApiError::Status {
                status: 400,
                message: "Geçersiz e-posta veya şifre".to_string(),
            }),
        }
    }

    async fn google_login(&self, credentials: &GoogleLoginRequest) -> Result<AuthResponse, ApiError> {
        self.auth_response(&credentials.id_token)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        let token = format!("token-{}", request.username);
        let mut data = self.data.lock().unwrap();
        let id = data.users.len() as u64 + 100;
        let mut created = user(id, &request.username);
        created.email = request.email.clone();
        created.full_name = request.full_name.clone();
        data.users.insert(token.clone(), created.clone());
        Ok(AuthResponse {
            token,
            user: created,
        })
    }

    async fn profile(&self, token: &str) -> Result<User, ApiError> {
        self.authorize(token)
    }

    async fn user_balance(&self, token: &str) -> Result<Balance, ApiError> {
        self.authorize(token)?;
        Ok(self.data.lock().unwrap().balance.clone().unwrap_or(Balance {
            total_balance: 0.0,
            balance_details: vec![],
        }))
    }

    async fn groups(&self, token: &str) -> Result<Vec<Group>, ApiError> {
        self.authorize(token)?;
        Ok(self.data.lock().unwrap().groups.clone())
    }

    async fn group(&self, token: &str, id: GroupId) -> Result<Group, ApiError> {
        self.authorize(token)?;
        self.data
            .lock()
            .unwrap()
            .groups
            .iter()
            .find(|group| group.id == id)
            .cloned()
            .ok_or_else(|| not_found("group"))
    }

    async fn create_group(&self, token: &str, request: &CreateGroupRequest) -> Result<Group, ApiError> {
        let creator = self.authorize(token)?;
        let mut data = self.data.lock().unwrap();
        let mut group = group_with_members(data.groups.len() as u64 + 1, &request.name, &[creator.id]);
        group.description = request.description.clone();
        group.is_user_admin = Some(true);
        data.groups.push(group.clone());
        Ok(group)
    }

    async fn update_group(
        &self,
        token: &str,
        id: GroupId,
        request: &UpdateGroupRequest,
    ) -> Result<Group, ApiError> {
        self.authorize(token)?;
        let mut data = self.data.lock().unwrap();
        let group = data
            .groups
            .iter_mut()
            .find(|group| group.id == id)
            .ok_or_else(|| not_found("group"))?;
        if let Some(name) = &request.name {
            group.name = name.clone();
        }
        if let Some(description) = &request.description {
            group.description = Some(description.clone());
        }
        Ok(group.clone())
    }

    async fn delete_group(&self, token: &str, id: GroupId) -> Result<(), ApiError> {
        self.authorize(token)?;
        self.data.lock().unwrap().groups.retain(|group| group.id != id);
        Ok(())
    }

    async fn add_member(&self, token: &str, id: GroupId, username: &str) -> Result<(), ApiError> {
        self.authorize(token)?;
        self.data
            .lock()
            .unwrap()
            .added_members
            .push((id, username.to_string()));
        Ok(())
    }

    async fn group_balance(&self, token: &str, id: GroupId) -> Result<GroupBalance, ApiError> {
        let group = self.group(token, id).await?;
        Ok(GroupBalance {
            group_id: group.id,
            group_name: group.name,
            balances: group
                .members
                .into_iter()
                .map(|member| BalanceDetail {
                    user: member.user,
                    amount: 0.0,
                })
                .collect(),
        })
    }

    async fn expenses(&self, token: &str) -> Result<Vec<Expense>, ApiError> {
        self.authorize(token)?;
        Ok(self.data.lock().unwrap().expenses.clone())
    }

    async fn expense(&self, token: &str, id: ExpenseId) -> Result<Expense, ApiError> {
        self.authorize(token)?;
        self.data
            .lock()
            .unwrap()
            .expenses
            .iter()
            .find(|expense| expense.id == id)
            .cloned()
            .ok_or_else(|| not_found("expense"))
    }

    async fn create_expense(
        &self,
        token: &str,
        request: &CreateExpenseRequest,
    ) -> Result<Expense, ApiError> {
        let payer = self.authorize(token)?;
        let group = self.group(token, request.group_id).await?;
        let mut data = self.data.lock().unwrap();
        data.created.push(request.clone());

        let mut created = expense(
            data.expenses.len() as u64 + 1,
            &request.title,
            request.amount,
            &group,
            1,
        );
        created.description = request.description.clone();
        created.currency = request.currency.clone();
        created.paid_by = payer;
        created.expense_shares = request
            .member_amounts
            .iter()
            .enumerate()
            .map(|(idx, (member, amount))| ExpenseShare {
                id: idx as u64 + 1,
                user: user(member.0, &format!("user{member}")),
                amount: *amount,
                settled: false,
            })
            .collect();
        data.expenses.push(created.clone());
        Ok(created)
    }

    async fn update_expense(
        &self,
        token: &str,
        id: ExpenseId,
        request: &UpdateExpenseRequest,
    ) -> Result<Expense, ApiError> {
        self.authorize(token)?;
        let mut data = self.data.lock().unwrap();
        let expense = data
            .expenses
            .iter_mut()
            .find(|expense| expense.id == id)
            .ok_or_else(|| not_found("expense"))?;
        if let Some(title) = &request.title {
            expense.title = title.clone();
        }
        if let Some(amount) = request.amount {
            expense.amount = amount;
        }
        Ok(expense.clone())
    }

    async fn delete_expense(&self, token: &str, id: ExpenseId) -> Result<(), ApiError> {
        self.authorize(token)?;
        self.data.lock().unwrap().expenses.retain(|expense| expense.id != id);
        Ok(())
    }

    async fn settle_expense(&self, token: &str, id: ExpenseId) -> Result<(), ApiError> {
        self.authorize(token)?;
        let mut data = self.data.lock().unwrap();
        let expense = data
            .expenses
            .iter_mut()
            .find(|expense| expense.id == id)
            .ok_or_else(|| not_found("expense"))?;
        for share in &mut expense.expense_shares {
            share.settled = true;
        }
        Ok(())
    }
}
