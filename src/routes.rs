use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{removal_cookie, Authenticated, RegisterForm, SessionContext, SESSION_COOKIE};
use crate::balance::{load_dashboard, load_group_overview};
use crate::draft::{DraftError, DraftGroup, DraftId, DraftState, ExpenseDraft};
use crate::error::AppError;
use crate::listing::{
    expenses_by_group, expenses_total, filter_and_sort_expenses, filter_groups, ExpenseQuery,
    GroupExpenseSummary, GroupQuery,
};
use crate::schemas::{
    AddMemberRequest, AuthResponse, CreateGroupRequest, Expense, ExpenseId, GoogleLoginRequest,
    GroupId, LoginRequest, UpdateExpenseRequest, UpdateGroupRequest,
};
use crate::split::{MemberId, SplitMode};
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(login)
        .service(google_login)
        .service(register)
        .service(restore)
        .service(logout)
        .service(me)
        .service(dashboard)
        .service(list_groups)
        .service(create_group)
        .service(get_group)
        .service(update_group)
        .service(delete_group)
        .service(add_member)
        .service(list_expenses)
        .service(get_expense)
        .service(update_expense)
        .service(delete_expense)
        .service(settle_expense)
        .service(open_draft)
        .service(get_draft)
        .service(draft_details)
        .service(draft_group)
        .service(draft_amount)
        .service(draft_mode)
        .service(draft_share)
        .service(discard_draft)
        .service(submit_draft);
}

async fn open_session(state: &AppState, response: AuthResponse) -> HttpResponse {
    let context = SessionContext::from(response);
    let user = context.user.clone();
    let id = state.sessions.open(context).await;
    HttpResponse::Ok().cookie(state.signer.cookie(id)).json(user)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[post("/auth/login")]
async fn login(
    state: web::Data<AppState>,
    json: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let response = state.api.login(&json).await?;
    Ok(open_session(&state, response).await)
}

#[post("/auth/google")]
async fn google_login(
    state: web::Data<AppState>,
    json: web::Json<GoogleLoginRequest>,
) -> Result<HttpResponse, AppError> {
    let response = state.api.google_login(&json).await?;
    Ok(open_session(&state, response).await)
}

#[post("/auth/register")]
async fn register(
    state: web::Data<AppState>,
    json: web::Json<RegisterForm>,
) -> Result<HttpResponse, AppError> {
    let request = json.into_inner().validate()?;
    let response = state.api.register(&request).await?;
    Ok(open_session(&state, response).await)
}

#[derive(Deserialize)]
struct RestoreJson {
    token: String,
}

#[post("/auth/restore")]
async fn restore(
    state: web::Data<AppState>,
    json: web::Json<RestoreJson>,
) -> Result<HttpResponse, AppError> {
    let context = SessionContext::restore(state.api.as_ref(), json.into_inner().token).await?;
    let id = state.sessions.open(context.clone()).await;
    Ok(HttpResponse::Ok()
        .cookie(state.signer.cookie(id))
        .json(context.user))
}

#[post("/auth/logout")]
async fn logout(request: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let session = request
        .cookie(SESSION_COOKIE)
        .and_then(|cookie| state.signer.verify(cookie.value()));
    if let Some(id) = session {
        state.sessions.close(id).await;
    }
    HttpResponse::NoContent().cookie(removal_cookie()).finish()
}

#[get("/auth/me")]
async fn me(auth: Authenticated) -> HttpResponse {
    HttpResponse::Ok().json(auth.user())
}

#[get("/dashboard")]
async fn dashboard(
    state: web::Data<AppState>,
    auth: Authenticated,
) -> Result<HttpResponse, AppError> {
    let loaded = load_dashboard(state.api.as_ref(), auth.token(), auth.user().clone()).await;
    let dashboard = auth.guard(&state, loaded).await?;
    Ok(HttpResponse::Ok().json(dashboard))
}

#[get("/groups")]
async fn list_groups(
    state: web::Data<AppState>,
    auth: Authenticated,
    query: web::Query<GroupQuery>,
) -> Result<HttpResponse, AppError> {
    let groups = auth.guard(&state, state.api.groups(auth.token()).await).await?;
    Ok(HttpResponse::Ok().json(filter_groups(groups, &query)))
}

#[post("/groups")]
async fn create_group(
    state: web::Data<AppState>,
    auth: Authenticated,
    json: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let json = json.into_inner();
    let request = CreateGroupRequest {
        name: non_blank(Some(json.name)).ok_or(AppError::Invalid("group name is required"))?,
        description: non_blank(json.description),
    };
    let group = auth
        .guard(&state, state.api.create_group(auth.token(), &request).await)
        .await?;
    info!(group = group.id, user = %auth.user().username, "group created");
    Ok(HttpResponse::Created().json(group))
}

#[get("/groups/{id}")]
async fn get_group(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<GroupId>,
) -> Result<HttpResponse, AppError> {
    let loaded = load_group_overview(state.api.as_ref(), auth.token(), id.into_inner()).await;
    let overview = auth.guard(&state, loaded).await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[put("/groups/{id}")]
async fn update_group(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<GroupId>,
    json: web::Json<UpdateGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let json = json.into_inner();
    if json.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::Invalid("group name is required"));
    }
    let request = UpdateGroupRequest {
        name: non_blank(json.name),
        description: json.description.map(|description| description.trim().to_string()),
    };
    let updated = state
        .api
        .update_group(auth.token(), id.into_inner(), &request)
        .await;
    let group = auth.guard(&state, updated).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[delete("/groups/{id}")]
async fn delete_group(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<GroupId>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    auth.guard(&state, state.api.delete_group(auth.token(), id).await)
        .await?;
    info!(group = id, user = %auth.user().username, "group deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[post("/groups/{id}/members")]
async fn add_member(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<GroupId>,
    json: web::Json<AddMemberRequest>,
) -> Result<HttpResponse, AppError> {
    let username = non_blank(Some(json.into_inner().username))
        .ok_or(AppError::Invalid("username is required"))?;
    let added = state
        .api
        .add_member(auth.token(), id.into_inner(), &username)
        .await;
    auth.guard(&state, added).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseList {
    count: usize,
    total: f64,
    expenses: Vec<Expense>,
    by_group: Vec<GroupExpenseSummary>,
}

#[get("/expenses")]
async fn list_expenses(
    state: web::Data<AppState>,
    auth: Authenticated,
    query: web::Query<ExpenseQuery>,
) -> Result<HttpResponse, AppError> {
    let expenses = auth
        .guard(&state, state.api.expenses(auth.token()).await)
        .await?;
    let expenses = filter_and_sort_expenses(expenses, &query);
    Ok(HttpResponse::Ok().json(ExpenseList {
        count: expenses.len(),
        total: expenses_total(&expenses),
        by_group: expenses_by_group(&expenses),
        expenses,
    }))
}

#[get("/expenses/{id}")]
async fn get_expense(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<ExpenseId>,
) -> Result<HttpResponse, AppError> {
    let fetched = state.api.expense(auth.token(), id.into_inner()).await;
    let expense = auth.guard(&state, fetched).await?;
    Ok(HttpResponse::Ok().json(expense))
}

#[put("/expenses/{id}")]
async fn update_expense(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<ExpenseId>,
    json: web::Json<UpdateExpenseRequest>,
) -> Result<HttpResponse, AppError> {
    let updated = state
        .api
        .update_expense(auth.token(), id.into_inner(), &json)
        .await;
    let expense = auth.guard(&state, updated).await?;
    Ok(HttpResponse::Ok().json(expense))
}

#[delete("/expenses/{id}")]
async fn delete_expense(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<ExpenseId>,
) -> Result<HttpResponse, AppError> {
    let deleted = state.api.delete_expense(auth.token(), id.into_inner()).await;
    auth.guard(&state, deleted).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/expenses/{id}/settle")]
async fn settle_expense(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<ExpenseId>,
) -> Result<HttpResponse, AppError> {
    let settled = state.api.settle_expense(auth.token(), id.into_inner()).await;
    auth.guard(&state, settled).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn fetch_draft_group(
    state: &AppState,
    auth: &Authenticated,
    id: GroupId,
) -> Result<DraftGroup, AppError> {
    let group = auth.guard(state, state.api.group(auth.token(), id).await).await?;
    Ok(DraftGroup::from(&group))
}

/// Applies `edit` to the caller's draft and renders the result.
async fn edit_draft(
    state: &AppState,
    auth: &Authenticated,
    id: DraftId,
    edit: impl FnOnce(&mut ExpenseDraft) -> Result<DraftState, DraftError>,
) -> Result<HttpResponse, AppError> {
    let view = state
        .drafts
        .with_draft(auth.user().id, id, |draft| {
            edit(draft)?;
            Ok::<_, DraftError>(draft.view(id))
        })
        .await
        .ok_or(AppError::DraftNotFound)??;
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct NewDraftJson {
    #[serde(default)]
    group_id: Option<GroupId>,
    #[serde(default)]
    mode: Option<SplitMode>,
}

#[post("/drafts")]
async fn open_draft(
    state: web::Data<AppState>,
    auth: Authenticated,
    json: Option<web::Json<NewDraftJson>>,
) -> Result<HttpResponse, AppError> {
    let json = json.map(web::Json::into_inner).unwrap_or_default();
    let mut draft = ExpenseDraft::new(state.config.default_currency.clone());
    if let Some(group_id) = json.group_id {
        draft.select_group(fetch_draft_group(&state, &auth, group_id).await?)?;
    }
    if let Some(mode) = json.mode {
        draft.set_mode(mode)?;
    }
    let id = state.drafts.open(auth.user().id, draft.clone()).await;
    Ok(HttpResponse::Created().json(draft.view(id)))
}

#[get("/drafts/{id}")]
async fn get_draft(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<DraftId>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    let view = state
        .drafts
        .with_draft(auth.user().id, id, |draft| draft.view(id))
        .await
        .ok_or(AppError::DraftNotFound)?;
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Deserialize)]
struct DetailsJson {
    title: String,
    #[serde(default)]
    description: String,
    currency: String,
}

#[put("/drafts/{id}/details")]
async fn draft_details(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<DraftId>,
    json: web::Json<DetailsJson>,
) -> Result<HttpResponse, AppError> {
    let DetailsJson {
        title,
        description,
        currency,
    } = json.into_inner();
    edit_draft(&state, &auth, id.into_inner(), |draft| {
        draft.set_details(title, description, currency)
    })
    .await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupJson {
    group_id: GroupId,
}

#[put("/drafts/{id}/group")]
async fn draft_group(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<DraftId>,
    json: web::Json<GroupJson>,
) -> Result<HttpResponse, AppError> {
    let group = fetch_draft_group(&state, &auth, json.group_id).await?;
    edit_draft(&state, &auth, id.into_inner(), |draft| draft.select_group(group)).await
}

/// Form input as typed, whether the client sends it as text or as a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawInput {
    Text(String),
    Number(f64),
}

impl RawInput {
    fn into_text(self) -> String {
        match self {
            RawInput::Text(text) => text,
            RawInput::Number(number) => number.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct AmountJson {
    amount: RawInput,
}

#[put("/drafts/{id}/amount")]
async fn draft_amount(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<DraftId>,
    json: web::Json<AmountJson>,
) -> Result<HttpResponse, AppError> {
    let input = json.into_inner().amount.into_text();
    edit_draft(&state, &auth, id.into_inner(), |draft| draft.set_amount(input)).await
}

#[derive(Deserialize)]
struct ModeJson {
    mode: SplitMode,
}

#[put("/drafts/{id}/mode")]
async fn draft_mode(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<DraftId>,
    json: web::Json<ModeJson>,
) -> Result<HttpResponse, AppError> {
    let mode = json.mode;
    edit_draft(&state, &auth, id.into_inner(), |draft| draft.set_mode(mode)).await
}

#[put("/drafts/{id}/shares/{member}")]
async fn draft_share(
    state: web::Data<AppState>,
    auth: Authenticated,
    path: web::Path<(DraftId, MemberId)>,
    json: web::Json<AmountJson>,
) -> Result<HttpResponse, AppError> {
    let (id, member) = path.into_inner();
    let input = json.into_inner().amount.into_text();
    edit_draft(&state, &auth, id, |draft| draft.set_share(member, &input)).await
}

#[delete("/drafts/{id}")]
async fn discard_draft(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<DraftId>,
) -> Result<HttpResponse, AppError> {
    state
        .drafts
        .discard(auth.user().id, id.into_inner())
        .await
        .ok_or(AppError::DraftNotFound)?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/drafts/{id}/submit")]
async fn submit_draft(
    state: web::Data<AppState>,
    auth: Authenticated,
    id: web::Path<DraftId>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    let owner = auth.user().id;
    let request = state
        .drafts
        .with_draft(owner, id, ExpenseDraft::validate)
        .await
        .ok_or(AppError::DraftNotFound)??;

    let created = state.api.create_expense(auth.token(), &request).await;
    let expense = match auth.guard(&state, created).await {
        Ok(expense) => expense,
        Err(err) => {
            state.drafts.with_draft(owner, id, ExpenseDraft::reopen).await;
            warn!(draft = %id, "expense not created: {err}");
            return Err(err);
        }
    };

    state
        .drafts
        .with_draft(owner, id, ExpenseDraft::mark_submitted)
        .await;
    state.drafts.discard(owner, id).await;
    info!(expense = expense.id, group = request.group_id, "expense created");
    Ok(HttpResponse::Created().json(expense))
}
