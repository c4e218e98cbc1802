//! Expense-creation sessions.
//!
//! An [`ExpenseDraft`] is the transient form state behind "new expense": the
//! selected group, the typed amount, the split mode and the current shares.
//! Every edit recomputes what it affects and settles the draft's state, and
//! only a draft that passes [`ExpenseDraft::validate`] yields a request for
//! the backend.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::auth::SESSION_TTL;
use crate::schemas::{CreateExpenseRequest, Group, GroupId, UserId};
use crate::split::{
    assigned_total, compute_equal_split, parse_share, parse_total, set_custom_share,
    validate_split, MemberId, Shares, SplitError, SplitMode,
};

pub type DraftId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DraftState {
    Empty,
    GroupSelected,
    AmountEntered,
    EqualComputed,
    CustomEditing,
    Validated,
    Submitted,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum DraftError {
    #[error("expense title is required")]
    MissingTitle,

    #[error("shares can only be edited in custom mode")]
    NotCustom,

    #[error("draft has not been validated")]
    NotValidated,

    #[error("draft was already submitted")]
    Closed,

    #[error("draft is being submitted")]
    Submitting,

    #[error(transparent)]
    Split(#[from] SplitError),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMember {
    pub id: MemberId,
    pub full_name: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftGroup {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<DraftMember>,
}

impl DraftGroup {
    pub fn member_ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|member| member.id).collect()
    }
}

impl From<&Group> for DraftGroup {
    /// Keeps the backend's member order and drops repeated users.
    fn from(group: &Group) -> Self {
        let mut seen = HashSet::new();
        let members = group
            .members
            .iter()
            .filter(|member| seen.insert(member.user.id))
            .map(|member| DraftMember {
                id: member.user.member_id(),
                full_name: member.user.full_name.clone(),
                email: member.user.email.clone(),
            })
            .collect();
        Self {
            id: group.id,
            name: group.name.clone(),
            members,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExpenseDraft {
    title: String,
    description: String,
    currency: String,
    amount_input: String,
    group: Option<DraftGroup>,
    mode: Option<SplitMode>,
    shares: Shares,
    state: DraftState,
}

impl ExpenseDraft {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            currency: currency.into(),
            amount_input: String::new(),
            group: None,
            mode: None,
            shares: Shares::new(),
            state: DraftState::Empty,
        }
    }

    pub fn total(&self) -> Option<f64> {
        parse_total(&self.amount_input).ok()
    }

    pub fn set_details(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        currency: impl Into<String>,
    ) -> Result<DraftState, DraftError> {
        self.ensure_open()?;
        self.title = title.into();
        self.description = description.into();
        self.currency = currency.into();
        Ok(self.settle())
    }

    pub fn select_group(&mut self, group: DraftGroup) -> Result<DraftState, DraftError> {
        self.ensure_open()?;
        let members = group.member_ids();
        self.group = Some(group);
        self.shares = match (self.mode, self.total()) {
            (Some(_), Some(total)) => compute_equal_split(total, &members),
            _ => zeroed(&members),
        };
        Ok(self.settle())
    }

    pub fn set_amount(&mut self, input: impl Into<String>) -> Result<DraftState, DraftError> {
        self.ensure_open()?;
        self.amount_input = input.into();
        if self.mode == Some(SplitMode::Equal) {
            self.recompute_equal();
        }
        Ok(self.settle())
    }

    pub fn set_mode(&mut self, mode: SplitMode) -> Result<DraftState, DraftError> {
        self.ensure_open()?;
        match mode {
            SplitMode::Equal => self.recompute_equal(),
            SplitMode::Custom if self.mode.is_none() => self.recompute_equal(),
            // Seeded from the equal shares already in place, or already custom.
            SplitMode::Custom => {}
        }
        self.mode = Some(mode);
        Ok(self.settle())
    }

    pub fn set_share(&mut self, member: MemberId, input: &str) -> Result<DraftState, DraftError> {
        self.ensure_open()?;
        if self.mode != Some(SplitMode::Custom) {
            return Err(DraftError::NotCustom);
        }
        self.shares = set_custom_share(&self.shares, member, parse_share(input))?;
        Ok(self.settle())
    }

    /// Runs every submit-time check. On failure the state is left as is.
    ///
    /// Success leaves the draft `Validated`, which refuses further edits and
    /// a second validation until [`ExpenseDraft::reopen`] or
    /// [`ExpenseDraft::mark_submitted`].
    pub fn validate(&mut self) -> Result<CreateExpenseRequest, DraftError> {
        self.ensure_open()?;
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DraftError::MissingTitle);
        }
        let total = parse_total(&self.amount_input)?;
        let group = self.group.as_ref().ok_or(SplitError::MissingGroup)?;
        validate_split(total, Some(&self.shares))?;

        let description = self.description.trim();
        let request = CreateExpenseRequest {
            title: title.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            amount: total,
            currency: self.currency.clone(),
            group_id: group.id,
            member_amounts: self.shares.clone(),
        };
        self.state = DraftState::Validated;
        Ok(request)
    }

    pub fn mark_submitted(&mut self) -> Result<(), DraftError> {
        match self.state {
            DraftState::Validated => {
                self.state = DraftState::Submitted;
                Ok(())
            }
            DraftState::Submitted => Err(DraftError::Closed),
            _ => Err(DraftError::NotValidated),
        }
    }

    /// Back to editing after the backend refused a validated draft.
    pub fn reopen(&mut self) -> DraftState {
        if self.state == DraftState::Validated {
            self.settle();
        }
        self.state
    }

    pub fn view(&self, id: DraftId) -> DraftView {
        let total = self.total();
        let assigned = assigned_total(&self.shares);
        let mismatch = match (total, &self.group) {
            (Some(total), Some(_)) => validate_split(total, Some(&self.shares))
                .err()
                .and_then(|err| err.difference()),
            _ => None,
        };
        DraftView {
            id,
            state: self.state,
            title: self.title.clone(),
            description: self.description.clone(),
            currency: self.currency.clone(),
            amount: self.amount_input.clone(),
            total,
            group: self.group.clone(),
            mode: self.mode,
            shares: self.shares.clone(),
            assigned,
            mismatch,
        }
    }

    fn ensure_open(&self) -> Result<(), DraftError> {
        match self.state {
            DraftState::Submitted => Err(DraftError::Closed),
            DraftState::Validated => Err(DraftError::Submitting),
            _ => Ok(()),
        }
    }

    // An unusable amount leaves the previous shares in place.
    fn recompute_equal(&mut self) {
        if let (Some(group), Some(total)) = (&self.group, self.total()) {
            self.shares = compute_equal_split(total, &group.member_ids());
        }
    }

    fn settle(&mut self) -> DraftState {
        self.state = match (&self.group, self.total(), self.mode) {
            (None, _, _) => DraftState::Empty,
            (Some(_), None, _) => DraftState::GroupSelected,
            (Some(_), Some(_), None) => DraftState::AmountEntered,
            (Some(_), Some(_), Some(SplitMode::Equal)) => DraftState::EqualComputed,
            (Some(_), Some(_), Some(SplitMode::Custom)) => DraftState::CustomEditing,
        };
        self.state
    }
}

#[cfg(test)]
impl ExpenseDraft {
    pub fn state(&self) -> DraftState {
        self.state
    }

    pub fn shares(&self) -> &Shares {
        &self.shares
    }
}

fn zeroed(members: &[MemberId]) -> Shares {
    members.iter().map(|member| (*member, 0.0)).collect()
}

/// What the form renders for one draft.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    pub id: DraftId,
    pub state: DraftState,
    pub title: String,
    pub description: String,
    pub currency: String,
    pub amount: String,
    pub total: Option<f64>,
    pub group: Option<DraftGroup>,
    pub mode: Option<SplitMode>,
    pub shares: Shares,
    pub assigned: f64,
    /// Excess (positive) or shortfall (negative) while shares and total disagree.
    pub mismatch: Option<f64>,
}

struct OwnedDraft {
    owner: UserId,
    touched: Instant,
    draft: ExpenseDraft,
}

/// In-progress drafts, each visible only to the user who opened it.
///
/// Drafts left untouched for longer than `max_idle` are dropped the next
/// time any draft is opened.
pub struct DraftStore {
    drafts: RwLock<HashMap<DraftId, OwnedDraft>>,
    max_idle: Duration,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::with_max_idle(SESSION_TTL)
    }
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_idle(max_idle: Duration) -> Self {
        Self {
            drafts: RwLock::default(),
            max_idle,
        }
    }

    pub async fn open(&self, owner: UserId, draft: ExpenseDraft) -> DraftId {
        let id = Uuid::new_v4();
        let mut drafts = self.drafts.write().await;
        let before = drafts.len();
        drafts.retain(|_, entry| entry.touched.elapsed() < self.max_idle);
        if drafts.len() < before {
            debug!(evicted = before - drafts.len(), "dropped idle drafts");
        }
        drafts.insert(
            id,
            OwnedDraft {
                owner,
                touched: Instant::now(),
                draft,
            },
        );
        id
    }

    /// Runs `f` against the draft if `owner` opened it.
    pub async fn with_draft<T>(
        &self,
        owner: UserId,
        id: DraftId,
        f: impl FnOnce(&mut ExpenseDraft) -> T,
    ) -> Option<T> {
        let mut drafts = self.drafts.write().await;
        drafts
            .get_mut(&id)
            .filter(|entry| entry.owner == owner)
            .map(|entry| {
                entry.touched = Instant::now();
                f(&mut entry.draft)
            })
    }

    pub async fn discard(&self, owner: UserId, id: DraftId) -> Option<ExpenseDraft> {
        let mut drafts = self.drafts.write().await;
        match drafts.get(&id) {
            Some(entry) if entry.owner == owner => drafts.remove(&id).map(|entry| entry.draft),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{group_with_members, user};

    const A: MemberId = MemberId(1);
    const B: MemberId = MemberId(2);
    const C: MemberId = MemberId(3);

    fn three_member_group() -> DraftGroup {
        DraftGroup::from(&group_with_members(10, "Trip", &[1, 2, 3]))
    }

    fn ready_draft() -> ExpenseDraft {
        let mut draft = ExpenseDraft::new("TRY");
        draft.set_details("Dinner", "", "TRY").unwrap();
        draft.select_group(three_member_group()).unwrap();
        draft.set_mode(SplitMode::Equal).unwrap();
        draft.set_amount("100").unwrap();
        draft
    }

    #[test]
    fn starts_empty() {
        let draft = ExpenseDraft::new("TRY");
        assert_eq!(draft.state(), DraftState::Empty);
        assert!(draft.shares().is_empty());
    }

    #[test]
    fn group_members_are_deduplicated_in_order() {
        let group = group_with_members(1, "Ev", &[5, 2, 5, 9]);
        let draft_group = DraftGroup::from(&group);
        assert_eq!(
            draft_group.member_ids(),
            vec![MemberId(5), MemberId(2), MemberId(9)]
        );
    }

    #[test]
    fn walks_through_states() {
        let mut draft = ExpenseDraft::new("TRY");
        assert_eq!(
            draft.select_group(three_member_group()),
            Ok(DraftState::GroupSelected)
        );
        assert_eq!(draft.shares(), &Shares::from([(A, 0.0), (B, 0.0), (C, 0.0)]));
        assert_eq!(draft.set_amount("90"), Ok(DraftState::AmountEntered));
        assert_eq!(draft.set_mode(SplitMode::Equal), Ok(DraftState::EqualComputed));
        assert_eq!(draft.shares()[&B], 30.0);
        assert_eq!(draft.set_amount("120"), Ok(DraftState::EqualComputed));
        assert_eq!(draft.shares()[&B], 40.0);
        assert_eq!(draft.set_amount("oops"), Ok(DraftState::GroupSelected));
        assert_eq!(draft.shares()[&B], 40.0);
    }

    #[test]
    fn mode_switch_seeds_custom_and_edits_stay_independent() {
        let mut draft = ready_draft();
        let third = 100.0 / 3.0;
        assert_eq!(draft.shares(), &Shares::from([(A, third), (B, third), (C, third)]));

        assert_eq!(draft.set_mode(SplitMode::Custom), Ok(DraftState::CustomEditing));
        assert_eq!(draft.shares(), &Shares::from([(A, third), (B, third), (C, third)]));

        draft.set_share(A, "40").unwrap();
        draft.set_share(B, "40").unwrap();
        assert_eq!(draft.shares()[&C], third);

        let err = draft.validate().unwrap_err();
        match err {
            DraftError::Split(SplitError::SplitMismatch { total, assigned }) => {
                assert_eq!(total, 100.0);
                assert!((assigned - (80.0 + third)).abs() < 1e-9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(draft.state(), DraftState::CustomEditing);
    }

    #[test]
    fn custom_edits_survive_amount_changes() {
        let mut draft = ready_draft();
        draft.set_mode(SplitMode::Custom).unwrap();
        draft.set_share(A, "70").unwrap();
        draft.set_amount("150").unwrap();
        assert_eq!(draft.shares()[&A], 70.0);
        assert_eq!(draft.state(), DraftState::CustomEditing);
    }

    #[test]
    fn switching_back_to_equal_recomputes_everything() {
        let mut draft = ready_draft();
        draft.set_mode(SplitMode::Custom).unwrap();
        draft.set_share(A, "70").unwrap();
        draft.set_mode(SplitMode::Equal).unwrap();
        assert!(draft.shares().values().all(|share| *share == 100.0 / 3.0));
    }

    #[test]
    fn custom_mode_straight_from_amount_entered_seeds_equal_shares() {
        let mut draft = ExpenseDraft::new("TRY");
        draft.select_group(three_member_group()).unwrap();
        draft.set_amount("30").unwrap();
        draft.set_mode(SplitMode::Custom).unwrap();
        assert_eq!(draft.shares(), &Shares::from([(A, 10.0), (B, 10.0), (C, 10.0)]));
    }

    #[test]
    fn changing_group_replaces_the_key_set() {
        let mut draft = ready_draft();
        draft.set_mode(SplitMode::Custom).unwrap();
        draft.set_share(A, "90").unwrap();

        let other = DraftGroup::from(&group_with_members(11, "Office", &[4, 5]));
        draft.select_group(other).unwrap();
        assert_eq!(
            draft.shares(),
            &Shares::from([(MemberId(4), 50.0), (MemberId(5), 50.0)])
        );
    }

    #[test]
    fn share_edits_require_custom_mode() {
        let mut draft = ready_draft();
        assert_eq!(draft.set_share(A, "5"), Err(DraftError::NotCustom));
    }

    #[test]
    fn share_edits_reject_outsiders() {
        let mut draft = ready_draft();
        draft.set_mode(SplitMode::Custom).unwrap();
        assert_eq!(
            draft.set_share(MemberId(99), "5"),
            Err(DraftError::Split(SplitError::UnknownMember(MemberId(99))))
        );
    }

    #[test]
    fn validation_checks_in_order() {
        let mut draft = ExpenseDraft::new("TRY");
        assert_eq!(draft.validate(), Err(DraftError::MissingTitle));
        draft.set_details("Taxi", "", "TRY").unwrap();
        assert_eq!(draft.validate(), Err(DraftError::Split(SplitError::InvalidAmount)));
        draft.set_amount("12").unwrap();
        assert_eq!(draft.validate(), Err(DraftError::Split(SplitError::MissingGroup)));
        assert_eq!(draft.state(), DraftState::Empty);
    }

    #[test]
    fn validated_draft_produces_request_and_closes_on_submit() {
        let mut draft = ready_draft();
        draft.set_details("  Dinner ", " ", "EUR").unwrap();
        let request = draft.validate().unwrap();
        assert_eq!(draft.state(), DraftState::Validated);
        assert_eq!(request.title, "Dinner");
        assert_eq!(request.description, None);
        assert_eq!(request.currency, "EUR");
        assert_eq!(request.group_id, 10);
        assert_eq!(&request.member_amounts, draft.shares());

        draft.mark_submitted().unwrap();
        assert_eq!(draft.state(), DraftState::Submitted);
        assert_eq!(draft.set_amount("5"), Err(DraftError::Closed));
        assert_eq!(draft.mark_submitted(), Err(DraftError::Closed));
    }

    #[test]
    fn submit_requires_validation() {
        let mut draft = ready_draft();
        assert_eq!(draft.mark_submitted(), Err(DraftError::NotValidated));
    }

    #[test]
    fn validated_draft_refuses_edits_until_reopened() {
        let mut draft = ready_draft();
        draft.validate().unwrap();
        assert_eq!(draft.set_amount("200"), Err(DraftError::Submitting));
        assert_eq!(draft.validate(), Err(DraftError::Submitting));

        assert_eq!(draft.reopen(), DraftState::EqualComputed);
        assert_eq!(draft.set_amount("200"), Ok(DraftState::EqualComputed));
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn reselecting_custom_keeps_edits() {
        let mut draft = ready_draft();
        draft.set_mode(SplitMode::Custom).unwrap();
        draft.set_share(A, "50").unwrap();
        assert_eq!(draft.set_mode(SplitMode::Custom), Ok(DraftState::CustomEditing));
        assert_eq!(draft.shares()[&A], 50.0);
        assert_eq!(draft.shares()[&B], 100.0 / 3.0);
    }

    #[test]
    fn view_reports_mismatch() {
        let mut draft = ready_draft();
        draft.set_mode(SplitMode::Custom).unwrap();
        draft.set_share(A, "0").unwrap();
        let view = draft.view(Uuid::nil());
        let mismatch = view.mismatch.unwrap();
        assert!((mismatch + 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(view.total, Some(100.0));
    }

    #[actix_web::test]
    async fn store_hides_drafts_from_other_users() {
        let store = DraftStore::new();
        let owner = user(1, "ayse").id;
        let id = store.open(owner, ExpenseDraft::new("TRY")).await;

        assert_eq!(store.with_draft(owner, id, |draft| draft.state()).await, Some(DraftState::Empty));
        assert_eq!(store.with_draft(2, id, |draft| draft.state()).await, None);
        assert!(store.discard(2, id).await.is_none());
        assert!(store.discard(owner, id).await.is_some());
        assert!(store.with_draft(owner, id, |_| ()).await.is_none());
    }

    #[actix_web::test]
    async fn only_one_of_two_racing_submits_validates() {
        let store = DraftStore::new();
        let id = store.open(1, ready_draft()).await;
        let first = store.with_draft(1, id, ExpenseDraft::validate).await.unwrap();
        let second = store.with_draft(1, id, ExpenseDraft::validate).await.unwrap();
        assert!(first.is_ok());
        assert_eq!(second, Err(DraftError::Submitting));
    }

    #[actix_web::test]
    async fn idle_drafts_are_evicted_on_open() {
        let store = DraftStore::with_max_idle(Duration::ZERO);
        let stale = store.open(1, ExpenseDraft::new("TRY")).await;
        let fresh = store.open(1, ExpenseDraft::new("TRY")).await;
        assert!(store.with_draft(1, stale, |_| ()).await.is_none());
        assert!(store.with_draft(1, fresh, |_| ()).await.is_some());

        let store = DraftStore::new();
        let kept = store.open(1, ExpenseDraft::new("TRY")).await;
        store.open(2, ExpenseDraft::new("TRY")).await;
        assert!(store.with_draft(1, kept, |_| ()).await.is_some());
    }
}
