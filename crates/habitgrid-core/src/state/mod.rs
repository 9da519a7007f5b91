//! The single-writer application state.
//!
//! One owned aggregate holds every mutable structure (maps, board,
//! history, blocklist, rewards); all mutation goes through one serialized
//! entry point. Pipeline runs for different goals may execute
//! concurrently, but each commits only its own map slot, and a commit is
//! discarded when the goal's generation token moved on in the meantime.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::board::evaluator::{evaluate_toggle, CompletionOutcome};
use crate::board::scheduler::{self, RefreshContext};
use crate::board::support::{is_support_goal, support_map};
use crate::board::{Board, ShuffleHistory, DEFAULT_BOARD_SIZE};
use crate::events::{AppEvent, EventBus};
use crate::map::progress::{record_step_completion, StepProgress};
use crate::map::HabitMap;
use crate::oracle::Oracle;
use crate::pipeline;

/// Coins granted per newly completed line.
pub const LINE_COIN_BONUS: u64 = 10;

/// Coins granted for finishing a whole board.
pub const FULL_BOARD_COIN_BONUS: u64 = 50;

/// Reward bookkeeping. Redemption arithmetic lives elsewhere; this only
/// accumulates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardLedger {
    pub coins: u64,
    /// Set once, on the very first full-board completion app-wide.
    pub bonus_ticket_granted: bool,
}

/// What one completion earned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedReward {
    pub coins_awarded: u64,
    /// True only on the first full-board completion ever.
    pub bonus_ticket: bool,
}

impl RewardLedger {
    pub fn apply(&mut self, outcome: &CompletionOutcome) -> AppliedReward {
        let mut coins = outcome.new_line_count() as u64 * LINE_COIN_BONUS;
        let mut bonus_ticket = false;
        if outcome.completed_full_board {
            coins += FULL_BOARD_COIN_BONUS;
            if !self.bonus_ticket_granted {
                self.bonus_ticket_granted = true;
                bonus_ticket = true;
            }
        }
        self.coins += coins;
        AppliedReward {
            coins_awarded: coins,
            bonus_ticket,
        }
    }
}

/// Errors from state mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("goal must not be empty")]
    EmptyGoal,

    #[error("{0:?} is a reserved goal key")]
    ReservedGoal(String),

    #[error("no cell with id {0}")]
    UnknownCell(Uuid),

    #[error("cell {0} has never been filled")]
    EmptyCell(Uuid),
}

/// Result of completing a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellCompletion {
    pub outcome: CompletionOutcome,
    pub reward: AppliedReward,
    /// Progress recorded against the originating step, when the cell was
    /// goal-linked.
    pub step_progress: Option<StepProgress>,
}

/// The owned state aggregate. Mutated only through [`App`].
#[derive(Debug)]
pub struct AppState {
    maps: BTreeMap<String, HabitMap>,
    /// Monotonic generation token per goal. A pipeline result is committed
    /// only while its token is still current.
    tokens: BTreeMap<String, u64>,
    support: HabitMap,
    pub board: Board,
    pub history: ShuffleHistory,
    pub blocked_topics: Vec<String>,
    pub rewards: RewardLedger,
    pub board_size_preference: usize,
    refresh_in_flight: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            maps: BTreeMap::new(),
            tokens: BTreeMap::new(),
            support: support_map(),
            board: Board::new(DEFAULT_BOARD_SIZE),
            history: ShuffleHistory::new(),
            blocked_topics: Vec::new(),
            rewards: RewardLedger::default(),
            board_size_preference: DEFAULT_BOARD_SIZE,
            refresh_in_flight: false,
        }
    }

    /// Rebuild state from persisted documents.
    pub fn from_documents(
        maps: BTreeMap<String, HabitMap>,
        board: Board,
        history: ShuffleHistory,
        blocked_topics: Vec<String>,
        rewards: RewardLedger,
    ) -> Self {
        let board_size_preference = board.size;
        Self {
            maps,
            tokens: BTreeMap::new(),
            support: support_map(),
            board,
            history,
            blocked_topics,
            rewards,
            board_size_preference,
            refresh_in_flight: false,
        }
    }

    pub fn maps(&self) -> &BTreeMap<String, HabitMap> {
        &self.maps
    }

    pub fn map(&self, goal: &str) -> Option<&HabitMap> {
        self.maps.get(goal)
    }

    pub fn goals(&self) -> Vec<String> {
        self.maps.keys().cloned().collect()
    }

    pub fn current_token(&self, goal: &str) -> Option<u64> {
        self.tokens.get(goal).copied()
    }

    fn bump_token(&mut self, goal: &str) -> u64 {
        let token = self.tokens.entry(goal.to_string()).or_insert(0);
        *token += 1;
        *token
    }

    /// Register (or force-rebuild) a goal. Returns the generation token a
    /// pipeline result must present at commit time.
    pub fn register_goal(&mut self, goal: &str) -> Result<u64, StateError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(StateError::EmptyGoal);
        }
        if is_support_goal(goal) {
            return Err(StateError::ReservedGoal(goal.to_string()));
        }
        Ok(self.bump_token(goal))
    }

    /// Remove a goal and its map. The token bump makes any outstanding
    /// pipeline result for this goal stale.
    pub fn remove_goal(&mut self, goal: &str) -> bool {
        let existed = self.maps.remove(goal).is_some() || self.tokens.contains_key(goal);
        self.bump_token(goal);
        existed
    }

    /// Commit a finished pipeline result. Returns false (and drops the
    /// map) when the token is no longer current.
    pub fn commit_map(&mut self, goal: &str, token: u64, map: HabitMap) -> bool {
        if self.current_token(goal) != Some(token) {
            return false;
        }
        self.maps.insert(goal.to_string(), map);
        true
    }

    /// Claim the refresh guard. Returns false when a refresh is already
    /// in flight; such a request is a no-op, not queued.
    pub fn begin_refresh(&mut self) -> bool {
        if self.refresh_in_flight {
            return false;
        }
        self.refresh_in_flight = true;
        true
    }

    pub fn finish_refresh(&mut self) {
        self.refresh_in_flight = false;
    }

    /// Run the board scheduler against the current maps and blocklist.
    pub fn refresh_board<R: Rng>(&mut self, rng: &mut R) -> usize {
        let ctx = RefreshContext {
            maps: &self.maps,
            support: &self.support,
            blocked_topics: &self.blocked_topics,
            size_preference: self.board_size_preference,
        };
        scheduler::refresh(&mut self.board, &mut self.history, &ctx, rng)
    }

    /// Mark a cell done, record step progress for goal-linked cells, and
    /// evaluate line/board completion. Completing an already-done cell is
    /// a no-op that earns nothing.
    pub fn complete_cell(&mut self, id: Uuid) -> Result<CellCompletion, StateError> {
        let cell = self
            .board
            .cell_mut(id)
            .ok_or(StateError::UnknownCell(id))?;
        if cell.title.is_empty() {
            return Err(StateError::EmptyCell(id));
        }

        let already_done = cell.done;
        cell.done = true;
        let goal = cell.goal.clone();
        let origin_step = cell.origin_step_id.clone();

        let mut step_progress = None;
        if !already_done {
            if let (Some(goal), Some(step_id)) = (goal, origin_step) {
                if let Some(map) = self.maps.get_mut(&goal) {
                    step_progress = record_step_completion(map, &step_id);
                }
            }
        }

        let outcome = if already_done {
            CompletionOutcome {
                new_lines: Vec::new(),
                completed_full_board: false,
            }
        } else {
            evaluate_toggle(&mut self.board)
        };
        let reward = self.rewards.apply(&outcome);

        Ok(CellCompletion {
            outcome,
            reward,
            step_progress,
        })
    }
}

// ---------------------------------------------------------------------------
// The async handle
// ---------------------------------------------------------------------------

struct AppInner {
    state: Mutex<AppState>,
    events: EventBus,
    oracle: Arc<dyn Oracle>,
}

/// Cloneable handle to the single-writer state owner.
///
/// Every mutation serializes through one mutex; per-goal pipeline runs are
/// spawned as independent tasks and serialize only at commit time.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    pub fn new(oracle: Arc<dyn Oracle>, state: AppState) -> Self {
        Self {
            inner: Arc::new(AppInner {
                state: Mutex::new(state),
                events: EventBus::default(),
                oracle,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.inner.events.subscribe()
    }

    /// Read-only access to the current state.
    pub async fn with_state<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let state = self.inner.state.lock().await;
        f(&state)
    }

    /// Mutable access for callers that persist state afterwards.
    pub async fn with_state_mut<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut state = self.inner.state.lock().await;
        f(&mut state)
    }

    /// Register a goal and spawn its pipeline run. The returned handle can
    /// be awaited; the outcome also arrives as a [`AppEvent::MapReady`] or
    /// [`AppEvent::MapFailed`] event.
    pub async fn register_goal(&self, goal: &str) -> Result<JoinHandle<()>, StateError> {
        let goal = goal.trim().to_string();
        let token = {
            let mut state = self.inner.state.lock().await;
            state.register_goal(&goal)?
        };

        let inner = self.inner.clone();
        Ok(tokio::spawn(async move {
            let result = pipeline::build_habit_map(inner.oracle.as_ref(), &goal).await;
            let mut state = inner.state.lock().await;
            if state.current_token(&goal) != Some(token) {
                info!(goal = %goal, token, "discarding pipeline result with stale token");
                return;
            }
            match result {
                Ok(map) => {
                    state.commit_map(&goal, token, map);
                    drop(state);
                    inner.events.publish(AppEvent::MapReady { goal });
                }
                Err(e) => {
                    warn!(goal = %goal, error = %e, "pipeline failed, previous map retained");
                    drop(state);
                    inner.events.publish(AppEvent::MapFailed {
                        goal,
                        error: e.to_string(),
                    });
                }
            }
        }))
    }

    /// Force a full regeneration of an existing goal's map.
    pub async fn rebuild_goal(&self, goal: &str) -> Result<JoinHandle<()>, StateError> {
        self.register_goal(goal).await
    }

    pub async fn remove_goal(&self, goal: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        state.remove_goal(goal)
    }

    /// Refresh the board. Returns false when a refresh was already in
    /// flight (the request is dropped, not queued).
    pub async fn refresh_board(&self) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            if !state.begin_refresh() {
                return false;
            }
        }
        let mut state = self.inner.state.lock().await;
        state.refresh_board(&mut rand::rng());
        state.finish_refresh();
        drop(state);
        self.inner.events.publish(AppEvent::BoardRefreshed);
        true
    }

    /// Complete a cell and publish any completion events.
    pub async fn complete_cell(&self, id: Uuid) -> Result<CellCompletion, StateError> {
        let completion = {
            let mut state = self.inner.state.lock().await;
            state.complete_cell(id)?
        };
        if completion.outcome.new_line_count() > 0 {
            self.inner.events.publish(AppEvent::LineCompleted {
                count: completion.outcome.new_line_count(),
            });
        }
        if completion.outcome.completed_full_board {
            self.inner.events.publish(AppEvent::BoardCompleted);
        }
        Ok(completion)
    }

    pub async fn set_board_size(&self, size: usize) {
        let mut state = self.inner.state.lock().await;
        state.board_size_preference = size;
    }

    pub async fn block_topic(&self, topic: &str) {
        let mut state = self.inner.state.lock().await;
        let topic = topic.trim().to_lowercase();
        if !topic.is_empty() && !state.blocked_topics.contains(&topic) {
            state.blocked_topics.push(topic);
        }
    }

    pub async fn unblock_topic(&self, topic: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let topic = topic.trim().to_lowercase();
        let before = state.blocked_topics.len();
        state.blocked_topics.retain(|t| t != &topic);
        state.blocked_topics.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> RewardLedger {
        RewardLedger::default()
    }

    #[test]
    fn line_rewards_scale_with_count() {
        let mut rewards = ledger();
        let applied = rewards.apply(&CompletionOutcome {
            new_lines: vec![0, 3],
            completed_full_board: false,
        });
        assert_eq!(applied.coins_awarded, 2 * LINE_COIN_BONUS);
        assert!(!applied.bonus_ticket);
        assert_eq!(rewards.coins, 2 * LINE_COIN_BONUS);
    }

    #[test]
    fn bonus_ticket_only_on_first_full_board_ever() {
        let mut rewards = ledger();
        let first = rewards.apply(&CompletionOutcome {
            new_lines: vec![7],
            completed_full_board: true,
        });
        assert!(first.bonus_ticket);
        assert_eq!(first.coins_awarded, LINE_COIN_BONUS + FULL_BOARD_COIN_BONUS);

        let second = rewards.apply(&CompletionOutcome {
            new_lines: vec![],
            completed_full_board: true,
        });
        assert!(!second.bonus_ticket);
        assert!(rewards.bonus_ticket_granted);
    }

    #[test]
    fn register_rejects_reserved_and_empty_goals() {
        let mut state = AppState::new();
        assert_eq!(state.register_goal("  "), Err(StateError::EmptyGoal));
        assert!(matches!(
            state.register_goal("_support"),
            Err(StateError::ReservedGoal(_))
        ));
    }

    #[test]
    fn tokens_are_monotonic_per_goal() {
        let mut state = AppState::new();
        let first = state.register_goal("run").unwrap();
        let second = state.register_goal("run").unwrap();
        assert!(second > first);
        assert_eq!(state.register_goal("draw").unwrap(), 1);
    }

    #[test]
    fn stale_commit_is_discarded() {
        let mut state = AppState::new();
        let stale = state.register_goal("run").unwrap();
        let _current = state.register_goal("run").unwrap();
        let committed = state.commit_map("run", stale, support_map());
        assert!(!committed);
        assert!(state.map("run").is_none());
    }

    #[test]
    fn removal_invalidates_outstanding_runs() {
        let mut state = AppState::new();
        let token = state.register_goal("run").unwrap();
        state.remove_goal("run");
        assert!(!state.commit_map("run", token, support_map()));
        assert!(state.map("run").is_none());
    }

    #[test]
    fn current_token_commit_lands() {
        let mut state = AppState::new();
        let token = state.register_goal("run").unwrap();
        assert!(state.commit_map("run", token, support_map()));
        assert!(state.map("run").is_some());
    }

    #[test]
    fn refresh_guard_rejects_second_claim() {
        let mut state = AppState::new();
        assert!(state.begin_refresh());
        assert!(!state.begin_refresh());
        state.finish_refresh();
        assert!(state.begin_refresh());
    }

    #[test]
    fn completing_unknown_cell_errors() {
        let mut state = AppState::new();
        let err = state.complete_cell(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StateError::UnknownCell(_)));
    }

    #[test]
    fn completing_unfilled_cell_errors() {
        let mut state = AppState::new();
        let id = state.board.cells[0].id;
        assert_eq!(state.complete_cell(id), Err(StateError::EmptyCell(id)));
    }

    #[test]
    fn double_completion_earns_nothing_extra() {
        let mut state = AppState::new();
        state.refresh_board(&mut rand::rng());
        let id = state.board.cells[0].id;
        state.complete_cell(id).unwrap();
        let coins_after_first = state.rewards.coins;
        let again = state.complete_cell(id).unwrap();
        assert_eq!(again.reward.coins_awarded, 0);
        assert!(again.step_progress.is_none());
        assert_eq!(state.rewards.coins, coins_after_first);
    }

    #[test]
    fn full_row_earns_one_line_bonus() {
        let mut state = AppState::new();
        state.refresh_board(&mut rand::rng());
        for i in 0..3 {
            let id = state.board.cells[i].id;
            state.complete_cell(id).unwrap();
        }
        assert_eq!(state.rewards.coins, LINE_COIN_BONUS);
        assert_eq!(state.board.rewarded_lines.len(), 1);
    }
}
