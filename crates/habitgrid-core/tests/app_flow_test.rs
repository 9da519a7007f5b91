//! App-level flows: goal registration through the single-writer owner,
//! stale-token discards, board refresh, and reward bookkeeping.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use habitgrid_core::board::Board;
use habitgrid_core::events::AppEvent;
use habitgrid_core::oracle::{Oracle, OracleError, OracleRequest};
use habitgrid_core::state::{App, AppState};

use habitgrid_test_utils::{full_pipeline_script, sample_map, ScriptedOracle};

fn app_with_script(script: Vec<String>) -> App {
    App::new(
        Arc::new(ScriptedOracle::with_responses(script)),
        AppState::new(),
    )
}

#[tokio::test]
async fn registering_a_goal_builds_and_commits_its_map() {
    let app = app_with_script(full_pipeline_script());
    let mut events = app.subscribe();

    let handle = app.register_goal("sketch daily").await.unwrap();
    handle.await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        AppEvent::MapReady { goal: "sketch daily".to_string() }
    );
    let goals = app.with_state(|s| s.goals()).await;
    assert_eq!(goals, vec!["sketch daily".to_string()]);
}

#[tokio::test]
async fn failed_pipeline_retains_the_previous_map() {
    // First run succeeds, the rebuild's script immediately runs dry.
    let app = app_with_script(full_pipeline_script());
    app.register_goal("sketch daily").await.unwrap().await.unwrap();
    let before = app.with_state(|s| s.map("sketch daily").cloned()).await.unwrap();

    let mut events = app.subscribe();
    app.rebuild_goal("sketch daily").await.unwrap().await.unwrap();

    match events.recv().await.unwrap() {
        AppEvent::MapFailed { goal, .. } => assert_eq!(goal, "sketch daily"),
        other => panic!("expected MapFailed, got {other:?}"),
    }
    let after = app.with_state(|s| s.map("sketch daily").cloned()).await.unwrap();
    assert_eq!(before, after);
}

/// Oracle that parks its first request until the test opens the gate;
/// later requests pass straight through.
struct GatedOracle {
    gate: Arc<Notify>,
    released: std::sync::atomic::AtomicBool,
    inner: ScriptedOracle,
}

#[async_trait]
impl Oracle for GatedOracle {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        if !self.released.swap(true, std::sync::atomic::Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.generate(request).await
    }
}

#[tokio::test]
async fn removing_a_goal_discards_the_in_flight_result() {
    let gate = Arc::new(Notify::new());
    let oracle = GatedOracle {
        gate: gate.clone(),
        released: std::sync::atomic::AtomicBool::new(false),
        inner: ScriptedOracle::with_responses(full_pipeline_script()),
    };
    let app = App::new(Arc::new(oracle), AppState::new());
    let mut events = app.subscribe();

    let handle = app.register_goal("sketch daily").await.unwrap();
    // The pipeline parks on its first oracle call; remove the goal, then
    // let the run finish. The single stored permit releases the gate even
    // if the task has not reached it yet.
    assert!(app.remove_goal("sketch daily").await);
    gate.notify_one();
    handle.await.unwrap();

    assert!(app.with_state(|s| s.map("sketch daily").is_none()).await);
    // Neither a ready nor a failed event: the result was simply dropped.
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn refresh_fills_the_board_and_emits_an_event() {
    let app = app_with_script(vec![]);
    let mut events = app.subscribe();

    assert!(app.refresh_board().await);
    assert_eq!(events.recv().await.unwrap(), AppEvent::BoardRefreshed);
    let empty = app
        .with_state(|s| s.board.cells.iter().filter(|c| c.title.is_empty()).count())
        .await;
    assert_eq!(empty, 0);
}

#[tokio::test]
async fn blocked_topics_keep_candidates_off_the_board() {
    let app = app_with_script(vec![]);
    app.block_topic("coffee").await;

    // Commit a map by hand whose first stage mentions coffee.
    app.with_state_mut(|state| {
        let mut map = sample_map("morning routine");
        map.stages[0].steps[0].actions[0].text = "have a cup of coffee".to_string();
        let token = state.register_goal("morning routine").unwrap();
        state.commit_map("morning routine", token, map);
    })
    .await;

    app.refresh_board().await;
    let titles = app.with_state(|s| s.board.occupied_titles()).await;
    assert!(titles.iter().all(|t| !t.contains("coffee")));
    assert_eq!(titles.len(), 9);
}

#[tokio::test]
async fn completing_goal_cells_advances_the_step() {
    let app = app_with_script(vec![]);
    app.with_state_mut(|state| {
        let token = state.register_goal("practice").unwrap();
        state.commit_map("practice", token, sample_map("practice"));
    })
    .await;
    app.refresh_board().await;

    let goal_cells: Vec<_> = app
        .with_state(|s| {
            s.board
                .cells
                .iter()
                .filter(|c| c.goal.is_some())
                .map(|c| c.id)
                .collect::<Vec<_>>()
        })
        .await;
    assert!(!goal_cells.is_empty());

    let completion = app.complete_cell(goal_cells[0]).await.unwrap();
    let progress = completion.step_progress.expect("goal cell records progress");
    let completed = app
        .with_state(|s| {
            s.map("practice")
                .unwrap()
                .step(&progress.step_id)
                .unwrap()
                .completed_count
        })
        .await;
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn first_full_board_grants_the_ticket_exactly_once() {
    let app = app_with_script(vec![]);
    let mut events = app.subscribe();
    app.refresh_board().await;

    let ids = app
        .with_state(|s| s.board.cells.iter().map(|c| c.id).collect::<Vec<_>>())
        .await;
    let mut ticket_grants = 0;
    for id in ids {
        let completion = app.complete_cell(id).await.unwrap();
        if completion.reward.bonus_ticket {
            ticket_grants += 1;
        }
    }
    assert_eq!(ticket_grants, 1);
    assert!(app.with_state(|s| s.board.full_rewarded).await);
    assert_eq!(app.with_state(|s| s.board.completed_full_boards).await, 1);

    // Drain events: the last one must be the full-board completion.
    let mut saw_board_completed = false;
    while let Ok(event) = events.try_recv() {
        if event == AppEvent::BoardCompleted {
            saw_board_completed = true;
        }
    }
    assert!(saw_board_completed);

    // A second, fresh board: coins flow again but no second ticket.
    app.with_state_mut(|s| s.board = Board::new(3)).await;
    app.refresh_board().await;
    let ids = app
        .with_state(|s| s.board.cells.iter().map(|c| c.id).collect::<Vec<_>>())
        .await;
    for id in ids {
        let completion = app.complete_cell(id).await.unwrap();
        assert!(!completion.reward.bonus_ticket);
    }
    assert!(app.with_state(|s| s.rewards.bonus_ticket_granted).await);
}
