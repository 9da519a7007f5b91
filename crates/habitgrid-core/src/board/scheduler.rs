//! Board refill: place candidates onto the grid under the composition cap,
//! rejecting near-duplicates, falling back to a fixed generic pool.
//!
//! Scheduling never fails user-visibly: every target cell always receives
//! a title, in the worst case the always-available last-resort action.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::map::HabitMap;

use super::candidates::{candidates, Candidate};
use super::dedup::conflicts_with_any;
use super::support::SUPPORT_GOAL;
use super::{Board, Cell, ShuffleHistory, GOAL_LINKED_CAP};

/// Fixed pool of generic low-effort actions used when both candidate
/// streams run dry. Checked in order, so the pool stays deterministic.
pub const FALLBACK_ACTIONS: &[&str] = &[
    "drink a glass of water",
    "stretch for 30 seconds",
    "take three deep breaths",
    "stand up and roll your shoulders",
    "look out the window for a minute",
];

/// Accepted unconditionally when every fallback option is also rejected.
pub const LAST_RESORT_ACTION: &str = "take one slow breath";

/// Everything a refresh reads besides the board and history.
pub struct RefreshContext<'a> {
    /// Tracked user goals and their maps. Must not include the support map.
    pub maps: &'a BTreeMap<String, HabitMap>,
    /// The built-in support map.
    pub support: &'a HabitMap,
    pub blocked_topics: &'a [String],
    /// Current grid size preference; the board resizes when it changed.
    pub size_preference: usize,
}

/// Refill the board. Returns the number of cells that received a new title.
///
/// Steps: resize if needed, compute the replace-set (all cells when
/// pristine, else only not-done cells), build the two pre-shuffled streams,
/// fill each slot preferring goal-linked candidates under the cap, reject
/// via the deduplicator against board titles plus history, and finally
/// append the new board's titles to the history ring.
pub fn refresh<R: Rng>(
    board: &mut Board,
    history: &mut ShuffleHistory,
    ctx: &RefreshContext<'_>,
    rng: &mut R,
) -> usize {
    board.resize(ctx.size_preference);

    let pristine = board.is_pristine();
    let targets: Vec<usize> = board
        .cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| pristine || !cell.done)
        .map(|(i, _)| i)
        .collect();

    // Old titles of replaced cells are cleared up front; they were already
    // recorded into history by the refresh that placed them.
    for &i in &targets {
        let cell = &mut board.cells[i];
        cell.title.clear();
        cell.done = false;
        cell.goal = None;
        cell.origin_step_id = None;
    }

    let mut goal_stream: Vec<Candidate> = ctx
        .maps
        .iter()
        .flat_map(|(goal, map)| candidates(goal, map, ctx.blocked_topics))
        .collect();
    goal_stream.shuffle(rng);

    let mut support_stream: Vec<Candidate> =
        candidates(SUPPORT_GOAL, ctx.support, ctx.blocked_topics);
    support_stream.shuffle(rng);

    let mut filled = 0;
    for i in targets {
        let existing: Vec<String> = board
            .occupied_titles()
            .into_iter()
            .chain(history.titles().map(str::to_string))
            .collect();

        let under_cap = board.goal_linked_count() < GOAL_LINKED_CAP;
        let picked = if under_cap {
            draw(&mut goal_stream, &existing)
        } else {
            None
        }
        .or_else(|| draw(&mut support_stream, &existing));

        board.cells[i] = match picked {
            Some(candidate) => Cell {
                id: uuid::Uuid::new_v4(),
                title: candidate.text,
                done: false,
                // Support candidates do not count against the cap.
                goal: (candidate.goal != SUPPORT_GOAL).then_some(candidate.goal),
                origin_step_id: Some(candidate.origin_step_id),
            },
            None => fallback_cell(&existing),
        };
        filled += 1;
    }

    history.push(board.occupied_titles());
    debug!(filled, size = board.size, "board refreshed");
    filled
}

/// Pop candidates from a pre-shuffled stream until one survives the
/// deduplicator. Rejected candidates are discarded for this refresh.
fn draw(stream: &mut Vec<Candidate>, existing: &[String]) -> Option<Candidate> {
    while let Some(candidate) = stream.pop() {
        if !conflicts_with_any(&candidate.text, existing.iter().map(String::as_str)) {
            return Some(candidate);
        }
        debug!(text = %candidate.text, "candidate rejected as near-duplicate");
    }
    None
}

/// Build a cell from the fixed fallback pool, or the last resort when the
/// whole pool collides with the corpus.
fn fallback_cell(existing: &[String]) -> Cell {
    let title = FALLBACK_ACTIONS
        .iter()
        .find(|text| !conflicts_with_any(text, existing.iter().map(String::as_str)))
        .copied()
        .unwrap_or(LAST_RESORT_ACTION);
    Cell {
        id: uuid::Uuid::new_v4(),
        title: title.to_string(),
        done: false,
        goal: None,
        origin_step_id: None,
    }
}
