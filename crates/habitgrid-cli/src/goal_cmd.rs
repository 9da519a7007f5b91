//! Goal and map commands.

use anyhow::Context;

use habitgrid_core::events::AppEvent;
use habitgrid_core::map::progress::current_stage;

use crate::CliContext;

/// Register (or rebuild) a goal, wait for its pipeline run, and persist
/// the result. On failure the previous map stays untouched.
pub async fn cmd_add(ctx: &CliContext, goal: &str) -> anyhow::Result<()> {
    let had_map = ctx.app.with_state(|s| s.map(goal).is_some()).await;
    println!(
        "{} habit map for {goal:?}...",
        if had_map { "Rebuilding" } else { "Building" }
    );

    let mut events = ctx.app.subscribe();
    let handle = ctx.app.register_goal(goal).await?;
    handle.await.context("pipeline task panicked")?;

    // The outcome event was published before the task finished.
    loop {
        match events.try_recv() {
            Ok(AppEvent::MapReady { goal: g }) if g == goal => break,
            Ok(AppEvent::MapFailed { goal: g, error }) if g == goal => {
                if had_map {
                    anyhow::bail!("map generation failed ({error}); the previous map was kept");
                }
                anyhow::bail!("map generation failed: {error}");
            }
            Ok(_) => continue,
            Err(_) => anyhow::bail!("pipeline finished without reporting an outcome"),
        }
    }

    let map = ctx
        .app
        .with_state(|s| s.map(goal).cloned())
        .await
        .context("map missing after a successful run")?;
    ctx.save().await?;
    let steps: usize = map.stages.iter().map(|s| s.steps.len()).sum();
    println!("Map ready: {} stages, {steps} steps.", map.stages.len());
    println!("Run `habitgrid board refresh` to pull its actions onto the board.");
    Ok(())
}

pub async fn cmd_remove(ctx: &CliContext, goal: &str) -> anyhow::Result<()> {
    let existed = ctx.app.remove_goal(goal).await;
    let deleted = ctx.store.delete_map(goal)?;
    ctx.save().await?;
    if existed || deleted {
        println!("Removed {goal:?}.");
    } else {
        println!("No such goal: {goal:?}.");
    }
    Ok(())
}

pub async fn cmd_list(ctx: &CliContext) -> anyhow::Result<()> {
    let rows: Vec<(String, usize, usize, usize)> = ctx
        .app
        .with_state(|s| {
            s.maps()
                .values()
                .map(|map| {
                    let total: usize = map.stages.iter().map(|st| st.steps.len()).sum();
                    let done: usize = map
                        .stages
                        .iter()
                        .flat_map(|st| st.steps.iter())
                        .filter(|step| step.is_complete())
                        .count();
                    (map.goal.clone(), current_stage(map), done, total)
                })
                .collect()
        })
        .await;

    if rows.is_empty() {
        println!("No goals yet. Add one with `habitgrid goal add \"...\"`.");
        return Ok(());
    }
    for (goal, stage, done, total) in rows {
        println!("{goal}  (stage {stage}, {done}/{total} steps complete)");
    }
    Ok(())
}

pub async fn cmd_show_map(ctx: &CliContext, goal: &str) -> anyhow::Result<()> {
    let map = ctx
        .app
        .with_state(|s| s.map(goal).cloned())
        .await
        .with_context(|| format!("no map for goal {goal:?}"))?;

    println!("Goal: {}", map.goal);
    println!("Mastery: {}", map.mastery_definition);
    println!("Updated: {}", map.updated_at.format("%Y-%m-%d %H:%M UTC"));

    println!("\nFrictions:");
    for friction in &map.frictions {
        println!("  - {friction}");
    }

    println!("\nMethod route:");
    for entry in &map.method_route {
        match entry.tag {
            Some(tag) => println!("  - [{tag:?}] {}", entry.text),
            None => println!("  - {}", entry.text),
        }
    }

    let stage = current_stage(&map);
    println!("\nStages (current: {stage}):");
    for s in &map.stages {
        let marker = if s.index as usize == stage { ">" } else { " " };
        println!("{marker} stage {}:", s.index);
        for step in &s.steps {
            println!(
                "    {} {} ({}/{}) -- {} [{}]",
                step.step_id,
                step.title,
                step.completed_count,
                step.required_completions,
                step.duration_estimate,
                step.category,
            );
        }
    }
    Ok(())
}
