//! Board commands: show, refresh, complete, resize.

use anyhow::bail;

use habitgrid_core::board::{MAX_BOARD_SIZE, MIN_BOARD_SIZE};
use habitgrid_core::state::CellCompletion;

use crate::CliContext;

pub async fn cmd_show(ctx: &CliContext) -> anyhow::Result<()> {
    let (size, cells, coins) = ctx
        .app
        .with_state(|s| {
            let cells: Vec<(String, bool)> = s
                .board
                .cells
                .iter()
                .map(|c| (c.title.clone(), c.done))
                .collect();
            (s.board.size, cells, s.rewards.coins)
        })
        .await;

    if cells.iter().all(|(title, _)| title.is_empty()) {
        println!("The board is empty. Run `habitgrid board refresh` to fill it.");
        return Ok(());
    }

    for row in 0..size {
        for col in 0..size {
            let (title, done) = &cells[row * size + col];
            let index = row * size + col + 1;
            let marker = if *done { "x" } else { " " };
            println!("[{marker}] {index:>2}. {title}");
        }
        if row + 1 < size {
            println!();
        }
    }
    println!("\nCoins: {coins}");
    Ok(())
}

pub async fn cmd_refresh(ctx: &CliContext) -> anyhow::Result<()> {
    if !ctx.app.refresh_board().await {
        println!("A refresh is already in flight; nothing to do.");
        return Ok(());
    }
    ctx.save().await?;
    println!("Board refreshed.");
    cmd_show(ctx).await
}

pub async fn cmd_done(ctx: &CliContext, cell: usize) -> anyhow::Result<()> {
    let id = ctx
        .app
        .with_state(|s| s.board.cells.get(cell.wrapping_sub(1)).map(|c| c.id))
        .await;
    let Some(id) = id else {
        let count = ctx.app.with_state(|s| s.board.cells.len()).await;
        bail!("cell {cell} is out of range (the board has {count} cells)");
    };

    let completion = ctx.app.complete_cell(id).await?;
    ctx.save().await?;
    report_completion(&completion);
    Ok(())
}

fn report_completion(completion: &CellCompletion) {
    println!("Done.");
    if let Some(progress) = &completion.step_progress {
        if progress.step_newly_complete {
            println!("Step {} is now complete.", progress.step_id);
        }
    }
    let lines = completion.outcome.new_line_count();
    if lines > 0 {
        println!("{lines} new line{} completed!", if lines == 1 { "" } else { "s" });
    }
    if completion.outcome.completed_full_board {
        println!("Full board! Nicely done.");
    }
    if completion.reward.coins_awarded > 0 {
        println!("+{} coins", completion.reward.coins_awarded);
    }
    if completion.reward.bonus_ticket {
        println!("Bonus ticket earned -- first full board ever.");
    }
}

pub async fn cmd_size(ctx: &CliContext, size: usize) -> anyhow::Result<()> {
    if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
        bail!("size must be between {MIN_BOARD_SIZE} and {MAX_BOARD_SIZE}");
    }
    ctx.app.set_board_size(size).await;
    // The new size takes effect through a refresh.
    cmd_refresh(ctx).await
}
