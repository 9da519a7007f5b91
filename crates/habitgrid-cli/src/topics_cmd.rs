//! Blocked-topic commands.

use crate::CliContext;

pub async fn cmd_block(ctx: &CliContext, topic: &str) -> anyhow::Result<()> {
    ctx.app.block_topic(topic).await;
    ctx.save().await?;
    println!("Blocked {topic:?}. It will never appear on the board.");
    Ok(())
}

pub async fn cmd_unblock(ctx: &CliContext, topic: &str) -> anyhow::Result<()> {
    let removed = ctx.app.unblock_topic(topic).await;
    ctx.save().await?;
    if removed {
        println!("Unblocked {topic:?}.");
    } else {
        println!("{topic:?} was not blocked.");
    }
    Ok(())
}

pub async fn cmd_list(ctx: &CliContext) -> anyhow::Result<()> {
    let topics = ctx.app.with_state(|s| s.blocked_topics.clone()).await;
    if topics.is_empty() {
        println!("No blocked topics.");
        return Ok(());
    }
    for topic in topics {
        println!("{topic}");
    }
    Ok(())
}
