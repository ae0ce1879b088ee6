use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::{close_session, render_events, send_chunked, summary_of};
use crate::interview::session::InterviewSession;
use crate::state::Context;

const NO_SESSION: &str = "No interview in progress. Start one with `/interview start`.";

async fn live_session(ctx: &Context<'_>, user_id: u64) -> Option<Arc<Mutex<InterviewSession>>> {
    ctx.data().sessions.read().await.get(&user_id).cloned()
}

/// Start a new mock interview
#[poise::command(slash_command)]
pub async fn start(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();

    let Some(events) = ctx.data().open_session(user_id).await? else {
        ctx.say("You already have an interview running. Use `/interview end` to stop it first.")
            .await?;
        return Ok(());
    };
    info!(user = ctx.author().name, "Interview session opened");

    if let Some(report) = summary_of(&events) {
        close_session(&ctx, user_id, Some(report)).await;
    }
    send_chunked(&ctx, &render_events(&events)).await
}

/// Answer the current question
#[poise::command(slash_command)]
pub async fn answer(
    ctx: Context<'_>,
    #[description = "Your answer"] text: String,
) -> Result<(), anyhow::Error> {
    respond(ctx, &text).await
}

/// Get a hint for the current question
#[poise::command(slash_command)]
pub async fn hint(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    respond(ctx, "hint").await
}

/// Skip the current question
#[poise::command(slash_command)]
pub async fn skip(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    respond(ctx, "skip").await
}

async fn respond(ctx: Context<'_>, input: &str) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    let Some(session) = live_session(&ctx, user_id).await else {
        ctx.say(NO_SESSION).await?;
        return Ok(());
    };

    // Semantic scoring can outlast the interaction acknowledgement window.
    ctx.defer().await?;

    let (events, done) = {
        let mut session = session.lock().await;
        match session.handle(input).await {
            Ok(events) => (events, session.is_done()),
            Err(e) => {
                drop(session);
                ctx.say(format!("Could not process that: {}", e)).await?;
                return Ok(());
            }
        }
    };

    if done {
        close_session(&ctx, user_id, summary_of(&events)).await;
    }
    send_chunked(&ctx, &render_events(&events)).await
}

/// Show progress of the current interview
#[poise::command(slash_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    let Some(session) = live_session(&ctx, user_id).await else {
        ctx.say(NO_SESSION).await?;
        return Ok(());
    };

    let text = {
        let session = session.lock().await;
        let report = session.report();
        let mut text = format!(
            "**Progress:** {} of {} questions ({} skipped)\n\
             **Running score:** {:.1} / 100 ({})\n\
             **Current tier:** {}",
            report.turns.len(),
            report.configured_questions,
            report.skipped(),
            report.final_score,
            report.band,
            session.state().tier,
        );
        if let Some(q) = session.current_question() {
            text.push_str(&format!("\n\n**Open question** ({})\n{}", q.tier, q.prompt));
        }
        text
    };

    send_chunked(&ctx, &text).await
}

/// End the current interview and show the summary
#[poise::command(slash_command)]
pub async fn end(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    let Some(session) = live_session(&ctx, user_id).await else {
        ctx.say(NO_SESSION).await?;
        return Ok(());
    };

    let report = session.lock().await.finish();
    close_session(&ctx, user_id, report.as_ref()).await;

    match report {
        Some(report) => send_chunked(&ctx, &report.render_summary()).await,
        None => {
            ctx.say("That interview had already finished.").await?;
            Ok(())
        }
    }
}
