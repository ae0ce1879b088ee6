mod config;
mod history;
mod session;

use tracing::{info, warn};

use crate::interview::report::SessionReport;
use crate::interview::session::{Event, Turn};
use crate::state::Context;

/// Discord messages are capped at 2000 characters.
const CHUNK_LIMIT: usize = 1990;

/// Mock Excel interview
#[poise::command(
    slash_command,
    subcommands(
        "session::start",
        "session::answer",
        "session::hint",
        "session::skip",
        "session::status",
        "session::end",
        "history::history",
        "config::config"
    )
)]
pub async fn interview(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

fn render_turn_scores(turn: &Turn) -> String {
    format!(
        "Acc {:.2} | Comp {:.2} | Clar {:.2} | Depth {:.2}",
        turn.scores.accuracy, turn.scores.completeness, turn.scores.clarity, turn.scores.depth
    )
}

pub(crate) fn render_event(event: &Event) -> String {
    match event {
        Event::Introduction(text) => text.clone(),
        Event::Question {
            number,
            total,
            tier,
            prompt,
        } => format!("**Q{}/{}** ({})\n{}", number, total, tier, prompt),
        Event::Hint(text) => format!("*Hint:* {}", text),
        Event::Feedback(turn) => {
            let mode = turn.mode.map(|m| format!(" - {}", m)).unwrap_or_default();
            format!(
                "**Score:** {:.1} / 100 ({}){}\n{}\n{}",
                turn.final_score,
                turn.band,
                mode,
                render_turn_scores(turn),
                turn.feedback
            )
        }
        Event::Skipped(turn) => match &turn.model_answer {
            Some(model) => format!("Skipped Q{}. Model answer: {}", turn.number, model),
            None => format!("Skipped Q{}.", turn.number),
        },
        Event::Summary(report) => report.render_summary(),
    }
}

pub(crate) fn render_events(events: &[Event]) -> String {
    events
        .iter()
        .map(render_event)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn summary_of(events: &[Event]) -> Option<&SessionReport> {
    events.iter().find_map(|e| match e {
        Event::Summary(report) => Some(report),
        _ => None,
    })
}

/// Drop the user's live session and archive its report.
async fn close_session(ctx: &Context<'_>, user_id: u64, report: Option<&SessionReport>) {
    ctx.data().sessions.write().await.remove(&user_id);
    let Some(report) = report else {
        return;
    };
    match ctx.data().archive.store(user_id, report).await {
        Ok(()) => info!(user_id, session = %report.session_id, "Interview archived"),
        Err(e) => warn!(user_id, session = %report.session_id, "Failed to archive report: {}", e),
    }
}

/// Split text into pieces of at most `limit` bytes, preferring line then word
/// boundaries and never splitting a character.
fn split_chunks(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let mut chunk_len = remaining.len().min(limit);
        while !remaining.is_char_boundary(chunk_len) {
            chunk_len -= 1;
        }
        let split_at = if chunk_len < remaining.len() {
            remaining[..chunk_len]
                .rfind('\n')
                .or_else(|| remaining[..chunk_len].rfind(' '))
                .map(|i| i + 1)
                .unwrap_or(chunk_len)
        } else {
            chunk_len
        };
        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    chunks
}

/// Send a message in Discord-safe chunks.
/// Uses ctx.say() for all chunks so follow-ups go through the interaction webhook.
async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in split_chunks(text, CHUNK_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}
