use uuid::Uuid;

use super::send_chunked;
use crate::interview::report::SessionReport;
use crate::state::Context;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 20;

fn render_line(report: &SessionReport) -> String {
    format!(
        "`{}` {} - {:.1} / 100 ({}), {} of {} answered, {} - `{}`",
        report.finished_at.format("%Y-%m-%d %H:%M"),
        report.topic,
        report.final_score,
        report.band,
        report.answered(),
        report.configured_questions,
        report.end_reason,
        report.session_id
    )
}

/// List your past interviews, or show one in full
#[poise::command(slash_command)]
pub async fn history(
    ctx: Context<'_>,
    #[description = "Session id to show in full"] session: Option<String>,
    #[description = "How many recent interviews to list (max 20)"] limit: Option<u32>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    let archive = &ctx.data().archive;

    if let Some(raw) = session {
        let Ok(session_id) = Uuid::parse_str(raw.trim()) else {
            ctx.say(format!("`{}` is not a valid session id.", raw)).await?;
            return Ok(());
        };
        return match archive.get(user_id, &session_id).await? {
            Some(report) => send_chunked(&ctx, &report.render_summary()).await,
            None => {
                ctx.say("No archived interview with that id.").await?;
                Ok(())
            }
        };
    }

    let limit = limit.map(|l| l as usize).unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let reports = archive.list(user_id, limit).await?;
    if reports.is_empty() {
        ctx.say("No finished interviews yet.").await?;
        return Ok(());
    }

    let mut text = format!("**Your last {} interview(s):**\n", reports.len());
    for report in &reports {
        text.push_str(&render_line(report));
        text.push('\n');
    }
    send_chunked(&ctx, &text).await
}
