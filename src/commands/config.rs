use crate::state::{Context, InterviewConfig, CONFIG_KEYS};

fn render_config(c: &InterviewConfig) -> String {
    format!(
        "**Interview Configuration:**\n\
         `question_count`: {}\n\
         `w_acc` / `w_comp` / `w_clar` / `w_depth`: {} / {} / {} / {}\n\
         `keyword_threshold`: {}\n\
         `strict_keyword_threshold`: {}\n\
         `dedup_threshold`: {}\n\
         `semantic_enabled`: {}\n\
         `semantic_max_retries`: {}\n\
         `semantic_timeout_secs`: {}\n\
         `blend_max_delta`: {}\n\
         `raise_tier_at` / `lower_tier_at`: {} / {}\n\
         `clarity_length_cap`: {}\n\
         `selection`: {}\n\
         Bands: Beginner <= {}, Intermediate <= {}, Advanced <= {}, Expert above",
        c.question_count,
        c.weights.accuracy,
        c.weights.completeness,
        c.weights.clarity,
        c.weights.depth,
        c.keyword_threshold,
        c.strict_keyword_threshold,
        c.dedup_threshold,
        c.semantic_enabled,
        c.semantic_max_retries,
        c.semantic_timeout.as_secs(),
        c.blend_max_delta,
        c.raise_tier_at,
        c.lower_tier_at,
        c.clarity_length_cap,
        c.selection,
        c.bands.beginner_max,
        c.bands.intermediate_max,
        c.bands.advanced_max,
    )
}

/// Show or change interview parameters (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "Parameter name, e.g. question_count"] param: Option<String>,
    #[description = "New value"] value: Option<String>,
) -> Result<(), anyhow::Error> {
    let user_id = ctx.author().id.get();
    if !ctx.data().is_admin(user_id) {
        ctx.say("This command is admin-only.").await?;
        return Ok(());
    }

    match (param.as_deref(), value.as_deref()) {
        // Show current config
        (None, _) => {
            let text = render_config(&*ctx.data().config.read().await);
            ctx.say(text).await?;
        }
        // Set a parameter
        (Some(key), Some(val)) => {
            let result = ctx.data().config.write().await.set(key, val);
            match result {
                Ok(()) => {
                    tracing::info!(user_id, key, value = val, "Interview config changed");
                    ctx.say(format!("`{}` set to {}. New interviews will use it.", key, val))
                        .await?;
                }
                Err(e) => {
                    ctx.say(format!("{}", e)).await?;
                }
            }
        }
        (Some(_), None) => {
            ctx.say(format!(
                "Provide both `param` and `value`. Example: `/interview config question_count 5`\nValid: {}",
                CONFIG_KEYS.join(", ")
            ))
            .await?;
        }
    }

    Ok(())
}
