mod archive;
mod commands;
mod corpus;
mod error;
mod eval;
mod interview;
mod llm;
mod state;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, warn, Level};

use archive::ReportArchive;
use corpus::Corpus;
use llm::{ChatBackend, LlmClient};
use state::{AppState, InterviewConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();

    let level = dotenv::var("LOG_LEVEL")
        .ok()
        .and_then(|l| l.parse::<Level>().ok())
        .unwrap_or(Level::DEBUG);
    tracing_subscriber::fmt().with_max_level(level).init();

    let token = dotenv::var("DISCORD_TOKEN").expect("DISCORD_TOKEN required");
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Load question bank
    let bank_path = PathBuf::from(
        dotenv::var("QUESTION_BANK").unwrap_or_else(|_| "./data/question_bank.json".to_string()),
    );
    let corpus = Arc::new(Corpus::load(&bank_path)?);

    // Init report archive
    let archive_dir =
        PathBuf::from(dotenv::var("ARCHIVE_DIR").unwrap_or_else(|_| "./data/reports".to_string()));
    let archive = Arc::new(ReportArchive::new(&archive_dir).await?);
    info!("Report archive initialized at {:?}", archive_dir);

    // Init LLM judge
    let judge: Option<Arc<dyn ChatBackend>> = match LlmClient::from_env()? {
        Some(client) => {
            info!(model = client.model(), "LLM judge configured");
            Some(Arc::new(client))
        }
        None => {
            warn!("No LLM endpoint configured, semantic scoring disabled");
            None
        }
    };

    let config = InterviewConfig::from_env(judge.is_some()).context("Invalid interview configuration")?;
    info!(
        questions = config.question_count,
        semantic = config.semantic_enabled,
        selection = %config.selection,
        "Interview configuration loaded"
    );

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if !admin_ids.is_empty() {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let app_state = AppState {
        corpus,
        judge,
        archive,
        sessions: RwLock::new(HashMap::new()),
        admin_ids,
        config: Arc::new(RwLock::new(config)),
    };

    let intents =
        serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MESSAGES;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::interview()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        gid,
                    )
                    .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    )
                    .await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting interview bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
