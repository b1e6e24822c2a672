use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chat_session::{SessionController, SessionError};
use clap::Parser;
use config::ConfigStore;
use core_types::{ConversationTurn, RequestConfig};
use i18n::I18n;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod cli;

use app::{AppContext, mask_key};
use cli::{Cli, Command, ConfigCommand, KeysCommand, PrefsCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = match cli.data_dir.clone() {
        Some(dir) => dir,
        None => {
            let mut dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
            dir.push("siivi");
            dir
        }
    };
    if let Err(err) = fs::create_dir_all(&data_dir) {
        eprintln!("failed to prepare data dir: {err}");
    }
    let _log_guard = init_local_logger(&data_dir.join("logs"));

    let config_dir = cli.data_dir.as_ref().map(|dir| dir.join("config"));
    if let Command::Config {
        action: ConfigCommand::Path,
    } = &cli.command
    {
        let store = match config_dir {
            Some(dir) => ConfigStore::from_dir(dir),
            None => ConfigStore::from_default_location()?,
        };
        println!("{}", store.path().display());
        return Ok(());
    }

    let ctx = AppContext::open(&data_dir, config_dir).context("failed to load siivi state")?;
    let result = run(cli.command, &ctx).await;
    if let Err(err) = &result {
        error!(error = %err, "command failed");
    }
    result
}

async fn run(command: Command, ctx: &AppContext) -> Result<()> {
    match command {
        Command::Chat { user } => chat(ctx, &user).await,
        Command::Ask { prompt, user } => ask(ctx, &user, &prompt).await,
        Command::Image { prompt } => image(ctx, &prompt).await,
        Command::Keys { action } => keys(ctx, action),
        Command::Prefs { action } => prefs(ctx, action),
        Command::Config { .. } => Ok(()),
    }
}

async fn chat(ctx: &AppContext, user: &str) -> Result<()> {
    let prefs = ctx.config.preferences_for(user);
    let i18n = I18n::new(prefs.language);
    let request = prefs.request_config();
    let dispatcher = Arc::new(ctx.build_dispatcher()?);
    let session = SessionController::new(dispatcher);

    println!("{}", i18n.t("welcome"));
    println!("{}", i18n.t("tagline"));
    println!("{}", i18n.t("cli.help"));
    info!(user, model = %request.model_id, "chat session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{}> ", i18n.t("cli.prompt"));
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                session.create_chat();
                println!("{}", i18n.t("cli.new_chat"));
                continue;
            }
            _ => {}
        }

        eprintln!("{}", i18n.t("cli.thinking"));
        match session.send_message(None, &line, &request).await {
            Ok(reply) => println!("{}: {}", i18n.t("cli.assistant"), reply.turn.content),
            Err(SessionError::Completion { source, .. }) => {
                eprintln!("{} ({source})", i18n.t("cli.error"));
            }
            Err(err) => eprintln!("{err}"),
        }
    }

    println!("{}", i18n.t("cli.goodbye"));
    Ok(())
}

async fn ask(ctx: &AppContext, user: &str, prompt: &str) -> Result<()> {
    let request: RequestConfig = ctx.config.preferences_for(user).request_config();
    let dispatcher = ctx.build_dispatcher()?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let turns = [ConversationTurn::user(prompt)];
    let result = dispatcher
        .dispatch_with_cancel(&turns, &request, &cancel)
        .await;
    watcher.abort();

    let reply = result.context("no provider produced a reply")?;
    println!("{reply}");
    Ok(())
}

async fn image(ctx: &AppContext, prompt: &str) -> Result<()> {
    let i18n = I18n::new(ctx.config.preferences_for(config::DEFAULT_USER).language);
    let key = ctx.image_key()?;
    let image = ctx.image_generator().generate(prompt, key.as_deref()).await?;
    if image.placeholder {
        eprintln!("{}", i18n.t("cli.image_placeholder"));
    }
    println!("{}", image.url);
    Ok(())
}

fn keys(ctx: &AppContext, action: KeysCommand) -> Result<()> {
    match action {
        KeysCommand::Add { tier, key } => {
            let reference = ctx.credential_ref(&tier)?;
            let count = ctx.vault.add(&reference, key)?;
            println!("{tier}: {count} key(s)");
        }
        KeysCommand::List { tier } => {
            let reference = ctx.credential_ref(&tier)?;
            let keys = ctx.vault.list(&reference)?;
            if keys.is_empty() {
                let i18n = I18n::new(ctx.config.preferences_for(config::DEFAULT_USER).language);
                println!("{}", i18n.t("cli.no_keys"));
            }
            for (index, key) in keys.iter().enumerate() {
                println!("{index}\t{}", mask_key(key));
            }
        }
        KeysCommand::Remove { tier, index } => {
            let reference = ctx.credential_ref(&tier)?;
            let removed = ctx.vault.remove_at(&reference, index)?;
            println!("removed {}", mask_key(&removed));
        }
        KeysCommand::Clear { tier } => {
            let reference = ctx.credential_ref(&tier)?;
            ctx.vault.clear(&reference)?;
            println!("{tier}: cleared");
        }
    }
    Ok(())
}

fn prefs(ctx: &AppContext, action: PrefsCommand) -> Result<()> {
    let show = matches!(action, PrefsCommand::Show { .. });
    let (user, patch) = action.into_patch();
    let prefs = if show {
        ctx.config.preferences_for(&user)
    } else {
        ctx.config_store.update_preferences(&user, patch)?
    };
    let text = serde_json::to_string_pretty(&prefs).context("failed to render preferences")?;
    println!("{text}");
    Ok(())
}

fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "siivi.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,app_cli=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}
