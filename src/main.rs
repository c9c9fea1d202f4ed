use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::Deserialize;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tokio::sync::Mutex;
use uuid::Uuid;

mod backup;
mod callback_handlers;
mod extract;
mod ledger;
mod message_handlers;
mod messages;
#[cfg(test)]
mod tests;

use backup::BackupNotifier;
use ledger::LedgerStore;

#[derive(Debug, Deserialize, Clone)]
struct Config {
    token: String,
    data_dir: PathBuf,
    backup_chat_id: Option<i64>,
    #[serde(default)]
    backup_on_status_update: bool,
    #[serde(default)]
    duplicate_policy: DuplicatePolicy,
}

/// What the bot offers when an incoming link is already in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DuplicatePolicy {
    #[default]
    OfferDelete,
    ForceNewOnly,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    config: PathBuf,
}

/// Transient per-user conversation state. A user with no entry in the
/// session map is idle. The id is embedded in callback data so replayed
/// or outdated button presses can be told apart from live ones.
#[derive(Clone, Debug)]
struct Session {
    id: String,
    state: SessionState,
}

#[derive(Clone, Debug)]
enum SessionState {
    LinkPending { link: String },
    AwaitingStatusText { link: String },
}

impl Session {
    fn link(&self) -> &str {
        match &self.state {
            SessionState::LinkPending { link } | SessionState::AwaitingStatusText { link } => link,
        }
    }
}

struct AppState {
    config: Config,
    store: LedgerStore,
    sessions: Mutex<HashMap<u64, Session>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    fs::create_dir_all(&config.data_dir).context("create data_dir")?;

    let bot = Bot::new(config.token.clone());

    let backup = config
        .backup_chat_id
        .map(|chat_id| BackupNotifier::new(bot.clone(), ChatId(chat_id)));
    if backup.is_none() {
        info!("backup chat not configured; backups disabled");
    }

    let store = LedgerStore::new(
        config.data_dir.clone(),
        config.backup_on_status_update,
        backup,
    );

    let state = Arc::new(AppState {
        config,
        store,
        sessions: Mutex::new(HashMap::new()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handlers::handle_message))
        .branch(Update::filter_callback_query().endpoint(callback_handlers::handle_callback));

    info!("bot started");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config: Config = toml::from_str(&contents).context("parse config")?;
    Ok(config)
}

fn build_status_keyboard(session_id: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = messages::FIXED_STATUSES
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            vec![InlineKeyboardButton::callback(
                label.to_string(),
                format!("st:{}:{}", session_id, idx + 1),
            )]
        })
        .collect();
    rows.push(vec![
        InlineKeyboardButton::callback(
            messages::BTN_CUSTOM_STATUS,
            format!("st:{}:free", session_id),
        ),
        InlineKeyboardButton::callback(messages::BTN_NO_STATUS, format!("st:{}:plain", session_id)),
    ]);
    InlineKeyboardMarkup::new(rows)
}

fn build_duplicate_keyboard(session_id: &str, policy: DuplicatePolicy) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if policy == DuplicatePolicy::OfferDelete {
        rows.push(vec![InlineKeyboardButton::callback(
            messages::BTN_DELETE,
            format!("st:{}:del", session_id),
        )]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        messages::BTN_NEW_LINK,
        format!("st:{}:new", session_id),
    )]);
    InlineKeyboardMarkup::new(rows)
}

// Offered after a successful add. The session was cleared on commit, so
// the delete button here lands in the stale branch; the new-link button
// works from any state.
fn build_followup_keyboard(session_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            messages::BTN_NEW_LINK,
            format!("st:{}:new", session_id),
        )],
        vec![InlineKeyboardButton::callback(
            messages::BTN_DELETE,
            format!("st:{}:del", session_id),
        )],
    ])
}

fn parse_command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let cmd = first.trim_start_matches('/');
    Some(cmd.split('@').next().unwrap_or(cmd))
}

fn short_id() -> String {
    let id = Uuid::new_v4().to_string();
    id.split('-').next().unwrap_or(&id).to_string()
}
