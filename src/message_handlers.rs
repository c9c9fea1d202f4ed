use super::*;
use std::collections::BTreeMap;

use log::error;
use teloxide::types::InputFile;

use crate::extract::extract_post_link;
use crate::ledger::LedgerError;

pub(super) async fn handle_message(
    bot: Bot,
    msg: Message,
    state: std::sync::Arc<AppState>,
) -> Result<()> {
    let user = match msg.from() {
        Some(user) => user.clone(),
        None => return Ok(()),
    };
    let user_id = user.id.0;
    let chat_id = msg.chat.id;

    // Commands are stateless and win over any pending session state.
    if let Some(text) = msg.text() {
        match parse_command(text) {
            Some("start") | Some("help") => {
                return handle_start(&bot, chat_id, &state, user_id, &user.first_name).await;
            }
            Some("export") => {
                return handle_export(&bot, chat_id, &state, user_id).await;
            }
            Some("stats") => {
                return handle_stats(&bot, chat_id, &state, user_id).await;
            }
            _ => {
                // Unknown command or plain text, fall through.
            }
        }
    }

    let content = msg
        .text()
        .or_else(|| msg.caption())
        .map(|text| text.to_string());

    // A pending free-text status consumes the next text verbatim.
    if let Some(content) = &content {
        let awaiting = {
            let mut sessions = state.sessions.lock().await;
            match sessions.remove(&user_id) {
                Some(Session {
                    state: SessionState::AwaitingStatusText { link },
                    ..
                }) => Some(link),
                Some(other) => {
                    sessions.insert(user_id, other);
                    None
                }
                None => None,
            }
        };
        if let Some(link) = awaiting {
            return commit_add(&bot, chat_id, &state, user_id, &link, content).await;
        }
    }

    // Posts forwarded from a public channel carry the link implicitly.
    if let Some(chat) = msg.forward_from_chat() {
        if let (Some(username), Some(message_id)) = (chat.username(), msg.forward_from_message_id())
        {
            let link = format!("https://t.me/{}/{}", username, message_id);
            return handle_link(&bot, chat_id, &state, user_id, link).await;
        }
    }

    match content.as_deref().and_then(extract_post_link) {
        Some(link) => handle_link(&bot, chat_id, &state, user_id, link).await,
        None => {
            bot.send_message(chat_id, messages::NO_LINK_FOUND).await?;
            Ok(())
        }
    }
}

async fn handle_start(
    bot: &Bot,
    chat_id: ChatId,
    state: &std::sync::Arc<AppState>,
    user_id: u64,
    first_name: &str,
) -> Result<()> {
    if let Err(err) = state.store.ensure_exists(user_id).await {
        error!("ensure ledger failed for user {}: {}", user_id, err);
        bot.send_message(chat_id, messages::RETRY_LATER).await?;
        return Ok(());
    }
    bot.send_message(chat_id, messages::start_text(first_name))
        .await?;
    Ok(())
}

async fn handle_export(
    bot: &Bot,
    chat_id: ChatId,
    state: &std::sync::Arc<AppState>,
    user_id: u64,
) -> Result<()> {
    let count = match state.store.count(user_id).await {
        Ok(count) => count,
        Err(err) => {
            error!("export failed for user {}: {}", user_id, err);
            bot.send_message(chat_id, messages::RETRY_LATER).await?;
            return Ok(());
        }
    };
    if count == 0 {
        bot.send_message(chat_id, messages::EXPORT_EMPTY).await?;
        return Ok(());
    }
    send_table_document(bot, chat_id, state, user_id).await
}

async fn handle_stats(
    bot: &Bot,
    chat_id: ChatId,
    state: &std::sync::Arc<AppState>,
    user_id: u64,
) -> Result<()> {
    let (total, histogram) = match stats_for(state, user_id).await {
        Ok(stats) => stats,
        Err(err) => {
            error!("stats failed for user {}: {}", user_id, err);
            bot.send_message(chat_id, messages::RETRY_LATER).await?;
            return Ok(());
        }
    };
    if total == 0 {
        bot.send_message(chat_id, messages::STATS_EMPTY).await?;
        return Ok(());
    }
    bot.send_message(chat_id, build_stats_text(total, &histogram))
        .await?;
    Ok(())
}

async fn stats_for(
    state: &std::sync::Arc<AppState>,
    user_id: u64,
) -> Result<(usize, BTreeMap<String, usize>), LedgerError> {
    let total = state.store.count(user_id).await?;
    let histogram = state.store.status_histogram(user_id).await?;
    Ok((total, histogram))
}

pub(super) fn build_stats_text(total: usize, histogram: &BTreeMap<String, usize>) -> String {
    let mut text = format!("📊 Статистика твоих постов:\n\nВсего постов: {}\n", total);
    if !histogram.is_empty() {
        text.push_str("\nПо статусам:\n");
        for (status, count) in histogram {
            text.push_str(&format!("• {}: {}\n", status, count));
        }
    }
    text.trim_end().to_string()
}

/// Shared entry point for typed and forwarded links: checks the ledger
/// and opens a pending session with the matching keyboard.
pub(super) async fn handle_link(
    bot: &Bot,
    chat_id: ChatId,
    state: &std::sync::Arc<AppState>,
    user_id: u64,
    link: String,
) -> Result<()> {
    let known = match state.store.exists(user_id, &link).await {
        Ok(known) => known,
        Err(err) => {
            error!("ledger lookup failed for user {}: {}", user_id, err);
            bot.send_message(chat_id, messages::RETRY_LATER).await?;
            return Ok(());
        }
    };

    let session_id = short_id();
    let (text, keyboard) = if known {
        (
            messages::duplicate_prompt(&link),
            build_duplicate_keyboard(&session_id, state.config.duplicate_policy),
        )
    } else {
        (
            messages::new_post_prompt(&link),
            build_status_keyboard(&session_id),
        )
    };

    state.sessions.lock().await.insert(
        user_id,
        Session {
            id: session_id,
            state: SessionState::LinkPending { link },
        },
    );

    bot.send_message(chat_id, text).reply_markup(keyboard).await?;
    Ok(())
}

/// Commits a pending link with the given status. The caller has already
/// cleared the session, so a replayed button cannot reach this twice for
/// the same pending link.
pub(super) async fn commit_add(
    bot: &Bot,
    chat_id: ChatId,
    state: &std::sync::Arc<AppState>,
    user_id: u64,
    link: &str,
    status: &str,
) -> Result<()> {
    match state.store.add(user_id, link, status).await {
        Ok(number) => {
            send_table_document(bot, chat_id, state, user_id).await?;
            let session_id = short_id();
            bot.send_message(chat_id, messages::added_text(number, link, status))
                .reply_markup(build_followup_keyboard(&session_id))
                .await?;
        }
        Err(LedgerError::DuplicateLink) => {
            // Lost a race with an earlier commit; reopen in duplicate mode.
            let session_id = short_id();
            let keyboard = build_duplicate_keyboard(&session_id, state.config.duplicate_policy);
            state.sessions.lock().await.insert(
                user_id,
                Session {
                    id: session_id,
                    state: SessionState::LinkPending {
                        link: link.to_string(),
                    },
                },
            );
            bot.send_message(chat_id, messages::duplicate_prompt(link))
                .reply_markup(keyboard)
                .await?;
        }
        Err(LedgerError::Storage(err)) => {
            error!("add failed for user {}: {:#}", user_id, err);
            bot.send_message(chat_id, messages::RETRY_LATER).await?;
        }
    }
    Ok(())
}

pub(super) async fn send_table_document(
    bot: &Bot,
    chat_id: ChatId,
    state: &std::sync::Arc<AppState>,
    user_id: u64,
) -> Result<()> {
    let path = state.store.ledger_path(user_id);
    if !path.exists() {
        bot.send_message(chat_id, messages::EXPORT_EMPTY).await?;
        return Ok(());
    }
    let name = format!(
        "my_posts_{}.csv",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    bot.send_document(chat_id, InputFile::file(path).file_name(name))
        .await?;
    Ok(())
}
