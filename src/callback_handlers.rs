use super::*;

use log::error;

use crate::message_handlers::{commit_add, send_table_document};

pub(super) enum SessionTake {
    Taken(Session),
    Stale,
}

/// Removes the user's session only when the pressed button belongs to
/// it. A mismatched id means the button is from an older prompt; the
/// live session is put back untouched.
pub(super) fn take_matching_session(
    sessions: &mut HashMap<u64, Session>,
    user_id: u64,
    session_id: &str,
) -> SessionTake {
    match sessions.remove(&user_id) {
        Some(session) if session.id == session_id => SessionTake::Taken(session),
        Some(other) => {
            sessions.insert(user_id, other);
            SessionTake::Stale
        }
        None => SessionTake::Stale,
    }
}

pub(super) fn status_for_action(action: &str) -> Option<&'static str> {
    let index: usize = action.parse().ok()?;
    match index {
        1..=4 => Some(messages::FIXED_STATUSES[index - 1]),
        _ => None,
    }
}

pub(super) async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: std::sync::Arc<AppState>,
) -> Result<()> {
    let user_id = q.from.id.0;
    let (Some(data), Some(message)) = (q.data.clone(), q.message.clone()) else {
        bot.answer_callback_query(q.id).await?;
        return Ok(());
    };
    let chat_id = message.chat.id;

    let Some(rest) = data.strip_prefix("st:") else {
        bot.answer_callback_query(q.id).await?;
        return Ok(());
    };
    let mut parts = rest.splitn(2, ':');
    let session_id = parts.next().unwrap_or("").to_string();
    let action = parts.next().unwrap_or("").to_string();

    // "New link" is an unconditional reset to idle; it needs no live
    // session and never mutates the ledger.
    if action == "new" {
        state.sessions.lock().await.remove(&user_id);
        // Edits fail on a repeated press (unchanged text); that is fine.
        let _ = bot
            .edit_message_text(chat_id, message.id, messages::READY_FOR_NEW)
            .await;
        bot.answer_callback_query(q.id).await?;
        return Ok(());
    }

    let session = {
        let mut sessions = state.sessions.lock().await;
        match take_matching_session(&mut sessions, user_id, &session_id) {
            SessionTake::Taken(session) => Some(session),
            SessionTake::Stale => None,
        }
    };
    let Some(session) = session else {
        let _ = bot
            .edit_message_text(chat_id, message.id, messages::STALE_BUTTON)
            .await;
        bot.answer_callback_query(q.id).await?;
        return Ok(());
    };
    let link = session.link().to_string();

    match action.as_str() {
        "free" => {
            state.sessions.lock().await.insert(
                user_id,
                Session {
                    id: session.id,
                    state: SessionState::AwaitingStatusText { link },
                },
            );
            bot.edit_message_text(chat_id, message.id, messages::ASK_STATUS_TEXT)
                .await?;
        }
        "plain" => {
            commit_add(&bot, chat_id, &state, user_id, &link, "").await?;
        }
        "del" => match state.store.delete(user_id, &link).await {
            Ok(true) => {
                bot.send_message(chat_id, messages::DELETED).await?;
                send_table_document(&bot, chat_id, &state, user_id).await?;
            }
            Ok(false) => {
                bot.edit_message_text(chat_id, message.id, messages::DELETE_FAILED)
                    .await?;
            }
            Err(err) => {
                error!("delete failed for user {}: {}", user_id, err);
                bot.send_message(chat_id, messages::RETRY_LATER).await?;
            }
        },
        other => {
            if let Some(status) = status_for_action(other) {
                commit_add(&bot, chat_id, &state, user_id, &link, status).await?;
            } else {
                bot.edit_message_text(chat_id, message.id, messages::UNKNOWN_ACTION)
                    .await?;
            }
        }
    }

    bot.answer_callback_query(q.id).await?;
    Ok(())
}
