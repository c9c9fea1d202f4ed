use std::path::PathBuf;

use log::{error, warn};
use teloxide::prelude::*;
use teloxide::types::InputFile;

/// Mirrors a user's table to an operator-configured chat after each
/// mutation. Delivery is detached from the mutation path: failures are
/// logged and never reach the caller.
#[derive(Clone)]
pub(super) struct BackupNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl BackupNotifier {
    pub(super) fn new(bot: Bot, chat_id: ChatId) -> Self {
        BackupNotifier { bot, chat_id }
    }

    pub(super) fn notify(&self, user_id: u64, path: PathBuf) {
        let bot = self.bot.clone();
        let chat_id = self.chat_id;
        tokio::spawn(async move {
            if !path.exists() {
                warn!("no ledger file to back up for user {}", user_id);
                return;
            }
            let name = format!(
                "backup_user_{}_{}.csv",
                user_id,
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            );
            let document = InputFile::file(path).file_name(name);
            if let Err(err) = bot.send_document(chat_id, document).await {
                error!("backup delivery for user {} failed: {}", user_id, err);
            }
        });
    }
}
