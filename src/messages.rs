//! All user-facing strings in one place.

pub(super) const FIXED_STATUSES: [&str; 4] = [
    "Вышли первыми",
    "Вышли в течение часа",
    "Вышли в течение 2-3 часов",
    "Вышли больше, чем через 3 часа",
];

pub(super) const BTN_NEW_LINK: &str = "Отправить новую ссылку";
pub(super) const BTN_DELETE: &str = "Удалить этот пост";
pub(super) const BTN_CUSTOM_STATUS: &str = "Свой статус";
pub(super) const BTN_NO_STATUS: &str = "Без статуса";

pub(super) const NO_LINK_FOUND: &str =
    "❌ Я не нашёл действительную ссылку на пост в Telegram в твоём сообщении.\n\n\
     Отправь ссылку, перешли пост из канала/группы (с username) или отправь медиа \
     с подписью, содержащей ссылку.";

pub(super) const ASK_STATUS_TEXT: &str =
    "✍️ Напиши статус одним сообщением — я сохраню его как есть.";

pub(super) const READY_FOR_NEW: &str = "✅ Готов принять новую ссылку. Отправь её сюда.";

pub(super) const STALE_BUTTON: &str = "❌ Ошибка: ссылка не найдена. Отправь ссылку заново.";

pub(super) const DELETED: &str = "🗑 Пост удалён.";

pub(super) const DELETE_FAILED: &str = "❌ Не удалось удалить пост. Возможно, его уже нет.";

pub(super) const RETRY_LATER: &str =
    "❌ Произошла ошибка при сохранении. Попробуй ещё раз позже.";

pub(super) const UNKNOWN_ACTION: &str = "❌ Неизвестная команда. Попробуй снова.";

pub(super) const EXPORT_EMPTY: &str =
    "❌ Твоя база данных пуста. Добавь хотя бы один пост.";

pub(super) const STATS_EMPTY: &str = "📊 Твоя база данных пуста.";

pub(super) fn start_text(first_name: &str) -> String {
    format!(
        "👋 Привет, {}! Я бот для сохранения постов.\n\n\
         Просто перешли мне пост из Telegram или отправь ссылку.\n\n\
         Команды:\n\
         /export - выгрузить твою базу данных\n\
         /stats - статистика твоих постов",
        first_name
    )
}

pub(super) fn new_post_prompt(link: &str) -> String {
    format!("📌 Пост получен!\n\nСсылка: {}\n\nКогда он вышел?", link)
}

pub(super) fn duplicate_prompt(link: &str) -> String {
    format!(
        "⚠️ Ссылка уже есть в базе данных!\n\nСсылка: {}\n\nВыбери действие:",
        link
    )
}

pub(super) fn added_text(number: u32, link: &str, status: &str) -> String {
    let shown_status = if status.is_empty() { "—" } else { status };
    format!(
        "✅ Пост #{} добавлен в твою базу данных!\n\nСсылка: {}\nСтатус: {}",
        number, link, shown_status
    )
}
