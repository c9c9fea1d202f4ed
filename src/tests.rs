use super::*;
use std::collections::BTreeMap;

use tempfile::TempDir;
use teloxide::types::InlineKeyboardButtonKind;

use crate::callback_handlers::{status_for_action, take_matching_session, SessionTake};
use crate::extract::extract_post_link;
use crate::ledger::{
    add_record_sync, delete_record_sync, ensure_ledger_sync, read_records, update_status_sync,
    AddOutcome, LedgerError, ModifyOutcome,
};
use crate::message_handlers::build_stats_text;

fn pending(link: &str) -> Session {
    Session {
        id: "abc".to_string(),
        state: SessionState::LinkPending {
            link: link.to_string(),
        },
    }
}

#[test]
fn extract_finds_link_inside_surrounding_text() {
    let text = "check this out https://t.me/news/55 cool post";
    assert_eq!(
        extract_post_link(text),
        Some("https://t.me/news/55".to_string())
    );
}

#[test]
fn extract_takes_first_of_multiple_links() {
    let text = "https://t.me/first/1 and https://t.me/second/2";
    assert_eq!(
        extract_post_link(text),
        Some("https://t.me/first/1".to_string())
    );
}

#[test]
fn extract_is_idempotent() {
    let link = extract_post_link("see https://t.me/news/55 here").unwrap();
    assert_eq!(extract_post_link(&link), Some(link.clone()));
}

#[test]
fn extract_accepts_both_hosts_and_bare_handles() {
    assert_eq!(
        extract_post_link("https://telegram.me/some_channel"),
        Some("https://telegram.me/some_channel".to_string())
    );
    assert_eq!(
        extract_post_link("http://t.me/chan"),
        Some("http://t.me/chan".to_string())
    );
}

#[test]
fn extract_rejects_foreign_hosts_and_plain_text() {
    assert_eq!(extract_post_link("https://example.com/chan/1"), None);
    assert_eq!(extract_post_link("no links here"), None);
    assert_eq!(extract_post_link(""), None);
}

#[test]
fn ensure_ledger_writes_header_exactly_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_7.csv");
    assert!(ensure_ledger_sync(&path).unwrap());
    assert!(!ensure_ledger_sync(&path).unwrap());
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("№,Ссылка,Статус,Дата добавления"));
    assert_eq!(contents.lines().count(), 1);
    assert!(read_records(&path).unwrap().is_empty());
}

#[test]
fn add_assigns_dense_numbers_and_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_1.csv");
    assert_eq!(
        add_record_sync(&path, "https://t.me/chan/1", "Вышли первыми").unwrap(),
        AddOutcome::Added(1)
    );
    assert_eq!(
        add_record_sync(&path, "https://t.me/chan/2", "").unwrap(),
        AddOutcome::Added(2)
    );

    let records = read_records(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].number, 1);
    assert_eq!(records[0].link, "https://t.me/chan/1");
    assert_eq!(records[0].status, "Вышли первыми");
    assert_eq!(records[0].added_at.len(), "2025-01-01 00:00:00".len());
    assert_eq!(records[1].number, 2);
    assert_eq!(records[1].status, "");
}

#[test]
fn add_rejects_duplicate_link() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_1.csv");
    let link = "https://t.me/chan/1";
    assert_eq!(add_record_sync(&path, link, "").unwrap(), AddOutcome::Added(1));
    assert_eq!(
        add_record_sync(&path, link, "Вышли первыми").unwrap(),
        AddOutcome::Duplicate
    );
    assert_eq!(read_records(&path).unwrap().len(), 1);
}

#[test]
fn delete_renumbers_trailing_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_1.csv");
    for i in 1..=5 {
        add_record_sync(&path, &format!("https://t.me/chan/{}", i), "").unwrap();
    }

    assert_eq!(
        delete_record_sync(&path, "https://t.me/chan/3").unwrap(),
        ModifyOutcome::Applied
    );

    let records = read_records(&path).unwrap();
    let numbers: Vec<u32> = records.iter().map(|r| r.number).collect();
    let links: Vec<&str> = records.iter().map(|r| r.link.as_str()).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(
        links,
        vec![
            "https://t.me/chan/1",
            "https://t.me/chan/2",
            "https://t.me/chan/4",
            "https://t.me/chan/5",
        ]
    );
}

#[test]
fn delete_then_readd_starts_numbering_over() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_1.csv");
    let link = "https://t.me/chan/1";
    add_record_sync(&path, link, "").unwrap();
    assert_eq!(
        delete_record_sync(&path, link).unwrap(),
        ModifyOutcome::Applied
    );
    assert_eq!(
        add_record_sync(&path, link, "Вышли в течение часа").unwrap(),
        AddOutcome::Added(1)
    );
}

#[test]
fn delete_of_missing_link_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_1.csv");
    assert_eq!(
        delete_record_sync(&path, "https://t.me/chan/1").unwrap(),
        ModifyOutcome::NotFound
    );
}

#[test]
fn update_status_keeps_number_and_date() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_1.csv");
    let link = "https://t.me/chan/1";
    add_record_sync(&path, link, "").unwrap();
    let before = read_records(&path).unwrap()[0].clone();

    assert_eq!(
        update_status_sync(&path, link, "Вышли первыми").unwrap(),
        ModifyOutcome::Applied
    );
    let after = read_records(&path).unwrap()[0].clone();
    assert_eq!(after.number, before.number);
    assert_eq!(after.added_at, before.added_at);
    assert_eq!(after.status, "Вышли первыми");

    assert_eq!(
        update_status_sync(&path, "https://t.me/chan/9", "x").unwrap(),
        ModifyOutcome::NotFound
    );
}

#[tokio::test]
async fn store_reports_empty_without_creating_a_file() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(dir.path().to_path_buf(), false, None);
    assert_eq!(store.count(5).await.unwrap(), 0);
    assert!(store.list(5).await.unwrap().is_empty());
    assert!(store.status_histogram(5).await.unwrap().is_empty());
    assert!(!store.ledger_path(5).exists());
}

#[tokio::test]
async fn store_add_count_histogram_scenario() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(dir.path().to_path_buf(), false, None);
    let number = store
        .add(42, "https://t.me/chan/100", "Вышли первыми")
        .await
        .unwrap();
    assert_eq!(number, 1);
    assert_eq!(store.count(42).await.unwrap(), 1);
    assert!(store.exists(42, "https://t.me/chan/100").await.unwrap());

    let histogram = store.status_histogram(42).await.unwrap();
    assert_eq!(histogram.len(), 1);
    assert_eq!(histogram.get("Вышли первыми"), Some(&1));
}

#[tokio::test]
async fn store_rejects_duplicate_add() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(dir.path().to_path_buf(), false, None);
    let link = "https://t.me/chan/1";
    store.add(1, link, "").await.unwrap();
    let err = store.add(1, link, "Вышли первыми").await.unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateLink));
    assert_eq!(store.count(1).await.unwrap(), 1);
}

#[tokio::test]
async fn store_histogram_skips_unset_statuses() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(dir.path().to_path_buf(), false, None);
    store.add(1, "https://t.me/chan/1", "").await.unwrap();
    store
        .add(1, "https://t.me/chan/2", "Вышли первыми")
        .await
        .unwrap();
    store
        .add(1, "https://t.me/chan/3", "Вышли первыми")
        .await
        .unwrap();

    let histogram = store.status_histogram(1).await.unwrap();
    assert_eq!(histogram.len(), 1);
    assert_eq!(histogram.get("Вышли первыми"), Some(&2));
}

#[tokio::test]
async fn store_keeps_users_isolated() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::new(dir.path().to_path_buf(), false, None);
    store.add(1, "https://t.me/chan/1", "").await.unwrap();
    assert!(!store.exists(2, "https://t.me/chan/1").await.unwrap());
    assert_eq!(store.count(2).await.unwrap(), 0);
    assert_eq!(store.add(2, "https://t.me/chan/1", "").await.unwrap(), 1);
}

#[test]
fn parse_command_strips_slash_and_mention() {
    assert_eq!(parse_command("/start"), Some("start"));
    assert_eq!(parse_command("/stats@posttrack_bot"), Some("stats"));
    assert_eq!(parse_command("/export extra words"), Some("export"));
    assert_eq!(parse_command("hello"), None);
    assert_eq!(parse_command(""), None);
}

#[test]
fn status_for_action_maps_fixed_labels() {
    assert_eq!(status_for_action("1"), Some(messages::FIXED_STATUSES[0]));
    assert_eq!(status_for_action("4"), Some(messages::FIXED_STATUSES[3]));
    assert_eq!(status_for_action("0"), None);
    assert_eq!(status_for_action("5"), None);
    assert_eq!(status_for_action("free"), None);
}

#[test]
fn stale_buttons_never_consume_a_live_session() {
    let mut sessions = HashMap::new();
    sessions.insert(9, pending("https://t.me/a/1"));

    // Wrong id: the live session stays for the prompt it belongs to.
    assert!(matches!(
        take_matching_session(&mut sessions, 9, "zzz"),
        SessionTake::Stale
    ));
    assert!(sessions.contains_key(&9));

    // Matching id consumes it.
    assert!(matches!(
        take_matching_session(&mut sessions, 9, "abc"),
        SessionTake::Taken(_)
    ));

    // A replay of the same button now finds nothing to commit.
    assert!(matches!(
        take_matching_session(&mut sessions, 9, "abc"),
        SessionTake::Stale
    ));
}

#[test]
fn status_keyboard_lists_fixed_and_extra_options() {
    let kb = build_status_keyboard("sid");
    assert_eq!(kb.inline_keyboard.len(), 5);
    for (idx, label) in messages::FIXED_STATUSES.iter().enumerate() {
        let button = &kb.inline_keyboard[idx][0];
        assert_eq!(button.text, *label);
        match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => {
                assert_eq!(data, &format!("st:sid:{}", idx + 1));
            }
            other => panic!("unexpected button kind: {:?}", other),
        }
    }
    let extra: Vec<&str> = kb.inline_keyboard[4].iter().map(|b| b.text.as_str()).collect();
    assert_eq!(extra, vec![messages::BTN_CUSTOM_STATUS, messages::BTN_NO_STATUS]);
}

#[test]
fn duplicate_keyboard_follows_policy() {
    let offer = build_duplicate_keyboard("sid", DuplicatePolicy::OfferDelete);
    assert_eq!(offer.inline_keyboard.len(), 2);
    assert_eq!(offer.inline_keyboard[0][0].text, messages::BTN_DELETE);
    assert_eq!(offer.inline_keyboard[1][0].text, messages::BTN_NEW_LINK);

    let new_only = build_duplicate_keyboard("sid", DuplicatePolicy::ForceNewOnly);
    assert_eq!(new_only.inline_keyboard.len(), 1);
    assert_eq!(new_only.inline_keyboard[0][0].text, messages::BTN_NEW_LINK);
}

#[test]
fn stats_text_lists_total_and_statuses() {
    let mut histogram = BTreeMap::new();
    histogram.insert("Вышли первыми".to_string(), 2);
    histogram.insert("Вышли в течение часа".to_string(), 1);

    let text = build_stats_text(3, &histogram);
    assert!(text.contains("Всего постов: 3"));
    assert!(text.contains("• Вышли первыми: 2"));
    assert!(text.contains("• Вышли в течение часа: 1"));

    let bare = build_stats_text(1, &BTreeMap::new());
    assert!(bare.contains("Всего постов: 1"));
    assert!(!bare.contains("По статусам"));
}
