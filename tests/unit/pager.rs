#[path = "../common/mod.rs"]
mod common;

use common::{history, msg, FakeBackend};
use guild_chat::error::ChatError;
use guild_chat::pager::{LoadOutcome, MessagePager};

#[tokio::test]
async fn test_load_initial_stores_ascending_and_sets_has_more() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 5));
    let pager = MessagePager::new(fake.clone(), 3);

    let outcome = pager.load_initial(1).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded(3));
    assert_eq!(pager.message_ids().await, vec![3, 4, 5]);
    assert!(pager.has_more().await);
    assert_eq!(pager.conversation().await, Some(1));
}

#[tokio::test]
async fn test_load_initial_short_page_has_no_more() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 2));
    let pager = MessagePager::new(fake.clone(), 3);

    pager.load_initial(1).await.unwrap();
    assert_eq!(pager.message_ids().await, vec![1, 2]);
    assert!(!pager.has_more().await);
}

#[tokio::test]
async fn test_load_older_prepends_previous_page() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 7, 12));
    let pager = MessagePager::new(fake.clone(), 3);

    pager.load_initial(1).await.unwrap();
    assert_eq!(pager.message_ids().await, vec![10, 11, 12]);

    let outcome = pager.load_older().await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded(3));
    assert_eq!(pager.message_ids().await, vec![7, 8, 9, 10, 11, 12]);
    assert_eq!(fake.fetch_calls.lock().unwrap().last(), Some(&(1, Some(10))));
}

#[tokio::test]
async fn test_overlapping_pages_stay_sorted_and_unique() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 20, 23));
    let pager = MessagePager::new(fake.clone(), 4);
    pager.load_initial(1).await.unwrap();

    // pages that overlap what is held and each other, newest-first as the backend sends them
    fake.scripted_pages.lock().unwrap().extend(vec![
        vec![msg(1, 21, 210), msg(1, 19, 190), msg(1, 18, 180), msg(1, 17, 170)],
        vec![msg(1, 18, 180), msg(1, 16, 160), msg(1, 15, 150), msg(1, 14, 140)],
        vec![msg(1, 14, 140), msg(1, 13, 130)],
    ]);
    for _ in 0..3 {
        pager.load_older().await.unwrap();
    }

    let messages = pager.messages().await;
    let ids: Vec<_> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, (13..=23).collect::<Vec<_>>());
    assert!(messages
        .windows(2)
        .all(|w| w[0].order_key() < w[1].order_key()));
    assert!(!pager.has_more().await);
}

#[tokio::test]
async fn test_load_older_noop_without_more_history() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 2));
    let pager = MessagePager::new(fake.clone(), 3);
    pager.load_initial(1).await.unwrap();

    assert_eq!(pager.load_older().await.unwrap(), LoadOutcome::Skipped);
    assert_eq!(fake.fetches_for(1), 1);
}

#[tokio::test]
async fn test_load_older_without_conversation_is_skipped() {
    let fake = FakeBackend::new();
    let pager = MessagePager::new(fake.clone(), 3);
    assert_eq!(pager.load_older().await.unwrap(), LoadOutcome::Skipped);
    assert!(fake.fetch_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_load_older_reentrancy_guard() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 9));
    let pager = MessagePager::new(fake.clone(), 3);
    pager.load_initial(1).await.unwrap();

    let gate = fake.gate(1);
    let background = pager.clone();
    let handle = tokio::spawn(async move { background.load_older().await });
    fake.wait_for_fetches(1, 2).await;

    assert!(pager.is_loading().await);
    assert_eq!(pager.load_older().await.unwrap(), LoadOutcome::Skipped);
    assert_eq!(fake.fetches_for(1), 2);

    gate.notify_one();
    assert_eq!(handle.await.unwrap().unwrap(), LoadOutcome::Loaded(3));
    assert_eq!(pager.message_ids().await, vec![4, 5, 6, 7, 8, 9]);
}

#[tokio::test]
async fn test_failed_load_older_leaves_state_untouched() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 6));
    let pager = MessagePager::new(fake.clone(), 3);
    pager.load_initial(1).await.unwrap();

    *fake.fail_fetch.lock().unwrap() = Some(ChatError::Network("timeout".to_string()));
    let err = pager.load_older().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(pager.message_ids().await, vec![4, 5, 6]);
    assert!(pager.has_more().await);
    assert!(!pager.is_loading().await);

    *fake.fail_fetch.lock().unwrap() = None;
    assert_eq!(pager.load_older().await.unwrap(), LoadOutcome::Loaded(3));
    assert_eq!(pager.message_ids().await, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_stale_initial_page_is_discarded() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 3));
    fake.set_history(2, history(2, 50, 52));
    let pager = MessagePager::new(fake.clone(), 3);

    let gate = fake.gate(1);
    let background = pager.clone();
    let handle = tokio::spawn(async move { background.load_initial(1).await });
    fake.wait_for_fetches(1, 1).await;

    pager.load_initial(2).await.unwrap();
    gate.notify_one();

    assert_eq!(handle.await.unwrap().unwrap(), LoadOutcome::Stale);
    assert_eq!(pager.conversation().await, Some(2));
    assert_eq!(pager.message_ids().await, vec![50, 51, 52]);
}

#[tokio::test]
async fn test_push_during_initial_load_survives_first_page() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 3));
    let pager = MessagePager::new(fake.clone(), 3);

    let gate = fake.gate(1);
    let background = pager.clone();
    let handle = tokio::spawn(async move { background.load_initial(1).await });
    fake.wait_for_fetches(1, 1).await;

    assert!(pager.receive_push(msg(1, 99, 9_999)).await);
    gate.notify_one();

    assert_eq!(handle.await.unwrap().unwrap(), LoadOutcome::Loaded(3));
    assert_eq!(pager.message_ids().await, vec![1, 2, 3, 99]);
}

#[tokio::test]
async fn test_receive_push_appends_and_dedups() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 3));
    let pager = MessagePager::new(fake.clone(), 50);
    pager.load_initial(1).await.unwrap();

    assert!(pager.receive_push(msg(1, 4, 40)).await);
    assert!(!pager.receive_push(msg(1, 4, 40)).await);
    assert!(!pager.receive_push(msg(2, 5, 50)).await);
    assert_eq!(pager.message_ids().await, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_receive_push_keeps_time_order() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 3));
    let pager = MessagePager::new(fake.clone(), 50);
    pager.load_initial(1).await.unwrap();

    // arrives late but was created between 1 and 2
    assert!(pager.receive_push(msg(1, 9, 15)).await);
    assert_eq!(pager.message_ids().await, vec![1, 9, 2, 3]);
}

#[tokio::test]
async fn test_receive_push_rejects_empty_message() {
    let fake = FakeBackend::new();
    let pager = MessagePager::new(fake.clone(), 50);
    pager.load_initial(1).await.unwrap();

    let mut empty = msg(1, 4, 40);
    empty.text = Some("   ".to_string());
    assert!(!pager.receive_push(empty).await);
    assert!(pager.messages().await.is_empty());
}

#[tokio::test]
async fn test_reset_forgets_conversation() {
    let fake = FakeBackend::new();
    fake.set_history(1, history(1, 1, 3));
    let pager = MessagePager::new(fake.clone(), 50);
    pager.load_initial(1).await.unwrap();

    pager.reset().await;
    assert_eq!(pager.conversation().await, None);
    assert!(pager.messages().await.is_empty());
    assert!(!pager.receive_push(msg(1, 4, 40)).await);
}
