mod common;

use std::time::Duration;

use linkdesk::chat::model::Role;
use linkdesk::store::{StoreClient, StoreError};

fn fresh_store(base_url: &str) -> StoreClient {
    StoreClient::with_cache_ttl(base_url, Duration::ZERO)
}

#[tokio::test]
async fn conversation_lifecycle() {
    let app = common::spawn_app().await;
    let store = fresh_store(&app.base_url);

    // No prior conversation: created with the right pair, nothing unread.
    let convo = store.create_conversation("u1", Some("a1")).await.unwrap();
    let ids: Vec<_> = convo.participant_ids().collect();
    assert_eq!(ids, ["u1", "a1"]);
    assert_eq!(convo.unread_count, 0);
    assert!(convo.last_message.is_none());

    // User says hello: the conversation tracks the last message and unread.
    let sent = store
        .send_message(convo.id, "u1", "Hello", Role::User)
        .await
        .unwrap();
    assert_eq!(sent.text, "Hello");
    assert!(!sent.read);

    let listed = store.get_conversations("a1", true).await.unwrap();
    let found = listed.iter().find(|c| c.id == convo.id).unwrap();
    assert_eq!(found.unread_count, 1);
    assert_eq!(found.last_message.as_ref().unwrap().text, "Hello");

    // Admin reads: unread resets, the message flips to read.
    let outcome = store.mark_read(convo.id, "a1").await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.messages_updated, 1);

    // Idempotent: nothing left to update, unread stays zero.
    let again = store.mark_read(convo.id, "a1").await.unwrap();
    assert!(again.success);
    assert_eq!(again.messages_updated, 0);

    let listed = store.get_conversations("a1", true).await.unwrap();
    assert_eq!(listed.iter().find(|c| c.id == convo.id).unwrap().unread_count, 0);

    let messages = store.get_messages(convo.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].read);
}

#[tokio::test]
async fn sent_message_is_read_back_exactly_once() {
    let app = common::spawn_app().await;
    let store = fresh_store(&app.base_url);

    let convo = store.create_conversation("u1", Some("a1")).await.unwrap();
    let sent = store
        .send_message(convo.id, "u1", "exactly once", Role::User)
        .await
        .unwrap();

    let messages = store.get_messages(convo.id).await.unwrap();
    let matching: Vec<_> = messages.iter().filter(|m| m.id == sent.id).collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].text, "exactly once");
    assert_eq!(matching[0].sender, "u1");
    assert_eq!(matching[0].sender_type, Role::User);
}

#[tokio::test]
async fn messages_come_back_in_send_order() {
    let app = common::spawn_app().await;
    let store = fresh_store(&app.base_url);

    let convo = store.create_conversation("u1", Some("a1")).await.unwrap();
    for text in ["one", "two", "three"] {
        store.send_message(convo.id, "u1", text, Role::User).await.unwrap();
    }

    let messages = store.get_messages(convo.id).await.unwrap();
    let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["one", "two", "three"]);
    assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn create_conversation_is_idempotent_even_when_racing() {
    let app = common::spawn_app().await;
    let store = fresh_store(&app.base_url);

    let first = store.create_conversation("u1", Some("a1")).await.unwrap();
    let second = store.create_conversation("u1", Some("a1")).await.unwrap();
    assert_eq!(first.id, second.id);

    // Two creates in the same race window converge on one conversation.
    let (left, right) = tokio::join!(
        store.create_conversation("u2", Some("a1")),
        store.create_conversation("u2", Some("a1")),
    );
    assert_eq!(left.unwrap().id, right.unwrap().id);

    let all = store.get_conversations("a1", true).await.unwrap();
    assert_eq!(all.iter().filter(|c| c.is_participant("u2")).count(), 1);
}

#[tokio::test]
async fn create_without_admin_pairs_with_the_first_admin() {
    let app = common::spawn_app().await;
    let store = fresh_store(&app.base_url);

    let convo = store.create_conversation("u1", None).await.unwrap();
    let ids: Vec<_> = convo.participant_ids().collect();
    assert_eq!(ids, ["u1", "a1"]);
}

#[tokio::test]
async fn listing_filters_users_but_not_admins() {
    let app = common::spawn_app().await;
    let store = fresh_store(&app.base_url);

    let mine = store.create_conversation("u1", Some("a1")).await.unwrap();
    let theirs = store.create_conversation("u2", Some("a1")).await.unwrap();

    let for_user = store.get_conversations("u1", false).await.unwrap();
    assert!(for_user.iter().all(|c| c.is_participant("u1")));
    assert!(for_user.iter().any(|c| c.id == mine.id));
    assert!(!for_user.iter().any(|c| c.id == theirs.id));

    let for_admin = store.get_conversations("a1", true).await.unwrap();
    assert!(for_admin.iter().any(|c| c.id == mine.id));
    assert!(for_admin.iter().any(|c| c.id == theirs.id));

    // Most recently active first.
    tokio::time::sleep(Duration::from_millis(10)).await;
    store.send_message(mine.id, "u1", "bump", Role::User).await.unwrap();
    let for_admin = store.get_conversations("a1", true).await.unwrap();
    assert_eq!(for_admin[0].id, mine.id);
}

#[tokio::test]
async fn error_taxonomy_is_distinguishable() {
    let app = common::spawn_app().await;
    let store = fresh_store(&app.base_url);
    let convo = store.create_conversation("u1", Some("a1")).await.unwrap();

    let err = store.get_conversations("ghost", false).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");

    let err = store.create_conversation("ghost", None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");

    let err = store.get_messages(uuid::Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "{err}");

    let err = store
        .send_message(convo.id, "u2", "not my thread", Role::User)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized(_)), "{err}");

    let err = store.send_message(convo.id, "u1", "", Role::User).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "{err}");

    let err = store.mark_read(convo.id, "u2").await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized(_)), "{err}");
}

#[tokio::test]
async fn message_cache_absorbs_refetches_within_the_ttl() {
    let app = common::spawn_app().await;
    // Default five-second window.
    let caching = StoreClient::new(&app.base_url);

    let convo = caching.create_conversation("u1", Some("a1")).await.unwrap();
    caching.send_message(convo.id, "u1", "first", Role::User).await.unwrap();

    assert_eq!(caching.get_messages(convo.id).await.unwrap().len(), 1);

    // A write inside the window is invisible to the cached read...
    caching.send_message(convo.id, "u1", "second", Role::User).await.unwrap();
    assert_eq!(caching.get_messages(convo.id).await.unwrap().len(), 1);

    // ...but a fresh read sees it.
    let fresh = fresh_store(&app.base_url);
    assert_eq!(fresh.get_messages(convo.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn admins_listing_is_the_pairing_boundary() {
    let app = common::spawn_app().await;
    let store = fresh_store(&app.base_url);

    let admins = store.get_admins().await.unwrap();
    let ids: Vec<_> = admins.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["a1", "a2"]);
    assert!(admins.iter().all(|a| a.role == Role::Admin));
}
