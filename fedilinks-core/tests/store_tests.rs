use chrono::Utc;

use fedilinks_core::{
    AccessToken, AppRegistration, ArticleCache, SecretCodec, Slot, SlotStore,
};

fn codec() -> SecretCodec {
    SecretCodec::new([1u8; 32])
}

fn registration() -> AppRegistration {
    let codec = codec();
    AppRegistration {
        client_id: codec.seal("cid"),
        client_secret: codec.seal("csec"),
        instance: "example.social".into(),
    }
}

#[tokio::test]
async fn slots_survive_a_reload() {
    let dir = tempfile::tempdir().unwrap();

    let store = SlotStore::load_from_dir(dir.path()).await;
    store.put_registration(registration()).await;
    store
        .put_access_token(AccessToken {
            token: codec().seal("tok"),
        })
        .await;

    let reloaded = SlotStore::load_from_dir(dir.path()).await;
    let reg = reloaded.registration().await.expect("registration persisted");
    assert_eq!(reg.instance, "example.social");
    assert_eq!(codec().open(&reg.client_id).unwrap(), "cid");
    assert!(reloaded.access_token().await.is_some());
    assert!(reloaded.auth_code().await.is_none());
}

#[tokio::test]
async fn mutation_stamps_the_slot_modified_time() {
    let store = SlotStore::in_memory();
    assert!(store.modified_at(Slot::Registration).await.is_none());

    let before = Utc::now();
    store.put_registration(registration()).await;
    let stamped = store
        .modified_at(Slot::Registration)
        .await
        .expect("modified time set");
    assert!(stamped >= before);
    assert!(store.modified_at(Slot::AccessToken).await.is_none());

    store.clear(Slot::Registration).await;
    assert!(store.modified_at(Slot::Registration).await.is_none());
}

#[tokio::test]
async fn clear_all_empties_every_slot_on_disk_too() {
    let dir = tempfile::tempdir().unwrap();

    let store = SlotStore::load_from_dir(dir.path()).await;
    store.put_registration(registration()).await;
    store
        .put_article_cache(ArticleCache {
            favorite_cursor: Some("5".into()),
            bookmark_cursor: None,
            posts: Vec::new(),
            last_fetched_at: Utc::now(),
        })
        .await;
    store.clear_all().await;

    let reloaded = SlotStore::load_from_dir(dir.path()).await;
    assert!(reloaded.registration().await.is_none());
    assert!(reloaded.auth_code().await.is_none());
    assert!(reloaded.access_token().await.is_none());
    assert!(reloaded.article_cache().await.is_none());
}

#[tokio::test]
async fn load_falls_back_to_tmp_file_on_corrupted_slot() {
    let dir = tempfile::tempdir().unwrap();

    // Seed a valid store, keep the tmp sibling, then corrupt the main file.
    let store = SlotStore::load_from_dir(dir.path()).await;
    store.put_registration(registration()).await;
    drop(store);

    let main = dir.path().join("registration.json");
    let tmp = dir.path().join("registration.json.tmp");
    let good = tokio::fs::read(&main).await.unwrap();
    tokio::fs::write(&tmp, &good).await.unwrap();
    tokio::fs::write(&main, b"{ this is not json ").await.unwrap();

    let reloaded = SlotStore::load_from_dir(dir.path()).await;
    let reg = reloaded
        .registration()
        .await
        .expect("should fall back to tmp file when main is corrupted");
    assert_eq!(reg.instance, "example.social");
}

#[tokio::test]
async fn mutations_broadcast_slot_changes() {
    let store = SlotStore::in_memory();
    let mut changes = store.subscribe();

    store.put_registration(registration()).await;
    let change = changes.recv().await.unwrap();
    assert_eq!(change.slot, Slot::Registration);
    assert!(change.modified_at.is_some());

    store.clear(Slot::Registration).await;
    let change = changes.recv().await.unwrap();
    assert_eq!(change.slot, Slot::Registration);
    assert!(change.modified_at.is_none());

    // Clearing an already-empty slot is not a change.
    store.clear(Slot::AuthCode).await;
    assert!(changes.try_recv().is_err());
}
