use std::sync::Arc;
use tazzina::cafes::{CafeStore, NewCafe, StoreError};
use tazzina::orm::{Db, auto_migrate};

async fn fresh_store() -> CafeStore {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    auto_migrate(db.clone()).await.unwrap();
    CafeStore::new(db)
}

fn sample(name: &str) -> NewCafe {
    NewCafe {
        name: name.to_string(),
        map_url: format!("https://maps.example.com/{}", name.to_lowercase()),
        img_url: format!("https://img.example.com/{}.jpg", name.to_lowercase()),
        location: "Peckham".to_string(),
        seats: Some("20-30".to_string()),
        has_toilet: true,
        has_wifi: true,
        has_sockets: false,
        can_take_calls: false,
        coffee_price: Some("£2.75".to_string()),
    }
}

#[tokio::test]
async fn test_create_assigns_increasing_ids() {
    let store = fresh_store().await;
    let first = store.create(sample("Rosetta")).await.unwrap();
    let second = store.create(sample("Prufrock")).await.unwrap();
    assert!(first.id > 0);
    assert!(second.id > first.id);
}

#[tokio::test]
async fn test_create_preserves_fields_verbatim() {
    let store = fresh_store().await;
    let created = store.create(sample("Rosetta")).await.unwrap();

    let fetched = store.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.name, "Rosetta");
    assert_eq!(fetched.seats.as_deref(), Some("20-30"));
    assert_eq!(fetched.coffee_price.as_deref(), Some("£2.75"));
    assert!(fetched.has_toilet);
    assert!(fetched.has_wifi);
    assert!(!fetched.has_sockets);
    assert!(!fetched.can_take_calls);
}

#[tokio::test]
async fn test_optional_fields_can_be_absent() {
    let store = fresh_store().await;
    let mut cafe = sample("Spartivento");
    cafe.seats = None;
    cafe.coffee_price = None;

    let created = store.create(cafe).await.unwrap();
    let fetched = store.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.seats, None);
    assert_eq!(fetched.coffee_price, None);
}

#[tokio::test]
async fn test_list_all_returns_insertion_order() {
    let store = fresh_store().await;
    store.create(sample("Milkman")).await.unwrap();
    store.create(sample("Allpress")).await.unwrap();
    store.create(sample("Brickwood")).await.unwrap();

    let names: Vec<String> = store
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|cafe| cafe.name)
        .collect();
    // Insertion order, not alphabetical.
    assert_eq!(names, vec!["Milkman", "Allpress", "Brickwood"]);
}

#[tokio::test]
async fn test_duplicate_name_is_a_unique_violation() {
    let store = fresh_store().await;
    store.create(sample("Rosetta")).await.unwrap();

    let result = store.create(sample("Rosetta")).await;
    assert!(matches!(result, Err(StoreError::UniqueViolation(_))));

    let err = store.create(sample("Rosetta")).await.unwrap_err();
    assert!(err.to_string().contains("unique"));

    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_removes_only_that_row() {
    let store = fresh_store().await;
    let keep = store.create(sample("Keeper")).await.unwrap();
    let drop = store.create(sample("Dropper")).await.unwrap();

    store.delete_by_id(drop.id).await.unwrap();

    let remaining = store.list_all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep.id);
    assert_eq!(store.get_by_id(drop.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_delete_of_unknown_id_is_a_noop() {
    let store = fresh_store().await;
    store.create(sample("Solo")).await.unwrap();

    store.delete_by_id(999_999).await.unwrap();
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_deleted_ids_are_never_reused() {
    let store = fresh_store().await;
    let first = store.create(sample("Ephemeral")).await.unwrap();
    store.delete_by_id(first.id).await.unwrap();

    let second = store.create(sample("Successor")).await.unwrap();
    assert_ne!(second.id, first.id);
    assert!(second.id > first.id);
}

#[tokio::test]
async fn test_get_by_id_of_unknown_id_is_none() {
    let store = fresh_store().await;
    assert_eq!(store.get_by_id(42).await.unwrap(), None);
}
