use trawler_core::models::CanonicalRecord;
use trawler_core::normalize::normalize;
use trawler_core::store::PageStore;
use trawler_core::testutil::make_raw_record;
use trawler_db::PageRepository;

use crate::integration::common::setup_test_db;

fn record(url: &str, text: &str) -> CanonicalRecord {
    normalize(make_raw_record(url, text)).unwrap()
}

#[tokio::test]
async fn insert_and_find_by_url() {
    let (pool, _container) = setup_test_db().await;
    let repo = PageRepository::new(pool);

    let rec = record("https://example.com/a", "some body text for the page");
    let id = repo.insert_page(&rec).await.unwrap();

    let found = repo.find_by_url("https://example.com/a").await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.content_hash, rec.content_hash);
    assert_eq!(found.fingerprint, rec.fingerprint);

    assert!(repo.find_by_url("https://example.com/b").await.unwrap().is_none());
}

#[tokio::test]
async fn fingerprint_roundtrips_through_bigint_array() {
    let (pool, _container) = setup_test_db().await;
    let repo = PageRepository::new(pool);

    // Long text so the sketch holds many large u64 values (cast to
    // negative i64 in the column).
    let text: String = (0..200).map(|i| format!("token{i} ")).collect();
    let rec = record("https://example.com/long", &text);
    repo.insert_page(&rec).await.unwrap();

    let found = repo
        .find_by_url("https://example.com/long")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.fingerprint, rec.fingerprint);
    assert_eq!(found.fingerprint.bucket(), rec.fingerprint.bucket());
}

#[tokio::test]
async fn candidates_filter_by_bucket_and_domain() {
    let (pool, _container) = setup_test_db().await;
    let repo = PageRepository::new(pool);

    let base: String = (0..50).map(|i| format!("token{i} ")).collect();
    let a = record("https://example.com/a", &base);
    let near = record("https://example.com/b", &format!("{base} tiny addition"));
    let other_domain = record("https://elsewhere.test/a", &base);
    let unrelated = record("https://example.com/c", "entirely different words here");

    repo.insert_page(&a).await.unwrap();
    repo.insert_page(&near).await.unwrap();
    repo.insert_page(&other_domain).await.unwrap();
    repo.insert_page(&unrelated).await.unwrap();

    let candidates = repo
        .find_fingerprint_candidates(a.fingerprint.bucket(), "example.com", 10)
        .await
        .unwrap();
    let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();

    assert!(urls.contains(&"https://example.com/a"));
    assert!(urls.contains(&"https://example.com/b"));
    assert!(!urls.contains(&"https://elsewhere.test/a"), "domain filter");
    assert!(!urls.contains(&"https://example.com/c"), "bucket filter");

    let capped = repo
        .find_fingerprint_candidates(a.fingerprint.bucket(), "example.com", 1)
        .await
        .unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn update_page_overwrites_content() {
    let (pool, _container) = setup_test_db().await;
    let repo = PageRepository::new(pool);

    let original = record("https://example.com/a", "first version of the body");
    let id = repo.insert_page(&original).await.unwrap();

    let revised = record("https://example.com/a", "second version of the body");
    repo.update_page(id, &revised).await.unwrap();

    let found = repo.find_by_url("https://example.com/a").await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.content_hash, revised.content_hash);
    assert_ne!(found.content_hash, original.content_hash);

    assert_eq!(repo.count_pages().await.unwrap(), 1);
}
