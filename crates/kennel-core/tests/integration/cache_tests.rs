use std::sync::Arc;

use kennel_core::{ListingCache, PromptTemplate};

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let fingerprint = PromptTemplate::default().fingerprint().to_string();

    {
        let cache = ListingCache::open(&path);
        cache
            .set_description("https://shelter.example/rex", "Gentle senior", Some("Rex"))
            .await
            .unwrap();
        cache
            .set_score(
                "https://shelter.example/rex",
                &fingerprint,
                81,
                &["Evaluator score: 81/100".to_string()],
            )
            .await
            .unwrap();
    }

    let reopened = ListingCache::open(&path);
    let description = reopened
        .get_description("https://shelter.example/rex")
        .unwrap();
    assert_eq!(description.text, "Gentle senior");
    assert_eq!(description.name, "Rex");
    let score = reopened
        .get_score("https://shelter.example/rex", &fingerprint)
        .unwrap();
    assert_eq!(score.score, 81);
}

#[tokio::test]
async fn file_is_one_json_document_with_both_namespaces() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let cache = ListingCache::open(&path);
    cache.set_description("/a", "text", None).await.unwrap();
    cache.set_score("/a", "f1", 3, &[]).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["descriptions"]["/a"]["text"], "text");
    assert_eq!(raw["scores"]["/a"]["f1"]["score"], 3);
}

#[tokio::test]
async fn corrupt_file_starts_empty_and_is_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "{ not json").unwrap();

    let cache = ListingCache::open(&path);
    assert!(cache.get_description("/a").is_none());

    cache.set_description("/a", "fresh", None).await.unwrap();
    let reopened = ListingCache::open(&path);
    assert_eq!(reopened.get_description("/a").unwrap().text, "fresh");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_leave_a_complete_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let cache = Arc::new(ListingCache::open(&path));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for i in 0..25 {
                    cache
                        .set_description(&format!("/{t}/{i}"), "text", None)
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let reopened = ListingCache::open(&path);
    assert_eq!(reopened.stats().description_entries, 100);
}
