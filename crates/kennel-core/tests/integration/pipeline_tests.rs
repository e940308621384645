use std::sync::Arc;

use kennel_core::score::MISSING_API_KEY;
use kennel_core::{
    Aggregator, Collector, Listing, ListingCache, NOT_SCORED, PromptTemplate, RetryPolicy,
};

use crate::common::{ListCollector, StubFetcher, TableEvaluator, TagStripper};

fn aggregator(
    fetcher: StubFetcher,
    evaluator: Option<TableEvaluator>,
    cache: Arc<ListingCache>,
    template: PromptTemplate,
) -> Aggregator<StubFetcher, TagStripper, TableEvaluator> {
    Aggregator::new(fetcher, TagStripper, evaluator, cache, template)
        .with_evaluator_retry(RetryPolicy::none())
}

fn shelter_collectors() -> Vec<Arc<dyn Collector<StubFetcher>>> {
    vec![
        ListCollector::new(
            "north",
            vec![
                Listing::new("north", "Rex", "https://north.example/rex")
                    .with_description("Calm, cat-tested"),
                Listing::new("north", "Bolt", "https://north.example/bolt")
                    .with_description("High energy"),
            ],
        ),
        ListCollector::failing("south"),
        ListCollector::new(
            "east",
            vec![
                Listing::new("east", "rex", "https://north.example/rex")
                    .with_description("Calm, cat-tested"),
                Listing::new("east", "Pip", "https://east.example/pip"),
            ],
        ),
    ]
}

#[tokio::test]
async fn end_to_end_ranks_unique_listings() {
    let fetcher = StubFetcher::with_pages(&[(
        "https://east.example/pip",
        "<p>Pip naps all day</p>",
    )]);
    let evaluator = TableEvaluator::new(&[("Rex", "88"), ("Bolt", "Score: 12"), ("Pip", "45")]);
    let cache = Arc::new(ListingCache::in_memory());

    let summary = aggregator(fetcher, Some(evaluator), cache, PromptTemplate::default())
        .run(&shelter_collectors())
        .await;

    let ranked: Vec<_> = summary
        .listings
        .iter()
        .map(|l| (l.name.to_lowercase(), l.score))
        .collect();
    assert_eq!(
        ranked,
        vec![
            ("rex".to_string(), 88),
            ("pip".to_string(), 45),
            ("bolt".to_string(), 12)
        ]
    );
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.collected, 4);

    let pip = summary.listings.iter().find(|l| l.name == "Pip").unwrap();
    assert_eq!(pip.description, "Pip naps all day");

    let south = summary.sources.iter().find(|s| s.source == "south").unwrap();
    assert!(south.error.as_deref().unwrap().contains("layout changed"));
}

#[tokio::test]
async fn cache_file_spares_work_on_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kennel_cache.json");
    let pages = [("https://east.example/pip", "<p>Pip naps all day</p>")];

    let first_evaluator = TableEvaluator::new(&[]);
    aggregator(
        StubFetcher::with_pages(&pages),
        Some(first_evaluator.clone()),
        Arc::new(ListingCache::open(&path)),
        PromptTemplate::default(),
    )
    .run(&shelter_collectors())
    .await;
    assert_eq!(first_evaluator.calls(), 3);

    let fetcher = StubFetcher::with_pages(&pages);
    let second_evaluator = TableEvaluator::new(&[]);
    let summary = aggregator(
        fetcher.clone(),
        Some(second_evaluator.clone()),
        Arc::new(ListingCache::open(&path)),
        PromptTemplate::default(),
    )
    .run(&shelter_collectors())
    .await;

    assert_eq!(second_evaluator.calls(), 0);
    assert_eq!(fetcher.hits.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(summary.scoring.cached, 3);
    assert!(summary.listings.iter().all(|l| l.score == 50));
}

#[tokio::test]
async fn new_prompt_rescores_without_dropping_old_fingerprint() {
    let cache = Arc::new(ListingCache::in_memory());
    let old = PromptTemplate::new("Rate {dog_name}: {raw_text}");
    let new = PromptTemplate::new("How well would {dog_name} live with a cat? {raw_text}");
    let collectors: Vec<Arc<dyn Collector<StubFetcher>>> = vec![ListCollector::new(
        "north",
        vec![Listing::new("north", "Rex", "https://north.example/rex").with_description("Calm")],
    )];

    aggregator(
        StubFetcher::default(),
        Some(TableEvaluator::new(&[("Rex", "30")])),
        Arc::clone(&cache),
        old.clone(),
    )
    .run(&collectors)
    .await;

    let evaluator = TableEvaluator::new(&[("Rex", "70")]);
    let ranked = aggregator(
        StubFetcher::default(),
        Some(evaluator.clone()),
        Arc::clone(&cache),
        new.clone(),
    )
    .aggregate_and_rank(&collectors)
    .await;

    assert_eq!(evaluator.calls(), 1);
    assert_eq!(ranked[0].score, 70);
    let url = "https://north.example/rex";
    assert_eq!(cache.get_score(url, old.fingerprint()).unwrap().score, 30);
    assert_eq!(cache.get_score(url, new.fingerprint()).unwrap().score, 70);
}

#[tokio::test]
async fn no_api_key_marks_everything_unscored() {
    let fetcher = StubFetcher::with_pages(&[(
        "https://east.example/pip",
        "<p>Pip naps all day</p>",
    )]);
    let summary = aggregator(
        fetcher.clone(),
        None,
        Arc::new(ListingCache::in_memory()),
        PromptTemplate::default(),
    )
    .run(&shelter_collectors())
    .await;

    assert_eq!(summary.listings.len(), 3);
    assert!(summary.listings.iter().all(|l| l.score == NOT_SCORED));
    assert!(
        summary
            .listings
            .iter()
            .all(|l| l.score_details == vec![MISSING_API_KEY.to_string()])
    );
    assert_eq!(fetcher.hits.load(std::sync::atomic::Ordering::SeqCst), 0);
}
