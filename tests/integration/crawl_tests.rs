//! Integration tests for the crawl engine
//!
//! These tests drive the scheduler and engine through an in-process scripted
//! Graph client and check what lands in SQLite.

use async_trait::async_trait;
use fb_pages_crawler::config::{parse_config, Config};
use fb_pages_crawler::crawler::{register_targets, CrawlEngine, CrawlRequest, CrawlScheduler};
use fb_pages_crawler::graph::{
    GraphClient, OperatorLog, RateLimitedFetcher, RetryPolicy, TransportError,
};
use fb_pages_crawler::state::SchedulerState;
use fb_pages_crawler::storage::{SqliteStorage, Storage, TargetInfo};
use fb_pages_crawler::url::{query_param, GraphEndpoint};
use fb_pages_crawler::CrawlerError;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Route = dyn Fn(&str, &str) -> Result<Value, TransportError> + Send + Sync;

/// Routes each request by path and records every URL it was asked for
struct ScriptedGraph {
    route: Box<Route>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedGraph {
    /// `route` receives the URL path and the full URL
    fn new<F>(route: F) -> Arc<Self>
    where
        F: Fn(&str, &str) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            route: Box::new(route),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn requests_to(&self, suffix: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| url.split('?').next().unwrap_or_default().ends_with(suffix))
            .collect()
    }
}

#[async_trait]
impl GraphClient for ScriptedGraph {
    async fn get(&self, url: &str) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        let path = url.split('?').next().unwrap_or_default();
        (self.route)(path, url)
    }
}

fn test_config(extra: &str) -> Config {
    parse_config(&format!(
        r#"
        [graph]
        base-url = "https://graph.test/v2.3"
        access-token = "tok"

        [retry]
        transient-delay-ms = 0
        throttle-delay-ms = 0

        [crawl]
        snapshot-targets = false
        {}

        [storage]
        database-path = ":memory:"
        "#,
        extra
    ))
    .expect("Failed to parse test config")
}

fn fetcher(client: Arc<ScriptedGraph>, config: &Config) -> RateLimitedFetcher {
    RateLimitedFetcher::new(
        client,
        RetryPolicy::from_config(config),
        OperatorLog::disabled(),
    )
}

fn register(storage: &mut SqliteStorage, id: &str) {
    storage
        .insert_target(&TargetInfo {
            id: id.to_string(),
            name: format!("Page {}", id),
            ..TargetInfo::default()
        })
        .expect("Failed to register target");
}

fn in_memory_with_target(id: &str) -> SqliteStorage {
    let mut storage = SqliteStorage::open_in_memory().expect("Failed to open DB");
    register(&mut storage, id);
    storage
}

async fn run_once(
    client: Arc<ScriptedGraph>,
    config: Config,
    storage: SqliteStorage,
    targets: &[&str],
) -> CrawlScheduler<SqliteStorage> {
    let config = Arc::new(config);
    let fetcher = fetcher(client, &config);
    let mut scheduler = CrawlScheduler::new(
        config,
        "test-hash",
        fetcher,
        storage,
        CancellationToken::new(),
    )
    .expect("Failed to create scheduler");

    let ids = targets.iter().map(|id| id.to_string()).collect();
    scheduler
        .run(CrawlRequest::new(ids).once())
        .await
        .expect("Crawl failed");
    scheduler
}

fn posts(prefix: &str, range: std::ops::Range<usize>) -> Vec<Value> {
    range
        .map(|i| {
            json!({
                "id": format!("{}_{}", prefix, i),
                "message": format!("post {}", i),
                "created_time": "2015-03-01T10:00:00+0000",
            })
        })
        .collect()
}

#[tokio::test]
async fn test_two_page_feed_persists_every_post() {
    let client = ScriptedGraph::new(|path, url| {
        assert!(path.ends_with("/42/feed"), "unexpected request {}", url);
        if query_param(url, "after").as_deref() == Some("p2") {
            Ok(json!({"data": posts("42", 500..503)}))
        } else {
            Ok(json!({
                "data": posts("42", 0..500),
                "paging": {"next": "https://graph.test/v2.3/42/feed?access_token=tok&after=p2"}
            }))
        }
    });

    let scheduler = run_once(
        client.clone(),
        test_config(""),
        in_memory_with_target("42"),
        &["42"],
    )
    .await;

    let storage = scheduler.storage();
    assert_eq!(storage.count_posts(Some("42")).unwrap(), 503);
    assert_eq!(client.requests().len(), 2);

    // The cursor URL keeps the configured page size
    let second = &client.requests()[1];
    assert_eq!(query_param(second, "limit").as_deref(), Some("500"));
    assert_eq!(query_param(second, "after").as_deref(), Some("p2"));

    let target = storage.get_target("42").unwrap().unwrap();
    assert!(!target.is_fresh);
    assert_eq!(target.last_outcome.as_deref(), Some("completed"));
}

/// One post with two comments and three likes
fn small_page_client() -> Arc<ScriptedGraph> {
    ScriptedGraph::new(|path, _url| {
        if path.ends_with("/42/feed") {
            Ok(json!({"data": [{
                "id": "42_1",
                "message": "hello",
                "created_time": "2015-03-01T10:00:00+0000",
                "comments": {"summary": {"total_count": 2}},
                "likes": {"summary": {"total_count": 3}},
            }]}))
        } else if path.ends_with("/42_1/comments") {
            Ok(json!({
                "data": [
                    {"id": "c1", "message": "first", "from": {"id": "u1", "name": "Ann"}, "like_count": 0},
                    {"id": "c2", "message": "second", "from": {"id": "u2", "name": "Bob"}, "like_count": 0},
                ],
                "summary": {"total_count": 2}
            }))
        } else if path.ends_with("/42_1/likes") {
            Ok(json!({
                "data": [
                    {"id": "u1", "name": "Ann"},
                    {"id": "u3", "name": "Cid"},
                    {"id": "u4", "name": "Dee"},
                ],
                "summary": {"total_count": 3}
            }))
        } else {
            Ok(json!({"data": []}))
        }
    })
}

#[tokio::test]
async fn test_recrawl_does_not_duplicate_rows() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("crawl.db");
    let open = || SqliteStorage::open(&db_path, Duration::from_millis(10)).expect("Failed to open DB");

    let mut storage = open();
    register(&mut storage, "42");
    drop(storage);

    let first = small_page_client();
    run_once(first.clone(), test_config(""), open(), &["42"]).await;

    let counts = |storage: &SqliteStorage| {
        (
            storage.count_posts(None).unwrap(),
            storage.count_comments(None).unwrap(),
            storage.count_likes(None).unwrap(),
            storage.count_actors(None).unwrap(),
            storage.count_target_fans("42").unwrap(),
        )
    };
    let after_first = counts(&open());
    assert_eq!(after_first, (1, 2, 3, 4, 4));

    let second = small_page_client();
    let scheduler = run_once(second.clone(), test_config(""), open(), &["42"]).await;
    assert_eq!(counts(scheduler.storage()), after_first);

    // The first sweep was unbounded; the re-crawl only covers the recent window
    let first_feed = &first.requests_to("/feed")[0];
    let second_feed = &second.requests_to("/feed")[0];
    assert!(query_param(first_feed, "since").is_none());
    assert!(query_param(second_feed, "since").is_some());

    let post = scheduler.storage().get_post("42_1").unwrap().unwrap();
    assert_eq!(post.comment_count, 2);
    assert_eq!(post.like_count, 3);
    assert_eq!(scheduler.storage().count_passes().unwrap(), 2);
}

#[tokio::test]
async fn test_transient_failures_abandon_after_max_attempts() {
    let client = ScriptedGraph::new(|_path, _url| {
        Err(TransportError::Decode {
            status: 502,
            message: "bad gateway".to_string(),
        })
    });

    let scheduler = run_once(
        client.clone(),
        test_config(""),
        in_memory_with_target("42"),
        &["42"],
    )
    .await;

    assert_eq!(client.requests().len(), 30);
    let storage = scheduler.storage();
    assert_eq!(storage.count_posts(None).unwrap(), 0);

    let target = storage.get_target("42").unwrap().unwrap();
    assert!(target.is_fresh);
    assert_eq!(target.last_outcome.as_deref(), Some("abandoned"));

    let pass = storage.get_latest_pass().unwrap().unwrap();
    assert_eq!(pass.targets_done, 0);
    assert_eq!(pass.targets_abandoned, 1);
}

#[tokio::test]
async fn test_oversized_page_halves_limit_until_floor() {
    let client = ScriptedGraph::new(|_path, _url| {
        Ok(json!({"error": {"code": 1, "message": "Please reduce the amount of data"}}))
    });
    let mut config = test_config("");
    config.limits.feed_page_limit = 100;

    let scheduler = run_once(client.clone(), config, in_memory_with_target("42"), &["42"]).await;

    let limits: Vec<String> = client
        .requests()
        .iter()
        .filter_map(|url| query_param(url, "limit"))
        .collect();
    assert_eq!(limits, vec!["100", "50", "25"]);

    let target = scheduler.storage().get_target("42").unwrap().unwrap();
    assert!(target.is_fresh);
    assert_eq!(target.last_outcome.as_deref(), Some("abandoned"));
}

#[tokio::test]
async fn test_empty_feed_still_completes_fresh_target() {
    let client = ScriptedGraph::new(|_path, _url| Ok(json!({"data": []})));

    let scheduler = run_once(
        client.clone(),
        test_config(r#"new-target-since = "2014-01-01""#),
        in_memory_with_target("42"),
        &["42"],
    )
    .await;

    assert_eq!(client.requests().len(), 1);
    assert_eq!(
        query_param(&client.requests()[0], "since").as_deref(),
        Some("2014-1-1")
    );
    let target = scheduler.storage().get_target("42").unwrap().unwrap();
    assert!(!target.is_fresh);
    assert_eq!(target.last_skipped, 0);
}

#[tokio::test]
async fn test_comment_total_comes_from_summary_not_persisted_rows() {
    let client = ScriptedGraph::new(|path, _url| {
        if path.ends_with("/42/feed") {
            Ok(json!({"data": [{"id": "42_1", "comments": {"summary": {"total_count": 10}}}]}))
        } else {
            let data: Vec<Value> = (0..10)
                .map(|i| {
                    if i < 8 {
                        json!({"id": format!("c{}", i), "from": {"id": format!("u{}", i), "name": "Fan"}})
                    } else {
                        json!({"id": format!("c{}", i), "message": "no author"})
                    }
                })
                .collect();
            Ok(json!({"data": data, "summary": {"total_count": 10}}))
        }
    });

    let scheduler = run_once(client, test_config(""), in_memory_with_target("42"), &["42"]).await;
    let storage = scheduler.storage();

    assert_eq!(storage.get_post("42_1").unwrap().unwrap().comment_count, 10);
    assert_eq!(storage.count_comments(Some("42")).unwrap(), 8);

    let target = storage.get_target("42").unwrap().unwrap();
    assert_eq!(target.last_skipped, 2);
    assert_eq!(target.last_outcome.as_deref(), Some("completed"));
}

#[tokio::test]
async fn test_snapshot_recorded_after_sweep() {
    let client = ScriptedGraph::new(|path, _url| {
        if path.ends_with("/feed") {
            Ok(json!({"data": posts("42", 0..3)}))
        } else {
            Ok(json!({"id": "42", "name": "Renamed Page", "likes": 1200, "talking_about_count": 40}))
        }
    });
    let mut config = test_config("");
    config.crawl.snapshot_targets = true;

    let scheduler = run_once(client.clone(), config, in_memory_with_target("42"), &["42"]).await;

    assert_eq!(scheduler.storage().count_snapshots("42").unwrap(), 1);
    assert_eq!(client.requests_to("/42").len(), 1);
}

fn engine(client: Arc<ScriptedGraph>, update_period_days: u32) -> CrawlEngine {
    let mut config = test_config("");
    config.crawl.update_period_days = update_period_days;
    CrawlEngine::new(
        Arc::new(config),
        "test-hash",
        client,
        OperatorLog::disabled(),
    )
}

#[tokio::test]
async fn test_engine_cancel_while_sleeping() {
    let client = ScriptedGraph::new(|_path, _url| Ok(json!({"data": posts("42", 0..2)})));
    let engine = engine(client.clone(), 1);

    let handle = engine
        .start_with_storage(
            CrawlRequest::new(vec!["42".to_string()]),
            in_memory_with_target("42"),
        )
        .expect("Failed to start");

    let mut state = handle.subscribe();
    state
        .wait_for(|s| *s == SchedulerState::Sleeping)
        .await
        .expect("Worker ended before sleeping");

    // Only one invocation may be active
    let second = engine.start_with_storage(
        CrawlRequest::new(vec!["42".to_string()]).once(),
        in_memory_with_target("42"),
    );
    assert!(matches!(second, Err(CrawlerError::AlreadyRunning)));
    assert!(engine.is_running());

    handle.cancel();
    let mut state = handle.subscribe();
    let summary = handle.wait().await.expect("Crawl failed");

    assert_eq!(summary.targets_done, 1);
    assert_eq!(summary.posts, 2);
    assert_eq!(*state.borrow_and_update(), SchedulerState::Cancelled);
    assert_eq!(client.requests().len(), 1);
    assert!(!engine.is_running());

    // The slot is free again once the worker has ended
    let again = engine
        .start_with_storage(
            CrawlRequest::new(vec!["42".to_string()]).once(),
            in_memory_with_target("42"),
        )
        .expect("Failed to restart");
    let summary = again.wait().await.expect("Crawl failed");
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn test_register_targets_then_crawl() {
    let client = ScriptedGraph::new(|path, url| {
        if path.ends_with("/feed") {
            return Ok(json!({"data": []}));
        }
        let ids = query_param(url, "ids").unwrap_or_default();
        let mut found = Map::new();
        for id in ids.split(',').filter(|id| *id != "missing") {
            found.insert(
                id.to_string(),
                json!({"id": id, "name": format!("Page {}", id), "category": "Media"}),
            );
        }
        Ok(Value::Object(found))
    });
    let config = test_config("");
    let endpoint = GraphEndpoint::from_config(&config.graph).unwrap();
    let fetcher = fetcher(client.clone(), &config);
    let mut storage = SqliteStorage::open_in_memory().unwrap();

    let ids = vec!["7".to_string(), "8".to_string(), "missing".to_string()];
    let report = register_targets(&fetcher, &endpoint, &mut storage, &ids)
        .await
        .expect("Registration failed");

    assert_eq!(report.inserted, vec!["7", "8"]);
    assert_eq!(report.missing, vec!["missing"]);
    assert_eq!(client.requests().len(), 1);

    let scheduler = run_once(client.clone(), config, storage, &["7", "8"]).await;
    let targets = scheduler.storage().list_targets().unwrap();
    assert_eq!(targets.len(), 2);
    assert!(targets.iter().all(|t| !t.is_fresh));
    assert_eq!(client.requests_to("/feed").len(), 2);
}
