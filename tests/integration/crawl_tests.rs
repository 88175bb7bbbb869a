//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for a Gerrit server and exercise
//! pagination, detail harvesting, backoff and resumption end-to-end.

use chrono::NaiveDate;
use gerry_harvest::config::{Config, ResumeMode, Target, TargetEntry};
use gerry_harvest::crawler::{
    listing_query, BackoffPolicy, Coordinator, FetchError, GerritClient,
};
use gerry_harvest::storage::COMPLETE_MARKER;
use gerry_harvest::timeframe::TimeFrame;
use gerry_harvest::HarvestError;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const EXPECTED_CHANGE_ID: &str = "Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 6, d).unwrap()
}

/// Creates a config whose "local" target points at the mock server and
/// spans 2018-06-01 and 2018-06-02
fn create_test_config(server: &MockServer, output_dir: &Path) -> Config {
    let mut config = Config::builtin();
    config.crawl.output_dir = output_dir.to_path_buf();
    config.crawl.end_date = day(3);
    config.targets.push(TargetEntry {
        name: "local".to_string(),
        url: server.uri(),
        start_date: day(1),
        reviewer_updates: true,
    });
    config
}

fn test_policy() -> BackoffPolicy {
    BackoffPolicy::new([
        (429, Duration::from_millis(50)),
        (503, Duration::from_millis(10)),
    ])
}

fn coordinator(config: &Config) -> Coordinator {
    Coordinator::new(config, config.target("local").unwrap())
        .expect("Failed to create coordinator")
        .with_policy(test_policy())
}

fn gerrit_response(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(")]}}'\n{}", body))
}

fn summaries(numbers: &[u64], more: bool) -> Value {
    let mut items: Vec<Value> = numbers
        .iter()
        .map(|n| json!({"_number": n, "change_id": format!("I{n}"), "status": "MERGED"}))
        .collect();
    if more {
        if let Some(Value::Object(last)) = items.last_mut() {
            last.insert("_more_changes".to_string(), Value::Bool(true));
        }
    }
    Value::Array(items)
}

fn listing_for(d: NaiveDate) -> String {
    listing_query(&TimeFrame::day(d))
}

async fn mount_listing(server: &MockServer, d: NaiveDate, numbers: &[u64]) {
    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("q", listing_for(d).as_str()))
        .respond_with(gerrit_response(summaries(numbers, false)))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, number: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/changes/{number}/detail/")))
        .respond_with(gerrit_response(
            json!({"_number": number, "change_id": format!("I{number}")}),
        ))
        .mount(server)
        .await;
}

/// Counts listing requests received for one day
async fn listing_requests_for(server: &MockServer, d: NaiveDate) -> usize {
    let query = listing_for(d);
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/changes/")
        .filter(|r| r.url.query_pairs().any(|(k, v)| k == "q" && v == query.as_str()))
        .count()
}

fn target(server: &MockServer, name: &str, reviewer_updates: bool) -> Target {
    Target::from_entry(&TargetEntry {
        name: name.to_string(),
        url: server.uri(),
        start_date: day(1),
        reviewer_updates,
    })
    .unwrap()
}

/// Matches detail requests that do not ask for reviewer updates
struct WithoutReviewerUpdates;

impl Match for WithoutReviewerUpdates {
    fn matches(&self, request: &Request) -> bool {
        !request
            .url
            .query_pairs()
            .any(|(k, v)| k == "o" && v == "REVIEWER_UPDATES")
    }
}

#[tokio::test]
async fn test_pagination_follows_more_changes_flag() {
    let mock_server = MockServer::start().await;
    let frame = TimeFrame::day(day(1));
    let query = listing_query(&frame);

    // Three pages of 2, 2 and 1 changes; only the last lacks the flag
    for (offset, numbers, more) in [
        ("0", vec![1, 2], true),
        ("2", vec![3, 4], true),
        ("4", vec![5], false),
    ] {
        Mock::given(method("GET"))
            .and(path("/changes/"))
            .and(query_param("q", query.as_str()))
            .and(query_param("S", offset))
            .respond_with(gerrit_response(summaries(&numbers, more)))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let client = GerritClient::new(target(&mock_server, "local", true), &Default::default())
        .expect("Failed to build client");
    let changes = client.changes_in_frame(&frame).await.expect("Listing failed");

    let numbers: Vec<u64> = changes.iter().map(|c| c.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_pagination_stops_on_empty_page() {
    let mock_server = MockServer::start().await;
    let frame = TimeFrame::day(day(1));

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("S", "0"))
        .respond_with(gerrit_response(summaries(&[1, 2], true)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("S", "2"))
        .respond_with(gerrit_response(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GerritClient::new(target(&mock_server, "local", true), &Default::default())
        .expect("Failed to build client");
    let changes = client.changes_in_frame(&frame).await.expect("Listing failed");
    assert_eq!(changes.len(), 2);
}

/// Day one's listing has a first page that points to a second page, and
/// that second page fails with 503
async fn mount_failing_second_page(server: &MockServer) {
    let query = listing_for(day(1));
    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("q", query.as_str()))
        .and(query_param("S", "0"))
        .respond_with(gerrit_response(summaries(&[1, 2], true)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("q", query.as_str()))
        .and(query_param("S", "2"))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_failure_on_later_page_discards_earlier_pages() {
    let mock_server = MockServer::start().await;
    mount_failing_second_page(&mock_server).await;

    let client = GerritClient::new(target(&mock_server, "local", true), &Default::default())
        .expect("Failed to build client");
    let result = client.changes_in_frame(&TimeFrame::day(day(1))).await;

    assert_eq!(
        result,
        Err(FetchError::Http {
            status: 503,
            retry_after: None
        })
    );
}

#[tokio::test]
async fn test_crawl_leaves_day_empty_when_later_page_fails() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_failing_second_page(&mock_server).await;
    mount_listing(&mock_server, day(2), &[]).await;
    mount_detail(&mock_server, 1).await;
    mount_detail(&mock_server, 2).await;

    let mut config = create_test_config(&mock_server, output.path());
    config.crawl.max_passes = Some(1);
    let result = coordinator(&config).run().await;

    assert!(
        matches!(result, Err(HarvestError::PassLimit { pending: 1, .. })),
        "got {result:?}"
    );

    // No detail was requested from the partial listing
    let detail_requests = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/detail/"))
        .count();
    assert_eq!(detail_requests, 0);

    let day_dir = output.path().join("local/changes/2018-06-01");
    assert!(day_dir.is_dir());
    assert_eq!(std::fs::read_dir(&day_dir).unwrap().count(), 0);
    assert!(output
        .path()
        .join("local/changes/2018-06-02")
        .join(COMPLETE_MARKER)
        .exists());
}

#[tokio::test]
async fn test_endless_pagination_is_a_parse_failure() {
    let mock_server = MockServer::start().await;

    // Every page claims another one follows
    Mock::given(method("GET"))
        .and(path("/changes/"))
        .respond_with(gerrit_response(summaries(&[1], true)))
        .mount(&mock_server)
        .await;

    let client = GerritClient::new(target(&mock_server, "local", true), &Default::default())
        .expect("Failed to build client")
        .with_max_pages(3);
    let result = client.changes_in_frame(&TimeFrame::day(day(1))).await;

    assert!(matches!(result, Err(FetchError::Parse(_))), "got {result:?}");
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_listing_surfaces_http_and_parse_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("q", listing_for(day(1)).as_str()))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("q", listing_for(day(2)).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&mock_server)
        .await;

    let client = GerritClient::new(target(&mock_server, "local", true), &Default::default())
        .expect("Failed to build client");

    let err = client
        .changes_in_frame(&TimeFrame::day(day(1)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FetchError::Http {
            status: 429,
            retry_after: Some(Duration::from_secs(7)),
        }
    );

    let err = client
        .changes_in_frame(&TimeFrame::day(day(2)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "parse");
}

#[tokio::test]
async fn test_transport_failure_is_classified() {
    // Nothing listens on the discard port
    let target = Target::from_entry(&TargetEntry {
        name: "down".to_string(),
        url: "http://127.0.0.1:9".to_string(),
        start_date: day(1),
        reviewer_updates: true,
    })
    .unwrap();

    let client = GerritClient::new(target, &Default::default()).expect("Failed to build client");
    let err = client.change_detail(1).await.unwrap_err();
    assert_eq!(err.kind(), "transport");
}

#[tokio::test]
async fn test_change_detail_requests_all_options() {
    let mock_server = MockServer::start().await;

    let mut mock = Mock::given(method("GET")).and(path("/changes/109611/detail/"));
    for option in [
        "DETAILED_LABELS",
        "MESSAGES",
        "DETAILED_ACCOUNTS",
        "REVIEWED",
        "ALL_FILES",
        "ALL_COMMITS",
        "ALL_REVISIONS",
        "REVIEWER_UPDATES",
    ] {
        mock = mock.and(query_param("o", option));
    }
    mock.respond_with(gerrit_response(
        json!({"_number": 109611, "change_id": EXPECTED_CHANGE_ID}),
    ))
    .expect(1)
    .mount(&mock_server)
    .await;

    let client = GerritClient::new(target(&mock_server, "gerrit", true), &Default::default())
        .expect("Failed to build client");
    let detail = client.change_detail(109611).await.expect("Detail failed");

    assert_eq!(detail.number, 109611);
    assert_eq!(detail.change_id(), Some(EXPECTED_CHANGE_ID));
}

#[tokio::test]
async fn test_change_detail_omits_reviewer_updates_without_capability() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/42/detail/"))
        .and(query_param("o", "ALL_REVISIONS"))
        .and(WithoutReviewerUpdates)
        .respond_with(gerrit_response(json!({"_number": 42})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GerritClient::new(
        target(&mock_server, "libreoffice", false),
        &Default::default(),
    )
    .expect("Failed to build client");
    assert!(client.change_detail(42).await.is_ok());
}

#[tokio::test]
async fn test_full_crawl_writes_one_file_per_change() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_listing(&mock_server, day(1), &[101, 102]).await;
    mount_listing(&mock_server, day(2), &[201]).await;
    for number in [101, 102, 201] {
        mount_detail(&mock_server, number).await;
    }
    let config = create_test_config(&mock_server, output.path());
    let report = coordinator(&config).run().await.expect("Crawl failed");

    assert_eq!(report.passes, 1);
    assert_eq!(report.units_completed, 2);
    assert_eq!(report.total_failures(), 0);

    let changes = output.path().join("local/changes");
    for file in [
        "2018-06-01/101.json",
        "2018-06-01/102.json",
        "2018-06-02/201.json",
    ] {
        assert!(changes.join(file).is_file(), "missing {file}");
    }
    assert!(changes.join("2018-06-01").join(COMPLETE_MARKER).exists());

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(changes.join("2018-06-01/101.json")).unwrap())
            .unwrap();
    assert_eq!(written["_number"], 101);
}

#[tokio::test]
async fn test_detail_file_matches_fixture() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_listing(&mock_server, day(1), &[109611]).await;
    mount_listing(&mock_server, day(2), &[]).await;
    Mock::given(method("GET"))
        .and(path("/changes/109611/detail/"))
        .respond_with(gerrit_response(
            json!({"_number": 109611, "change_id": EXPECTED_CHANGE_ID, "messages": []}),
        ))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server, output.path());
    coordinator(&config).run().await.expect("Crawl failed");

    let file = output.path().join("local/changes/2018-06-01/109611.json");
    let written: Value = serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
    assert_eq!(written["change_id"], EXPECTED_CHANGE_ID);
    assert_eq!(written["_number"], 109611);
}

#[tokio::test]
async fn test_second_run_issues_no_requests() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_listing(&mock_server, day(1), &[101]).await;
    // A day without changes completes once its listing succeeds
    mount_listing(&mock_server, day(2), &[]).await;
    mount_detail(&mock_server, 101).await;

    let config = create_test_config(&mock_server, output.path());
    coordinator(&config).run().await.expect("First crawl failed");
    let after_first = mock_server.received_requests().await.unwrap().len();
    assert_eq!(after_first, 3);

    let report = coordinator(&config).run().await.expect("Second crawl failed");
    assert_eq!(report.passes, 0);
    assert_eq!(
        mock_server.received_requests().await.unwrap().len(),
        after_first
    );
}

#[tokio::test]
async fn test_resume_skips_days_with_output() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_listing(&mock_server, day(1), &[101]).await;
    mount_listing(&mock_server, day(2), &[201]).await;
    mount_detail(&mock_server, 101).await;
    mount_detail(&mock_server, 201).await;

    // A previous run already harvested something on the first day
    let done = output.path().join("local/changes/2018-06-01");
    std::fs::create_dir_all(&done).unwrap();
    std::fs::write(done.join("100.json"), "{}").unwrap();

    let config = create_test_config(&mock_server, output.path());
    let report = coordinator(&config).run().await.expect("Crawl failed");

    assert_eq!(report.units_completed, 1);
    assert_eq!(listing_requests_for(&mock_server, day(1)).await, 0);
    assert_eq!(listing_requests_for(&mock_server, day(2)).await, 1);
    assert!(!done.join("101.json").exists());
    assert!(output.path().join("local/changes/2018-06-02/201.json").exists());
}

#[tokio::test]
async fn test_rate_limited_day_is_retried_next_pass() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    // First listing attempt for day one is rate limited
    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("q", listing_for(day(1)).as_str()))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    mount_listing(&mock_server, day(1), &[101]).await;
    mount_listing(&mock_server, day(2), &[201]).await;
    mount_detail(&mock_server, 101).await;
    mount_detail(&mock_server, 201).await;

    let config = create_test_config(&mock_server, output.path());
    let start = std::time::Instant::now();
    let report = coordinator(&config).run().await.expect("Crawl failed");

    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(report.passes, 2);
    assert_eq!(report.failures.get("http"), Some(&1));
    assert_eq!(listing_requests_for(&mock_server, day(1)).await, 2);
    assert_eq!(listing_requests_for(&mock_server, day(2)).await, 1);
    assert!(output.path().join("local/changes/2018-06-01/101.json").exists());
}

#[tokio::test]
async fn test_day_mode_keeps_partially_harvested_day() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_listing(&mock_server, day(1), &[1, 2]).await;
    mount_listing(&mock_server, day(2), &[]).await;
    mount_detail(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/changes/2/detail/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server, output.path());
    let report = coordinator(&config).run().await.expect("Crawl failed");

    // The day already holds a file, so it is not revisited
    assert_eq!(report.passes, 1);
    assert_eq!(report.changes_written, 1);
    assert_eq!(report.failures.get("http"), Some(&1));

    let day_dir = output.path().join("local/changes/2018-06-01");
    assert!(day_dir.join("1.json").exists());
    assert!(!day_dir.join("2.json").exists());
    assert!(!day_dir.join(COMPLETE_MARKER).exists());
}

#[tokio::test]
async fn test_change_mode_retries_only_missing_changes() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_listing(&mock_server, day(1), &[1, 2]).await;
    mount_listing(&mock_server, day(2), &[]).await;
    Mock::given(method("GET"))
        .and(path("/changes/1/detail/"))
        .respond_with(gerrit_response(json!({"_number": 1})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/changes/2/detail/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    mount_detail(&mock_server, 2).await;

    let mut config = create_test_config(&mock_server, output.path());
    config.crawl.resume = ResumeMode::Change;
    let report = coordinator(&config).run().await.expect("Crawl failed");

    assert_eq!(report.passes, 2);
    assert_eq!(report.changes_written, 2);
    assert_eq!(report.changes_skipped, 1);
    assert_eq!(listing_requests_for(&mock_server, day(1)).await, 2);

    let day_dir = output.path().join("local/changes/2018-06-01");
    assert!(day_dir.join("2.json").exists());
    assert!(day_dir.join(COMPLETE_MARKER).exists());
}

#[tokio::test]
async fn test_pass_limit_stops_broken_target() {
    let mock_server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server, output.path());
    config.crawl.max_passes = Some(3);
    let result = coordinator(&config).run().await;

    match result {
        Err(HarvestError::PassLimit {
            target,
            passes,
            pending,
        }) => {
            assert_eq!(target, "local");
            assert_eq!(passes, 3);
            assert_eq!(pending, 2);
        }
        other => panic!("expected pass limit, got {other:?}"),
    }

    // Two days per pass
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 6);
}
