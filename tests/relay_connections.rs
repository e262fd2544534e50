use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use relay_bid_collector::{
    errors::CollectorError,
    relay::{
        client::RelayClient,
        retry::{RelayFetcher, RetryPolicy},
        RelayService,
    },
    test_helpers::{create_test_bid, RecordingSleeper},
    types::{FetchOutcome, RelayEndpoint},
};

const BID_TRACES_PATH: &str = "/relay/v1/data/bidtraces/builder_blocks_received";

fn client(server: &MockServer, name: &str, timeout: Duration) -> RelayClient {
    RelayClient::with_endpoint(RelayEndpoint::new(name, server.base_url()), timeout)
}

fn fetcher(sleeper: &RecordingSleeper) -> RelayFetcher {
    RelayFetcher::with_sleeper(
        RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        },
        Box::new(sleeper.clone()),
    )
}

#[tokio::test]
async fn test_fetches_and_tags_bids() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(BID_TRACES_PATH)
                .query_param("block_number", "100")
                .header("accept", "application/json");
            then.status(200)
                .json_body(json!([create_test_bid(100, 1), create_test_bid(100, 2)]));
        })
        .await;

    let relay = client(&server, "flashbots", Duration::from_secs(2));
    let outcome = fetcher(&RecordingSleeper::new()).fetch(&relay, 100).await;

    mock.assert_hits_async(1).await;
    let bids = match outcome {
        FetchOutcome::Success(bids) => bids,
        other => panic!("expected bids, got {:?}", other),
    };
    assert_eq!(bids.len(), 2);
    assert!(bids.iter().all(|b| b.relay_name() == Some("flashbots")));
    assert_eq!(bids[0].get("value"), Some(&json!("1")));
    assert_eq!(bids[1].get("value"), Some(&json!("2")));
}

#[tokio::test]
async fn test_empty_array_is_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(BID_TRACES_PATH);
            then.status(200).json_body(json!([]));
        })
        .await;

    let sleeper = RecordingSleeper::new();
    let relay = client(&server, "agnostic", Duration::from_secs(2));
    let outcome = fetcher(&sleeper).fetch(&relay, 100).await;

    assert!(matches!(outcome, FetchOutcome::Empty));
    mock.assert_hits_async(1).await;
    assert!(sleeper.sleeps().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_error_status_is_retried_until_exhausted() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(BID_TRACES_PATH);
            then.status(503);
        })
        .await;

    let sleeper = RecordingSleeper::new();
    let relay = client(&server, "ultrasound", Duration::from_secs(2));
    let outcome = fetcher(&sleeper).fetch(&relay, 100).await;

    mock.assert_hits_async(3).await;
    assert!(outcome.is_failure());
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5); 2]);
}

#[test_log::test(tokio::test)]
async fn test_timeout_is_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(BID_TRACES_PATH);
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!([create_test_bid(100, 1)]));
        })
        .await;

    let relay = client(&server, "aestus", Duration::from_millis(50));
    let outcome = fetcher(&RecordingSleeper::new()).fetch(&relay, 100).await;

    mock.assert_hits_async(3).await;
    match outcome {
        FetchOutcome::Failure(CollectorError::RetriesExhausted { relay, attempts, last_error }) => {
            assert_eq!(relay, "aestus");
            assert_eq!(attempts, 3);
            assert!(last_error.contains("timed out"));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
}

#[tokio::test]
async fn test_single_attempt_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(BID_TRACES_PATH).query_param("block_number", "1");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(BID_TRACES_PATH).query_param("block_number", "2");
            then.status(200).body("not json");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(BID_TRACES_PATH).query_param("block_number", "3");
            then.status(200).json_body(json!({"message": "not an array"}));
        })
        .await;

    let relay = client(&server, "bloxroute max profit", Duration::from_secs(2));

    assert!(matches!(
        relay.get_builder_bids(1).await,
        Err(CollectorError::RelayStatusError(status)) if status.as_u16() == 404
    ));
    assert!(matches!(
        relay.get_builder_bids(2).await,
        Err(CollectorError::InvalidResponseError(_))
    ));
    assert!(matches!(
        relay.get_builder_bids(3).await,
        Err(CollectorError::InvalidResponseError(_))
    ));
}
