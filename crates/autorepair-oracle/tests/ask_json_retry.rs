use std::time::Duration;

use autorepair_oracle::fakes::ScriptedOracle;
use autorepair_oracle::{ask_json, OracleError, RetryPolicy};

#[tokio::test(start_paused = true)]
async fn rate_limited_judgment_is_retried_then_parsed() {
    let oracle = ScriptedOracle::new();
    oracle.push_err(OracleError::RateLimited("429 quota exceeded".to_string()));
    oracle.push_err(OracleError::RateLimited("429 quota exceeded".to_string()));
    oracle.push_ok("Sure, here it is:\n```json\n{\"decision\": \"DEPLOY\", \"nested\": {\"a\": 1}}\n```");

    let start = tokio::time::Instant::now();
    let value = ask_json(&oracle, "judge", &RetryPolicy::default()).await.unwrap();

    assert_eq!(value["decision"], "DEPLOY");
    assert_eq!(value["nested"]["a"], 1);
    assert_eq!(oracle.call_count(), 3);
    assert!(start.elapsed() >= Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn malformed_judgment_keeps_raw_text_and_is_not_retried() {
    let oracle = ScriptedOracle::new();
    oracle.push_ok("I cannot answer in JSON today.");
    oracle.push_ok("{\"unused\": true}");

    let err = ask_json(&oracle, "judge", &RetryPolicy::default())
        .await
        .unwrap_err();

    assert_eq!(err.raw_response(), Some("I cannot answer in JSON today."));
    assert_eq!(oracle.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_rate_limit_surfaces_as_rate_limited() {
    let oracle = ScriptedOracle::new();
    for _ in 0..3 {
        oracle.push_err(OracleError::RateLimited("resource exhausted".to_string()));
    }

    let err = ask_json(&oracle, "judge", &RetryPolicy::default())
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(oracle.call_count(), 3);
}
