//! Integration tests for model selection and usage accounting.
//!
//! The live tests make real calls to the Chutes endpoint.
//! Run with: CHUTES_API_KEY=your_key cargo test --test llm_integration -- --ignored

use std::sync::Arc;

use swe_validate::config::{get_api_key, get_base_url};
use swe_validate::conversation::ValidationTarget;
use swe_validate::llm::{
    collect_reply, default_candidates, ChatRequest, Message, ModelCandidate, ModelSelector,
    OpenAiProvider,
};
use swe_validate::recorder::{
    read_outcomes, read_records, render_summary, OutcomeStatus, ResultRecorder, SummaryFilter,
    ValidationOutcome,
};
use swe_validate::ValidateError;

fn create_selector() -> ModelSelector {
    let key = get_api_key().expect("CHUTES_API_KEY or a key file must be available for live tests");
    ModelSelector::new(Arc::new(OpenAiProvider::new(get_base_url(), Some(key))))
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_selects_a_live_model_and_counts_tokens() {
    let connection = create_selector()
        .select(&default_candidates())
        .await
        .expect("at least one default candidate should answer");

    let request = ChatRequest::new(
        connection.model_id(),
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(16)
    .with_temperature(0.0);

    let stream = connection
        .chat_model()
        .stream(request)
        .await
        .expect("stream should open");
    let reply = collect_reply(stream).await.expect("reply should arrive");

    assert!(reply.content.contains('4'), "unexpected reply: {}", reply.content);
    let usage = connection.usage();
    assert!(usage.total > 0, "usage should be tracked");
    assert!(usage.total >= usage.prompt);
}

#[tokio::test]
#[ignore]
async fn test_unknown_model_exhausts_candidates() {
    let result = create_selector()
        .select(&[ModelCandidate::new("no-such-org/no-such-model")])
        .await;

    assert!(matches!(
        result,
        Err(ValidateError::ExhaustedCandidates { tried: 1 })
    ));
}

#[tokio::test]
async fn test_recorded_outcomes_feed_the_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let recorder = ResultRecorder::new(dir.path().join("results.jsonl"));

    let mut target = ValidationTarget::new("https://github.com/psf/requests").with_filter("test_basic");
    target.instance_id = Some("psf-requests".to_string());

    let solo = ValidationOutcome::begin(&target, "org/a").finish(4, Some("9 passed in 3.10s"), Default::default());
    let team = ValidationOutcome::begin(&target, "org/b")
        .with_team(Some("planner-coder-tester"))
        .finish(10, Some("2 failed, 7 passed in 4.00s"), Default::default());
    recorder.record(&solo).await;
    recorder.record(&team).await;

    let outcomes = read_outcomes(recorder.path()).expect("log should be readable");
    let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
    assert_eq!(statuses, vec![OutcomeStatus::Pass, OutcomeStatus::Fail]);

    let records = read_records(recorder.path()).expect("log should be readable");
    let table = render_summary(
        &records,
        &SummaryFilter::new(None, None, Some("one-agent".to_string())),
    );
    let rows: Vec<_> = table.lines().skip(1).collect();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains("\tpsf-requests\tone-agent\torg/a\tpass\t"));
}
