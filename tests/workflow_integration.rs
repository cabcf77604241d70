//! Integration tests for the orchestration workflow
//!
//! Every test runs the real orchestrator against deterministic steps and
//! scripted corpus stores; nothing here needs Ollama or Qdrant.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use tokio_util::sync::CancellationToken;

use common::*;
use docbuddy::agent::WorkflowPhase;
use docbuddy::steps::{ClausePlanner, ModelPlanner, StepSet};
use docbuddy::types::Query;

#[tokio::test]
async fn test_retry_limit_question_is_answered_first_time() {
    let config = test_config();
    let retriever = Arc::new(ScriptedRetriever::new(vec![chunk(
        "retry-guide",
        0,
        "maxRetries defaults to 2",
        0.9,
    )]));
    let orchestrator = orchestrator(
        steps_with(Arc::new(ClausePlanner::new()), retriever.clone(), &config),
        config,
    );

    let run = orchestrator
        .execute(Query::new("What is the retry limit?"), CancellationToken::new())
        .await;
    let answer = run.outcome.expect("answer");

    let result = run.state.result(0).expect("one research result");
    assert_eq!(result.chunks().len(), 1);
    let verdict = run.state.verdict(0).expect("accepted");
    assert!(verdict.score >= 0.5);
    assert!(!verdict.best_effort);

    assert!(answer.text().contains("retry-guide"));
    assert_eq!(answer.citations().len(), 1);
    assert_eq!(answer.citations()[0].document_id, "retry-guide");
    assert!((answer.confidence() - 0.9).abs() < 1e-6);
    assert_eq!(run.state.total_retries(), 0);
    assert_eq!(run.state.attempts(0), 1);
    assert_eq!(retriever.calls(), 1);
}

#[tokio::test]
async fn test_unreachable_corpus_fails_in_researching() {
    let config = test_config();
    let retriever = Arc::new(ScriptedRetriever::unreachable());
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&[]), retriever.clone(), &config),
        config.clone(),
    );

    let run = orchestrator
        .execute(Query::new("What is the retry limit?"), CancellationToken::new())
        .await;
    let failure = run.outcome.expect_err("failure");

    assert_eq!(failure.step, WorkflowPhase::Researching);
    assert_eq!(failure.cause(), "RetrievalError");
    assert_eq!(run.state.phase(), WorkflowPhase::Failed);

    let budget = config.max_retries_per_subquestion;
    assert_eq!(run.state.retries(0), budget);
    assert_eq!(run.state.attempts(0), budget + 1);
    assert_eq!(retriever.calls(), budget as usize + 1);
    assert!(run.state.answer().is_none());
}

#[tokio::test]
async fn test_transient_retrieval_error_is_retried() {
    let config = test_config();
    let retriever = Arc::new(
        ScriptedRetriever::new(vec![chunk("guide", 0, "maxRetries defaults to 2", 0.8)])
            .failing_first(1),
    );
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&[]), retriever.clone(), &config),
        config,
    );

    let run = orchestrator
        .execute(Query::new("retry limit?"), CancellationToken::new())
        .await;

    assert!(run.outcome.is_ok());
    assert_eq!(run.state.retries(0), 1);
    assert_eq!(run.state.attempts(0), 2);
}

#[tokio::test]
async fn test_always_low_critic_terminates_with_best_effort() {
    let config = test_config();
    let retriever = Arc::new(ScriptedRetriever::new(vec![chunk("guide", 0, "vaguely related", 0.9)]));
    let mut steps = steps_with(ScriptedPlanner::new(&["a?", "b?", "c?"]), retriever.clone(), &config);
    steps.critic = Arc::new(FixedCritic(0.1));
    let orchestrator = orchestrator(steps, config.clone());

    let run = orchestrator
        .execute(Query::new("a? b? c?"), CancellationToken::new())
        .await;
    let answer = run.outcome.expect("best-effort answer");

    for ordinal in 0..3 {
        assert_eq!(run.state.attempts(ordinal), config.max_retries_per_subquestion + 1);
        assert!(run.state.verdict(ordinal).unwrap().best_effort);
    }
    assert_eq!(run.state.best_effort_ordinals(), vec![0, 1, 2]);
    assert!((answer.confidence() - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn test_only_rejected_sub_question_is_researched_again() {
    let config = test_config();
    let retriever = Arc::new(
        ScriptedRetriever::new(vec![chunk("guide", 0, "solid answer", 0.9)]).respond(
            "weak?",
            vec![vec![chunk("guide", 1, "barely related", 0.2)]],
        ),
    );
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&["strong?", "weak?"]), retriever.clone(), &config),
        config,
    );

    let run = orchestrator
        .execute(Query::new("strong? weak?"), CancellationToken::new())
        .await;

    assert!(run.outcome.is_ok());
    assert_eq!(run.state.attempts(0), 1);
    assert_eq!(run.state.attempts(1), 2);
    assert_eq!(run.state.retries(1), 1);
    assert!(!run.state.verdict(1).unwrap().best_effort);
    assert_eq!(retriever.calls(), 3);

    let phases: Vec<_> = run.state.trace().iter().map(|t| t.to).collect();
    assert_eq!(
        phases,
        vec![
            WorkflowPhase::Researching,
            WorkflowPhase::Critiquing,
            WorkflowPhase::Researching,
            WorkflowPhase::Critiquing,
            WorkflowPhase::Synthesizing,
            WorkflowPhase::Done,
        ]
    );
}

#[tokio::test]
async fn test_result_count_matches_sub_questions() {
    let config = test_config();
    let retriever = Arc::new(ScriptedRetriever::new(vec![chunk("guide", 0, "text", 0.7)]));
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&["one?", "two?", "three?"]), retriever, &config),
        config,
    );

    let run = orchestrator
        .execute(Query::new("one? two? three?"), CancellationToken::new())
        .await;

    assert!(run.outcome.is_ok());
    assert_eq!(run.state.sub_questions().len(), 3);
    assert_eq!(run.state.results().len(), run.state.sub_questions().len());
}

#[tokio::test]
async fn test_plan_is_capped_at_max_subquestions() {
    let mut config = test_config();
    config.max_subquestions = 2;
    let retriever = Arc::new(ScriptedRetriever::new(vec![chunk("guide", 0, "text", 0.7)]));
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&["a?", "b?", "c?", "d?"]), retriever, &config),
        config,
    );

    let run = orchestrator
        .execute(Query::new("a? b? c? d?"), CancellationToken::new())
        .await;

    assert!(run.outcome.is_ok());
    assert_eq!(run.state.sub_questions().len(), 2);
}

#[tokio::test]
async fn test_degenerate_query_researches_original_text() {
    let config = test_config();
    let planner = ScriptedPlanner::new(&[]);
    let retriever = Arc::new(ScriptedRetriever::new(vec![chunk("guide", 0, "maxRetries defaults to 2", 0.9)]));
    let orchestrator = orchestrator(steps_with(planner.clone(), retriever, &config), config);

    let run = orchestrator
        .execute(Query::new("What is the retry limit?"), CancellationToken::new())
        .await;

    let answer = run.outcome.expect("answer");
    assert_eq!(run.state.sub_questions().len(), 1);
    assert_eq!(run.state.sub_questions()[0].text, "What is the retry limit?");
    assert_eq!(run.state.results().len(), 1);
    assert!(!answer.citations().is_empty());
    assert_eq!(planner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_same_query_gives_same_answer() {
    let config = test_config();
    let retriever = Arc::new(ScriptedRetriever::new(vec![
        chunk("a", 0, "first passage", 0.8),
        chunk("b", 0, "second passage", 0.8),
        chunk("c", 3, "third passage", 0.6),
    ]));
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&["x?", "y?"]), retriever, &config),
        config,
    );

    let first = orchestrator.run(Query::new("x? y?")).await.expect("first");
    let second = orchestrator.run(Query::new("x? y?")).await.expect("second");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_fabricated_citation_fails_synthesis() {
    let config = test_config();
    let planner = ScriptedPlanner::new(&[]);
    let retriever = Arc::new(ScriptedRetriever::new(vec![chunk("guide", 0, "text", 0.9)]));
    let mut steps = steps_with(planner.clone(), retriever, &config);
    steps.synthesizer = Arc::new(FabricatingSynthesizer);
    let orchestrator = orchestrator(steps, config);

    let run = orchestrator
        .execute(Query::new("anything"), CancellationToken::new())
        .await;
    let failure = run.outcome.expect_err("synthesis must fail");

    assert_eq!(failure.step, WorkflowPhase::Synthesizing);
    assert_eq!(failure.cause(), "SynthesisError");
    assert!(run.state.answer().is_none());
    // Never retried by the orchestrator
    assert_eq!(planner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_planning_error_fails_in_planning() {
    let config = test_config();
    let retriever = Arc::new(ScriptedRetriever::new(vec![]));
    let orchestrator = orchestrator(
        steps_with(Arc::new(BrokenPlanner), retriever.clone(), &config),
        config,
    );

    let failure = orchestrator
        .run(Query::new("anything"))
        .await
        .expect_err("planning failure");

    assert_eq!(failure.step, WorkflowPhase::Planning);
    assert_eq!(failure.cause(), "PlanningError");
    assert_eq!(retriever.calls(), 0);
}

#[tokio::test]
async fn test_model_outage_fails_planning_with_planning_error() {
    let config = test_config();
    let retriever = Arc::new(ScriptedRetriever::new(vec![]));
    let orchestrator = orchestrator(
        steps_with(
            Arc::new(ModelPlanner::new(Arc::new(UnreachableModel))),
            retriever.clone(),
            &config,
        ),
        config,
    );

    let failure = orchestrator
        .run(Query::new("What is the retry limit?"))
        .await
        .expect_err("model outage");

    assert_eq!(failure.step, WorkflowPhase::Planning);
    assert_eq!(failure.cause(), "PlanningError");
    assert_eq!(retriever.calls(), 0);
}

#[tokio::test]
async fn test_empty_retrieval_fails_synthesis_after_budget() {
    let config = test_config();
    let retriever = Arc::new(ScriptedRetriever::new(vec![]));
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&[]), retriever.clone(), &config),
        config.clone(),
    );

    let run = orchestrator
        .execute(Query::new("nothing matches this"), CancellationToken::new())
        .await;
    let failure = run.outcome.expect_err("nothing to ground an answer in");

    assert_eq!(failure.step, WorkflowPhase::Synthesizing);
    assert_eq!(run.state.attempts(0), config.max_retries_per_subquestion + 1);
}

#[tokio::test]
async fn test_research_parallelism_is_bounded() {
    let mut config = test_config();
    config.max_parallel_research = 2;
    let retriever = Arc::new(
        ScriptedRetriever::new(vec![chunk("guide", 0, "text", 0.9)])
            .with_delay(Duration::from_millis(30)),
    );
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&["a?", "b?", "c?", "d?"]), retriever.clone(), &config),
        config,
    );

    let run = orchestrator
        .execute(Query::new("a? b? c? d?"), CancellationToken::new())
        .await;

    assert!(run.outcome.is_ok());
    assert!(retriever.max_in_flight.load(Ordering::SeqCst) <= 2);
    let ordinals: Vec<_> = run.state.results().keys().copied().collect();
    assert_eq!(ordinals, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_cancellation_during_research_abandons_tasks() {
    let config = test_config();
    let retriever = Arc::new(
        ScriptedRetriever::new(vec![chunk("guide", 0, "text", 0.9)])
            .with_delay(Duration::from_secs(30)),
    );
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&["a?", "b?"]), retriever.clone(), &config),
        config,
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let run = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.execute(Query::new("a? b?"), cancel),
    )
    .await
    .expect("cancellation must not wait for the slow store");

    let failure = run.outcome.expect_err("cancelled");
    assert_eq!(failure.step, WorkflowPhase::Researching);
    assert_eq!(failure.cause(), "Cancelled");
    assert_eq!(run.state.phase(), WorkflowPhase::Failed);
    assert!(run.state.results().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(retriever.completed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancellation_during_backoff() {
    let mut config = test_config();
    config.retry_backoff_ms = 10_000;
    let retriever = Arc::new(ScriptedRetriever::unreachable());
    let orchestrator = orchestrator(
        steps_with(ScriptedPlanner::new(&[]), retriever.clone(), &config),
        config,
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let run = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.execute(Query::new("q"), cancel),
    )
    .await
    .expect("backoff must be interruptible");

    assert_eq!(run.outcome.expect_err("cancelled").cause(), "Cancelled");
    assert_eq!(retriever.calls(), 1);
}

#[quickcheck]
fn prop_retry_loop_terminates(budget: u8, plan_size: u8, fail_first: u8) -> TestResult {
    let budget = (budget % 4) as u32;
    let plan_size = (plan_size % 4) as usize + 1;
    let fail_first = (fail_first % 6) as usize;

    let mut config = test_config();
    config.max_retries_per_subquestion = budget;

    let plan: Vec<String> = (0..plan_size).map(|i| format!("q{}?", i)).collect();
    let plan_refs: Vec<&str> = plan.iter().map(|s| s.as_str()).collect();
    let retriever = Arc::new(
        ScriptedRetriever::new(vec![chunk("guide", 0, "text", 0.9)]).failing_first(fail_first),
    );
    let mut steps: StepSet = steps_with(ScriptedPlanner::new(&plan_refs), retriever, &config);
    steps.critic = Arc::new(FixedCritic(0.0));
    let orchestrator = orchestrator(steps, config);

    let run = tokio_test::block_on(orchestrator.execute(Query::new("q"), CancellationToken::new()));

    let bounded = (0..plan_size).all(|o| run.state.attempts(o) <= budget + 1);
    let terminal = run.state.phase().is_terminal();
    TestResult::from_bool(bounded && terminal)
}
