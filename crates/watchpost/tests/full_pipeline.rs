mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use watchpost_cases::{index_rebuilder, CaseStore, ReindexScheduler};
use watchpost_core::{AlarmLevel, AlarmSummary, DecisionSource, DocKind, ResultHistory};
use watchpost_index::BuildOptions;
use watchpost_pipeline::{Dispatch, InferenceDispatcher, JsonlNotifier, Orchestrator, Publisher};
use watchpost_telemetry::{read_jsonl, Paths};

#[tokio::test]
async fn test_fire_without_person_is_critical_alarm() {
    let dir = TempDir::new().unwrap();
    let paths = Paths::with_root(dir.path());
    seed_corpus(&paths, &[("badge_policy.md", RULE_DOC)]);
    let embedder = embedder();
    build(&paths, &embedder);
    let cases = Arc::new(CaseStore::new(&paths).unwrap());

    // The reasoning model answers nonsense, so the rule engine decides.
    let orchestrator = Orchestrator::new(
        ScriptedVision::new(vision_reply(false, "n/a", false, true, "smoke near the generator")),
        ScriptedReasoning::new("I am unable to help with that.".to_string()),
        retriever(&paths, embedder),
        Arc::new(ResultHistory::new(10)),
        settings(),
    )
    .with_cases(Arc::clone(&cases));

    let report = orchestrator.run_cycle(frame(1)).await.unwrap();
    assert!(report.summary.is_alarm);
    assert_eq!(report.summary.alarm_level, AlarmLevel::Critical);
    assert_eq!(report.summary.source, DecisionSource::RuleEngine);

    let stored = report.case.expect("critical alarm persisted");
    let case = cases.get_case(&stored.case_id).unwrap().unwrap();
    assert!(case
        .image_path
        .unwrap()
        .to_string_lossy()
        .ends_with("_critical.jpg"));
}

#[tokio::test]
async fn test_retrieval_counts_flow_into_decision() {
    let dir = TempDir::new().unwrap();
    let paths = Paths::with_root(dir.path());
    seed_corpus(
        &paths,
        &[
            ("badge_policy.md", RULE_DOC),
            ("case_20250101_000000_000_aaaa.md", "Person without badge at the loading dock."),
            ("case_20250102_000000_000_bbbb.md", "Visitor tailgated into the server room."),
        ],
    );
    let embedder = embedder();
    assert_eq!(build(&paths, &embedder).chunks, 3);

    let mut settings = settings();
    settings.threshold = 0.0;
    let orchestrator = Orchestrator::new(
        ScriptedVision::new(vision_reply(true, "not_worn", false, false, "person at the dock")),
        ScriptedReasoning::new(reasoning_reply("yes", "general", "badge missing")),
        retriever(&paths, embedder),
        Arc::new(ResultHistory::new(10)),
        settings,
    );

    let report = orchestrator.run_cycle(frame(1)).await.unwrap();
    assert_eq!(report.documents.len(), 3);
    assert_eq!(
        report.documents.iter().filter(|d| d.kind == DocKind::Rule).count(),
        1
    );
    let metadata = &report.result.metadata;
    assert_eq!(metadata.source, DecisionSource::Model);
    assert_eq!(
        (metadata.kb_total_references, metadata.kb_rule_files, metadata.kb_history_cases),
        (3, 1, 2)
    );
    assert_eq!(report.summary.kb_total_references, 3);
    assert!(report.documents.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[tokio::test]
async fn test_reasoning_timeout_uses_fallback() {
    let dir = TempDir::new().unwrap();
    let paths = Paths::with_root(dir.path());
    let mut settings = settings();
    settings.reasoning_timeout = Duration::from_millis(100);

    let orchestrator = Orchestrator::new(
        ScriptedVision::new(vision_reply(true, "unconfirmed", true, false, "person at the gate")),
        ScriptedReasoning::slow(
            reasoning_reply("no", "none", "too late"),
            Duration::from_secs(30),
        ),
        retriever(&paths, embedder()),
        Arc::new(ResultHistory::new(10)),
        settings,
    );

    let report = orchestrator.run_cycle(frame(4)).await.unwrap();
    assert!(report.fallback_reason.is_some());
    assert_eq!(report.result.metadata.model, "fallback rule engine");
    assert_eq!(report.result.decision.confidence, 0.5);
    // No index on disk: retrieval degrades to no evidence.
    assert!(report.documents.is_empty());
    assert_eq!(report.summary.alarm_level, AlarmLevel::Severe);
    assert_eq!(orchestrator.history().latest().unwrap().frame_sequence, Some(4));
}

#[tokio::test]
async fn test_new_case_becomes_retrievable_after_reindex() {
    let dir = TempDir::new().unwrap();
    let paths = Paths::with_root(dir.path());
    seed_corpus(&paths, &[("badge_policy.md", RULE_DOC)]);
    let embedder = embedder();
    build(&paths, &embedder);
    let retriever = retriever(&paths, embedder);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = ReindexScheduler::spawn(
        index_rebuilder(
            paths.kb_source_dir(),
            paths.index_path(),
            Arc::clone(&retriever),
            BuildOptions::default(),
        ),
        Arc::clone(&retriever),
        Duration::from_millis(50),
        Duration::from_millis(50),
        shutdown_rx,
    );
    let cases = Arc::new(CaseStore::new(&paths).unwrap().with_reindex(scheduler.handle()));

    let before = retriever.query("server room intrusion", 10, 0.0);
    assert!(before.iter().all(|d| d.kind == DocKind::Rule));

    let orchestrator = Orchestrator::new(
        ScriptedVision::new(vision_reply(true, "not_worn", true, false, "server room intrusion")),
        ScriptedReasoning::new(reasoning_reply("yes", "critical", "no badge in server room")),
        Arc::clone(&retriever),
        Arc::new(ResultHistory::new(10)),
        settings(),
    )
    .with_cases(cases);
    let report = orchestrator.run_cycle(frame(1)).await.unwrap();
    assert!(report.case.is_some());

    assert!(eventually(Duration::from_secs(10), || retriever.stats().generation >= 1).await);
    let after = retriever.query("server room intrusion", 10, 0.0);
    assert!(after.iter().any(|d| d.kind == DocKind::Case));

    shutdown_tx.send(true).unwrap();
    scheduler.join().await;
}

#[tokio::test]
async fn test_single_flight_and_publication() {
    let dir = TempDir::new().unwrap();
    let paths = Paths::with_root(dir.path());
    paths.ensure_dirs().unwrap();

    let (publisher, publisher_task) =
        Publisher::spawn(vec![Arc::new(JsonlNotifier::new(paths.alarm_feed()))], 8);
    let mut vision = ScriptedVision::new(vision_reply(true, "worn", false, false, "staff at desk"));
    vision.delay = Duration::from_millis(200);
    let orchestrator = Orchestrator::new(
        vision,
        ScriptedReasoning::new(reasoning_reply("no", "none", "all clear")),
        retriever(&paths, embedder()),
        Arc::new(ResultHistory::new(10)),
        settings(),
    )
    .with_publisher(publisher);
    let history = Arc::clone(orchestrator.history());
    let dispatcher = InferenceDispatcher::new(Arc::new(orchestrator), Duration::from_secs(2));

    let outcomes: Vec<Dispatch> = (1..=10).map(|i| dispatcher.try_infer(frame(i))).collect();
    let mut started = 0;
    for outcome in outcomes {
        match outcome {
            Dispatch::Started(handle) => {
                started += 1;
                handle.await.unwrap();
            }
            Dispatch::Busy => {}
            Dispatch::Throttled => panic!("nothing started before the first call"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(history.len(), 1);
    assert_eq!(history.latest().unwrap().frame_sequence, Some(1));

    drop(dispatcher);
    publisher_task.await.unwrap();
    let feed: Vec<AlarmSummary> = read_jsonl(&paths.alarm_feed()).unwrap();
    assert_eq!(feed.len(), 1);
    assert!(!feed[0].is_alarm);
}
