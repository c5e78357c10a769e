use exam_session::clients::{ExamApi, InMemoryExamStore};
use exam_session::models::{AnswerValue, ExamData, ExamLocation, ExamModule, QuestionId, Status};
use exam_session::services::{
    flatten_answers, nest_answers, CatalogNormalizer, ClockTick, FlatAnswers, ListeningPhase,
    SyncService,
};
use exam_session::workflow::{
    load_exam, ExamSession, LoadedExam, ModuleTransition, ProgressionCoordinator,
    SubmissionOutcome,
};
use exam_session::{Config, ExamRunner, SessionCommand};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

const SESSION: &str = "scenario-session";

fn exam_data() -> ExamData {
    serde_json::from_value(json!({
        "reading": { "sections": [
            { "title": "Passage 1", "questionGroups": [
                { "type": "true_false", "heading": "Questions 1-3", "items": [{}, {}, {}] },
                { "type": "gap_fill", "heading": "Questions 4-5", "items": [{ "id": 4 }, { "id": 5 }] }
            ]}
        ]},
        "listening": { "parts": [
            { "title": "Part 1", "questionGroups": [
                { "type": "true_false", "items": [{}, {}, {}, {}, {}] },
                { "type": "matching", "data": {
                    "items": [{}, {}, {}, {}, {}],
                    "options": ["A", "B", "C", "D", "E", "F"]
                }}
            ]}
        ]},
        "writing": { "tasks": [{ "key": "task1", "prompt": "Describe the chart", "minWords": 150 }] }
    }))
    .unwrap()
}

fn config() -> Config {
    Config {
        submit_retry_delay_secs: 0,
        ..Config::for_session(SESSION)
    }
}

fn coordinator(store: &InMemoryExamStore, config: &Config) -> ProgressionCoordinator {
    let api: Arc<dyn ExamApi> = Arc::new(store.clone());
    ProgressionCoordinator::new(config, api.clone(), SyncService::new(api, SESSION))
}

#[test]
fn scenario_a_listening_numbering_spans_blocks() {
    let data = exam_data();
    let catalog = CatalogNormalizer::normalize(ExamModule::Listening, &data.listening);

    let expected: Vec<QuestionId> = (1..=10)
        .map(|n| QuestionId::numbered(ExamModule::Listening, n))
        .collect();
    assert_eq!(catalog.question_ids(), expected.as_slice());

    let starts: Vec<Option<u32>> = catalog.blocks().map(|b| b.start_id).collect();
    assert_eq!(starts, vec![Some(1), Some(6)]);

    // 重新规范化不改变任何ID
    let again = CatalogNormalizer::normalize(ExamModule::Listening, &catalog.to_raw());
    assert_eq!(again.question_ids(), catalog.question_ids());
}

#[test]
fn ids_are_unique_across_modules() {
    let data = exam_data();
    let mut seen = HashSet::new();
    for module in [ExamModule::Reading, ExamModule::Listening] {
        let catalog = CatalogNormalizer::normalize(module, data.module_raw(module));
        for id in catalog.question_ids() {
            assert!(seen.insert(id.clone()), "重复ID: {}", id);
        }
    }
    assert_eq!(seen.len(), 15);
}

#[test]
fn ids_with_another_modules_prefix_stay_unique() {
    let data: ExamData = serde_json::from_value(json!({
        "reading": { "sections": [{ "questionGroups": [
            { "type": "mcq", "items": [{}, {}, {}] }
        ]}]},
        "listening": { "parts": [{ "questionGroups": [
            { "type": "mcq", "items": [{ "id": "reading-3" }] }
        ]}]}
    }))
    .unwrap();

    let mut seen = HashSet::new();
    for module in [ExamModule::Reading, ExamModule::Listening] {
        let catalog = CatalogNormalizer::normalize(module, data.module_raw(module));
        for id in catalog.question_ids() {
            assert!(seen.insert(id.clone()), "重复ID: {}", id);
        }
    }
    assert_eq!(seen.len(), 4);

    // 听力题的答案仍然归在听力模块下
    let listening = CatalogNormalizer::normalize(ExamModule::Listening, &data.listening);
    let mut flat = FlatAnswers::new();
    flat.insert(
        listening.question_ids()[0].clone(),
        AnswerValue::Text("A".into()),
    );
    let nested = nest_answers(&flat);
    assert!(nested.contains_key("listening"));
    assert!(!nested.contains_key("reading"));
}

#[test]
fn scenario_b_flag_survives_rewrite() {
    let loaded = LoadedExam::online(exam_data());
    let mut session = ExamSession::new(&config(), ExamModule::Reading, &loaded, None);

    assert_ok!(session.set_answer("reading-3", AnswerValue::Text("TRUE".into())));
    assert_eq!(assert_ok!(session.toggle_flag("reading-3")), Status::Flagged);

    let id = assert_ok!(session.set_answer("reading-3", AnswerValue::Text("FALSE".into())));
    assert_eq!(session.status_of(&id), Status::Flagged);
    assert_eq!(
        session.answer(&id),
        Some(&AnswerValue::Text("FALSE".into()))
    );
}

#[test]
fn nested_answers_round_trip() {
    let loaded = LoadedExam::online(exam_data());
    let mut session = ExamSession::new(&config(), ExamModule::Reading, &loaded, None);
    session
        .set_answer("1", AnswerValue::Selection("TRUE".into()))
        .unwrap();
    session
        .set_answer(
            "4",
            AnswerValue::MultiBlank([(1, "cat".to_string()), (2, "dog".to_string())].into()),
        )
        .unwrap();

    let nested = session.nested_answers();
    assert_eq!(nest_answers(&flatten_answers(&nested)), nested);
}

#[tokio::test]
async fn scenario_c_clock_expiry_submits_once() {
    let store = InMemoryExamStore::new();
    let config = config();
    let coordinator = coordinator(&store, &config);
    let mut session = ExamSession::new(&config, ExamModule::Reading, &LoadedExam::offline(5), None);
    assert_eq!(session.time_left(), 3600);

    let mut submissions = Vec::new();
    for _ in 0..3700 {
        if session.tick_clock() == ClockTick::Expired {
            submissions.push(coordinator.submit_exam(&mut session).await);
        }
    }

    assert_eq!(submissions, vec![SubmissionOutcome::Submitted { attempts: 1 }]);
    assert!(session.is_exam_ended());
    assert_eq!(session.time_left(), 0);
    assert_eq!(store.finish_calls(), 1);
    assert_eq!(
        coordinator.submit_exam(&mut session).await,
        SubmissionOutcome::AlreadySubmitted
    );
    assert_err!(session.set_answer("1", AnswerValue::Text("late".into())));
}

#[tokio::test]
async fn scenario_d_review_end_advances_to_writing() {
    let store = InMemoryExamStore::new();
    let config = config();
    let coordinator = coordinator(&store, &config);
    let loaded = LoadedExam::online(exam_data());
    let mut session = ExamSession::new(&config, ExamModule::Listening, &loaded, None);

    assert_eq!(session.listening_phase(), ListeningPhase::Audio);
    assert!(assert_ok!(session.start_review_phase()));
    assert_eq!(session.review_time_left(), 120);

    let mut transitions = Vec::new();
    for _ in 0..130 {
        session.tick_clock();
        if session.tick_review() {
            transitions.push(coordinator.finish_module(&mut session).await);
        }
    }
    assert_eq!(
        transitions,
        vec![ModuleTransition::Advanced(ExamLocation::new(
            SESSION,
            ExamModule::Writing
        ))]
    );
    assert_eq!(session.listening_phase(), ListeningPhase::Ended);
    assert_eq!(
        coordinator.finish_module(&mut session).await,
        ModuleTransition::AlreadyHandled
    );
    assert_eq!(store.save_calls(), 1);
}

#[tokio::test]
async fn scenario_e_failed_sync_keeps_local_state() {
    let store = InMemoryExamStore::new();
    store.fail_next_saves(1);
    let config = config();
    let coordinator = coordinator(&store, &config);
    let mut session = ExamSession::new(&config, ExamModule::Reading, &LoadedExam::offline(5), None);
    session
        .set_answer("2", AnswerValue::Text("B".into()))
        .unwrap();
    let before = session.answers().clone();

    assert!(!coordinator.sync_progress_to_server(&session).await);
    assert_eq!(session.answers(), &before);
    assert!(store.saved_progress(SESSION).is_none());

    // 下一次定时同步就是重试
    assert!(coordinator.sync_progress_to_server(&session).await);
    let saved = store.saved_progress(SESSION).unwrap();
    assert_eq!(
        saved.answers["reading"].get("2"),
        Some(&AnswerValue::Text("B".into()))
    );
    assert_eq!(store.save_calls(), 2);
}

#[tokio::test]
async fn resume_from_saved_progress() {
    let store = InMemoryExamStore::new().with_exam(SESSION, exam_data());
    let config = config();
    let coordinator = coordinator(&store, &config);

    let loaded = assert_ok!(load_exam(&config, &store).await);
    let mut reading = ExamSession::new(&config, ExamModule::Reading, &loaded, None);
    reading
        .set_answer("5", AnswerValue::Text("harbour".into()))
        .unwrap();
    for _ in 0..10 {
        reading.tick_clock();
    }
    assert!(coordinator.sync_progress_to_server(&reading).await);

    let reloaded = assert_ok!(load_exam(&config, &store).await);
    let resumed = ExamSession::new(&config, ExamModule::Reading, &reloaded, None);
    assert_eq!(resumed.time_left(), 3590);
    assert_eq!(resumed.answered_count(), 1);
}

#[tokio::test]
async fn resume_with_new_coordinator_keeps_syncing() {
    let store = InMemoryExamStore::new().with_exam(SESSION, exam_data());
    let config = config();

    let first = coordinator(&store, &config);
    let loaded = assert_ok!(load_exam(&config, &store).await);
    let mut reading = ExamSession::new(&config, ExamModule::Reading, &loaded, None);
    reading
        .set_answer("1", AnswerValue::Text("TRUE".into()))
        .unwrap();
    for _ in 0..3 {
        assert!(first.sync_progress_to_server(&reading).await);
    }

    // 重新进入考试，同步服务是全新的
    let reloaded = assert_ok!(load_exam(&config, &store).await);
    let second = coordinator(&store, &config);
    second
        .sync_service()
        .resume_after(reloaded.data.progress_sequence);
    let mut resumed = ExamSession::new(&config, ExamModule::Reading, &reloaded, None);
    resumed
        .set_answer("2", AnswerValue::Text("B".into()))
        .unwrap();
    assert!(second.sync_progress_to_server(&resumed).await);

    let saved = store.saved_progress(SESSION).unwrap();
    assert!(saved.answers["reading"].contains_key("1"));
    assert_eq!(
        saved.answers["reading"].get("2"),
        Some(&AnswerValue::Text("B".into()))
    );
    assert_eq!(store.discarded_envelopes(), 0);
}

// ========== 事件循环 ==========

async fn run_with(
    runner: ExamRunner,
    script: Vec<(u64, SessionCommand)>,
) -> exam_session::RunReport {
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(async move { runner.run(rx).await });
    for (delay_ms, command) in script {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        if tx.send(command).await.is_err() {
            break;
        }
    }
    let report = handle.await.unwrap().unwrap();
    drop(tx);
    report
}

#[tokio::test]
async fn runner_submits_when_clock_runs_out() {
    let store = InMemoryExamStore::new().with_exam(SESSION, exam_data());
    let config = Config {
        exam_duration_secs: 5,
        ..config()
    };
    let runner = ExamRunner::new(config, Arc::new(store.clone()))
        .with_tick_period(Duration::from_millis(5));

    let report = run_with(
        runner,
        vec![(0, SessionCommand::parse("answer 1 TRUE").unwrap())],
    )
    .await;

    assert_eq!(report.visited, vec![ExamModule::Reading]);
    assert_eq!(
        report.submission,
        Some(SubmissionOutcome::Submitted { attempts: 1 })
    );
    assert_eq!(store.finish_calls(), 1);
    let finished = store.finished(SESSION).unwrap();
    assert_eq!(
        finished.answers["reading"].get("1"),
        Some(&AnswerValue::Text("TRUE".into()))
    );
}

#[tokio::test]
async fn runner_walks_modules_in_order() {
    let store = InMemoryExamStore::new().with_exam(SESSION, exam_data());
    let config = Config {
        review_duration_secs: 3,
        ..config()
    };
    let runner = ExamRunner::new(config, Arc::new(store.clone()))
        .with_tick_period(Duration::from_millis(5));

    let report = run_with(
        runner,
        vec![
            (0, SessionCommand::Answer {
                id: "2".into(),
                value: AnswerValue::Text("FALSE".into()),
            }),
            (0, SessionCommand::FinishModule),
            (0, SessionCommand::AudioEnded),
            (500, SessionCommand::Write {
                key: "task1".into(),
                text: "The chart shows a steady rise".into(),
            }),
            (0, SessionCommand::FinishModule),
            (0, SessionCommand::FinishModule),
        ],
    )
    .await;

    assert_eq!(
        report.visited,
        vec![
            ExamModule::Reading,
            ExamModule::Listening,
            ExamModule::Writing,
            ExamModule::Speaking
        ]
    );
    assert!(matches!(
        report.submission,
        Some(SubmissionOutcome::Submitted { .. })
    ));

    // 每个模块结束都同步一次，最后一次快照包含写作内容
    let saved = store.saved_progress(SESSION).unwrap();
    assert_eq!(
        saved.writing_responses.get("task1").map(String::as_str),
        Some("The chart shows a steady rise")
    );
    assert_eq!(
        saved.answers["reading"].get("2"),
        Some(&AnswerValue::Text("FALSE".into()))
    );
}

#[tokio::test]
async fn runner_retries_sync_on_next_periodic_tick() {
    let store = InMemoryExamStore::new().with_exam(SESSION, exam_data());
    store.fail_next_saves(1);
    let config = Config {
        sync_interval_secs: 1,
        ..config()
    };
    let runner = ExamRunner::new(config, Arc::new(store.clone()));

    let report = run_with(
        runner,
        vec![
            (0, SessionCommand::parse("select 3 NOT GIVEN").unwrap()),
            (2500, SessionCommand::Submit),
        ],
    )
    .await;

    assert!(report.submission.is_some());
    assert!(store.save_calls() >= 2);
    let saved = store.saved_progress(SESSION).unwrap();
    assert!(saved.answers["reading"].contains_key("3"));
}

#[tokio::test]
async fn runner_stops_when_channel_closes() {
    let store = InMemoryExamStore::new();
    let runner = ExamRunner::new(config(), Arc::new(store.clone()));
    let (tx, rx) = mpsc::channel(4);
    tx.send(SessionCommand::Security(
        exam_session::models::SecurityEventKind::WindowBlur,
    ))
    .await
    .unwrap();
    drop(tx);

    let report = assert_ok!(runner.run(rx).await);
    assert_eq!(report.submission, None);
    assert_eq!(report.visited, vec![ExamModule::Reading]);
    assert!(store.saved_progress(SESSION).is_some());
    // 安全事件在后台上报
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.security_events().len(), 1);
}

#[tokio::test]
async fn runner_resumes_progress_from_previous_run() {
    let store = InMemoryExamStore::new().with_exam(SESSION, exam_data());

    let first = ExamRunner::new(config(), Arc::new(store.clone()));
    let report = run_with(
        first,
        vec![
            (0, SessionCommand::parse("answer 1 TRUE").unwrap()),
            (0, SessionCommand::Quit),
        ],
    )
    .await;
    assert_eq!(report.submission, None);

    let second = ExamRunner::new(config(), Arc::new(store.clone()));
    let report = run_with(
        second,
        vec![
            (0, SessionCommand::parse("answer 2 FALSE").unwrap()),
            (0, SessionCommand::Quit),
        ],
    )
    .await;
    assert_eq!(report.submission, None);

    let saved = store.saved_progress(SESSION).unwrap();
    assert_eq!(
        saved.answers["reading"].get("1"),
        Some(&AnswerValue::Text("TRUE".into()))
    );
    assert_eq!(
        saved.answers["reading"].get("2"),
        Some(&AnswerValue::Text("FALSE".into()))
    );
    assert_eq!(store.discarded_envelopes(), 0);
}

#[tokio::test]
async fn runner_debounces_writing_sync() {
    let store = InMemoryExamStore::new().with_exam(SESSION, exam_data());
    let config = Config {
        start_module: ExamModule::Writing,
        writing_debounce_millis: 300,
        ..config()
    };
    let runner = ExamRunner::new(config, Arc::new(store.clone()));
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(async move { runner.run(rx).await });

    let mut text = String::new();
    for word in ["The", "chart", "shows", "a", "rise"] {
        text.push_str(word);
        text.push(' ');
        tx.send(SessionCommand::Write {
            key: "task1".into(),
            text: text.trim_end().to_string(),
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // 最后一次输入后防抖还没到期
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.save_calls(), 0);

    // 连续输入只合并成一次同步
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.save_calls(), 1);
    let saved = store.saved_progress(SESSION).unwrap();
    assert_eq!(
        saved.writing_responses.get("task1").map(String::as_str),
        Some("The chart shows a rise")
    );

    tx.send(SessionCommand::Quit).await.unwrap();
    let report = assert_ok!(handle.await.unwrap());
    assert_eq!(report.visited, vec![ExamModule::Writing]);
}
