#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end conversation scenarios with scripted collaborators.

use async_trait::async_trait;
use friday::access::AccessMode;
use friday::auth::FixedAuthenticator;
use friday::config::AssistantConfig;
use friday::error::{AssistantError, Result};
use friday::intent::{Intent, IntentClassifier, KeywordIntentClassifier};
use friday::llm::{LanguageModel, TokenStream};
use friday::memory::{MemoryCategory, RecallOutcome};
use friday::pipeline::MuteFlag;
use friday::runtime::{RuntimeEvent, Stage};
use friday::session::{self, Engines};
use friday::stt::SpeechToText;
use friday::tts::TextToSpeech;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

// ── Scripted collaborators ──────────────────────────────────────────────────

/// Returns scripted utterances, each after a "listening" delay.
///
/// Once the script runs out it keeps hearing "exit", so a line dropped
/// during playback can never leave a session running.
struct ScriptedStt {
    script: VecDeque<(Duration, String)>,
    listen: Duration,
    paced_by: Option<Arc<Mutex<Vec<String>>>>,
    owed: usize,
}

impl ScriptedStt {
    fn new(lines: &[&str], listen: Duration) -> Self {
        Self {
            script: lines.iter().map(|l| (listen, (*l).to_owned())).collect(),
            listen,
            paced_by: None,
            owed: 0,
        }
    }

    /// Hand out a line only once `tts` has spoken a reply to every earlier
    /// line, so no scripted line is captured over playback and dropped.
    fn paced_by(mut self, tts: &SlowTts) -> Self {
        self.paced_by = Some(Arc::clone(&tts.spoken));
        self
    }

    /// Append a line that takes `listen` to hear.
    fn then(mut self, line: &str, listen: Duration) -> Self {
        self.script.push_back((listen, line.to_owned()));
        self
    }
}

#[async_trait]
impl SpeechToText for ScriptedStt {
    async fn transcribe(&mut self, _duration: Duration) -> Result<String> {
        let settled = self
            .paced_by
            .as_ref()
            .is_none_or(|spoken| spoken.lock().unwrap().len() >= self.owed);
        if !settled {
            tokio::time::sleep(self.listen).await;
            return Ok(String::new());
        }

        let (listen, line) = self
            .script
            .pop_front()
            .unwrap_or_else(|| (self.listen, "exit".to_owned()));
        self.owed += 1;
        tokio::time::sleep(listen).await;
        Ok(line)
    }
}

/// Records spoken text and takes `render` time per reply.
///
#[derive(Clone)]
struct SlowTts {
    spoken: Arc<Mutex<Vec<String>>>,
    render: Duration,
}

impl SlowTts {
    fn new(render: Duration) -> Self {
        Self {
            spoken: Arc::new(Mutex::new(Vec::new())),
            render,
        }
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextToSpeech for SlowTts {
    async fn speak(&mut self, text: &str) -> Result<()> {
        if !self.render.is_zero() {
            tokio::time::sleep(self.render).await;
        }
        self.spoken.lock().unwrap().push(text.to_owned());
        Ok(())
    }
}

struct FixedClassifier(Intent);

impl IntentClassifier for FixedClassifier {
    fn classify(&self, _text: &str) -> Result<Intent> {
        Ok(self.0)
    }
}

struct BrokenClassifier;

impl IntentClassifier for BrokenClassifier {
    fn classify(&self, _text: &str) -> Result<Intent> {
        Err(AssistantError::Intent("classifier offline".into()))
    }
}

/// Replies with a fixed sentence and keeps every system prompt it saw.
#[derive(Clone, Default)]
struct CannedModel {
    system_prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LanguageModel for CannedModel {
    async fn generate(&mut self, system: &str, _prompt: &str) -> Result<TokenStream> {
        self.system_prompts.lock().unwrap().push(system.to_owned());
        let items: Vec<Result<String>> = vec![Ok("Sure".to_owned()), Ok(", noted.".to_owned())];
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}

struct OfflineModel;

#[async_trait]
impl LanguageModel for OfflineModel {
    async fn generate(&mut self, _system: &str, _prompt: &str) -> Result<TokenStream> {
        Err(AssistantError::Llm("connection refused".into()))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn test_config(dir: &TempDir) -> AssistantConfig {
    let mut config = AssistantConfig::default();
    config.memory.db_path = dir.path().join("friday_memory.db");
    config.session.greeting = String::new();
    config
}

async fn run_session(
    config: AssistantConfig,
    access: AccessMode,
    engines: Engines,
) -> Vec<RuntimeEvent> {
    let mut auth = FixedAuthenticator(access);
    let pipeline = session::start(config, &mut auth, engines)
        .await
        .expect("session start");
    let (tx, mut rx) = broadcast::channel(256);
    let pipeline = pipeline.with_runtime_events(tx);

    tokio::time::timeout(Duration::from_secs(10), pipeline.run())
        .await
        .expect("session should end")
        .expect("pipeline result");

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn engines(
    stt: ScriptedStt,
    tts: SlowTts,
    classifier: Box<dyn IntentClassifier>,
    llm: Box<dyn LanguageModel>,
) -> Engines {
    Engines {
        stt: Box::new(stt),
        tts: Box::new(tts),
        classifier,
        llm,
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn guest_password_is_not_stored() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let tts = SlowTts::new(Duration::ZERO);

    let events = run_session(
        config.clone(),
        AccessMode::Guest,
        engines(
            ScriptedStt::new(&["my password is admin123", "exit"], Duration::from_millis(1))
                .paced_by(&tts),
            tts.clone(),
            Box::new(FixedClassifier(Intent::MemoryStore)),
            Box::new(OfflineModel),
        ),
    )
    .await;

    assert_eq!(
        tts.spoken(),
        vec![
            "Access Denied: I can only store memories for my recognized owner.",
            "Goodbye. Have a great day.",
        ]
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, RuntimeEvent::MemoryStored { .. }))
    );

    let store = session::open_store(&config).unwrap();
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn owner_fact_is_stored_with_fact_category() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let tts = SlowTts::new(Duration::ZERO);

    let events = run_session(
        config.clone(),
        AccessMode::Owner,
        engines(
            ScriptedStt::new(
                &["remember my project presentation is on Monday", "goodbye"],
                Duration::from_millis(1),
            )
            .paced_by(&tts),
            tts.clone(),
            Box::new(KeywordIntentClassifier::new(&config.intent)),
            Box::new(OfflineModel),
        ),
    )
    .await;

    assert_eq!(
        tts.spoken()[0],
        "Got it. I've added that to my long-term memory."
    );
    assert!(
        events
            .iter()
            .any(|e| matches!(e, RuntimeEvent::MemoryStored { .. }))
    );

    let mut owner = FixedAuthenticator(AccessMode::Owner);
    let RecallOutcome::Records(records) = session::recall(&config, &mut owner, 5).await.unwrap()
    else {
        panic!("expected a stored record");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category, MemoryCategory::Fact);
    assert!(records[0].importance >= 0.6);
}

#[tokio::test]
async fn exit_phrase_stops_every_stage_and_drops_later_speech() {
    let dir = TempDir::new().unwrap();
    let tts = SlowTts::new(Duration::ZERO);

    let events = run_session(
        test_config(&dir),
        AccessMode::Owner,
        engines(
            ScriptedStt::new(&["hello", "SHUTDOWN", "are you still there"], Duration::from_millis(1))
                .paced_by(&tts),
            tts.clone(),
            Box::new(FixedClassifier(Intent::Chat)),
            Box::new(CannedModel::default()),
        ),
    )
    .await;

    assert_eq!(tts.spoken(), vec!["Sure, noted.", "Goodbye. Have a great day."]);
    let utterances: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            RuntimeEvent::Utterance(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(utterances, vec!["hello"]);
    assert_eq!(events.last(), Some(&RuntimeEvent::SessionEnded));
    assert!(events.contains(&RuntimeEvent::Reply {
        text: "Goodbye. Have a great day.".to_owned(),
        is_final: true,
    }));
}

#[tokio::test]
async fn no_utterance_is_emitted_while_speaking() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.session.greeting = "Hello! How can I help?".to_owned();

    // Capture is much faster than playback, so without muting it would
    // emit several utterances during each reply.
    let lines = ["one", "two", "three", "four", "five", "six", "seven", "eight", "bye"];

    let events = run_session(
        config,
        AccessMode::Guest,
        engines(
            ScriptedStt::new(&lines, Duration::from_millis(3)),
            SlowTts::new(Duration::from_millis(40)),
            Box::new(FixedClassifier(Intent::Chat)),
            Box::new(CannedModel::default()),
        ),
    )
    .await;

    let mut muted = false;
    let mut mute_cycles = 0;
    for event in &events {
        match event {
            RuntimeEvent::Muted { active } => {
                muted = *active;
                if *active {
                    mute_cycles += 1;
                }
            }
            RuntimeEvent::Utterance(text) => {
                assert!(!muted, "utterance {text:?} emitted during playback");
            }
            _ => {}
        }
    }
    assert!(mute_cycles >= 2, "greeting and farewell should both be spoken");
    assert!(!muted, "mute flag must be released at the end");
}

#[tokio::test]
async fn clip_spanning_a_whole_reply_is_discarded() {
    let dir = TempDir::new().unwrap();
    let tts = SlowTts::new(Duration::from_millis(50));

    // The reply to "hello" starts and finishes while the second clip is
    // still being recorded, so that clip holds the assistant's own voice.
    let events = run_session(
        test_config(&dir),
        AccessMode::Owner,
        engines(
            ScriptedStt::new(&["hello"], Duration::from_millis(1))
                .then("sure noted", Duration::from_millis(300)),
            tts.clone(),
            Box::new(FixedClassifier(Intent::Chat)),
            Box::new(CannedModel::default()),
        ),
    )
    .await;

    let utterances: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            RuntimeEvent::Utterance(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(utterances, vec!["hello"]);
    assert_eq!(tts.spoken(), vec!["Sure, noted.", "Goodbye. Have a great day."]);
}

#[tokio::test]
async fn classifier_failure_falls_back_and_keeps_listening() {
    let dir = TempDir::new().unwrap();
    let tts = SlowTts::new(Duration::ZERO);
    let model = CannedModel::default();

    let events = run_session(
        test_config(&dir),
        AccessMode::Owner,
        engines(
            ScriptedStt::new(&["hello", "how are you", "bye"], Duration::from_millis(1))
                .paced_by(&tts),
            tts.clone(),
            Box::new(BrokenClassifier),
            Box::new(model.clone()),
        ),
    )
    .await;

    assert_eq!(
        tts.spoken(),
        vec![
            "I'm not sure how to handle that.",
            "I'm not sure how to handle that.",
            "Goodbye. Have a great day.",
        ]
    );
    assert!(model.system_prompts.lock().unwrap().is_empty());
    assert!(events.iter().any(|e| matches!(
        e,
        RuntimeEvent::StageFailure { stage: Stage::Think, error } if error.contains("classifier offline")
    )));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, RuntimeEvent::IntentClassified(_)))
    );
}

#[tokio::test]
async fn guest_prompt_never_sees_owner_memories() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    session::open_store(&config)
        .unwrap()
        .store("remember the vault code is 4242", AccessMode::Owner)
        .unwrap();

    let model = CannedModel::default();
    let tts = SlowTts::new(Duration::ZERO);
    run_session(
        config,
        AccessMode::Guest,
        engines(
            ScriptedStt::new(&["what do you remember about me", "quit"], Duration::from_millis(1))
                .paced_by(&tts),
            tts,
            Box::new(FixedClassifier(Intent::MemoryRecall)),
            Box::new(model.clone()),
        ),
    )
    .await;

    let prompts = model.system_prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("GUEST MODE"));
    assert!(!prompts[0].contains("4242"));
}

#[tokio::test]
async fn owner_prompt_carries_recall_and_working_memory() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    session::open_store(&config)
        .unwrap()
        .store("remember the vault code is 4242", AccessMode::Owner)
        .unwrap();

    let model = CannedModel::default();
    let tts = SlowTts::new(Duration::ZERO);
    run_session(
        config,
        AccessMode::Owner,
        engines(
            ScriptedStt::new(
                &["good morning", "what do you remember about me", "quit"],
                Duration::from_millis(1),
            )
            .paced_by(&tts),
            tts,
            Box::new(KeywordIntentClassifier::default()),
            Box::new(model.clone()),
        ),
    )
    .await;

    let prompts = model.system_prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 2);
    let recall_prompt = &prompts[1];
    assert!(recall_prompt.contains("OWNER VERIFIED"));
    assert!(recall_prompt.contains("1. (fact) remember the vault code is 4242"));
    assert!(recall_prompt.contains("User: good morning\nAssistant: Sure, noted."));
}

#[tokio::test]
async fn backend_outage_falls_back_and_keeps_listening() {
    let dir = TempDir::new().unwrap();
    let tts = SlowTts::new(Duration::ZERO);

    let events = run_session(
        test_config(&dir),
        AccessMode::Owner,
        engines(
            ScriptedStt::new(&["hello", "hello again", "exit"], Duration::from_millis(1))
                .paced_by(&tts),
            tts.clone(),
            Box::new(FixedClassifier(Intent::Chat)),
            Box::new(OfflineModel),
        ),
    )
    .await;

    assert_eq!(
        tts.spoken(),
        vec![
            "I'm not sure how to handle that.",
            "I'm not sure how to handle that.",
            "Goodbye. Have a great day.",
        ]
    );
    let failures = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                RuntimeEvent::StageFailure {
                    stage: Stage::Think,
                    ..
                }
            )
        })
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn mute_flag_is_shared_between_clones() {
    let flag = MuteFlag::new();
    let reader = flag.clone();
    let guard = flag.hold();
    assert!(reader.is_set());
    drop(guard);
    tokio::time::timeout(Duration::from_millis(100), reader.wait_clear())
        .await
        .unwrap();
}
