//! End-to-end interview flows against scripted capabilities.
//!
//! No network, no audio hardware: the assistant/transcription/synthesis/
//! submission capabilities and the playback sink are all scripted, so the
//! tests drive the real state machine and observe ordering.

use async_trait::async_trait;
use intervox_voice::{
    Assistant, AudioClip, Capabilities, InterviewError, InterviewResult, InterviewSession,
    Phase, PlaceholderCapture, ResultSubmission, SessionConfig, SessionEvent, SpeechSink,
    SpeechSynthesis, Transcription, TurnRecord, UtteranceHandle,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

// ---------------------------------------------------------------------
// Scripted capabilities
// ---------------------------------------------------------------------

struct ScriptedAssistant {
    sessions: AtomicUsize,
    replies: Mutex<VecDeque<InterviewResult<String>>>,
    /// Returned once the scripted replies run out (lets long random
    /// sequences keep going without ending the interview).
    fallback: Option<String>,
}

impl ScriptedAssistant {
    fn new(replies: Vec<InterviewResult<String>>) -> Self {
        Self {
            sessions: AtomicUsize::new(0),
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: None,
        }
    }

    fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    fn sessions_created(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    async fn create_session(&self) -> InterviewResult<String> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread-{n}"))
    }

    async fn submit_and_get_reply(
        &self,
        _session_id: &str,
        _utterance: &str,
    ) -> InterviewResult<String> {
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(reply) => Ok(reply.clone()),
                None => Err(InterviewError::Assistant("script exhausted".to_string())),
            },
        }
    }
}

struct ScriptedTranscription {
    results: Mutex<VecDeque<InterviewResult<String>>>,
    fallback: String,
}

impl ScriptedTranscription {
    fn new(results: Vec<InterviewResult<String>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            fallback: "네 준비되었습니다".to_string(),
        }
    }
}

#[async_trait]
impl Transcription for ScriptedTranscription {
    async fn transcribe(&self, _clip: &AudioClip) -> InterviewResult<String> {
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }
}

struct FixedSynthesis;

#[async_trait]
impl SpeechSynthesis for FixedSynthesis {
    async fn synthesize(&self, _text: &str) -> InterviewResult<Vec<u8>> {
        Ok(b"encoded-speech".to_vec())
    }
}

struct LoggingSubmission {
    log: Arc<Mutex<Vec<String>>>,
    count: AtomicUsize,
    failures_remaining: AtomicUsize,
    last: Mutex<Option<(String, Vec<TurnRecord>)>>,
}

impl LoggingSubmission {
    fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log,
            count: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    fn failing_first(self, failures: usize) -> Self {
        self.failures_remaining.store(failures, Ordering::SeqCst);
        self
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn last(&self) -> Option<(String, Vec<TurnRecord>)> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSubmission for LoggingSubmission {
    async fn submit(&self, identifier: &str, transcript: &[TurnRecord]) -> InterviewResult<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("submit".to_string());
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(InterviewError::Submission("workflow 503".to_string()));
        }
        *self.last.lock().unwrap() = Some((identifier.to_string(), transcript.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Scripted playback sinks
// ---------------------------------------------------------------------

/// Completes each utterance from a spawned task, logging the natural end
/// before it fires, so log order proves what happened after playback.
struct LoggingSink {
    log: Arc<Mutex<Vec<String>>>,
}

impl SpeechSink for LoggingSink {
    fn begin(&mut self, _audio: &[u8]) -> InterviewResult<UtteranceHandle> {
        self.log.lock().unwrap().push("playback-begin".to_string());
        let (tx, handle) = UtteranceHandle::pair();
        let log = Arc::clone(&self.log);
        tokio::spawn(async move {
            log.lock().unwrap().push("playback-finished".to_string());
            let _ = tx.send(());
        });
        Ok(handle)
    }

    fn halt(&mut self) {
        self.log.lock().unwrap().push("playback-halted".to_string());
    }
}

/// Completes only when the test fires the pending sender.
struct ManualSink {
    pending: Rc<RefCell<Vec<oneshot::Sender<()>>>>,
}

impl SpeechSink for ManualSink {
    fn begin(&mut self, _audio: &[u8]) -> InterviewResult<UtteranceHandle> {
        let (tx, handle) = UtteranceHandle::pair();
        self.pending.borrow_mut().push(tx);
        Ok(handle)
    }

    fn halt(&mut self) {
        self.pending.borrow_mut().clear();
    }
}

// ---------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------

fn fast_config() -> SessionConfig {
    let mut config = SessionConfig::for_candidate("01012345678");
    config.retry_backoff = Duration::from_millis(1);
    config
}

fn session_with<S: SpeechSink>(
    assistant: Arc<ScriptedAssistant>,
    transcription: Arc<ScriptedTranscription>,
    submission: Arc<LoggingSubmission>,
    sink: S,
) -> (InterviewSession<S>, mpsc::UnboundedReceiver<SessionEvent>) {
    let capabilities = Capabilities {
        assistant,
        transcription,
        synthesis: Arc::new(FixedSynthesis),
        submission,
    };
    InterviewSession::new(
        capabilities,
        Box::new(PlaceholderCapture::new()),
        sink,
        fast_config(),
    )
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------
// P1: idempotent initialization
// ---------------------------------------------------------------------

#[tokio::test]
async fn double_initialize_creates_one_assistant_session() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let assistant = Arc::new(
        ScriptedAssistant::new(vec![Ok("안녕하세요, 면접을 시작하겠습니다.".to_string())])
            .with_fallback("다음 질문입니다."),
    );
    let submission = Arc::new(LoggingSubmission::new(Arc::clone(&log)));
    let (mut session, _events) = session_with(
        Arc::clone(&assistant),
        Arc::new(ScriptedTranscription::new(vec![])),
        submission,
        LoggingSink {
            log: Arc::clone(&log),
        },
    );

    session.initialize().await.unwrap();
    session.initialize().await.unwrap();

    assert_eq!(assistant.sessions_created(), 1);
    let begins = log
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.as_str() == "playback-begin")
        .count();
    assert_eq!(begins, 1, "greeting must be played exactly once");
    assert_eq!(session.phase(), Phase::AwaitingAnswer);
}

// ---------------------------------------------------------------------
// P2: enablement invariant under randomized event sequences
// ---------------------------------------------------------------------

/// Tiny deterministic generator (xorshift) so the sequence is stable
/// across runs.
struct SeededRng(u64);

impl SeededRng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

#[tokio::test]
async fn enablement_always_matches_phase() {
    for seed in [0x1a2b3c4d_u64, 0x5e6f7081, 0x92a3b4c5] {
        let log = Arc::new(Mutex::new(Vec::new()));
        let assistant = Arc::new(
            ScriptedAssistant::new(vec![Ok("첫 질문입니다.".to_string())])
                .with_fallback("다음 질문입니다."),
        );
        let submission = Arc::new(LoggingSubmission::new(Arc::clone(&log)));
        let (mut session, _events) = session_with(
            assistant,
            Arc::new(ScriptedTranscription::new(vec![])),
            submission,
            LoggingSink {
                log: Arc::clone(&log),
            },
        );

        let mut rng = SeededRng(seed);
        for _ in 0..40 {
            match rng.next() % 5 {
                0 => {
                    let _ = session.initialize().await;
                }
                1 | 2 => {
                    let _ = session.toggle_answer().await;
                }
                3 => {
                    let _ = session.retry();
                }
                _ => {
                    let _ = session.resubmit().await;
                }
            }
            assert_eq!(
                session.is_answer_control_enabled(),
                matches!(session.phase(), Phase::AwaitingAnswer | Phase::Listening),
                "seed {seed:#x}: enablement drifted from phase {:?}",
                session.phase()
            );
        }
    }
}

// ---------------------------------------------------------------------
// P3: answer durability when the assistant fails
// ---------------------------------------------------------------------

#[tokio::test]
async fn transcribed_answer_survives_assistant_failure() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let assistant = Arc::new(ScriptedAssistant::new(vec![
        Ok("자기소개 부탁드립니다.".to_string()),
        Err(InterviewError::Assistant("connection reset".to_string())),
        Err(InterviewError::Assistant("connection reset".to_string())),
    ]));
    let submission = Arc::new(LoggingSubmission::new(Arc::clone(&log)));
    let (mut session, _events) = session_with(
        assistant,
        Arc::new(ScriptedTranscription::new(vec![Ok(
            "저는 3년차 개발자입니다".to_string()
        )])),
        submission,
        LoggingSink {
            log: Arc::clone(&log),
        },
    );

    session.initialize().await.unwrap();
    session.toggle_answer().await.unwrap();
    let err = session.toggle_answer().await.unwrap_err();
    assert!(matches!(err, InterviewError::Assistant(_)));

    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.transcript()[0].prompt, "자기소개 부탁드립니다.");
    assert_eq!(session.transcript()[0].answer, "저는 3년차 개발자입니다");

    // The candidate may retry the same prompt without losing the entry.
    session.retry().unwrap();
    assert_eq!(session.phase(), Phase::AwaitingAnswer);
    assert_eq!(session.current_prompt(), "자기소개 부탁드립니다.");
    assert_eq!(session.transcript().len(), 1);
}

// ---------------------------------------------------------------------
// P5: exactly one submission, after the end reply finished playing
// ---------------------------------------------------------------------

#[tokio::test]
async fn end_marker_submits_exactly_once_after_playback() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let assistant = Arc::new(ScriptedAssistant::new(vec![
        Ok("자기소개 부탁드립니다.".to_string()),
        Ok("면접이 종료되었습니다. 수고하셨습니다.".to_string()),
    ]));
    let submission = Arc::new(LoggingSubmission::new(Arc::clone(&log)));
    let (mut session, mut events) = session_with(
        assistant,
        Arc::new(ScriptedTranscription::new(vec![])),
        Arc::clone(&submission),
        LoggingSink {
            log: Arc::clone(&log),
        },
    );

    session.initialize().await.unwrap();
    session.toggle_answer().await.unwrap();
    session.toggle_answer().await.unwrap();

    assert_eq!(session.phase(), Phase::Ended);
    assert!(session.is_submitted());
    assert_eq!(submission.count(), 1);

    // The end reply's natural end must precede the submission.
    let entries = log.lock().unwrap().clone();
    let last_finish = entries
        .iter()
        .rposition(|e| e == "playback-finished")
        .expect("end reply played");
    let submit = entries
        .iter()
        .position(|e| e == "submit")
        .expect("transcript submitted");
    assert!(
        last_finish < submit,
        "submission must wait for playback: {entries:?}"
    );

    let ended = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::InterviewEnded { .. }))
        .count();
    assert_eq!(ended, 1);
}

#[tokio::test]
async fn failed_submission_keeps_transcript_and_allows_resubmit() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let assistant = Arc::new(ScriptedAssistant::new(vec![
        Ok("자기소개 부탁드립니다.".to_string()),
        Ok("면접이 종료되었습니다.".to_string()),
    ]));
    // Fails the first attempt and the automatic retry.
    let submission =
        Arc::new(LoggingSubmission::new(Arc::clone(&log)).failing_first(2));
    let (mut session, _events) = session_with(
        assistant,
        Arc::new(ScriptedTranscription::new(vec![])),
        Arc::clone(&submission),
        LoggingSink {
            log: Arc::clone(&log),
        },
    );

    session.initialize().await.unwrap();
    session.toggle_answer().await.unwrap();
    session.toggle_answer().await.unwrap();

    assert_eq!(session.phase(), Phase::Ended);
    assert!(!session.is_submitted());
    assert!(matches!(
        session.last_error(),
        Some(InterviewError::Submission(_))
    ));
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(submission.count(), 2);

    session.resubmit().await.unwrap();
    assert!(session.is_submitted());
    assert_eq!(submission.count(), 3);
    let (identifier, transcript) = submission.last().unwrap();
    assert_eq!(identifier, "01012345678");
    assert_eq!(transcript.len(), 1);
}

// ---------------------------------------------------------------------
// E2E scenario A: greeting → answer → next question
// ---------------------------------------------------------------------

#[tokio::test]
async fn full_turn_reenables_control_only_after_playback() {
    let pending = Rc::new(RefCell::new(Vec::new()));
    let log = Arc::new(Mutex::new(Vec::new()));
    let assistant = Arc::new(ScriptedAssistant::new(vec![
        Ok("테스트를 진행해보겠습니다. 준비되셨나요?".to_string()),
        Ok("경력에 대해 말씀해주세요.".to_string()),
    ]));
    let submission = Arc::new(LoggingSubmission::new(Arc::clone(&log)));
    let (mut session, mut events) = session_with(
        assistant,
        Arc::new(ScriptedTranscription::new(vec![Ok(
            "네 준비되었습니다".to_string()
        )])),
        submission,
        ManualSink {
            pending: Rc::clone(&pending),
        },
    );
    let speaking = session.speaking_watch();

    // Greeting playback: control must stay disabled until it ends.
    {
        let mut init = Box::pin(session.initialize());
        assert!(futures::poll!(init.as_mut()).is_pending());
        assert!(*speaking.borrow());
        if let Some(tx) = pending.borrow_mut().pop() {
            let _ = tx.send(());
        }
        assert!(matches!(
            futures::poll!(init.as_mut()),
            std::task::Poll::Ready(Ok(()))
        ));
    }
    assert_eq!(session.phase(), Phase::AwaitingAnswer);
    assert_eq!(
        session.current_prompt(),
        "테스트를 진행해보겠습니다. 준비되셨나요?"
    );

    session.toggle_answer().await.unwrap();
    assert_eq!(session.phase(), Phase::Listening);
    let _ = drain(&mut events); // discard history up to the answer turn

    // Answer turn: while the reply is being spoken the control is
    // disabled; it re-enables only after the playback completes.
    {
        let mut turn = Box::pin(session.toggle_answer());
        assert!(futures::poll!(turn.as_mut()).is_pending());
        assert!(*speaking.borrow());
        let mid_events = drain(&mut events);
        assert!(
            mid_events
                .iter()
                .all(|e| !matches!(e, SessionEvent::PhaseChanged { phase: Phase::AwaitingAnswer })),
            "control re-enabled before playback completed"
        );
        if let Some(tx) = pending.borrow_mut().pop() {
            let _ = tx.send(());
        }
        assert!(matches!(
            futures::poll!(turn.as_mut()),
            std::task::Poll::Ready(Ok(()))
        ));
    }

    assert_eq!(session.phase(), Phase::AwaitingAnswer);
    assert!(session.is_answer_control_enabled());
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.transcript()[0].answer, "네 준비되었습니다");
    assert_eq!(session.current_prompt(), "경력에 대해 말씀해주세요.");
}

// ---------------------------------------------------------------------
// E2E scenario B: end reply accumulates the full transcript
// ---------------------------------------------------------------------

#[tokio::test]
async fn end_reply_submits_accumulated_transcript() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let assistant = Arc::new(ScriptedAssistant::new(vec![
        Ok("자기소개 부탁드립니다.".to_string()),
        Ok("지원 동기를 말씀해주세요.".to_string()),
        Ok("면접이 종료되었습니다. 수고하셨습니다.".to_string()),
    ]));
    let submission = Arc::new(LoggingSubmission::new(Arc::clone(&log)));
    let transcription = Arc::new(ScriptedTranscription::new(vec![
        Ok("저는 3년차 개발자입니다".to_string()),
        Ok("성장할 수 있는 회사라고 생각했습니다".to_string()),
    ]));
    let (mut session, _events) = session_with(
        assistant,
        transcription,
        Arc::clone(&submission),
        LoggingSink {
            log: Arc::clone(&log),
        },
    );

    session.initialize().await.unwrap();
    for _ in 0..2 {
        session.toggle_answer().await.unwrap();
        session.toggle_answer().await.unwrap();
    }

    assert_eq!(session.phase(), Phase::Ended);
    assert_eq!(submission.count(), 1);
    let (identifier, transcript) = submission.last().unwrap();
    assert_eq!(identifier, "01012345678");
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].prompt, "자기소개 부탁드립니다.");
    assert_eq!(transcript[0].answer, "저는 3년차 개발자입니다");
    assert_eq!(transcript[1].prompt, "지원 동기를 말씀해주세요.");

    // The toggle stays inert after the interview ended.
    session.toggle_answer().await.unwrap();
    assert_eq!(session.phase(), Phase::Ended);
}

// ---------------------------------------------------------------------
// E2E scenario C: empty transcription is retryable
// ---------------------------------------------------------------------

#[tokio::test]
async fn empty_transcription_returns_to_awaiting_answer() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let assistant = Arc::new(ScriptedAssistant::new(vec![
        Ok("자기소개 부탁드립니다.".to_string()),
        Ok("다음 질문입니다.".to_string()),
    ]));
    let submission = Arc::new(LoggingSubmission::new(Arc::clone(&log)));
    let transcription = Arc::new(ScriptedTranscription::new(vec![
        Ok("".to_string()),
        Ok("두번째 시도입니다".to_string()),
    ]));
    let (mut session, _events) = session_with(
        assistant,
        transcription,
        submission,
        LoggingSink {
            log: Arc::clone(&log),
        },
    );

    session.initialize().await.unwrap();
    let before = session.transcript().len();

    session.toggle_answer().await.unwrap();
    let err = session.toggle_answer().await.unwrap_err();
    assert_eq!(err, InterviewError::EmptyTranscription);

    assert_eq!(session.phase(), Phase::AwaitingAnswer);
    assert_eq!(session.transcript().len(), before);
    assert_eq!(
        session.last_error(),
        Some(&InterviewError::EmptyTranscription)
    );

    // Same prompt, second attempt succeeds and clears the error.
    session.toggle_answer().await.unwrap();
    session.toggle_answer().await.unwrap();
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.transcript()[0].prompt, "자기소개 부탁드립니다.");
    assert_eq!(session.transcript()[0].answer, "두번째 시도입니다");
    assert!(session.last_error().is_none());
}

// ---------------------------------------------------------------------
// Initialization failure handling
// ---------------------------------------------------------------------

#[tokio::test]
async fn greeting_failure_parks_in_failed_until_reset() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let assistant = Arc::new(ScriptedAssistant::new(vec![
        Err(InterviewError::Assistant("gateway timeout".to_string())),
        Err(InterviewError::Assistant("gateway timeout".to_string())),
        // Served to the retry after the explicit reset.
        Ok("자기소개 부탁드립니다.".to_string()),
    ]));
    let submission = Arc::new(LoggingSubmission::new(Arc::clone(&log)));
    let (mut session, _events) = session_with(
        Arc::clone(&assistant),
        Arc::new(ScriptedTranscription::new(vec![])),
        submission,
        LoggingSink {
            log: Arc::clone(&log),
        },
    );

    assert!(session.initialize().await.is_err());
    assert_eq!(session.phase(), Phase::Failed);
    assert!(!session.is_answer_control_enabled());

    // No stable prompt to retry into; only an explicit reset helps.
    assert!(session.retry().is_err());

    session.shutdown();
    session.initialize().await.unwrap();
    assert_eq!(session.phase(), Phase::AwaitingAnswer);
    assert_eq!(assistant.sessions_created(), 2);
}
