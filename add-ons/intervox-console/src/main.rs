//! Interview console: a thin shell around one `InterviewSession`.
//!
//! The shell renders controller state and forwards exactly one intent
//! (Enter = toggle answer). It never tracks its own enabled/disabled
//! flag; the prompt line is derived from the session phase on every
//! redraw.

use anyhow::{Context, Result};
use intervox_services::{
    filter_records, sort_records, ElevenLabsSpeech, OpenAiAssistant, ResumeWorkflow,
    SortDirection, SortField, WhisperTranscription, WorkflowWebhook,
};
use intervox_voice::{
    AnswerCapture, Capabilities, CaptureConfig, InterviewSession, MicrophoneCapture, Phase,
    PlaceholderAssistant, PlaceholderCapture, PlaceholderSubmission, PlaceholderSynthesis,
    PlaceholderTranscription, RodioSink, SessionConfig, SessionEvent, SilentSink, SpeechSink,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[intervox] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Operator mode: `intervox-console resume [search-term]` lists past
    // submissions instead of running an interview.
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("resume") {
        return list_resumes(args.next().unwrap_or_default()).await;
    }

    let mut input = spawn_input_reader();

    println!("=== AI 면접 ===");
    let phone = read_phone_number(&mut input).await?;

    let capabilities = build_capabilities(&phone).await?;
    let config = SessionConfig::from_env(&phone);

    // Pre-interview device check, the last gate before the session.
    let no_audio = std::env::var("INTERVOX_NO_AUDIO").is_ok();
    let use_microphone = !no_audio && microphone_ready();

    if use_microphone {
        let capture: Box<dyn AnswerCapture> =
            Box::new(MicrophoneCapture::new(CaptureConfig::default()));
        let sink = RodioSink::new().context("speech output unavailable")?;
        let (session, events) = InterviewSession::new(capabilities, capture, sink, config);
        run_interview(session, events, &mut input).await
    } else {
        println!("(오디오 장치 없이 진행합니다)");
        let capture: Box<dyn AnswerCapture> = Box::new(PlaceholderCapture::new());
        let (session, events) =
            InterviewSession::new(capabilities, capture, SilentSink, config);
        run_interview(session, events, &mut input).await
    }
}

/// Operator listing: newest submissions first, optionally filtered by
/// name or phone.
async fn list_resumes(search: String) -> Result<()> {
    let workflow = ResumeWorkflow::from_env()?;
    let mut records = workflow.fetch_records().await?;
    sort_records(&mut records, SortField::CreateDate, SortDirection::Descending);
    let visible = filter_records(&records, &search);

    println!("{:<12} {:<14} {:<12} 요약", "이름", "연락처", "생성일");
    for record in &visible {
        let date = record.createdate.split('T').next().unwrap_or("");
        println!(
            "{:<12} {:<14} {:<12} {}",
            record.name, record.phone, date, record.summary
        );
    }
    println!("({}건)", visible.len());
    Ok(())
}

/// Stdin lines delivered over a channel so the shell can await them.
fn spawn_input_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.trim_end().to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Keypad step: a 10-11 digit number starting with 01.
async fn read_phone_number(input: &mut mpsc::UnboundedReceiver<String>) -> Result<String> {
    loop {
        println!("면접 결과를 받으실 전화번호를 입력해주세요 (예: 01012345678):");
        let Some(line) = input.recv().await else {
            anyhow::bail!("input closed before a phone number was entered");
        };
        let digits: String = line.chars().filter(|c| c.is_ascii_digit()).collect();
        if (10..=11).contains(&digits.len()) && digits.starts_with("01") {
            return Ok(digits);
        }
        println!("올바른 전화번호를 입력해주세요");
    }
}

fn microphone_ready() -> bool {
    match MicrophoneCapture::probe() {
        Ok(name) => {
            println!("마이크 확인 완료: {name}");
            true
        }
        Err(e) => {
            tracing::warn!("Microphone check failed: {e}");
            false
        }
    }
}

/// Real adapters when the keys are configured, placeholders otherwise.
async fn build_capabilities(phone: &str) -> Result<Capabilities> {
    if std::env::var("OPENAI_API_KEY").is_err() {
        tracing::info!("OPENAI_API_KEY not set; running the scripted demo interview");
        return Ok(Capabilities {
            assistant: Arc::new(PlaceholderAssistant::scripted_demo()),
            transcription: Arc::new(PlaceholderTranscription::new()),
            synthesis: Arc::new(PlaceholderSynthesis),
            submission: Arc::new(PlaceholderSubmission::new()),
        });
    }

    let assistant = Arc::new(OpenAiAssistant::from_env()?);
    let transcription = Arc::new(WhisperTranscription::from_env()?);
    let synthesis = Arc::new(ElevenLabsSpeech::from_env()?);

    let submission: Arc<dyn intervox_voice::ResultSubmission> = match WorkflowWebhook::from_env() {
        Ok(webhook) => {
            // Registration is best-effort; the interview proceeds either way.
            if let Err(e) = webhook.register_candidate(phone).await {
                tracing::warn!("Candidate registration failed: {e}");
            }
            Arc::new(webhook)
        }
        Err(e) => {
            tracing::warn!("Result webhook not configured ({e}); transcripts will not be delivered");
            Arc::new(PlaceholderSubmission::new())
        }
    };

    Ok(Capabilities {
        assistant,
        transcription,
        synthesis,
        submission,
    })
}

fn status_line(phase: Phase) -> &'static str {
    match phase {
        Phase::Uninitialized | Phase::Initializing => "면접을 준비하고 있습니다...",
        Phase::AwaitingAnswer => "[Enter] 답변 시작  |  [q] 종료",
        Phase::Listening => "듣고 있습니다... [Enter] 답변 완료",
        Phase::Transcribing => "답변을 인식하고 있습니다...",
        Phase::AwaitingAiReply => "AI 면접관이 생각하고 있습니다...",
        Phase::AiSpeaking => "AI 면접관이 말하는 중...",
        Phase::Ended => "면접이 끝났습니다.",
        Phase::Failed => "오류가 발생했습니다. [r] 다시 시도  |  [q] 종료",
    }
}

fn drain_events(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::PromptReady { text } => println!("\n면접관: {text}"),
            SessionEvent::AnswerRecorded { answer } => println!("나: {answer}"),
            SessionEvent::ErrorReported { message } => println!("! {message}"),
            SessionEvent::SpeechSkipped { reason } => {
                tracing::warn!("Speech skipped: {reason}")
            }
            SessionEvent::TranscriptSubmitted { .. } => println!("면접 결과가 전송되었습니다."),
            SessionEvent::InterviewEnded { .. } => println!("\n면접이 종료되었습니다. 수고하셨습니다!"),
            SessionEvent::PhaseChanged { .. } => {}
        }
    }
}

async fn run_interview<S: SpeechSink>(
    mut session: InterviewSession<S>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    input: &mut mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    if let Err(e) = session.initialize().await {
        drain_events(&mut events);
        println!("면접 초기화에 실패했습니다: {e}");
    }
    drain_events(&mut events);

    loop {
        if session.phase() == Phase::Ended {
            if !session.is_submitted() && session.last_error().is_some() {
                println!("결과 전송에 실패했습니다. [s] 다시 전송  |  [Enter] 건너뛰기");
                if let Some(line) = input.recv().await {
                    if line.trim() == "s" && session.resubmit().await.is_err() {
                        println!("다시 전송에 실패했습니다. 기록은 아래에 남아 있습니다.");
                    }
                }
                drain_events(&mut events);
            }
            break;
        }
        println!("{}", status_line(session.phase()));

        let Some(line) = input.recv().await else { break };
        match line.trim() {
            "q" => {
                session.shutdown();
                break;
            }
            "r" if session.phase() == Phase::Failed => {
                if session.retry().is_err() {
                    println!("다시 시작하려면 프로그램을 재실행해주세요.");
                    break;
                }
            }
            _ => {
                let _ = session.toggle_answer().await;
            }
        }
        drain_events(&mut events);
    }

    // Transcript recap, as on the result screen.
    if !session.transcript().is_empty() {
        println!("\n--- 면접 기록 ---");
        for (i, turn) in session.transcript().iter().enumerate() {
            println!("Q{}. {}", i + 1, turn.prompt);
            println!("    {}", turn.answer);
        }
    }
    Ok(())
}
