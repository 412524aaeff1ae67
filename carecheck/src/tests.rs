// In carecheck/src/tests.rs
//
// Pipeline tests against a scripted model adapter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::chat::{ChatError, ChatRole, ChatSession, APOLOGY_MESSAGE, NOT_STARTED_MESSAGE};
use crate::config::Settings;
use crate::document_processing::{extract_batch, SourceFile};
use crate::model_adapters::{
    GenerationError, GenerationErrorKind, GenerationRequest, LlmGeneration, ModelAdapter,
    TokenUsage,
};
use crate::report::tests::sample_report_json;
use crate::report::{parse_report, ReportData};
use crate::store::GuidelineStore;
use crate::{Error, ReportGenerator, UploadedFile};

type Scripted = Result<String, GenerationError>;

/// Replays canned responses in order and records every request it sees.
struct RecordingAdapter {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl RecordingAdapter {
    fn new(responses: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("lock requests").clone()
    }
}

impl ModelAdapter for RecordingAdapter {
    fn generate(&self, request: &GenerationRequest) -> Result<LlmGeneration, GenerationError> {
        self.requests.lock().expect("lock requests").push(request.clone());
        let next = self
            .responses
            .lock()
            .expect("lock responses")
            .pop_front()
            .expect("adapter called more often than scripted");
        next.map(|response| LlmGeneration {
            response,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        })
    }

    fn model_name(&self) -> &str {
        "recording-model"
    }

    fn provider_name(&self) -> &'static str {
        "Recording"
    }
}

fn quota_error() -> GenerationError {
    GenerationError::from_status("Recording", 429, "quota exceeded".into())
}

fn guideline() -> Vec<UploadedFile> {
    vec![UploadedFile::new("지침.txt", "낙상 예방 지표: 월 1회 이상 평가")]
}

fn evaluations() -> Vec<UploadedFile> {
    vec![UploadedFile::new("기록.txt", "2024-03-01 낙상 위험 평가 실시")]
}

fn sample_report() -> ReportData {
    parse_report(&sample_report_json(2)).expect("sample report parses")
}

#[test]
fn generate_returns_all_fields_from_valid_json() -> Result<()> {
    let adapter = RecordingAdapter::new(vec![Ok(sample_report_json(4))]);
    let generator = ReportGenerator::new(adapter.clone(), Settings::default());

    let mut progress = Vec::new();
    let report = generator.generate(&guideline(), &evaluations(), &mut |pct, msg: &str| {
        progress.push((pct, msg.to_string()))
    })?;

    assert_eq!(report.basic_info.facility_name, "행복요양원");
    assert_eq!(report.evaluation_items.len(), 4);
    assert_eq!(report.cross_check_results.len(), 1);
    assert!(!report.ai_summary.is_empty());

    let requests = adapter.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].response_schema.is_some());
    assert_eq!(requests[0].temperature, Some(0.1));
    assert!(requests[0].contents[0].text.contains("낙상 위험 평가 실시"));

    let percentages: Vec<u8> = progress.iter().map(|(pct, _)| *pct).collect();
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percentages.last(), Some(&100));
    Ok(())
}

#[test]
fn generate_rejects_empty_and_malformed_responses() {
    for body in ["", "   ", "{\"basicInfo\": {}", "{\"aiSummary\": \"only\"}"] {
        let adapter = RecordingAdapter::new(vec![Ok(body.to_string())]);
        let generator = ReportGenerator::new(adapter, Settings::default());

        let result = generator.generate(&guideline(), &evaluations(), &mut |_, _: &str| {});
        assert!(
            matches!(result, Err(Error::ReportParse(_))),
            "body {:?} gave {:?}",
            body,
            result
        );
    }
}

#[test]
fn generation_failures_keep_their_category() {
    let adapter = RecordingAdapter::new(vec![Err(quota_error())]);
    let generator = ReportGenerator::new(adapter, Settings::default());

    let err = generator
        .generate(&guideline(), &evaluations(), &mut |_, _: &str| {})
        .unwrap_err();
    match &err {
        Error::Generation(inner) => assert_eq!(inner.kind, GenerationErrorKind::QuotaExceeded),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.user_message().contains("한도"));
}

#[test]
fn summarization_prepass_condenses_each_chunk_in_order() -> Result<()> {
    let mut settings = Settings::default();
    settings.summarization.enabled = true;
    settings.summarization.chunk_size = 12;
    settings.summarization.instruction = "핵심만".to_string();

    // "aaaaaaaaaa" and "\nbbbbbbbbbb" do not fit in one 12-char chunk.
    let evaluations = vec![
        UploadedFile::new("first.txt", "aaaaaaaaaa\nbbbbbbbbbb"),
        UploadedFile::new("second.txt", "short"),
    ];

    let adapter = RecordingAdapter::new(vec![
        Ok("요약 A".into()),
        Ok("요약 B".into()),
        Ok("요약 C".into()),
        Ok(sample_report_json(1)),
    ]);
    let generator = ReportGenerator::new(adapter.clone(), settings);

    let mut percentages = Vec::new();
    generator.generate(&guideline(), &evaluations, &mut |pct, _: &str| percentages.push(pct))?;

    let requests = adapter.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[..3].iter().all(|r| r.response_schema.is_none()));
    assert!(requests[0].contents[0].text.starts_with("핵심만"));
    assert!(requests[1].contents[0].text.contains("first.txt (2/2)"));

    let main_prompt = &requests[3].contents[0].text;
    assert!(main_prompt.contains("요약 A\n\n요약 B"));
    assert!(main_prompt.contains("요약 C"));
    assert!(!main_prompt.contains("aaaaaaaaaa"));
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
    Ok(())
}

#[test]
fn ask_before_start_is_an_explicit_error() {
    let adapter = RecordingAdapter::new(vec![]);
    let mut session = ChatSession::new(adapter.clone(), &Settings::default().model);

    assert!(matches!(session.ask("입소일은?"), Err(ChatError::NotStarted)));
    assert_eq!(session.ask_or_apology("입소일은?"), NOT_STARTED_MESSAGE);
    assert!(adapter.requests().is_empty());
}

#[test]
fn chat_threads_history_and_report_context() -> Result<()> {
    let adapter = RecordingAdapter::new(vec![
        Ok("입소일은 2023-05-01입니다.".into()),
        Ok("기관명은 행복요양원입니다.".into()),
    ]);
    let mut session = ChatSession::new(adapter.clone(), &Settings::default().model);
    session.start(&sample_report())?;

    assert_eq!(session.ask("입소일은?")?, "입소일은 2023-05-01입니다.");
    assert_eq!(session.ask("기관명은?")?, "기관명은 행복요양원입니다.");

    let history = session.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, ChatRole::User);
    assert_eq!(history[3].role, ChatRole::Model);

    let requests = adapter.requests();
    let instruction = requests[1].system_instruction.as_deref().unwrap_or_default();
    assert!(instruction.contains("행복요양원"));
    assert!(instruction.contains("evaluationItems"));
    assert_eq!(requests[1].contents.len(), 3);
    assert_eq!(requests[1].contents[2].text, "기관명은?");
    Ok(())
}

#[test]
fn chat_failures_become_an_apology_and_are_not_recorded() -> Result<()> {
    let adapter = RecordingAdapter::new(vec![
        Err(quota_error()),
        Ok("  ".into()),
        Ok("네.".into()),
    ]);
    let mut session = ChatSession::new(adapter, &Settings::default().model);
    session.start(&sample_report())?;

    assert_eq!(session.ask_or_apology("질문 1"), APOLOGY_MESSAGE);
    assert!(matches!(session.ask("질문 2"), Err(ChatError::EmptyAnswer)));
    assert!(session.history().is_empty());

    assert_eq!(session.ask_or_apology("질문 3"), "네.");
    assert_eq!(session.history().len(), 2);
    Ok(())
}

#[test]
fn restarting_chat_discards_history() -> Result<()> {
    let adapter = RecordingAdapter::new(vec![Ok("첫 답".into())]);
    let mut session = ChatSession::new(adapter, &Settings::default().model);
    session.start(&sample_report())?;
    session.ask("첫 질문")?;
    assert_eq!(session.history().len(), 2);

    session.start(&sample_report())?;
    assert!(session.is_started());
    assert!(session.history().is_empty());
    assert!(matches!(session.ask("   "), Err(ChatError::EmptyQuestion)));
    Ok(())
}

#[test]
fn uploads_flow_from_extraction_through_store_into_the_prompt() -> Result<()> {
    let store = GuidelineStore::in_memory();
    let uploads = vec![
        SourceFile::new(
            "기준.txt",
            Some("text/plain".into()),
            "욕창 예방 기준".as_bytes().to_vec(),
        ),
        SourceFile::new("서식.hwp", None, vec![1, 2, 3]),
    ];
    store.save_all(&extract_batch(&uploads)?)?;

    let stored = store.get_all()?;
    assert_eq!(stored.len(), 2);

    let adapter = RecordingAdapter::new(vec![Ok(sample_report_json(1))]);
    let generator = ReportGenerator::new(adapter.clone(), Settings::default());
    generator.generate(&stored, &evaluations(), &mut |_, _: &str| {})?;

    let prompt = &adapter.requests()[0].contents[0].text;
    assert!(prompt.contains("욕창 예방 기준"));
    assert!(prompt.contains("[서식.hwp] 파일은 내용을 분석할 수 없는 형식입니다."));
    Ok(())
}
