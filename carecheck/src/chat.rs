// carecheck/src/chat.rs
//!
//! Follow-up questions about a generated report.
//!
//! A [`ChatSession`] is an ordinary value owned by the caller: create it,
//! `start` it with a report, then `ask`. Starting again with another report
//! discards the earlier conversation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ModelSettings;
use crate::model_adapters::{GenerationError, GenerationRequest, ModelAdapter};
use crate::prompts;
use crate::report::ReportData;

pub const APOLOGY_MESSAGE: &str = "죄송합니다. 답변을 생성하는 중 오류가 발생했습니다. 다시 시도해 주세요.";
pub const NOT_STARTED_MESSAGE: &str = "채팅이 시작되지 않았습니다. 먼저 보고서를 생성해 주세요.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error("the chat session has not been started with a report")]
    NotStarted,
    #[error("the question is empty")]
    EmptyQuestion,
    #[error("the report could not be serialized for the chat context: {0}")]
    Context(String),
    #[error("the model returned an empty answer")]
    EmptyAnswer,
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

struct ActiveChat {
    system_instruction: String,
    history: Vec<ChatMessage>,
}

pub struct ChatSession {
    id: Uuid,
    adapter: Arc<dyn ModelAdapter>,
    temperature: f32,
    active: Option<ActiveChat>,
}

impl ChatSession {
    pub fn new(adapter: Arc<dyn ModelAdapter>, settings: &ModelSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            adapter,
            temperature: settings.temperature,
            active: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_started(&self) -> bool {
        self.active.is_some()
    }

    /// Seeds the conversation with `report`, replacing any previous one.
    pub fn start(&mut self, report: &ReportData) -> Result<(), ChatError> {
        let system_instruction = prompts::build_chat_instruction(report)
            .map_err(|err| ChatError::Context(err.to_string()))?;

        if self.active.is_some() {
            debug!(session = %self.id, "restarting chat with a new report");
        }
        self.active = Some(ActiveChat {
            system_instruction,
            history: Vec::new(),
        });
        Ok(())
    }

    /// Messages exchanged so far, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        self.active
            .as_ref()
            .map(|chat| chat.history.as_slice())
            .unwrap_or(&[])
    }

    /// Sends one question and returns the answer. Both turns are recorded
    /// only when the call succeeds.
    pub fn ask(&mut self, question: &str) -> Result<String, ChatError> {
        let chat = self.active.as_mut().ok_or(ChatError::NotStarted)?;

        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }

        let mut contents = chat.history.clone();
        contents.push(ChatMessage::user(question));
        let request = GenerationRequest {
            system_instruction: Some(chat.system_instruction.clone()),
            contents,
            response_schema: None,
            temperature: Some(self.temperature),
        };

        debug!(session = %self.id, turn = chat.history.len() / 2 + 1, "asking follow-up question");
        let answer = self.adapter.generate(&request)?.response.trim().to_string();
        if answer.is_empty() {
            return Err(ChatError::EmptyAnswer);
        }

        chat.history.push(ChatMessage::user(question));
        chat.history.push(ChatMessage::model(answer.clone()));
        Ok(answer)
    }

    /// Like [`ask`](Self::ask), but failures become a reply the conversation
    /// can show, so the caller never has to leave the chat.
    pub fn ask_or_apology(&mut self, question: &str) -> String {
        match self.ask(question) {
            Ok(answer) => answer,
            Err(ChatError::NotStarted) => NOT_STARTED_MESSAGE.to_string(),
            Err(err) => {
                warn!(session = %self.id, error = %err, "chat question failed");
                APOLOGY_MESSAGE.to_string()
            }
        }
    }
}
