// In carecheck/src/lib.rs

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

// The shared database pool type
pub type DbPool = Pool<SqliteConnectionManager>;

pub mod api_keys;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod document_processing;
pub mod files;
pub mod generator;
pub mod keychain;
pub mod model_adapters;
pub mod prompts;
pub mod report;
pub mod store;

pub use chat::{ChatError, ChatMessage, ChatRole, ChatSession};
pub use document_processing::{ExtractionError, ReadAggregationError, SourceFile};
pub use files::FileCollection;
pub use generator::ReportGenerator;
pub use model_adapters::{GenerationError, GenerationErrorKind, ModelAdapter};
pub use report::{Grade, ReportData, ReportParseError};

// Top-level error for everything the pipeline can surface to a user.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Keyring(#[from] keyring::Error),
    #[error(transparent)]
    Migration(#[from] rusqlite_migration::Error),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    ReadAggregation(#[from] ReadAggregationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    ReportParse(#[from] ReportParseError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// One human-readable line suitable for showing to the person running
    /// the analysis.
    pub fn user_message(&self) -> String {
        match self {
            Error::Db(_) | Error::Pool(_) | Error::Migration(_) => {
                format!("지침 파일 저장소를 사용할 수 없습니다: {self}")
            }
            Error::Keyring(_) => format!("API 키 저장소에 접근할 수 없습니다: {self}"),
            Error::Extraction(_) | Error::ReadAggregation(_) => {
                format!("파일을 읽는 중 오류가 발생했습니다: {self}")
            }
            Error::Generation(err) => err.user_message(),
            Error::ReportParse(_) => {
                format!("AI 응답을 보고서 형식으로 해석하지 못했습니다: {self}")
            }
            Error::Chat(_) => format!("채팅 중 오류가 발생했습니다: {self}"),
            Error::Config(msg) => format!("설정 오류: {msg}"),
        }
    }
}

/// A document after text extraction. `name` is the key within a collection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub content: String,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests;
