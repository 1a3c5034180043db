use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub const NAMES: [&'static str; 3] = ["beginner", "intermediate", "advanced"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

/// A teaching case as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalCase {
    pub id: Uuid,
    pub title: String,
    pub specialty: String,
    pub difficulty: Difficulty,
    pub presentation: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCase {
    pub title: String,
    pub specialty: String,
    pub difficulty: Difficulty,
    pub presentation: String,
}

/// A learner's submitted answer to a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: Uuid,
    pub case_id: Uuid,
    pub subject_id: String,
    pub answer: String,
    pub submitted_at: DateTime<Utc>,
}

/// Canonical form of a specialty, shared by storage, filtering and cache keys
pub fn normalize_specialty(specialty: &str) -> String {
    specialty.trim().to_lowercase()
}

/// Listing filter; `page` is 1-based
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFilter {
    pub specialty: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub page: u32,
    pub limit: u32,
}

impl Default for CaseFilter {
    fn default() -> Self {
        Self {
            specialty: None,
            difficulty: None,
            page: 1,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasePage {
    pub items: Vec<ClinicalCase>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

/// Storage for cases and attempts
#[async_trait]
pub trait CaseStore: Send + Sync + 'static {
    async fn list(&self, filter: &CaseFilter) -> Result<CasePage, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ClinicalCase>, StoreError>;

    /// Fails with `Conflict` when a case with the same title exists
    async fn create(&self, case: NewCase, created_by: &str) -> Result<ClinicalCase, StoreError>;

    /// `Ok(None)` when the case does not exist
    async fn record_attempt(
        &self,
        case_id: Uuid,
        subject_id: &str,
        answer: String,
    ) -> Result<Option<Attempt>, StoreError>;
}
