//! In-memory case store

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::repository::{
    Attempt, CaseFilter, CasePage, CaseStore, ClinicalCase, Difficulty, NewCase, StoreError,
    normalize_specialty,
};

#[derive(Default)]
pub struct InMemoryCaseStore {
    cases: RwLock<Vec<ClinicalCase>>,
    attempts: RwLock<Vec<Attempt>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with a handful of sample cases
    pub fn seeded() -> Self {
        let store = Self::new();
        let samples = [
            (
                "Crushing chest pain on exertion",
                "cardiology",
                Difficulty::Beginner,
                "58-year-old smoker with substernal pain radiating to the left arm.",
            ),
            (
                "Syncope with a new murmur",
                "cardiology",
                Difficulty::Advanced,
                "74-year-old with exertional syncope and a harsh systolic murmur.",
            ),
            (
                "Rising creatinine after contrast",
                "nephrology",
                Difficulty::Intermediate,
                "Creatinine doubled 48 hours after a contrast CT in a diabetic patient.",
            ),
            (
                "Fever and neck stiffness",
                "neurology",
                Difficulty::Intermediate,
                "19-year-old student with fever, headache and photophobia.",
            ),
        ];

        {
            let mut cases = store.cases.write();
            for (title, specialty, difficulty, presentation) in samples {
                cases.push(ClinicalCase {
                    id: Uuid::new_v4(),
                    title: title.to_string(),
                    specialty: specialty.to_string(),
                    difficulty,
                    presentation: presentation.to_string(),
                    created_by: "system".to_string(),
                    created_at: Utc::now(),
                });
            }
        }
        store
    }

    pub fn attempts_for(&self, case_id: Uuid) -> Vec<Attempt> {
        self.attempts
            .read()
            .iter()
            .filter(|a| a.case_id == case_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn list(&self, filter: &CaseFilter) -> Result<CasePage, StoreError> {
        // Stored specialties are already normalized
        let specialty = filter.specialty.as_deref().map(normalize_specialty);
        let cases = self.cases.read();
        let matching: Vec<&ClinicalCase> = cases
            .iter()
            .filter(|c| {
                specialty
                    .as_deref()
                    .is_none_or(|s| c.specialty == s)
            })
            .filter(|c| filter.difficulty.is_none_or(|d| c.difficulty == d))
            .collect();

        let limit = filter.limit.max(1) as usize;
        let offset = (filter.page.max(1) as usize - 1) * limit;
        let items = matching
            .iter()
            .skip(offset)
            .take(limit)
            .map(|c| (*c).clone())
            .collect();

        Ok(CasePage {
            items,
            total: matching.len(),
            page: filter.page,
            limit: filter.limit,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<ClinicalCase>, StoreError> {
        Ok(self.cases.read().iter().find(|c| c.id == id).cloned())
    }

    async fn create(&self, case: NewCase, created_by: &str) -> Result<ClinicalCase, StoreError> {
        let mut cases = self.cases.write();
        if cases
            .iter()
            .any(|c| c.title.eq_ignore_ascii_case(&case.title))
        {
            return Err(StoreError::Conflict(format!(
                "A case titled {:?} already exists",
                case.title
            )));
        }

        let created = ClinicalCase {
            id: Uuid::new_v4(),
            title: case.title,
            specialty: normalize_specialty(&case.specialty),
            difficulty: case.difficulty,
            presentation: case.presentation,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        cases.push(created.clone());
        Ok(created)
    }

    async fn record_attempt(
        &self,
        case_id: Uuid,
        subject_id: &str,
        answer: String,
    ) -> Result<Option<Attempt>, StoreError> {
        if !self.cases.read().iter().any(|c| c.id == case_id) {
            return Ok(None);
        }

        let attempt = Attempt {
            id: Uuid::new_v4(),
            case_id,
            subject_id: subject_id.to_string(),
            answer,
            submitted_at: Utc::now(),
        };
        self.attempts.write().push(attempt.clone());
        Ok(Some(attempt))
    }
}
