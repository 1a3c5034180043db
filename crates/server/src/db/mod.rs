//! Clinical case persistence

mod memory;
mod repository;

pub use memory::InMemoryCaseStore;
pub use repository::{
    Attempt, CaseFilter, CasePage, CaseStore, ClinicalCase, Difficulty, NewCase, StoreError,
    normalize_specialty,
};
