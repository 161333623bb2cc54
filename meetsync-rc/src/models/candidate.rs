//! Remote competitor candidates and local competitor identities

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Accepts the spellings sources and stores use ("M", "male", "F", "women", ...)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "m" | "male" | "men" | "man" => Some(Gender::Male),
            "f" | "female" | "women" | "woman" | "w" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }
}

/// Transient competitor record returned by a remote search
///
/// Never persisted directly; only its fields are copied into a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorCandidate {
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub birth_year: Option<i32>,
    #[serde(default)]
    pub club: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub division: String,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub remote_competitor_id: Option<String>,
    #[serde(default)]
    pub meet_name: Option<String>,
}

/// Identity used to de-duplicate candidates across pages and split halves
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateKey {
    name: String,
    date: Option<NaiveDate>,
    division: String,
    total_centi: Option<i64>,
    remote_competitor_id: Option<String>,
}

impl CompetitorCandidate {
    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            name: self.name.trim().to_lowercase(),
            date: self.date,
            division: self.division.clone(),
            total_centi: self.total.map(|t| (t * 100.0).round() as i64),
            remote_competitor_id: self.remote_competitor_id.clone(),
        }
    }
}

/// Remove duplicate candidates, keeping first occurrence order
pub fn dedup_candidates(candidates: Vec<CompetitorCandidate>) -> Vec<CompetitorCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.key()))
        .collect()
}

/// One entry of a competitor's remote competition history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub meet_name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default)]
    pub total: Option<f64>,
}

/// Competitor identity held by the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorIdentity {
    pub id: i64,
    pub name: String,
    pub remote_competitor_id: Option<String>,
    pub birth_year: Option<i32>,
    pub gender: Option<Gender>,
}
