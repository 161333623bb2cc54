//! Local result records and partial updates

use serde::{Deserialize, Serialize};

use super::candidate::Gender;

/// Resolver tier that produced a field value (provenance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverTier {
    /// Exact division, window around the stored meet date
    TierA,
    /// Exact division, window around the source-confirmed date
    TierB,
    /// Broadened division order with exact-name filter
    TierC,
    /// Duplicate-identity disambiguation through competition history
    TierD,
}

impl ResolverTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TierA => "tier_a",
            Self::TierB => "tier_b",
            Self::TierC => "tier_c",
            Self::TierD => "tier_d",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tier_a" => Some(Self::TierA),
            "tier_b" => Some(Self::TierB),
            "tier_c" => Some(Self::TierC),
            "tier_d" => Some(Self::TierD),
            _ => None,
        }
    }
}

/// One competitor's result at one meet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: i64,
    pub meet_id: i64,
    /// Local competitor identity; None until resolved
    pub competitor_id: Option<i64>,
    pub competitor_name: String,
    pub division: String,
    pub total: Option<f64>,
    pub bodyweight: Option<f64>,
    pub place: Option<u32>,
    pub birth_year: Option<i32>,
    pub age: Option<u32>,
    pub club: Option<String>,
    pub region: Option<String>,
    pub gender: Option<Gender>,
    pub remote_competitor_id: Option<String>,
    pub resolved_tier: Option<ResolverTier>,
}

impl ResultRecord {
    /// True when any identity or biographic field is still empty
    pub fn needs_backfill(&self) -> bool {
        self.competitor_id.is_none()
            || self.remote_competitor_id.is_none()
            || self.birth_year.is_none()
            || self.club.is_none()
            || self.region.is_none()
            || self.gender.is_none()
    }
}

/// Selection of result records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultFilter {
    pub meet_id: Option<i64>,
    pub competitor_id: Option<i64>,
    pub competitor_name: Option<String>,
    pub needs_backfill_only: bool,
}

impl ResultFilter {
    pub fn for_meet(meet_id: i64) -> Self {
        Self {
            meet_id: Some(meet_id),
            ..Default::default()
        }
    }

    pub fn backfill_for_meet(meet_id: i64) -> Self {
        Self {
            meet_id: Some(meet_id),
            needs_backfill_only: true,
            ..Default::default()
        }
    }
}

/// Before/after value of one written field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<String>,
    pub after: String,
}

/// Partial update of a result record
///
/// Only `Some` fields are written. The caller decides which fields may be
/// written; the store applies the patch as given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPatch {
    pub competitor_id: Option<i64>,
    pub remote_competitor_id: Option<String>,
    pub birth_year: Option<i32>,
    pub age: Option<u32>,
    pub club: Option<String>,
    pub region: Option<String>,
    pub gender: Option<Gender>,
    pub resolved_tier: Option<ResolverTier>,
    pub changes: Vec<FieldChange>,
}

impl ResultPatch {
    /// True when no data field would be written
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply the patch to an in-memory record
    pub fn apply_to(&self, record: &mut ResultRecord) {
        if let Some(v) = self.competitor_id {
            record.competitor_id = Some(v);
        }
        if let Some(v) = &self.remote_competitor_id {
            record.remote_competitor_id = Some(v.clone());
        }
        if let Some(v) = self.birth_year {
            record.birth_year = Some(v);
        }
        if let Some(v) = self.age {
            record.age = Some(v);
        }
        if let Some(v) = &self.club {
            record.club = Some(v.clone());
        }
        if let Some(v) = &self.region {
            record.region = Some(v.clone());
        }
        if let Some(v) = self.gender {
            record.gender = Some(v);
        }
        if let Some(v) = self.resolved_tier {
            record.resolved_tier = Some(v);
        }
    }
}
