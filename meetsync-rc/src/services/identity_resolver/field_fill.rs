//! Candidate → patch conversion
//!
//! Only fields that are null on the record are written, unless `force` is set.
//! Fields where the candidate has nothing to offer are never touched.

use crate::models::{
    CompetitorCandidate, FieldChange, Gender, ResolverTier, ResultPatch, ResultRecord,
};

fn change(field: &str, before: Option<String>, after: String) -> FieldChange {
    FieldChange {
        field: field.to_string(),
        before,
        after,
    }
}

/// Build the patch that copies `candidate` onto `record`
pub fn build_patch(
    record: &ResultRecord,
    candidate: &CompetitorCandidate,
    tier: ResolverTier,
    force: bool,
) -> ResultPatch {
    let mut patch = ResultPatch::default();

    macro_rules! fill {
        ($field:ident, $value:expr, $show:expr) => {
            if let Some(value) = $value {
                let writable = force || record.$field.is_none();
                if writable && record.$field.as_ref() != Some(&value) {
                    patch.changes.push(change(
                        stringify!($field),
                        record.$field.as_ref().map($show),
                        ($show)(&value),
                    ));
                    patch.$field = Some(value);
                }
            }
        };
    }

    fill!(
        remote_competitor_id,
        candidate.remote_competitor_id.clone(),
        |v: &String| v.clone()
    );
    fill!(birth_year, candidate.birth_year, |v: &i32| v.to_string());
    fill!(age, candidate.age, |v: &u32| v.to_string());
    fill!(club, candidate.club.clone(), |v: &String| v.clone());
    fill!(region, candidate.region.clone(), |v: &String| v.clone());
    fill!(gender, candidate.gender, |v: &Gender| v.as_str().to_string());

    if !patch.is_empty() {
        patch.resolved_tier = Some(tier);
    }
    patch
}

/// Patch assigning a confirmed local identity
pub fn identity_patch(
    record: &ResultRecord,
    competitor_id: i64,
    remote_competitor_id: Option<&str>,
    force: bool,
) -> ResultPatch {
    let mut patch = ResultPatch::default();

    if (force || record.competitor_id.is_none()) && record.competitor_id != Some(competitor_id) {
        patch.changes.push(change(
            "competitor_id",
            record.competitor_id.map(|v| v.to_string()),
            competitor_id.to_string(),
        ));
        patch.competitor_id = Some(competitor_id);
    }

    if let Some(remote_id) = remote_competitor_id {
        if (force || record.remote_competitor_id.is_none())
            && record.remote_competitor_id.as_deref() != Some(remote_id)
        {
            patch.changes.push(change(
                "remote_competitor_id",
                record.remote_competitor_id.clone(),
                remote_id.to_string(),
            ));
            patch.remote_competitor_id = Some(remote_id.to_string());
        }
    }

    if !patch.is_empty() {
        patch.resolved_tier = Some(ResolverTier::TierD);
    }
    patch
}
