//! Persistent results store
//!
//! `ResultStore` is the seam between reconciliation logic and storage.
//! `update_result` writes exactly the fields present in the patch; enforcing
//! only-fill-null is the caller's job.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::error::{SyncError, SyncResult};
use crate::models::{
    CompetitorIdentity, Gender, MeetFilter, MeetRecord, ResolverTier, ResultFilter, ResultPatch,
    ResultRecord,
};

/// Operations consumed from the local results store
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn read_meet(&self, meet_id: i64) -> SyncResult<Option<MeetRecord>>;

    async fn count_local_results(&self, meet_id: i64) -> SyncResult<u32>;

    /// Meets selected by the filter, ordered by date then local id
    async fn list_candidate_meets(&self, filter: &MeetFilter) -> SyncResult<Vec<MeetRecord>>;

    async fn read_result(&self, result_id: i64) -> SyncResult<Option<ResultRecord>>;

    /// Results selected by the filter, ordered by id
    async fn read_results(&self, filter: &ResultFilter) -> SyncResult<Vec<ResultRecord>>;

    async fn update_result(&self, result_id: i64, patch: &ResultPatch) -> SyncResult<()>;

    /// Every local competitor identity, ordered by id
    async fn list_competitors(&self) -> SyncResult<Vec<CompetitorIdentity>>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

const MEET_COLUMNS: &str = "local_id, remote_id, name, date";
const RESULT_COLUMNS: &str = "id, meet_id, competitor_id, competitor_name, division, total, \
     bodyweight, place, birth_year, age, club, region, gender, remote_competitor_id, resolved_tier";

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_meet(&self, meet: &MeetRecord) -> SyncResult<()> {
        sqlx::query("INSERT INTO meets (local_id, remote_id, name, date) VALUES (?, ?, ?, ?)")
            .bind(meet.local_id)
            .bind(&meet.remote_id)
            .bind(&meet.name)
            .bind(meet.date.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_competitor(&self, competitor: &CompetitorIdentity) -> SyncResult<()> {
        sqlx::query(
            "INSERT INTO competitors (id, name, remote_competitor_id, birth_year, gender) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(competitor.id)
        .bind(&competitor.name)
        .bind(&competitor.remote_competitor_id)
        .bind(competitor.birth_year)
        .bind(competitor.gender.map(Gender::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_result(&self, result: &ResultRecord) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO results (
                id, meet_id, competitor_id, competitor_name, division, total,
                bodyweight, place, birth_year, age, club, region, gender,
                remote_competitor_id, resolved_tier
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.id)
        .bind(result.meet_id)
        .bind(result.competitor_id)
        .bind(&result.competitor_name)
        .bind(&result.division)
        .bind(result.total)
        .bind(result.bodyweight)
        .bind(result.place.map(i64::from))
        .bind(result.birth_year)
        .bind(result.age.map(i64::from))
        .bind(&result.club)
        .bind(&result.region)
        .bind(result.gender.map(Gender::as_str))
        .bind(&result.remote_competitor_id)
        .bind(result.resolved_tier.map(ResolverTier::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_date(value: &str) -> SyncResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| SyncError::PersistenceFailure(format!("invalid stored date '{}': {}", value, e)))
}

fn meet_from_row(row: &SqliteRow) -> SyncResult<MeetRecord> {
    let date: String = row.try_get("date")?;
    Ok(MeetRecord {
        local_id: row.try_get("local_id")?,
        remote_id: row.try_get("remote_id")?,
        name: row.try_get("name")?,
        date: parse_date(&date)?,
    })
}

fn result_from_row(row: &SqliteRow) -> SyncResult<ResultRecord> {
    let gender: Option<String> = row.try_get("gender")?;
    let tier: Option<String> = row.try_get("resolved_tier")?;
    let place: Option<i64> = row.try_get("place")?;
    let age: Option<i64> = row.try_get("age")?;

    Ok(ResultRecord {
        id: row.try_get("id")?,
        meet_id: row.try_get("meet_id")?,
        competitor_id: row.try_get("competitor_id")?,
        competitor_name: row.try_get("competitor_name")?,
        division: row.try_get("division")?,
        total: row.try_get("total")?,
        bodyweight: row.try_get("bodyweight")?,
        place: place.and_then(|p| u32::try_from(p).ok()),
        birth_year: row.try_get("birth_year")?,
        age: age.and_then(|a| u32::try_from(a).ok()),
        club: row.try_get("club")?,
        region: row.try_get("region")?,
        gender: gender.as_deref().and_then(Gender::parse),
        remote_competitor_id: row.try_get("remote_competitor_id")?,
        resolved_tier: tier.as_deref().and_then(ResolverTier::parse),
    })
}

fn competitor_from_row(row: &SqliteRow) -> SyncResult<CompetitorIdentity> {
    let gender: Option<String> = row.try_get("gender")?;
    Ok(CompetitorIdentity {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        remote_competitor_id: row.try_get("remote_competitor_id")?,
        birth_year: row.try_get("birth_year")?,
        gender: gender.as_deref().and_then(Gender::parse),
    })
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn read_meet(&self, meet_id: i64) -> SyncResult<Option<MeetRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM meets WHERE local_id = ?",
            MEET_COLUMNS
        ))
        .bind(meet_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(meet_from_row).transpose()
    }

    async fn count_local_results(&self, meet_id: i64) -> SyncResult<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results WHERE meet_id = ?")
            .bind(meet_id)
            .fetch_one(&self.pool)
            .await?;
        u32::try_from(count)
            .map_err(|_| SyncError::PersistenceFailure(format!("result count {} out of range", count)))
    }

    async fn list_candidate_meets(&self, filter: &MeetFilter) -> SyncResult<Vec<MeetRecord>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM meets WHERE 1 = 1", MEET_COLUMNS));

        if !filter.ids.is_empty() {
            qb.push(" AND local_id IN (");
            let mut ids = qb.separated(", ");
            for id in &filter.ids {
                ids.push_bind(*id);
            }
            qb.push(")");
        } else {
            if let Some(from) = filter.date_from {
                qb.push(" AND date >= ").push_bind(from.to_string());
            }
            if let Some(to) = filter.date_to {
                qb.push(" AND date <= ").push_bind(to.to_string());
            }
        }

        qb.push(" ORDER BY date, local_id");
        if let Some(max) = filter.max_count {
            qb.push(" LIMIT ").push_bind(max as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(meet_from_row).collect()
    }

    async fn read_result(&self, result_id: i64) -> SyncResult<Option<ResultRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM results WHERE id = ?",
            RESULT_COLUMNS
        ))
        .bind(result_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(result_from_row).transpose()
    }

    async fn read_results(&self, filter: &ResultFilter) -> SyncResult<Vec<ResultRecord>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM results WHERE 1 = 1", RESULT_COLUMNS));

        if let Some(meet_id) = filter.meet_id {
            qb.push(" AND meet_id = ").push_bind(meet_id);
        }
        if let Some(competitor_id) = filter.competitor_id {
            qb.push(" AND competitor_id = ").push_bind(competitor_id);
        }
        if let Some(name) = &filter.competitor_name {
            qb.push(" AND competitor_name = ")
                .push_bind(name.clone())
                .push(" COLLATE NOCASE");
        }
        if filter.needs_backfill_only {
            qb.push(
                " AND (competitor_id IS NULL OR remote_competitor_id IS NULL OR birth_year IS NULL \
                 OR club IS NULL OR region IS NULL OR gender IS NULL)",
            );
        }
        qb.push(" ORDER BY id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(result_from_row).collect()
    }

    async fn update_result(&self, result_id: i64, patch: &ResultPatch) -> SyncResult<()> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE results SET ");
        let mut fields = 0usize;
        {
            let mut set = qb.separated(", ");
            if let Some(v) = patch.competitor_id {
                set.push("competitor_id = ").push_bind_unseparated(v);
                fields += 1;
            }
            if let Some(v) = &patch.remote_competitor_id {
                set.push("remote_competitor_id = ").push_bind_unseparated(v.clone());
                fields += 1;
            }
            if let Some(v) = patch.birth_year {
                set.push("birth_year = ").push_bind_unseparated(v);
                fields += 1;
            }
            if let Some(v) = patch.age {
                set.push("age = ").push_bind_unseparated(i64::from(v));
                fields += 1;
            }
            if let Some(v) = &patch.club {
                set.push("club = ").push_bind_unseparated(v.clone());
                fields += 1;
            }
            if let Some(v) = &patch.region {
                set.push("region = ").push_bind_unseparated(v.clone());
                fields += 1;
            }
            if let Some(v) = patch.gender {
                set.push("gender = ").push_bind_unseparated(v.as_str());
                fields += 1;
            }
            if let Some(v) = patch.resolved_tier {
                set.push("resolved_tier = ").push_bind_unseparated(v.as_str());
                fields += 1;
            }
        }

        if fields == 0 {
            return Ok(());
        }

        qb.push(" WHERE id = ").push_bind(result_id);
        let outcome = qb.build().execute(&self.pool).await?;
        if outcome.rows_affected() == 0 {
            return Err(SyncError::PersistenceFailure(format!(
                "result {} not found for update",
                result_id
            )));
        }
        Ok(())
    }

    async fn list_competitors(&self) -> SyncResult<Vec<CompetitorIdentity>> {
        let rows = sqlx::query(
            "SELECT id, name, remote_competitor_id, birth_year, gender FROM competitors ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(competitor_from_row).collect()
    }
}
