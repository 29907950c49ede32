use error_stack::{Report, ResultExt};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, PgSslMode};
use sqlx::Row;
use std::fmt::Write;
use std::{str::FromStr, sync::Arc, time::Duration};

use super::{Datastore, Error, ErrorExt, Filter, FollowRow, NewFollowRow, Result, SlotPredicate};
use crate::config;
use crate::registry::TargetRegistry;
use crate::types::id::marker::FollowMarker;
use crate::types::Id;

const TABLE: &str = "follows";

/// Postgres datastore. Follow rows live in a single `follows` table
/// with one nullable `BIGINT` column per registered slot.
#[derive(Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
    registry: Arc<TargetRegistry>,
}

impl PgStore {
    #[tracing::instrument(skip_all, name = "follow.db.connect")]
    pub async fn connect(cfg: &config::Database, registry: Arc<TargetRegistry>) -> Result<Self> {
        let mut pool_opts = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(cfg.timeout_secs.get()))
            .max_connections(cfg.pool_size.get());

        if let Some(min_idle) = cfg.min_idle {
            pool_opts = pool_opts.min_connections(min_idle.get());
        }

        let mut connect_opts =
            PgConnectOptions::from_str(&cfg.url).change_context(Error::InvalidUrl)?;

        if cfg.enforce_tls {
            connect_opts = connect_opts.ssl_mode(PgSslMode::Prefer);
        }

        let store = Self::from_pool(pool_opts.connect_lazy_with(connect_opts), registry);
        match store.wait_until_healthy().await {
            Ok(..) => {}
            Err(report) if matches!(report.current_context(), Error::UnhealthyPool) => {
                tracing::warn!("database is not reachable yet, connecting lazily");
            }
            Err(report) => return Err(report),
        }

        Ok(store)
    }

    #[must_use]
    pub fn from_pool(pool: sqlx::PgPool, registry: Arc<TargetRegistry>) -> Self {
        Self { pool, registry }
    }

    #[must_use]
    pub fn connections(&self) -> u32 {
        self.pool.size()
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connections() > 0
    }

    #[tracing::instrument(skip(self))]
    pub async fn wait_until_healthy(&self) -> Result<()> {
        match self.pool.acquire().await {
            Ok(..) => Ok(()),
            Err(e) if !self.is_healthy() => Err(e).change_context(Error::UnhealthyPool),
            Err(e) => Err(Report::new(Error::Internal(e))),
        }
    }

    /// Creates the follow table along with a column and a partial
    /// index for every registered slot. Safe to run repeatedly.
    #[tracing::instrument(skip_all, name = "follow.db.ensure_schema")]
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in schema_statements(&self.registry) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .into_db_error()
                .attach_printable_lazy(|| format!("while running: {statement}"))?;
        }
        Ok(())
    }

    fn decode(&self, row: &PgRow) -> Result<FollowRow> {
        let slots = self
            .registry
            .slots()
            .iter()
            .map(|slot| row.try_get::<Option<i64>, _>(slot.name()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .into_db_error()?;

        Ok(FollowRow {
            id: row.try_get("id").into_db_error()?,
            user_id: row.try_get("user_id").into_db_error()?,
            created_at: row.try_get("created_at").into_db_error()?,
            slots,
        })
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool", &self.pool)
            .field("slots", &self.registry.len())
            .finish()
    }
}

impl Datastore for PgStore {
    #[tracing::instrument(skip_all, name = "follow.db.insert", fields(user_id = %row.user_id))]
    async fn insert(&self, row: NewFollowRow) -> Result<FollowRow> {
        if row.slots.len() != self.registry.len() {
            return Err(Report::new(Error::SlotCount {
                expected: self.registry.len(),
                actual: row.slots.len(),
            }));
        }

        let sql = insert_sql(&self.registry);
        let mut query = sqlx::query(&sql).bind(row.user_id).bind(row.created_at);
        for value in row.slots {
            query = query.bind(value);
        }

        let inserted = query.fetch_one(&self.pool).await.into_db_error()?;
        self.decode(&inserted)
    }

    #[tracing::instrument(skip_all, name = "follow.db.delete", fields(id = %id))]
    async fn delete(&self, id: Id<FollowMarker>) -> Result<Option<FollowRow>> {
        let sql = format!(r#"DELETE FROM "{TABLE}" WHERE id = $1 RETURNING *"#);
        let deleted = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .into_db_error()?;

        deleted.map(|row| self.decode(&row)).transpose()
    }

    #[tracing::instrument(skip_all, name = "follow.db.query")]
    async fn query(&self, filter: &Filter<'_>) -> Result<Vec<FollowRow>> {
        let (clause, binds) = where_clause(filter);
        let sql = format!(r#"SELECT * FROM "{TABLE}"{clause} ORDER BY id"#);

        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }

        let rows = query.fetch_all(&self.pool).await.into_db_error()?;
        rows.iter().map(|row| self.decode(row)).collect()
    }

    #[tracing::instrument(skip_all, name = "follow.db.count")]
    async fn count(&self, filter: &Filter<'_>) -> Result<u64> {
        let (clause, binds) = where_clause(filter);
        let sql = format!(r#"SELECT COUNT(*) FROM "{TABLE}"{clause}"#);

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in binds {
            query = query.bind(value);
        }

        let amount = query.fetch_one(&self.pool).await.into_db_error()?;
        Ok(u64::try_from(amount).unwrap_or_default())
    }
}

// Slot names are validated by the registry, so quoting them is enough.
fn schema_statements(registry: &TargetRegistry) -> Vec<String> {
    let mut statements = vec![
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{TABLE}" (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT (now() AT TIME ZONE 'utc')
)"#
        ),
        format!(r#"CREATE INDEX IF NOT EXISTS "{TABLE}_user_id_idx" ON "{TABLE}" (user_id)"#),
    ];

    for slot in registry.slots() {
        let name = slot.name();
        statements.push(format!(
            r#"ALTER TABLE "{TABLE}" ADD COLUMN IF NOT EXISTS "{name}" BIGINT"#
        ));
        statements.push(format!(
            r#"CREATE INDEX IF NOT EXISTS "{TABLE}_{name}_idx" ON "{TABLE}" ("{name}") WHERE "{name}" IS NOT NULL"#
        ));
    }

    statements
}

fn insert_sql(registry: &TargetRegistry) -> String {
    let mut columns = String::from("user_id, created_at");
    let mut values = String::from("$1, $2");

    for (position, slot) in registry.slots().iter().enumerate() {
        _ = write!(columns, r#", "{}""#, slot.name());
        _ = write!(values, ", ${}", position + 3);
    }

    format!(r#"INSERT INTO "{TABLE}" ({columns}) VALUES ({values}) RETURNING *"#)
}

/// Renders a filter into a `WHERE` clause (with a leading space) and
/// the values to bind, in placeholder order.
fn where_clause(filter: &Filter<'_>) -> (String, Vec<i64>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(user_id) = filter.user_id {
        binds.push(user_id.as_i64());
        conditions.push(format!("user_id = ${}", binds.len()));
    }

    if let Some(slot) = filter.slot {
        let name = slot.slot.name();
        match slot.predicate {
            SlotPredicate::Equals(object_id) => {
                binds.push(object_id);
                conditions.push(format!(r#""{name}" = ${}"#, binds.len()));
            }
            SlotPredicate::NotNull => conditions.push(format!(r#""{name}" IS NOT NULL"#)),
        }
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::Filter;
    use crate::test_utils::{self, FollowableKind};

    #[test]
    fn insert_sql_lists_every_slot() {
        let registry = test_utils::registry();
        assert_eq!(
            r#"INSERT INTO "follows" (user_id, created_at, "post", "topic", "member") VALUES ($1, $2, $3, $4, $5) RETURNING *"#,
            insert_sql(&registry)
        );
    }

    #[test]
    fn where_clause_numbers_placeholders_in_bind_order() {
        let registry = test_utils::registry();
        let topic = registry.resolve(FollowableKind::Topic).unwrap();

        assert_eq!((String::new(), vec![]), where_clause(&Filter::new()));

        let (clause, binds) = where_clause(&Filter::new().user(Id::new(4)).slot_eq(topic, 9));
        assert_eq!(r#" WHERE user_id = $1 AND "topic" = $2"#, clause);
        assert_eq!(vec![4, 9], binds);

        let (clause, binds) = where_clause(&Filter::new().slot_eq(topic, 9));
        assert_eq!(r#" WHERE "topic" = $1"#, clause);
        assert_eq!(vec![9], binds);

        let (clause, binds) = where_clause(&Filter::new().slot_not_null(topic));
        assert_eq!(r#" WHERE "topic" IS NOT NULL"#, clause);
        assert!(binds.is_empty());
    }

    #[test]
    fn schema_adds_one_column_per_slot() {
        let statements = schema_statements(&test_utils::registry());
        assert_eq!(2 + 3 * 2, statements.len());
        assert!(statements
            .iter()
            .any(|s| s == r#"ALTER TABLE "follows" ADD COLUMN IF NOT EXISTS "member" BIGINT"#));
    }

    #[tokio::test]
    #[ignore = "requires a Postgres database (set DATABASE_URL)"]
    async fn round_trips_rows_through_postgres() {
        use crate::datastore::{Datastore, NewFollowRow};
        use std::sync::Arc;

        let url = std::env::var("DATABASE_URL").unwrap();
        let registry = Arc::new(test_utils::registry());
        let pool = sqlx::PgPool::connect(&url).await.unwrap();
        let store = PgStore::from_pool(pool, registry.clone());
        store.ensure_schema().await.unwrap();

        let row = store
            .insert(NewFollowRow {
                user_id: Id::new(1),
                created_at: test_utils::now(),
                slots: vec![None, Some(77), None],
            })
            .await
            .unwrap();

        let topic = registry.resolve(FollowableKind::Topic).unwrap();
        let filter = Filter::new().user(Id::new(1)).slot_eq(topic, 77);
        assert!(store.count(&filter).await.unwrap() >= 1);
        assert!(store.query(&filter).await.unwrap().contains(&row));

        assert_eq!(Some(row.clone()), store.delete(row.id).await.unwrap());
    }
}
