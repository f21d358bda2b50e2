use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_create_metrics"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

// SQLite 与 PostgreSQL 通用。`(id, kind)` 为指标唯一标识，同时作为 upsert 冲突目标。
const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    id TEXT NOT NULL,
    kind TEXT NOT NULL,
    value DOUBLE PRECISION,
    delta BIGINT,
    PRIMARY KEY (id, kind)
);
";

const DOWN_SQL: &str = "DROP TABLE IF EXISTS metrics;";
