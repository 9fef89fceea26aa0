use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::utils::config::Config;

pub mod models;
pub mod queries;

/// Channel every mirrored table publishes its row changes on.
pub const ROW_CHANGES_CHANNEL: &str = "row_changes";

/// Tables that carry the change-notification trigger.
const NOTIFYING_TABLES: [&str; 7] = [
    "profiles",
    "basic_information",
    "chat_sessions",
    "messages",
    "reports",
    "assessments",
    "diet_plans",
];

/// Columns copied into a change notification. Only keys are sent, since
/// `pg_notify` rejects payloads of 8000 bytes or more; mirrors re-read the
/// row by id.
pub const NOTIFY_KEY_COLUMNS: [&str; 4] = ["id", "user_id", "session_id", "report_id"];

/// Tables that carry the `updated_at` trigger.
const UPDATED_AT_TABLES: [&str; 3] = ["profiles", "basic_information", "chat_sessions"];

pub async fn init_db(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Connected to Postgres successfully");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!("Running database migrations...");

    sqlx::query("CREATE TABLE IF NOT EXISTS profiles (
        id UUID PRIMARY KEY,
        email VARCHAR(255),
        full_name VARCHAR(255),
        location TEXT,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )").execute(pool).await?;

    sqlx::query("CREATE TABLE IF NOT EXISTS basic_information (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL UNIQUE REFERENCES profiles(id) ON DELETE CASCADE,
        height TEXT,
        weight TEXT,
        blood_type VARCHAR(8),
        allergies TEXT[] NOT NULL DEFAULT '{}',
        conditions TEXT[] NOT NULL DEFAULT '{}',
        medications TEXT[] NOT NULL DEFAULT '{}',
        emergency_contact JSONB,
        lifestyle JSONB,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )").execute(pool).await?;

    sqlx::query("CREATE TABLE IF NOT EXISTS chat_sessions (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
        title VARCHAR(255) NOT NULL,
        status VARCHAR(20) NOT NULL DEFAULT 'in_progress'
            CHECK (status IN ('in_progress', 'completed', 'scheduled')),
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )").execute(pool).await?;

    sqlx::query("CREATE TABLE IF NOT EXISTS messages (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        session_id UUID NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
        user_id UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
        role VARCHAR(16) NOT NULL CHECK (role IN ('user', 'assistant')),
        content TEXT NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )").execute(pool).await?;

    sqlx::query("CREATE TABLE IF NOT EXISTS reports (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        session_id UUID NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
        user_id UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
        content JSONB NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )").execute(pool).await?;

    sqlx::query("CREATE TABLE IF NOT EXISTS assessments (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
        assessment_type VARCHAR(64) NOT NULL,
        results JSONB NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )").execute(pool).await?;

    sqlx::query("CREATE TABLE IF NOT EXISTS diet_plans (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        report_id UUID NOT NULL UNIQUE REFERENCES reports(id) ON DELETE CASCADE,
        user_id UUID NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
        plan JSONB NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )").execute(pool).await?;

    // Indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_sessions_user_id ON chat_sessions(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id, created_at)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_user_id ON reports(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_session_id ON reports(session_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_assessments_user_id ON assessments(user_id)")
        .execute(pool).await?;

    sqlx::query("CREATE OR REPLACE FUNCTION update_updated_at_column()
        RETURNS TRIGGER AS $$
        BEGIN
            NEW.updated_at = NOW();
            RETURN NEW;
        END;
        $$ language 'plpgsql'").execute(pool).await?;

    for table in UPDATED_AT_TABLES {
        sqlx::query(&format!("DROP TRIGGER IF EXISTS update_{table}_updated_at ON {table}"))
            .execute(pool).await?;
        sqlx::query(&format!(
            "CREATE TRIGGER update_{table}_updated_at BEFORE UPDATE ON {table}
            FOR EACH ROW EXECUTE FUNCTION update_updated_at_column()"
        ))
        .execute(pool).await?;
    }

    // Row-level change feed consumed by services::realtime
    let key_columns = NOTIFY_KEY_COLUMNS
        .iter()
        .map(|c| format!("'{c}'"))
        .collect::<Vec<_>>()
        .join(", ");
    sqlx::query(&format!("CREATE OR REPLACE FUNCTION notify_row_change()
        RETURNS TRIGGER AS $$
        DECLARE
            new_keys JSONB;
            old_keys JSONB;
        BEGIN
            IF TG_OP <> 'DELETE' THEN
                SELECT jsonb_object_agg(key, value) INTO new_keys
                FROM jsonb_each(to_jsonb(NEW)) WHERE key IN ({key_columns});
            END IF;
            IF TG_OP <> 'INSERT' THEN
                SELECT jsonb_object_agg(key, value) INTO old_keys
                FROM jsonb_each(to_jsonb(OLD)) WHERE key IN ({key_columns});
            END IF;
            PERFORM pg_notify('{ROW_CHANGES_CHANNEL}', json_build_object(
                'table', TG_TABLE_NAME,
                'type', TG_OP,
                'record', new_keys,
                'old_record', old_keys
            )::text);
            RETURN NULL;
        END;
        $$ language 'plpgsql'")).execute(pool).await?;

    for table in NOTIFYING_TABLES {
        sqlx::query(&format!("DROP TRIGGER IF EXISTS notify_{table}_changes ON {table}"))
            .execute(pool).await?;
        sqlx::query(&format!(
            "CREATE TRIGGER notify_{table}_changes AFTER INSERT OR UPDATE OR DELETE ON {table}
            FOR EACH ROW EXECUTE FUNCTION notify_row_change()"
        ))
        .execute(pool).await?;
    }

    tracing::info!("✅ Database migrations completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MessageRole;
    use crate::db::queries::{
        create_chat_session, create_message, ensure_profile, get_chat_session,
        list_messages_by_session, save_consultation_round,
    };
    use serde_json::json;
    use uuid::Uuid;

    // Only runs against a scratch database named by TEST_DATABASE_URL
    async fn scratch_pool() -> Option<PgPool> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("TEST_DATABASE_URL is not reachable");
        run_migrations(&pool).await.expect("migrations failed");
        Some(pool)
    }

    #[tokio::test]
    async fn test_rows_over_notify_limit_are_stored() {
        let Some(pool) = scratch_pool().await else {
            return;
        };
        let user = Uuid::new_v4();
        ensure_profile(&pool, user, None).await.unwrap();
        let session = create_chat_session(&pool, user, "Large rows".into()).await.unwrap();

        let long_reply = "x".repeat(8500);
        create_message(&pool, session.id, user, MessageRole::Assistant, &long_reply)
            .await
            .unwrap();

        let report = json!({
            "diagnosis": {"condition": "Migraine", "description": "y".repeat(8200)}
        });
        let round = [(MessageRole::User, "last answer"), (MessageRole::Assistant, "done")];
        let stored = save_consultation_round(&pool, session.id, user, &round, Some(report))
            .await
            .unwrap();
        assert!(stored.is_some());

        let session = get_chat_session(&pool, session.id).await.unwrap().unwrap();
        assert_eq!(session.status, "completed");

        let contents: Vec<String> = list_messages_by_session(&pool, session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec![long_reply, "last answer".to_string(), "done".to_string()]);
    }
}
