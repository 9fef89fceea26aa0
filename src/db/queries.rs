use crate::db::models::*;
use crate::errors::AppResult;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

// Profile queries
pub async fn ensure_profile(pool: &PgPool, user_id: Uuid, email: Option<String>) -> AppResult<Profile> {
    sqlx::query("INSERT INTO profiles (id, email) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
        .bind(user_id)
        .bind(email)
        .execute(pool)
        .await?;

    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(profile)
}

pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> AppResult<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(profile)
}

pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    request: UpdateProfileRequest,
) -> AppResult<Profile> {
    let profile = sqlx::query_as::<_, Profile>(
        "INSERT INTO profiles (id, email, full_name, location) VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO UPDATE SET
            email = COALESCE(EXCLUDED.email, profiles.email),
            full_name = COALESCE(EXCLUDED.full_name, profiles.full_name),
            location = COALESCE(EXCLUDED.location, profiles.location)
         RETURNING *"
    )
    .bind(user_id)
    .bind(request.email)
    .bind(request.full_name)
    .bind(request.location)
    .fetch_one(pool)
    .await?;

    Ok(profile)
}

// Basic information queries
pub async fn get_basic_information(pool: &PgPool, user_id: Uuid) -> AppResult<Option<BasicInformation>> {
    let info = sqlx::query_as::<_, BasicInformation>(
        "SELECT * FROM basic_information WHERE user_id = $1"
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(info)
}

pub async fn upsert_basic_information(
    pool: &PgPool,
    user_id: Uuid,
    request: UpsertBasicInformationRequest,
) -> AppResult<BasicInformation> {
    let info = sqlx::query_as::<_, BasicInformation>(
        "INSERT INTO basic_information
            (user_id, height, weight, blood_type, allergies, conditions, medications, emergency_contact, lifestyle)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (user_id) DO UPDATE SET
            height = EXCLUDED.height,
            weight = EXCLUDED.weight,
            blood_type = EXCLUDED.blood_type,
            allergies = EXCLUDED.allergies,
            conditions = EXCLUDED.conditions,
            medications = EXCLUDED.medications,
            emergency_contact = EXCLUDED.emergency_contact,
            lifestyle = EXCLUDED.lifestyle
         RETURNING *"
    )
    .bind(user_id)
    .bind(request.height)
    .bind(request.weight)
    .bind(request.blood_type)
    .bind(request.allergies)
    .bind(request.conditions)
    .bind(request.medications)
    .bind(request.emergency_contact)
    .bind(request.lifestyle)
    .fetch_one(pool)
    .await?;

    Ok(info)
}

// Chat session queries
pub async fn create_chat_session(pool: &PgPool, user_id: Uuid, title: String) -> AppResult<ChatSession> {
    let session = sqlx::query_as::<_, ChatSession>(
        "INSERT INTO chat_sessions (user_id, title) VALUES ($1, $2) RETURNING *"
    )
    .bind(user_id)
    .bind(title)
    .fetch_one(pool)
    .await?;

    Ok(session)
}

pub async fn get_chat_session(pool: &PgPool, session_id: Uuid) -> AppResult<Option<ChatSession>> {
    let session = sqlx::query_as::<_, ChatSession>("SELECT * FROM chat_sessions WHERE id = $1")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

    Ok(session)
}

pub async fn list_chat_sessions(pool: &PgPool, user_id: Uuid) -> AppResult<Vec<ChatSession>> {
    let sessions = sqlx::query_as::<_, ChatSession>(
        "SELECT * FROM chat_sessions WHERE user_id = $1 ORDER BY created_at DESC"
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}

pub async fn update_session_status(
    pool: &PgPool,
    session_id: Uuid,
    status: SessionStatus,
) -> AppResult<Option<ChatSession>> {
    let session = sqlx::query_as::<_, ChatSession>(
        "UPDATE chat_sessions SET status = $1 WHERE id = $2 RETURNING *"
    )
    .bind(status.as_str())
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

// Message queries
pub async fn create_message(
    pool: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
    role: MessageRole,
    content: &str,
) -> AppResult<Message> {
    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages (session_id, user_id, role, content) VALUES ($1, $2, $3, $4) RETURNING *"
    )
    .bind(session_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(content)
    .fetch_one(pool)
    .await?;

    Ok(message)
}

pub async fn list_messages_by_session(pool: &PgPool, session_id: Uuid) -> AppResult<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages WHERE session_id = $1 ORDER BY created_at ASC"
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

// Report queries
/// Stores one consultation round in a single transaction: its messages and,
/// when present, the report, which also marks the session completed.
pub async fn save_consultation_round(
    pool: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
    messages: &[(MessageRole, &str)],
    report: Option<Value>,
) -> AppResult<Option<Report>> {
    let mut tx = pool.begin().await?;

    for (role, content) in messages {
        // NOW() is fixed per transaction; clock_timestamp() keeps the round ordered
        sqlx::query(
            "INSERT INTO messages (session_id, user_id, role, content, created_at)
             VALUES ($1, $2, $3, $4, clock_timestamp())"
        )
        .bind(session_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(*content)
        .execute(&mut *tx)
        .await?;
    }

    let mut stored = None;
    if let Some(content) = report {
        let report = sqlx::query_as::<_, Report>(
            "INSERT INTO reports (session_id, user_id, content) VALUES ($1, $2, $3) RETURNING *"
        )
        .bind(session_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_sessions SET status = $1 WHERE id = $2")
            .bind(SessionStatus::Completed.as_str())
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        stored = Some(report);
    }

    tx.commit().await?;
    Ok(stored)
}

pub async fn get_report(pool: &PgPool, report_id: Uuid) -> AppResult<Option<Report>> {
    let report = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = $1")
        .bind(report_id)
        .fetch_optional(pool)
        .await?;

    Ok(report)
}

pub async fn list_reports_by_user(pool: &PgPool, user_id: Uuid) -> AppResult<Vec<Report>> {
    let reports = sqlx::query_as::<_, Report>(
        "SELECT * FROM reports WHERE user_id = $1 ORDER BY created_at DESC"
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(reports)
}

// Assessment queries
pub async fn create_assessment(
    pool: &PgPool,
    user_id: Uuid,
    assessment_type: &str,
    results: Value,
) -> AppResult<Assessment> {
    let assessment = sqlx::query_as::<_, Assessment>(
        "INSERT INTO assessments (user_id, assessment_type, results) VALUES ($1, $2, $3) RETURNING *"
    )
    .bind(user_id)
    .bind(assessment_type)
    .bind(results)
    .fetch_one(pool)
    .await?;

    Ok(assessment)
}

pub async fn list_assessments(pool: &PgPool, user_id: Uuid) -> AppResult<Vec<Assessment>> {
    let assessments = sqlx::query_as::<_, Assessment>(
        "SELECT * FROM assessments WHERE user_id = $1 ORDER BY created_at DESC"
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(assessments)
}

// Diet plan queries
pub async fn get_diet_plan_by_report(pool: &PgPool, report_id: Uuid) -> AppResult<Option<StoredDietPlan>> {
    let plan = sqlx::query_as::<_, StoredDietPlan>("SELECT * FROM diet_plans WHERE report_id = $1")
        .bind(report_id)
        .fetch_optional(pool)
        .await?;

    Ok(plan)
}

/// Inserts a plan unless one already exists for the report; returns the stored one either way.
pub async fn insert_diet_plan(
    pool: &PgPool,
    report_id: Uuid,
    user_id: Uuid,
    plan: Value,
) -> AppResult<StoredDietPlan> {
    sqlx::query(
        "INSERT INTO diet_plans (report_id, user_id, plan) VALUES ($1, $2, $3)
         ON CONFLICT (report_id) DO NOTHING"
    )
    .bind(report_id)
    .bind(user_id)
    .bind(plan)
    .execute(pool)
    .await?;

    let stored = sqlx::query_as::<_, StoredDietPlan>("SELECT * FROM diet_plans WHERE report_id = $1")
        .bind(report_id)
        .fetch_one(pool)
        .await?;

    Ok(stored)
}

pub async fn list_diet_plans(pool: &PgPool, user_id: Uuid) -> AppResult<Vec<StoredDietPlan>> {
    let plans = sqlx::query_as::<_, StoredDietPlan>(
        "SELECT * FROM diet_plans WHERE user_id = $1 ORDER BY created_at DESC"
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(plans)
}

// Realtime snapshot
/// Reads every row of `table` whose `column` equals `user_id`, as JSON objects.
///
/// `table` and `column` are interpolated into the statement, so callers must
/// pass names from `MirrorTable`, never request input.
pub async fn fetch_rows_as_json(
    pool: &PgPool,
    table: &'static str,
    column: &'static str,
    user_id: Uuid,
) -> AppResult<Vec<Value>> {
    let sql = format!(
        "SELECT row_to_json(t) FROM {table} t WHERE t.{column} = $1 ORDER BY t.created_at ASC"
    );

    let rows = sqlx::query_scalar::<_, Value>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Reads one row of `table` by id, as a JSON object.
pub async fn fetch_row_as_json(pool: &PgPool, table: &'static str, id: Uuid) -> AppResult<Option<Value>> {
    let sql = format!("SELECT row_to_json(t) FROM {table} t WHERE t.id = $1");

    let row = sqlx::query_scalar::<_, Value>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}
