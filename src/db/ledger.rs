use sqlx::{PgExecutor, PgPool, Row};

/// Current credit balance, or `None` if the user has no profile row
pub async fn get_credits(pool: &PgPool, user_id: &str) -> Result<Option<i32>, sqlx::Error> {
    let row = sqlx::query("SELECT credits FROM profiles WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| r.try_get("credits")).transpose()
}

/// Take one credit if the balance allows it. Returns the new balance, or
/// `None` when the profile is missing or already at zero.
pub async fn decrement_credit<'e, E>(executor: E, user_id: &str) -> Result<Option<i32>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        UPDATE profiles
        SET credits = credits - 1
        WHERE id = $1 AND credits >= 1
        RETURNING credits
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    row.map(|r| r.try_get("credits")).transpose()
}
