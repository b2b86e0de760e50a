use sqlx::PgPool;

/// `Ok(false)` means the database answers but migrations have not run.
pub(crate) async fn schema_ready(pool: &PgPool) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT to_regclass('public.materials') IS NOT NULL
            AND to_regclass('public.material_records') IS NOT NULL",
    )
    .fetch_one(pool)
    .await
}
