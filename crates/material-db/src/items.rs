use crate::types::MaterialItem;
use sqlx::PgPool;
use tracing::debug;

/// Get the material items of every request in `request_ids`, in insertion
/// order per request
pub async fn get_for_request_ids(
    pool: &PgPool,
    request_ids: &[String],
) -> Result<Vec<MaterialItem>, sqlx::Error> {
    if request_ids.is_empty() {
        return Ok(Vec::new());
    }
    debug!(count = request_ids.len(), "Fetching material items");

    sqlx::query_as::<_, MaterialItem>(
        r#"
        SELECT
            id,
            request_id,
            material_descricao AS description,
            material_especificacao AS specification,
            quantidade AS quantity,
            unidade AS unit,
            urgencia AS urgency,
            foto1_url AS photo1_url,
            foto2_url AS photo2_url,
            created_at
        FROM material_items
        WHERE request_id = ANY($1)
        ORDER BY request_id, id ASC
        "#,
    )
    .bind(request_ids)
    .fetch_all(pool)
    .await
}
