use crate::types::MaterialRequest;
use sqlx::PgPool;
use tracing::debug;

/// Get every material request whose request id is in `request_ids`.
///
/// Ids without a row are simply absent from the result.
pub async fn get_by_request_ids(
    pool: &PgPool,
    request_ids: &[String],
) -> Result<Vec<MaterialRequest>, sqlx::Error> {
    if request_ids.is_empty() {
        return Ok(Vec::new());
    }
    debug!(count = request_ids.len(), "Fetching material requests");

    sqlx::query_as::<_, MaterialRequest>(
        r#"
        SELECT
            id,
            request_id,
            timestamp_envio AS submitted_at,
            loja_id AS store_id,
            loja_label AS store_label,
            solicitante_nome AS requester_name,
            solicitante_telefone AS requester_phone,
            numero_chamado AS ticket_number,
            tipo_equipe AS team_type,
            empresa_terceira AS contractor,
            tipo_servico AS service_type,
            sistema_afetado AS affected_system,
            descricao_geral_servico AS service_description,
            created_at
        FROM material_requests
        WHERE request_id = ANY($1)
        "#,
    )
    .bind(request_ids)
    .fetch_all(pool)
    .await
}
