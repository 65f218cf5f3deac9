//! Classifier stage (§4.5): headline-only triage into violent-death /
//! not-violent-death, driving the first `Source` state transition.

use futures::stream::{self, StreamExt};
use relato_common::PipelineError;
use relato_llm::schemas::ClassificationResult;
use relato_llm::LlmClient;
use relato_store::Store;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "\
Você classifica manchetes de notícias brasileiras quanto à ocorrência de morte violenta \
(arma de fogo, arma branca, espancamento, estrangulamento, operação policial com morte, \
feminicídio, latrocínio, infanticídio). Responda TRUE apenas quando a manchete indicar uma \
ou mais mortes violentas. Prisões sem morte, feridos sem óbito, anúncios de política de \
segurança e apreensões de armas/drogas são sempre FALSE.";

/// Claim up to `batch_size` Sources in `ready_for_classification` and classify
/// each with bounded concurrency. Returns the number of Sources processed
/// (including those left unchanged after an error, per §4.5 "leave state
/// unchanged so the next scheduling pass retries").
pub async fn run(
    store: &Store,
    llm: &LlmClient,
    concurrency: usize,
    batch_size: i64,
) -> Result<usize, PipelineError> {
    let claimed = relato_store::source::claim_batch(
        &store.pool,
        "ready_for_classification",
        "classifying",
        batch_size,
    )
    .await
    .map_err(relato_common::StoreError::Sqlx)?;

    let processed = claimed.len();

    stream::iter(claimed)
        .for_each_concurrent(concurrency, |source| async move {
            match llm
                .complete::<ClassificationResult>(SYSTEM_PROMPT, &source.headline)
                .await
            {
                Ok(result) => {
                    if let Err(e) = relato_store::source::write_classification(
                        &store.pool,
                        source.id,
                        result.is_violent_death,
                        confidence_str(result.confidence),
                        &result.reasoning,
                    )
                    .await
                    {
                        warn!(source_id = source.id, error = %e, "classifier: write-back failed");
                    }
                }
                Err(e) => {
                    warn!(source_id = source.id, error = %e, "classifier: llm call failed, retry next pass");
                    relato_store::source::leave_unchanged(&store.pool, source.id).await;
                }
            }
        })
        .await;

    info!(processed, "classifier: stage complete");
    Ok(processed)
}

fn confidence_str(level: relato_llm::schemas::ConfidenceLevel) -> &'static str {
    match level {
        relato_llm::schemas::ConfidenceLevel::Alta => "alta",
        relato_llm::schemas::ConfidenceLevel::Media => "media",
        relato_llm::schemas::ConfidenceLevel::Baixa => "baixa",
    }
}
