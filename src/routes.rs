use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState,
    analysis::PersistenceHandle,
    error::{EmbeddingError, LlmError, StoreError},
    models::{NewNft, NftInput, ResultEnvelope, SimilarityResult, StoredNftMetadata},
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze_nft))
        .route("/api/nfts", post(create_nft))
        .route("/api/nfts/{id}/analyze", post(reanalyze_nft))
        .route("/api/nfts/{id}/analysis", get(get_analysis))
        .route("/api/embedding", post(image_embedding))
        .route("/api/embeddings/batch", post(batch_embeddings))
        .route("/api/search-similar", post(search_similar))
        .with_state(state)
}

fn store_error(e: StoreError) -> (StatusCode, String) {
    tracing::error!("❌ Store operation failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Store error: {}", e))
}

fn embedding_error(e: EmbeddingError) -> (StatusCode, String) {
    let status = match &e {
        EmbeddingError::Unavailable(_) | EmbeddingError::Llm(LlmError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
        EmbeddingError::EmptyText => StatusCode::BAD_REQUEST,
        EmbeddingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    };
    tracing::error!("❌ Embedding failed: {}", e);
    (status, e.to_string())
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    model_configured: bool,
    vector_store_configured: bool,
    database_configured: bool,
    embedding_dimension: usize,
    max_concurrent_analyses: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        model_configured: state.analyzer.is_model_configured(),
        vector_store_configured: state.analyzer.similarity().is_available(),
        database_configured: state.pool.is_some(),
        embedding_dimension: state.descriptions.dimension(),
        max_concurrent_analyses: state.analyzer.max_concurrency(),
    })
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(flatten)]
    nft: NftInput,
    /// Persisted NFT to write the verdict onto and exclude from similarity.
    #[serde(default)]
    nft_id: Option<Uuid>,
}

async fn analyze_nft(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<ResultEnvelope>> {
    request.nft.validate().map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    tracing::info!("📥 Received NFT for analysis: {}", request.nft.title);

    let handle = request.nft_id.map(|nft_id| PersistenceHandle {
        store: state.records.clone(),
        nft_id,
    });
    let envelope = state
        .analyzer
        .analyze_nft_for_fraud(&request.nft, handle.as_ref())
        .await;
    Ok(Json(envelope))
}

#[derive(Serialize)]
struct Created {
    id: Uuid,
    status: &'static str,
}

async fn create_nft(
    State(state): State<AppState>,
    Json(new_nft): Json<NewNft>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let input = new_nft.to_input();
    input.validate().map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    if new_nft.creator_wallet_address.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "creator_wallet_address must not be empty".to_string(),
        ));
    }

    let id = Uuid::new_v4();
    let record = new_nft.into_record(id);
    state.records.insert_nft(&record).await.map_err(store_error)?;
    tracing::info!("Created NFT {} ('{}'), starting background analysis", id, record.title);

    let handle = PersistenceHandle {
        store: state.records.clone(),
        nft_id: id,
    };
    let analyzer = state.analyzer.clone();
    tokio::spawn(async move {
        analyzer.analyze_nft_for_fraud(&input, Some(&handle)).await;
    });

    Ok((
        StatusCode::CREATED,
        Json(Created {
            id,
            status: "analysis_pending",
        }),
    ))
}

async fn reanalyze_nft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ResultEnvelope>> {
    let record = state
        .records
        .fetch_nft(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("NFT {} not found", id)))?;

    let handle = PersistenceHandle {
        store: state.records.clone(),
        nft_id: id,
    };
    let envelope = state
        .analyzer
        .analyze_nft_for_fraud(&record.to_input(), Some(&handle))
        .await;
    Ok(Json(envelope))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .records
        .load_analysis(id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No analysis stored for NFT {}", id)))
}

#[derive(Deserialize)]
struct EmbeddingRequest {
    image_url: String,
}

#[derive(Serialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
    dimension: usize,
}

async fn image_embedding(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingRequest>,
) -> ApiResult<Json<EmbeddingResponse>> {
    if request.image_url.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "image_url must not be empty".to_string()));
    }
    let embedding = state
        .descriptions
        .get_image_embedding(&request.image_url)
        .await
        .map_err(embedding_error)?;
    Ok(Json(EmbeddingResponse {
        dimension: embedding.len(),
        embedding,
    }))
}

#[derive(Deserialize)]
struct BatchRequest {
    image_urls: Vec<String>,
    nft_ids: Vec<Uuid>,
    #[serde(default)]
    metadata: Vec<StoredNftMetadata>,
}

#[derive(Serialize)]
struct BatchResponse {
    results: Vec<bool>,
    stored: usize,
}

async fn batch_embeddings(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<Json<BatchResponse>> {
    let results = state
        .descriptions
        .batch_embed_and_store(&request.image_urls, &request.nft_ids, &request.metadata)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(BatchResponse {
        stored: results.iter().filter(|ok| **ok).count(),
        results,
    }))
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    exclude_nft_id: Option<Uuid>,
}

async fn search_similar(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SimilarityResult>> {
    let embedding = match (request.embedding, request.image_url) {
        (Some(embedding), _) if !embedding.is_empty() => embedding,
        (_, Some(url)) if !url.trim().is_empty() => state
            .descriptions
            .get_image_embedding(&url)
            .await
            .map_err(embedding_error)?,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "either embedding or image_url is required".to_string(),
            ));
        }
    };

    let threshold = request.threshold.unwrap_or(state.settings.similarity.report_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err((StatusCode::BAD_REQUEST, format!("threshold must be in [0, 1], got {}", threshold)));
    }
    let limit = request.limit.unwrap_or(state.settings.similarity.limit);

    let result = state
        .analyzer
        .similarity()
        .search_with(&embedding, threshold, limit, request.exclude_nft_id)
        .await;
    Ok(Json(result))
}
