//! REST handlers.
//!
//! Each protected handler authenticates the request headers first and checks the privilege
//! its route needs, then delegates to the core services.

use api_shared::auth::{API_KEY_HEADER, ROLE_HEADER, USER_HEADER};
use api_shared::{
    authenticate, Caller, ClassifyCellReq, CompleteReviewReq, CreateMorphologyReq,
    DifferentialReq, DifferentialRes, EventDto, EventsRes, FinalizeRes, FindingReq, FindingRes,
    HealthRes, HealthService, ListMorphologiesRes, ListReviewsRes, ListSamplesRes, MorphologyDto,
    PendingRes, RegisterSampleReq, RemoveFindingReq, ReviewDto, SampleDetail, SampleSummary,
    StatusQuery, TaxonomyRes,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use hemogram_core::{
    compute_differential, CellType, CompleteBloodCount, FindingChange, InstrumentType, NewSample,
    Privilege, ResultOption, ReviewStatus, SampleFilter, WbcConcentration,
};
use hemogram_core::{LabError, LabResult};

use crate::error::ApiError;
use crate::AppState;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn authorise(
    state: &AppState,
    headers: &HeaderMap,
    required: Privilege,
) -> Result<Caller, ApiError> {
    let caller = authenticate(
        &state.api_key,
        header(headers, API_KEY_HEADER),
        header(headers, USER_HEADER),
        header(headers, ROLE_HEADER),
    )?;
    caller.require(required)?;
    Ok(caller)
}

fn sample_filter(query: &StatusQuery) -> LabResult<SampleFilter> {
    match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("pending") => Ok(SampleFilter::Pending),
        Some("all") => Ok(SampleFilter::All),
        Some(other) => Err(LabError::InvalidInput(format!(
            "unknown sample status '{other}' (expected pending or all)"
        ))),
    }
}

fn review_filter(query: &StatusQuery) -> LabResult<Option<ReviewStatus>> {
    match query.status.as_deref().map(str::trim) {
        None | Some("") => Ok(Some(ReviewStatus::Pending)),
        Some("all") => Ok(None),
        Some(other) => other.parse().map(Some),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint. Open to unauthenticated callers.
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/taxonomy",
    responses(
        (status = 200, description = "Cell categories in canonical order", body = TaxonomyRes),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
#[axum::debug_handler]
pub async fn taxonomy(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TaxonomyRes>, ApiError> {
    authorise(&state, &headers, Privilege::VIEW)?;
    Ok(Json(TaxonomyRes::current()))
}

#[utoipa::path(
    post,
    path = "/differentials",
    request_body = DifferentialReq,
    responses(
        (status = 200, description = "Computed differential", body = DifferentialRes),
        (status = 400, description = "Invalid WBC, duplicate or unknown category"),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
/// Stateless differential computation from raw counts. Nothing is stored.
#[axum::debug_handler]
pub async fn compute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DifferentialReq>,
) -> Result<Json<DifferentialRes>, ApiError> {
    authorise(&state, &headers, Privilege::VIEW)?;
    let counts = req.raw_counts()?;
    let report = compute_differential(req.wbc, &counts)?;
    Ok(Json(DifferentialRes { report }))
}

#[utoipa::path(
    get,
    path = "/samples",
    params(StatusQuery),
    responses(
        (status = 200, description = "Samples, oldest first", body = ListSamplesRes),
        (status = 400, description = "Unknown status filter")
    )
)]
#[axum::debug_handler]
pub async fn list_samples(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ListSamplesRes>, ApiError> {
    authorise(&state, &headers, Privilege::VIEW)?;
    let filter = sample_filter(&query)?;
    let samples = state
        .samples
        .list(filter)
        .iter()
        .map(SampleSummary::from)
        .collect();
    Ok(Json(ListSamplesRes { samples }))
}

#[utoipa::path(
    post,
    path = "/samples",
    request_body = RegisterSampleReq,
    responses(
        (status = 201, description = "Sample registered", body = SampleDetail),
        (status = 400, description = "Bad request"),
        (status = 403, description = "Role cannot create samples"),
        (status = 500, description = "Internal server error")
    )
)]
/// Registers a sample from the analyser order. Every captured cell starts unidentified.
#[axum::debug_handler]
pub async fn register_sample(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterSampleReq>,
) -> Result<(StatusCode, Json<SampleDetail>), ApiError> {
    let caller = authorise(&state, &headers, Privilege::CREATE)?;
    let wbc = WbcConcentration::new(req.wbc).map_err(LabError::from)?;

    let sample = state.samples.register(
        NewSample {
            accession: req.accession,
            cbc: CompleteBloodCount {
                wbc,
                rbc: req.rbc,
                hgb: req.hgb,
                hct: req.hct,
                plt: req.plt,
            },
            instrument: InstrumentType::Cellavision,
            cell_count: req.cell_count,
        },
        &caller.user,
    )?;
    Ok((StatusCode::CREATED, Json(SampleDetail::new(sample, None))))
}

#[utoipa::path(
    get,
    path = "/samples/{id}",
    params(("id" = String, Path, description = "Sample id (32 lowercase hex)")),
    responses(
        (status = 200, description = "Sample detail", body = SampleDetail),
        (status = 404, description = "Sample not found")
    )
)]
#[axum::debug_handler]
pub async fn get_sample(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SampleDetail>, ApiError> {
    authorise(&state, &headers, Privilege::VIEW)?;
    let sample = state.samples.get(&id)?;
    let differential = state.samples.differential(&id)?;
    Ok(Json(SampleDetail::new(sample, differential)))
}

#[utoipa::path(
    put,
    path = "/samples/{id}/cells/{cell}",
    request_body = ClassifyCellReq,
    params(
        ("id" = String, Path, description = "Sample id"),
        ("cell" = usize, Path, description = "Captured cell id")
    ),
    responses(
        (status = 200, description = "Cell reclassified", body = api_shared::CellDto),
        (status = 400, description = "Unknown category"),
        (status = 404, description = "Sample or cell not found"),
        (status = 409, description = "Sample already finalized")
    )
)]
#[axum::debug_handler]
pub async fn classify_cell(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, cell)): Path<(String, usize)>,
    Json(req): Json<ClassifyCellReq>,
) -> Result<Json<api_shared::CellDto>, ApiError> {
    authorise(&state, &headers, Privilege::UPDATE)?;
    let cell = state.samples.classify_cell(&id, cell, &req.category)?;
    Ok(Json(cell.into()))
}

#[utoipa::path(
    post,
    path = "/samples/{id}/findings",
    request_body = FindingReq,
    params(("id" = String, Path, description = "Sample id")),
    responses(
        (status = 200, description = "Finding attached or already attached", body = FindingRes),
        (status = 404, description = "Sample or morphology not found"),
        (status = 409, description = "Sample already finalized")
    )
)]
#[axum::debug_handler]
pub async fn add_finding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<FindingReq>,
) -> Result<Json<FindingRes>, ApiError> {
    authorise(&state, &headers, Privilege::UPDATE)?;
    let change = state
        .samples
        .add_finding(&id, &req.name, req.note.as_deref())?;
    let status = match change {
        FindingChange::Attached => "attached",
        FindingChange::AlreadyAttached => "already attached",
    };
    Ok(Json(FindingRes {
        name: req.name,
        status: status.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/samples/{id}/findings",
    request_body = RemoveFindingReq,
    params(("id" = String, Path, description = "Sample id")),
    responses(
        (status = 200, description = "Finding removed or was not attached", body = FindingRes),
        (status = 409, description = "Sample already finalized")
    )
)]
#[axum::debug_handler]
pub async fn remove_finding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RemoveFindingReq>,
) -> Result<Json<FindingRes>, ApiError> {
    authorise(&state, &headers, Privilege::UPDATE)?;
    let removed = state.samples.remove_finding(&id, &req.name)?;
    Ok(Json(FindingRes {
        name: req.name,
        status: if removed { "removed" } else { "not attached" }.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/samples/{id}/finalize",
    params(("id" = String, Path, description = "Sample id")),
    responses(
        (status = 200, description = "Differential finalized", body = FinalizeRes),
        (status = 404, description = "Sample not found"),
        (status = 409, description = "Sample already finalized"),
        (status = 500, description = "Internal server error")
    )
)]
/// Computes and freezes the differential. A second call for the same sample is rejected.
#[axum::debug_handler]
pub async fn finalize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<FinalizeRes>, ApiError> {
    let caller = authorise(&state, &headers, Privilege::UPDATE)?;
    let outcome = state.samples.finalize(&id, &caller.user)?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    get,
    path = "/samples/{id}/events",
    params(("id" = String, Path, description = "Sample id")),
    responses(
        (status = 200, description = "Order event log", body = EventsRes),
        (status = 403, description = "Admin privilege required"),
        (status = 404, description = "Sample not found")
    )
)]
#[axum::debug_handler]
pub async fn sample_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<EventsRes>, ApiError> {
    authorise(&state, &headers, Privilege::ADMIN)?;
    let events = state
        .samples
        .events(&id)?
        .into_iter()
        .map(EventDto::from)
        .collect();
    Ok(Json(EventsRes { events }))
}

#[utoipa::path(
    get,
    path = "/reviews",
    params(StatusQuery),
    responses(
        (status = 200, description = "Pathologist reviews", body = ListReviewsRes),
        (status = 400, description = "Unknown status filter")
    )
)]
#[axum::debug_handler]
pub async fn list_reviews(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ListReviewsRes>, ApiError> {
    authorise(&state, &headers, Privilege::UPDATE)?;
    let status = review_filter(&query)?;
    let reviews = state
        .reviews
        .list(status)
        .into_iter()
        .map(ReviewDto::from)
        .collect();
    Ok(Json(ListReviewsRes { reviews }))
}

#[utoipa::path(
    post,
    path = "/reviews/{sample_id}/complete",
    request_body = CompleteReviewReq,
    params(("sample_id" = String, Path, description = "Sample id")),
    responses(
        (status = 200, description = "Review completed", body = ReviewDto),
        (status = 400, description = "Empty review text"),
        (status = 404, description = "No review for sample"),
        (status = 409, description = "Review already completed")
    )
)]
#[axum::debug_handler]
pub async fn complete_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sample_id): Path<String>,
    Json(req): Json<CompleteReviewReq>,
) -> Result<Json<ReviewDto>, ApiError> {
    let caller = authorise(&state, &headers, Privilege::UPDATE)?;
    let review = state
        .reviews
        .complete(&sample_id, &req.review, &caller.user)?;
    Ok(Json(review.into()))
}

#[utoipa::path(
    get,
    path = "/morphologies",
    responses(
        (status = 200, description = "Morphology catalogue sorted by name", body = ListMorphologiesRes)
    )
)]
#[axum::debug_handler]
pub async fn list_morphologies(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListMorphologiesRes>, ApiError> {
    authorise(&state, &headers, Privilege::VIEW)?;
    let morphologies = state
        .samples
        .morphologies()
        .list()?
        .into_iter()
        .map(MorphologyDto::from)
        .collect();
    Ok(Json(ListMorphologiesRes { morphologies }))
}

#[utoipa::path(
    post,
    path = "/morphologies",
    request_body = CreateMorphologyReq,
    responses(
        (status = 201, description = "Catalogue entry added", body = MorphologyDto),
        (status = 400, description = "Bad request"),
        (status = 403, description = "Moderate privilege required"),
        (status = 409, description = "Name already in catalogue")
    )
)]
#[axum::debug_handler]
pub async fn create_morphology(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateMorphologyReq>,
) -> Result<(StatusCode, Json<MorphologyDto>), ApiError> {
    let caller = authorise(&state, &headers, Privilege::MODERATE)?;
    let cell_type: CellType = req.cell_type.parse()?;
    let result_options = req
        .result_options
        .iter()
        .map(|option| option.parse::<ResultOption>())
        .collect::<LabResult<Vec<_>>>()?;

    let morphology = state.samples.morphologies().add(
        cell_type,
        &req.name,
        result_options,
        &caller.user,
    )?;
    Ok((StatusCode::CREATED, Json(morphology.into())))
}

#[utoipa::path(
    get,
    path = "/pending",
    responses(
        (status = 200, description = "Open samples and pending reviews", body = PendingRes)
    )
)]
#[axum::debug_handler]
pub async fn pending(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PendingRes>, ApiError> {
    authorise(&state, &headers, Privilege::VIEW)?;
    Ok(Json(state.samples.pending_counts().into()))
}
