use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, OriginalUri, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use log::{error, warn};
use persons_core::{
    CallContext, Person, PersonId, PersonListQuery, PersonProperties, StoreResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult, Operation},
    state::{AppState, SharedService},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub offset: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PersonsPage {
    pub persons: Vec<Person>,
    pub count: usize,
}

pub async fn liveness() -> &'static str {
    "live"
}

pub async fn readiness(State(state): State<AppState>) -> ApiResult<&'static str> {
    run_store(&state, |service, ctx| service.health_check(ctx))
        .await?
        .map_err(|err| {
            warn!("event=readiness module=server status=error error={err}");
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        })?;
    Ok("ready")
}

pub async fn list_persons(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<PersonsPage>> {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            warn!("event=list_params module=server status=ignored error={rejection}");
            ListParams::default()
        }
    };
    let query = list_query(&params);

    let persons = run_store(&state, move |service, ctx| service.list_persons(ctx, &query))
        .await?
        .map_err(|err| ApiError::from_store(err, Operation::Other))?;

    Ok(Json(PersonsPage {
        count: persons.len(),
        persons,
    }))
}

pub async fn create_person(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    payload: Result<Json<PersonProperties>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(properties) = payload.map_err(|rejection| {
        error!("event=create_person module=server status=rejected error={rejection}");
        ApiError::invalid_person(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;

    let person = run_store(&state, move |service, ctx| {
        service.create_person(ctx, &properties)
    })
    .await?
    .map_err(|err| ApiError::from_store(err, Operation::Create))?;

    let location = format!("{}/{}", uri.path().trim_end_matches('/'), person.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)]).into_response())
}

pub async fn get_person(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Person>> {
    let id = parse_person_id(&raw_id)?;

    run_store(&state, move |service, ctx| service.get_person(ctx, id))
        .await?
        .map_err(|err| ApiError::from_store(err, Operation::Other))?
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

pub async fn patch_person(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<PersonProperties>, JsonRejection>,
) -> ApiResult<Json<Person>> {
    let id = parse_person_id(&raw_id)?;
    let Json(patch) = payload.map_err(|rejection| {
        error!("event=patch_person module=server status=rejected id={id} error={rejection}");
        ApiError::invalid_person(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
    })?;
    let target = Person::new(id, patch);

    run_store(&state, move |service, ctx| service.update_person(ctx, &target))
        .await?
        .map_err(|err| ApiError::from_store(err, Operation::Update))?
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

pub async fn delete_person(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_person_id(&raw_id)?;

    let deleted = run_store(&state, move |service, ctx| service.delete_person(ctx, id))
        .await?
        .map_err(|err| ApiError::from_store(err, Operation::Other))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found())
    }
}

/// Runs a store call on the blocking pool under the request deadline.
///
/// The call's context is cancelled when the returned future is dropped, so
/// a client disconnect stops the store work at its next checkpoint.
async fn run_store<T, F>(state: &AppState, call: F) -> ApiResult<StoreResult<T>>
where
    T: Send + 'static,
    F: FnOnce(&SharedService, &CallContext) -> StoreResult<T> + Send + 'static,
{
    let ctx = CallContext::with_timeout(state.request_timeout);
    let _cancel = ctx.cancel_on_drop();
    let service = Arc::clone(&state.service);

    tokio::task::spawn_blocking(move || call(&service, &ctx))
        .await
        .map_err(|err| {
            error!("event=store_task module=server status=error error={err}");
            ApiError::internal(format!("store task failed: {err}"))
        })
}

fn parse_person_id(raw: &str) -> ApiResult<PersonId> {
    raw.parse::<PersonId>().map_err(|_| ApiError::invalid_id())
}

fn list_query(params: &ListParams) -> PersonListQuery {
    let offset = match params.offset.as_deref().map(str::parse::<u64>) {
        Some(Ok(offset)) => offset,
        _ => {
            warn!("event=list_params module=server status=defaulted offset=0");
            0
        }
    };
    let limit = match params.limit.as_deref().map(str::parse::<u64>) {
        Some(Ok(limit)) => Some(limit),
        _ => {
            warn!("event=list_params module=server status=defaulted limit=unbounded");
            None
        }
    };
    PersonListQuery::new(offset, limit)
}
