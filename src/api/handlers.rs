use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use utoipa::OpenApi;
use uuid::Uuid;

use super::{
    dto::{
        DeletedDto, ExportDto, LocationUploadDto, OutcomeKind, ReadingsQuery, SensorUploadDto, SettingsDto,
        StateChange, UploadReportDto, UploadRequest,
    },
    errors::AppError,
    AppState,
};
use crate::{
    db::models::{
        timestamp_now, HardwareProfile, InputKind, LocationFix, MeasurementKind, Order, PeriodUnit, Position,
        Reading, ReadingFilter, RowId, Sensor, SensorConfig, SensorState, ThresholdRule,
    },
    notify::{Notice, NoticeLevel},
    settings::SettingsUpdate,
    supervisor::CollectionStatus,
};

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// List every configured sensor in creation order.
#[utoipa::path(
    get,
    path = "/sensors",
    responses(
        (status = 200, description = "All sensors", body = Vec<Sensor>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "sensors"
)]
pub async fn list_sensors(State(state): State<AppState>) -> Result<Json<Vec<Sensor>>, AppError> {
    Ok(Json(state.registry.list().await?))
}

#[utoipa::path(
    get,
    path = "/sensors/{id}",
    params(("id" = Uuid, Path, description = "Sensor ID")),
    responses(
        (status = 200, description = "The sensor", body = Sensor),
        (status = 404, description = "Unknown sensor"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Sensor>, AppError> {
    Ok(Json(state.registry.get(id).await?))
}

/// Validate and store a new sensor. Refused while collecting.
#[utoipa::path(
    post,
    path = "/sensors",
    request_body = SensorConfig,
    responses(
        (status = 201, description = "Sensor created", body = Sensor),
        (status = 409, description = "Collection is running"),
        (status = 422, description = "Validation failed"),
    ),
    tag = "sensors"
)]
pub async fn create_sensor(
    State(state): State<AppState>,
    Json(config): Json<SensorConfig>,
) -> Result<(StatusCode, Json<Sensor>), AppError> {
    let registry = state.registry.clone();
    let sensor = state
        .supervisor
        .when_idle(move || async move { registry.create(config).await })
        .await
        .ok_or(AppError::Collecting)??;
    Ok((StatusCode::CREATED, Json(sensor)))
}

/// Replace a sensor's definition. Its readings are kept.
#[utoipa::path(
    put,
    path = "/sensors/{id}",
    params(("id" = Uuid, Path, description = "Sensor ID")),
    request_body = SensorConfig,
    responses(
        (status = 200, description = "Sensor updated", body = Sensor),
        (status = 404, description = "Unknown sensor"),
        (status = 409, description = "Collection is running"),
        (status = 422, description = "Validation failed"),
    ),
    tag = "sensors"
)]
pub async fn update_sensor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(config): Json<SensorConfig>,
) -> Result<Json<Sensor>, AppError> {
    let registry = state.registry.clone();
    let sensor = state
        .supervisor
        .when_idle(move || async move { registry.update(id, config).await })
        .await
        .ok_or(AppError::Collecting)??;
    Ok(Json(sensor))
}

#[utoipa::path(
    put,
    path = "/sensors/{id}/state",
    params(("id" = Uuid, Path, description = "Sensor ID")),
    request_body = StateChange,
    responses(
        (status = 200, description = "State changed", body = Sensor),
        (status = 404, description = "Unknown sensor"),
        (status = 409, description = "Collection is running"),
    ),
    tag = "sensors"
)]
pub async fn set_sensor_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(change): Json<StateChange>,
) -> Result<Json<Sensor>, AppError> {
    let registry = state.registry.clone();
    let sensor = state
        .supervisor
        .when_idle(move || async move { registry.set_state(id, change.state).await })
        .await
        .ok_or(AppError::Collecting)??;
    Ok(Json(sensor))
}

/// Export the sensor's readings to CSV, then delete the sensor and its log.
#[utoipa::path(
    delete,
    path = "/sensors/{id}",
    params(("id" = Uuid, Path, description = "Sensor ID")),
    responses(
        (status = 204, description = "Sensor deleted"),
        (status = 404, description = "Unknown sensor"),
        (status = 409, description = "Collection is running"),
        (status = 500, description = "Export failed; sensor kept"),
    ),
    tag = "sensors"
)]
pub async fn delete_sensor(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    let registry = state.registry.clone();
    state
        .supervisor
        .when_idle(move || async move { registry.delete(id).await })
        .await
        .ok_or(AppError::Collecting)??;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Readings of one sensor, in insertion order unless `order=descending`.
#[utoipa::path(
    get,
    path = "/sensors/{id}/readings",
    params(("id" = Uuid, Path, description = "Sensor ID"), ReadingsQuery),
    responses(
        (status = 200, description = "Readings", body = Vec<Reading>),
        (status = 404, description = "Unknown sensor"),
    ),
    tag = "readings"
)]
pub async fn list_readings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ReadingsQuery>,
) -> Result<Json<Vec<Reading>>, AppError> {
    state.registry.get(id).await?;
    let readings = state
        .store
        .query_readings(id, query.filter.unwrap_or_default(), query.order.unwrap_or_default())
        .await?;
    Ok(Json(readings))
}

/// Export the sensor's readings to CSV, then clear them. Row IDs keep counting.
#[utoipa::path(
    delete,
    path = "/sensors/{id}/readings",
    params(("id" = Uuid, Path, description = "Sensor ID")),
    responses(
        (status = 200, description = "Readings cleared", body = DeletedDto),
        (status = 404, description = "Unknown sensor"),
    ),
    tag = "readings"
)]
pub async fn clear_readings(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<DeletedDto>, AppError> {
    let sensor = state.registry.get(id).await?;
    let readings = state
        .store
        .query_readings(id, ReadingFilter::All, Order::Ascending)
        .await?;
    let path = state.exporter.export_readings(&sensor, &readings).await?;
    state
        .notifier
        .info(format!("Exported {} readings of '{}' to {}", readings.len(), sensor.name, path.display()))
        .await;

    let deleted = match readings.last() {
        Some(last) => state.store.delete_through(id, last.row_id).await?,
        None => 0,
    };
    Ok(Json(DeletedDto { deleted }))
}

#[utoipa::path(
    delete,
    path = "/sensors/{id}/readings/{row_id}",
    params(
        ("id" = Uuid, Path, description = "Sensor ID"),
        ("row_id" = i64, Path, description = "Row ID within the sensor's log"),
    ),
    responses(
        (status = 204, description = "Reading deleted"),
        (status = 404, description = "No such reading"),
    ),
    tag = "readings"
)]
pub async fn delete_reading(
    State(state): State<AppState>,
    Path((id, row_id)): Path<(Uuid, RowId)>,
) -> Result<StatusCode, AppError> {
    if state.store.delete_reading(id, row_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("sensor {id} has no reading {row_id}")))
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/locations",
    params(ReadingsQuery),
    responses((status = 200, description = "Location fixes", body = Vec<LocationFix>)),
    tag = "locations"
)]
pub async fn list_locations(
    State(state): State<AppState>,
    Query(query): Query<ReadingsQuery>,
) -> Result<Json<Vec<LocationFix>>, AppError> {
    let fixes = state
        .store
        .query_locations(query.filter.unwrap_or_default(), query.order.unwrap_or_default())
        .await?;
    Ok(Json(fixes))
}

/// Store a fix from an external positioning source. It also becomes the
/// position reported to the location poller.
#[utoipa::path(
    post,
    path = "/locations",
    request_body = Position,
    responses((status = 201, description = "Fix stored", body = LocationFix)),
    tag = "locations"
)]
pub async fn ingest_location(
    State(state): State<AppState>,
    Json(position): Json<Position>,
) -> Result<(StatusCode, Json<LocationFix>), AppError> {
    let timestamp = timestamp_now();
    let row_id = state.store.append_location(&timestamp, position).await?;
    state.location.set(position);
    Ok((
        StatusCode::CREATED,
        Json(LocationFix {
            row_id,
            timestamp,
            altitude: position.altitude,
            latitude: position.latitude,
            longitude: position.longitude,
            uploaded: false,
        }),
    ))
}

/// Export the location log to CSV, then clear it.
#[utoipa::path(
    delete,
    path = "/locations",
    responses((status = 200, description = "Location log cleared", body = DeletedDto)),
    tag = "locations"
)]
pub async fn clear_locations(State(state): State<AppState>) -> Result<Json<DeletedDto>, AppError> {
    let fixes = state
        .store
        .query_locations(ReadingFilter::All, Order::Ascending)
        .await?;
    let path = state.exporter.export_locations(&fixes).await?;
    state
        .notifier
        .info(format!("Exported {} location fixes to {}", fixes.len(), path.display()))
        .await;

    let deleted = match fixes.last() {
        Some(last) => state.store.delete_locations_through(last.row_id).await?,
        None => 0,
    };
    Ok(Json(DeletedDto { deleted }))
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// Upload pending readings of the given sensors, concurrently.
#[utoipa::path(
    post,
    path = "/uploads/sensors",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "Per-sensor results", body = UploadReportDto),
        (status = 412, description = "API key or feed ID missing"),
        (status = 502, description = "Upload endpoint unreachable"),
    ),
    tag = "uploads"
)]
pub async fn upload_sensors(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadReportDto>, AppError> {
    let report = state.uploader.upload_sensors(&request.sensor_ids).await?;
    Ok(Json(report.into()))
}

/// Upload the most recent location fix.
#[utoipa::path(
    post,
    path = "/uploads/location",
    responses(
        (status = 200, description = "Uploaded, or nothing to upload", body = LocationUploadDto),
        (status = 409, description = "Latest fix already uploaded"),
        (status = 412, description = "API key or feed ID missing"),
        (status = 502, description = "Upload failed"),
    ),
    tag = "uploads"
)]
pub async fn upload_location(State(state): State<AppState>) -> Result<Json<LocationUploadDto>, AppError> {
    let outcome = state.uploader.upload_location().await?;
    Ok(Json(outcome.into()))
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/collection",
    responses((status = 200, description = "Collection status", body = CollectionStatus)),
    tag = "collection"
)]
pub async fn collection_status(State(state): State<AppState>) -> Json<CollectionStatus> {
    Json(state.supervisor.status().await)
}

#[utoipa::path(
    post,
    path = "/collection/start",
    responses((status = 200, description = "Collecting", body = CollectionStatus)),
    tag = "collection"
)]
pub async fn start_collection(State(state): State<AppState>) -> Result<Json<CollectionStatus>, AppError> {
    Ok(Json(state.supervisor.start().await?))
}

#[utoipa::path(
    post,
    path = "/collection/stop",
    responses((status = 200, description = "Stopped", body = CollectionStatus)),
    tag = "collection"
)]
pub async fn stop_collection(State(state): State<AppState>) -> Json<CollectionStatus> {
    Json(state.supervisor.stop().await)
}

// ---------------------------------------------------------------------------
// Settings, notices, export
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/settings",
    responses((status = 200, description = "Operator settings", body = SettingsDto)),
    tag = "settings"
)]
pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsDto> {
    Json(state.settings.snapshot().await.into())
}

/// Change settings. A running collection keeps the values it started with.
#[utoipa::path(
    put,
    path = "/settings",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Updated settings", body = SettingsDto),
        (status = 400, description = "Invalid settings"),
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsDto>, AppError> {
    Ok(Json(state.settings.update(update).await?.into()))
}

/// Recent operator notices, oldest first.
#[utoipa::path(
    get,
    path = "/notices",
    responses((status = 200, description = "Notices", body = Vec<Notice>)),
    tag = "system"
)]
pub async fn list_notices(State(state): State<AppState>) -> Json<Vec<Notice>> {
    Json(state.notifier.recent().await)
}

/// Write every table to CSV files in the export directory.
#[utoipa::path(
    post,
    path = "/export",
    responses(
        (status = 200, description = "Files written", body = ExportDto),
        (status = 500, description = "Export failed"),
    ),
    tag = "system"
)]
pub async fn export_all(State(state): State<AppState>) -> Result<Json<ExportDto>, AppError> {
    let sensors = state.registry.list().await?;
    let paths = state.exporter.export_all(&sensors, &state.store).await?;
    state
        .notifier
        .info(format!("Exported {} files to {}", paths.len(), state.exporter.dir().display()))
        .await;
    Ok(Json(ExportDto {
        files: paths.iter().map(|p| p.display().to_string()).collect(),
    }))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        list_sensors, get_sensor, create_sensor, update_sensor, set_sensor_state, delete_sensor,
        list_readings, clear_readings, delete_reading,
        list_locations, ingest_location, clear_locations,
        upload_sensors, upload_location,
        collection_status, start_collection, stop_collection,
        get_settings, update_settings, list_notices, export_all, health,
    ),
    components(schemas(
        Sensor, SensorConfig, SensorState, PeriodUnit, InputKind, MeasurementKind, ThresholdRule,
        HardwareProfile, Reading, LocationFix, Position, ReadingFilter, Order, StateChange, DeletedDto,
        ExportDto, SettingsDto, SettingsUpdate, UploadRequest, UploadReportDto, SensorUploadDto,
        LocationUploadDto, OutcomeKind, CollectionStatus, Notice, NoticeLevel,
    )),
    tags(
        (name = "sensors",    description = "Sensor configuration"),
        (name = "readings",   description = "Stored readings"),
        (name = "locations",  description = "Location log"),
        (name = "uploads",    description = "Telemetry uploads"),
        (name = "collection", description = "Start and stop sampling"),
        (name = "settings",   description = "Operator settings"),
        (name = "system",     description = "System endpoints"),
    ),
    info(
        title = "Sensor Collector API",
        version = "0.1.0",
        description = "Operator API for periodic sensor sampling and telemetry upload"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
