pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use handlers::ApiDoc;

use crate::{
    export::Exporter,
    location::LatestPosition,
    notify::Notifier,
    sensors::SensorRegistry,
    settings::SettingsHandle,
    store::SampleStore,
    supervisor::CollectionSupervisor,
    upload::{HttpTransport, UploadCoordinator},
};

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub registry: SensorRegistry,
    pub store: SampleStore,
    pub supervisor: CollectionSupervisor<HttpTransport>,
    pub uploader: UploadCoordinator<HttpTransport>,
    pub settings: SettingsHandle,
    pub notifier: Notifier,
    pub exporter: Exporter,
    pub location: LatestPosition,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/sensors", get(handlers::list_sensors).post(handlers::create_sensor))
        .route(
            "/sensors/{id}",
            get(handlers::get_sensor)
                .put(handlers::update_sensor)
                .delete(handlers::delete_sensor),
        )
        .route("/sensors/{id}/state", put(handlers::set_sensor_state))
        .route(
            "/sensors/{id}/readings",
            get(handlers::list_readings).delete(handlers::clear_readings),
        )
        .route("/sensors/{id}/readings/{row_id}", delete(handlers::delete_reading))
        .route(
            "/locations",
            get(handlers::list_locations)
                .post(handlers::ingest_location)
                .delete(handlers::clear_locations),
        )
        .route("/uploads/sensors", post(handlers::upload_sensors))
        .route("/uploads/location", post(handlers::upload_location))
        .route("/collection", get(handlers::collection_status))
        .route("/collection/start", post(handlers::start_collection))
        .route("/collection/stop", post(handlers::stop_collection))
        .route("/settings", get(handlers::get_settings).put(handlers::update_settings))
        .route("/notices", get(handlers::list_notices))
        .route("/export", post(handlers::export_all))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
