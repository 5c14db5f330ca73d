//! HTTP surface over the prediction engine, recommendation rules and store.

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::analytics::{overview, performance_trends, summarize, PredictionSummary};
use crate::data::{
    read_profiles, read_roster, write_predictions, write_profiles, BatchPrediction, RosterEntry,
};
use crate::error::EngineError;
use crate::features::StudentFeatures;
use crate::model::{PerformanceCategory, PredictionEngine, PredictionResult};
use crate::profiles::{
    NewAttendanceRecord, NewPerformanceRecord, NewStudent, ProfileQuery, ProfileStore,
    ProfileUpdate, RegistryError, DEFAULT_RECORD_LIMIT,
};
use crate::recommendations::{generate, Priority};
use crate::store::{PredictionRecord, PredictionStore};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) | ApiError::Registry(RegistryError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Registry(RegistryError::Duplicate(_)) => StatusCode::CONFLICT,
            ApiError::Engine(e) | ApiError::Registry(RegistryError::Engine(e))
                if e.is_client_error() =>
            {
                StatusCode::BAD_REQUEST
            }
            ApiError::Engine(_) | ApiError::Registry(RegistryError::Engine(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            log::error!("Request failed: {}", self);
            "Failed to generate prediction".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(json!({
            "error": message,
            "status": status.as_u16(),
        }))
    }
}

type ApiResult = Result<HttpResponse, ApiError>;

/// Number of roster rows left out of a CSV batch because of invalid input.
pub const SKIPPED_ROWS_HEADER: &str = "X-Skipped-Rows";

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(flatten)]
    pub features: StudentFeatures,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub student_id: Option<String>,
    #[serde(flatten)]
    pub result: PredictionResult,
    pub model_version: String,
    pub strategy: &'static str,
    pub prediction_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BatchError {
    pub student_id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub total_students: usize,
    pub predictions: Vec<BatchPrediction>,
    pub summary: PredictionSummary,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    strategy: &'static str,
    model_version: String,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub performance_category: PerformanceCategory,
    pub predicted_score: f64,
}

#[derive(Debug, Deserialize)]
pub struct PriorityFilter {
    pub priority: Option<Priority>,
}

#[derive(Debug, Deserialize)]
pub struct StudentIds {
    #[serde(default)]
    pub student_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordLimit {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn record(engine: &PredictionEngine, student_id: &str, result: &PredictionResult) -> PredictionRecord {
    PredictionRecord {
        student_id: student_id.to_string(),
        result: result.clone(),
        model_version: engine.model_version().to_string(),
        prediction_date: Utc::now(),
    }
}

/// Predicts every entry and stores the successes. Invalid input is reported
/// per student; any other failure aborts the whole batch.
fn predict_roster(
    engine: &PredictionEngine,
    store: &PredictionStore,
    entries: Vec<RosterEntry>,
) -> Result<(Vec<BatchPrediction>, Vec<BatchError>), EngineError> {
    let mut predictions = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();

    for entry in entries {
        match engine.predict(&entry.features) {
            Ok(result) => {
                store.save_prediction(record(engine, &entry.student_id, &result));
                predictions.push(BatchPrediction {
                    student_id: entry.student_id,
                    result,
                });
            }
            Err(e) if e.is_client_error() => {
                log::warn!("Skipping {}: {}", entry.student_id, e);
                errors.push(BatchError {
                    student_id: entry.student_id,
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok((predictions, errors))
}

fn prediction_response(
    engine: &PredictionEngine,
    student_id: Option<String>,
    result: PredictionResult,
) -> HttpResponse {
    HttpResponse::Ok().json(PredictResponse {
        student_id,
        result,
        model_version: engine.model_version().to_string(),
        strategy: engine.strategy_name(),
        prediction_date: Utc::now(),
    })
}

async fn predict(
    req: web::Json<PredictRequest>,
    engine: web::Data<PredictionEngine>,
    store: web::Data<PredictionStore>,
) -> ApiResult {
    let PredictRequest { student_id, features } = req.into_inner();
    let result = engine.predict(&features)?;

    if let Some(id) = &student_id {
        store.save_prediction(record(&engine, id, &result));
    }

    Ok(prediction_response(&engine, student_id, result))
}

async fn batch_predict(
    web::Json(students): web::Json<Vec<RosterEntry>>,
    engine: web::Data<PredictionEngine>,
    store: web::Data<PredictionStore>,
) -> ApiResult {
    let (predictions, errors) = predict_roster(&engine, &store, students)?;
    let results: Vec<PredictionResult> = predictions.iter().map(|p| p.result.clone()).collect();

    Ok(HttpResponse::Ok().json(BatchResult {
        total_students: predictions.len(),
        summary: summarize(&results),
        predictions,
        errors,
    }))
}

async fn batch_predict_csv(
    body: web::Bytes,
    engine: web::Data<PredictionEngine>,
    store: web::Data<PredictionStore>,
) -> ApiResult {
    let entries = read_roster(&body[..])?;
    let (predictions, errors) = predict_roster(&engine, &store, entries)?;

    let mut csv = Vec::new();
    write_predictions(&mut csv, &predictions)?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header(("Content-Disposition", "attachment; filename=predictions.csv"))
        .insert_header((SKIPPED_ROWS_HEADER, errors.len().to_string()))
        .body(csv))
}

async fn predict_stored_student(
    path: web::Path<String>,
    engine: web::Data<PredictionEngine>,
    profiles: web::Data<ProfileStore>,
    store: web::Data<PredictionStore>,
) -> ApiResult {
    let student_id = path.into_inner();
    let result = profiles.predict_for_student(&engine, &student_id)?;
    store.save_prediction(record(&engine, &student_id, &result));
    Ok(prediction_response(&engine, Some(student_id), result))
}

/// Predicts stored students by id. Unknown ids are reported with the
/// invalid ones under `errors`.
async fn predict_stored_batch(
    req: web::Json<StudentIds>,
    engine: web::Data<PredictionEngine>,
    profiles: web::Data<ProfileStore>,
    store: web::Data<PredictionStore>,
) -> ApiResult {
    if req.student_ids.is_empty() {
        return Err(EngineError::invalid("student_ids", "no student IDs provided").into());
    }

    let mut entries = Vec::with_capacity(req.student_ids.len());
    let mut missing = Vec::new();
    for student_id in &req.student_ids {
        match profiles.get(student_id) {
            Some(profile) => entries.push(RosterEntry {
                student_id: profile.student_id,
                features: profile.features,
            }),
            None => missing.push(BatchError {
                student_id: student_id.clone(),
                error: RegistryError::NotFound(student_id.clone()).to_string(),
            }),
        }
    }

    let (predictions, mut errors) = predict_roster(&engine, &store, entries)?;
    errors.extend(missing);
    let results: Vec<PredictionResult> = predictions.iter().map(|p| p.result.clone()).collect();

    Ok(HttpResponse::Ok().json(BatchResult {
        total_students: predictions.len(),
        summary: summarize(&results),
        predictions,
        errors,
    }))
}

async fn list_students(
    query: web::Query<ProfileQuery>,
    profiles: web::Data<ProfileStore>,
) -> HttpResponse {
    HttpResponse::Ok().json(profiles.list(&query))
}

async fn create_student(
    req: web::Json<NewStudent>,
    profiles: web::Data<ProfileStore>,
) -> ApiResult {
    let profile = profiles.create(req.into_inner())?;
    log::info!("Created student {}", profile.student_id);
    Ok(HttpResponse::Created().json(profile))
}

async fn get_student(path: web::Path<String>, profiles: web::Data<ProfileStore>) -> ApiResult {
    let student_id = path.into_inner();
    let profile = profiles
        .get(&student_id)
        .ok_or(RegistryError::NotFound(student_id))?;
    Ok(HttpResponse::Ok().json(profile))
}

async fn update_student(
    path: web::Path<String>,
    req: web::Json<ProfileUpdate>,
    profiles: web::Data<ProfileStore>,
) -> ApiResult {
    let profile = profiles.update(&path, req.into_inner())?;
    Ok(HttpResponse::Ok().json(profile))
}

async fn delete_student(
    path: web::Path<String>,
    profiles: web::Data<ProfileStore>,
    store: web::Data<PredictionStore>,
) -> ApiResult {
    let student_id = path.into_inner();
    if !profiles.delete(&student_id) {
        return Err(RegistryError::NotFound(student_id).into());
    }
    store.forget_student(&student_id);
    log::info!("Deleted student {}", student_id);
    Ok(HttpResponse::NoContent().finish())
}

async fn add_performance_record(
    path: web::Path<String>,
    req: web::Json<NewPerformanceRecord>,
    profiles: web::Data<ProfileStore>,
) -> ApiResult {
    let record = profiles.add_performance_record(&path, req.into_inner())?;
    Ok(HttpResponse::Created().json(record))
}

async fn list_performance_records(
    path: web::Path<String>,
    query: web::Query<RecordLimit>,
    profiles: web::Data<ProfileStore>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(DEFAULT_RECORD_LIMIT);
    Ok(HttpResponse::Ok().json(profiles.performance_records(&path, limit)?))
}

async fn performance_summary(
    path: web::Path<String>,
    profiles: web::Data<ProfileStore>,
) -> ApiResult {
    Ok(HttpResponse::Ok().json(profiles.performance_summary(&path)?))
}

async fn add_attendance_record(
    path: web::Path<String>,
    req: web::Json<NewAttendanceRecord>,
    profiles: web::Data<ProfileStore>,
) -> ApiResult {
    let record = profiles.add_attendance_record(&path, req.into_inner())?;
    Ok(HttpResponse::Created().json(record))
}

async fn list_attendance_records(
    path: web::Path<String>,
    range: web::Query<DateRange>,
    profiles: web::Data<ProfileStore>,
) -> ApiResult {
    Ok(HttpResponse::Ok().json(profiles.attendance_records(&path, range.from, range.to)?))
}

async fn import_profiles(body: web::Bytes, profiles: web::Data<ProfileStore>) -> ApiResult {
    let students = read_profiles(&body[..])?;
    let report = profiles.import(students);
    log::info!("Imported {} students", report.imported_count);
    Ok(HttpResponse::Ok().json(report))
}

async fn export_profiles(profiles: web::Data<ProfileStore>) -> ApiResult {
    let mut csv = Vec::new();
    write_profiles(&mut csv, &profiles.all())?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header(("Content-Disposition", "attachment; filename=students_export.csv"))
        .body(csv))
}

async fn get_profile_overview(profiles: web::Data<ProfileStore>) -> HttpResponse {
    let features: Vec<StudentFeatures> = profiles.all().into_iter().map(|p| p.features).collect();
    HttpResponse::Ok().json(overview(&features))
}

async fn get_performance_trends(profiles: web::Data<ProfileStore>) -> HttpResponse {
    let features: Vec<StudentFeatures> = profiles.all().into_iter().map(|p| p.features).collect();
    HttpResponse::Ok().json(performance_trends(&features))
}

async fn recommend(req: web::Json<RecommendationRequest>) -> ApiResult {
    if !req.predicted_score.is_finite() {
        return Err(EngineError::invalid("predicted_score", "value is not a finite number").into());
    }
    Ok(HttpResponse::Ok().json(generate(req.performance_category, req.predicted_score)))
}

async fn get_student_prediction(
    path: web::Path<String>,
    store: web::Data<PredictionStore>,
) -> ApiResult {
    let student_id = path.into_inner();
    let latest = store
        .latest_prediction(&student_id)
        .ok_or_else(|| ApiError::NotFound(format!("No prediction for student {}", student_id)))?;
    Ok(HttpResponse::Ok().json(latest))
}

async fn generate_student_recommendations(
    path: web::Path<String>,
    store: web::Data<PredictionStore>,
) -> ApiResult {
    let student_id = path.into_inner();
    let latest = store
        .latest_prediction(&student_id)
        .ok_or_else(|| ApiError::NotFound(format!("No prediction for student {}", student_id)))?;

    let recommendations = generate(
        latest.result.performance_category,
        latest.result.predicted_score,
    );
    let saved = store.save_recommendations(&student_id, recommendations);
    log::info!("Stored {} recommendations for {}", saved.len(), student_id);

    Ok(HttpResponse::Created().json(saved))
}

async fn list_student_recommendations(
    path: web::Path<String>,
    filter: web::Query<PriorityFilter>,
    store: web::Data<PredictionStore>,
) -> HttpResponse {
    HttpResponse::Ok().json(store.recommendations(&path, filter.priority))
}

async fn recommendation_progress(
    path: web::Path<String>,
    store: web::Data<PredictionStore>,
) -> HttpResponse {
    HttpResponse::Ok().json(store.recommendation_progress(&path))
}

async fn complete_recommendation(
    path: web::Path<u64>,
    store: web::Data<PredictionStore>,
) -> ApiResult {
    let id = path.into_inner();
    if store.complete_recommendation(id) {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::NotFound(format!("No recommendation with id {}", id)))
    }
}

async fn get_analytics(store: web::Data<PredictionStore>) -> HttpResponse {
    let results: Vec<PredictionResult> = store
        .latest_predictions()
        .into_iter()
        .map(|record| record.result)
        .collect();
    HttpResponse::Ok().json(summarize(&results))
}

async fn get_model_info(engine: web::Data<PredictionEngine>) -> HttpResponse {
    HttpResponse::Ok().json(ModelInfo {
        strategy: engine.strategy_name(),
        model_version: engine.model_version().to_string(),
    })
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("Student Predictor API is running!")
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/model/info", web::get().to(get_model_info))
        .route("/predict", web::post().to(predict))
        .route("/predict/batch", web::post().to(batch_predict))
        .route("/predict/batch/csv", web::post().to(batch_predict_csv))
        .route("/recommendations", web::post().to(recommend))
        .route("/recommendations/{id}/complete", web::post().to(complete_recommendation))
        .route("/predictions/batch", web::post().to(predict_stored_batch))
        .route("/predictions/{id}", web::get().to(predict_stored_student))
        .service(
            web::resource("/students")
                .route(web::get().to(list_students))
                .route(web::post().to(create_student)),
        )
        .service(
            web::resource("/students/{id}")
                .route(web::get().to(get_student))
                .route(web::put().to(update_student))
                .route(web::delete().to(delete_student)),
        )
        .service(
            web::resource("/students/{id}/performance")
                .route(web::post().to(add_performance_record))
                .route(web::get().to(list_performance_records)),
        )
        .route(
            "/students/{id}/performance/summary",
            web::get().to(performance_summary),
        )
        .service(
            web::resource("/students/{id}/attendance")
                .route(web::post().to(add_attendance_record))
                .route(web::get().to(list_attendance_records)),
        )
        .route("/students/{id}/prediction", web::get().to(get_student_prediction))
        .service(
            web::resource("/students/{id}/recommendations")
                .route(web::post().to(generate_student_recommendations))
                .route(web::get().to(list_student_recommendations)),
        )
        .route(
            "/students/{id}/recommendations/progress",
            web::get().to(recommendation_progress),
        )
        .route("/analytics", web::get().to(get_analytics))
        .route("/analytics/overview", web::get().to(get_profile_overview))
        .route("/analytics/performance-trends", web::get().to(get_performance_trends))
        .route("/data/import", web::post().to(import_profiles))
        .route("/data/export", web::get().to(export_profiles));
}
