//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{blocking, ApiError};
use super::state::AppState;
use crate::alerts::{format_alert, AlertContext, ReportedCounts};
use crate::detect::{OutbreakAnalyzer, OutbreakVerdict};
use crate::scheduler::run_sweep;
use crate::storage::{alerts, subscribers, sweeps};

const LIST_LIMIT: usize = 100;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/outbreaks", get(list_active))
        .route("/outbreaks/check", get(check_outbreak))
        .route("/outbreaks/daily-check", post(daily_check))
        .route("/outbreaks/stats", get(stats))
        .route("/outbreaks/district/{district}", get(by_district))
        .route("/outbreaks/disease/{disease}", get(by_disease))
        .route("/outbreaks/{id}", get(outbreak_by_id))
        .route("/alerts", get(recent_alerts))
        .route("/sweeps", get(recent_sweeps))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_active(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let reports = state.reports.clone();
    let rows = blocking(move || reports.list_active(LIST_LIMIT)).await?;
    Ok(Json(json!({ "status": "success", "count": rows.len(), "data": rows })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckParams {
    district: Option<String>,
    disease: Option<String>,
    language: Option<String>,
    as_of: Option<DateTime<Utc>>,
}

async fn check_outbreak(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> Result<Json<Value>, ApiError> {
    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let (Some(district), Some(disease)) = (non_empty(params.district), non_empty(params.disease)) else {
        return Err(ApiError::BadRequest("District and disease are required".into()));
    };
    let language = params.language.unwrap_or_else(|| state.default_language.clone());
    let as_of = params.as_of.unwrap_or_else(Utc::now);

    let reports = state.reports.clone();
    let (d, s) = (district.clone(), disease.clone());
    let verdict = blocking(move || OutbreakAnalyzer::new(&reports).analyze(&d, &s, as_of)).await?;

    let assessment = match verdict {
        OutbreakVerdict::Assessed(a) => a,
        OutbreakVerdict::Inconclusive => {
            let reports = state.reports.clone();
            let (d, s) = (district.clone(), disease.clone());
            let db_records = blocking(move || reports.count_for(&d, &s)).await?;
            return Ok(Json(json!({
                "status": "success",
                "message": "Insufficient data for analysis",
                "debug": {
                    "dbRecords": db_records,
                    "reason": "Not enough historical OR current week data"
                }
            })));
        }
    };

    let ctx = AlertContext::new(&district, &disease, assessment.alert_level, &ReportedCounts::from(&assessment));
    let message = format_alert(&ctx, &language);

    Ok(Json(json!({
        "status": "success",
        "data": {
            "district": ctx.district,
            "disease": ctx.disease,
            "alertLevel": assessment.alert_level,
            "averageCases": ctx.average_cases,
            "currentCases": ctx.current_cases,
            "increasePercent": assessment.increase,
            "isOutbreak": assessment.is_outbreak,
            "alertMessage": message,
        }
    })))
}

async fn daily_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let summary = run_sweep(&state.sweep, "api", Utc::now()).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Daily check completed",
        "outbreaksDetected": summary.outbreaks.len(),
        "data": summary,
    })))
}

async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let reports = state.reports.clone();
    let pool = state.pool.clone();
    let (report_stats, total_users) =
        blocking(move || Ok::<_, crate::storage::StoreError>((reports.stats()?, subscribers::count_active(&pool)?)))
            .await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "totalOutbreaks": report_stats.total_active,
            "totalUsers": total_users,
            "byDisease": report_stats.by_disease,
            "byState": report_stats.by_state,
        }
    })))
}

async fn by_district(
    State(state): State<AppState>,
    Path(district): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let reports = state.reports.clone();
    let rows = blocking(move || reports.by_district(&district, LIST_LIMIT)).await?;
    Ok(Json(json!({ "status": "success", "count": rows.len(), "data": rows })))
}

async fn by_disease(
    State(state): State<AppState>,
    Path(disease): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let reports = state.reports.clone();
    let rows = blocking(move || reports.by_disease(&disease, LIST_LIMIT)).await?;
    Ok(Json(json!({ "status": "success", "count": rows.len(), "data": rows })))
}

async fn outbreak_by_id(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let reports = state.reports.clone();
    match blocking(move || reports.get(id)).await? {
        Some(report) => Ok(Json(json!({ "status": "success", "data": report }))),
        None => Err(ApiError::NotFound(format!("Outbreak report {} not found", id))),
    }
}

async fn recent_alerts(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    let rows = blocking(move || alerts::list_recent(&pool, LIST_LIMIT)).await?;
    Ok(Json(json!({ "status": "success", "count": rows.len(), "data": rows })))
}

async fn recent_sweeps(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    let rows = blocking(move || sweeps::list_recent(&pool, 20)).await?;
    Ok(Json(json!({ "status": "success", "count": rows.len(), "data": rows })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogNotifier;
    use crate::api::router;
    use crate::scheduler::SweepContext;
    use crate::storage::open_memory_pool;
    use crate::storage::reports::NewCaseReport;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
    }

    fn state() -> AppState {
        let pool = open_memory_pool().unwrap();
        let sweep = SweepContext {
            pool,
            notifier: Arc::new(LogNotifier),
            diseases: vec!["Dengue".into()],
            language: "hi".into(),
            max_concurrency: 2,
            pair_timeout: std::time::Duration::from_secs(10),
        };
        AppState::new(sweep, "en")
    }

    fn seed(state: &AppState, district: &str, history: &[u32], current: &[u32]) {
        for (i, c) in history.iter().enumerate() {
            insert(state, district, *c, as_of() - Duration::days(20 + i as i64));
        }
        for c in current {
            insert(state, district, *c, as_of() - Duration::days(2));
        }
    }

    fn insert(state: &AppState, district: &str, cases: u32, at: DateTime<Utc>) -> i64 {
        state
            .reports
            .insert(&NewCaseReport {
                state: "Gujarat".into(),
                district: district.into(),
                disease: "Dengue".into(),
                cases_count: cases,
                report_date: at,
                source_url: None,
                alert_text: None,
            })
            .unwrap()
    }

    async fn call(state: AppState, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1_000_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, json) = call(state(), Method::GET, "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_check_requires_params() {
        let (status, json) = call(state(), Method::GET, "/api/v1/outbreaks/check?district=Surat").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "District and disease are required");
    }

    #[tokio::test]
    async fn test_check_insufficient_data() {
        let state = state();
        seed(&state, "Surat", &[4, 4], &[9]);
        let (status, json) = call(
            state,
            Method::GET,
            "/api/v1/outbreaks/check?district=Surat&disease=Dengue&asOf=2026-08-01T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Insufficient data for analysis");
        assert_eq!(json["debug"]["dbRecords"], 3);
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn test_check_reports_outbreak() {
        let state = state();
        seed(&state, "Surat", &[10, 10, 10], &[12]);
        let (status, json) = call(
            state,
            Method::GET,
            "/api/v1/outbreaks/check?district=Surat&disease=Dengue&asOf=2026-08-01T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert_eq!(data["district"], "Surat");
        assert_eq!(data["alertLevel"], "MEDIUM");
        assert_eq!(data["averageCases"], 10);
        assert_eq!(data["currentCases"], 12);
        assert_eq!(data["increasePercent"], 20);
        assert_eq!(data["isOutbreak"], true);
        assert!(data["alertMessage"].as_str().unwrap().contains("CAUTION"));
    }

    #[tokio::test]
    async fn test_check_unknown_language_falls_back() {
        let state = state();
        seed(&state, "Surat", &[10, 10, 10], &[10]);
        let (_, json) = call(
            state,
            Method::GET,
            "/api/v1/outbreaks/check?district=Surat&disease=Dengue&language=xx&asOf=2026-08-01T00:00:00Z",
        )
        .await;
        assert_eq!(json["data"]["alertLevel"], "LOW");
        assert_eq!(json["data"]["alertMessage"], crate::alerts::FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn test_listing_and_lookup() {
        let state = state();
        let id = insert(&state, "Rajkot", 120, as_of());
        insert(&state, "Surat", 3, as_of() - Duration::days(1));

        let (_, json) = call(state.clone(), Method::GET, "/api/v1/outbreaks").await;
        assert_eq!(json["count"], 2);

        let (_, json) = call(state.clone(), Method::GET, "/api/v1/outbreaks/district/Rajkot").await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["alertLevel"], "MEDIUM");

        let (_, json) = call(state.clone(), Method::GET, "/api/v1/outbreaks/disease/Dengue").await;
        assert_eq!(json["count"], 2);

        let (status, json) = call(state.clone(), Method::GET, &format!("/api/v1/outbreaks/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["district"], "Rajkot");

        let (status, json) = call(state, Method::GET, "/api/v1/outbreaks/9999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_stats() {
        let state = state();
        insert(&state, "Rajkot", 120, as_of());
        insert(&state, "Surat", 3, as_of());
        let (_, json) = call(state, Method::GET, "/api/v1/outbreaks/stats").await;
        assert_eq!(json["data"]["totalOutbreaks"], 2);
        assert_eq!(json["data"]["totalUsers"], 0);
        assert_eq!(json["data"]["byDisease"][0]["totalCases"], 123);
    }

    #[tokio::test]
    async fn test_daily_check_records_sweep() {
        let state = state();
        seed(&state, "Surat", &[1, 1, 1], &[1]);
        let (status, json) = call(state.clone(), Method::POST, "/api/v1/outbreaks/daily-check").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Daily check completed");
        assert_eq!(json["data"]["pairsChecked"], 1);

        let (_, json) = call(state, Method::GET, "/api/v1/sweeps").await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["trigger"], "api");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _) = call(state(), Method::GET, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
