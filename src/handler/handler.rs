// SPDX-License-Identifier: GPL-2.0-or-later

use annotator::{priority_color, Annotator};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::{
    geometry::{Point, Rect},
    roi::{Roi, RoiData, PRIORITY_MAX, PRIORITY_MIN},
    time::{DaySecond, TimeOfDay},
    ArcLogger, CameraId, LogEntry, LogLevel, RoiId,
};
use resolve::{resolve, Resolution};
use roidb::{ArcRoiDb, BulkError, BulkOp, RoiDbError, RoiError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub roidb: ArcRoiDb,
    pub annotator: Arc<Annotator>,
    pub logger: ArcLogger,
}

/// All api routes.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/rois", post(roi_create_handler).get(rois_handler))
        .route("/api/rois/bulk", post(roi_bulk_handler))
        .route("/api/rois/active", get(rois_active_handler))
        .route(
            "/api/rois/{id}",
            get(roi_get_handler)
                .put(roi_put_handler)
                .delete(roi_delete_handler),
        )
        .route("/api/detect", post(detect_handler))
        .with_state(state)
}

/// Summary of a stored zone, returned from mutating endpoints.
#[derive(Debug, Serialize)]
pub struct RoiResponse {
    pub roi_id: RoiId,
    pub camera_id: CameraId,
    pub name: String,
    pub polygon_points: usize,
    pub priority: i64,
    pub start_time: String,
    pub end_time: String,
}

impl From<&Roi> for RoiResponse {
    fn from(roi: &Roi) -> Self {
        let render = |t: Option<TimeOfDay>| t.map(|t| t.to_string()).unwrap_or_default();
        Self {
            roi_id: roi.id.clone(),
            camera_id: roi.camera_id.clone(),
            name: roi.name.clone(),
            polygon_points: roi.polygon.len(),
            priority: roi.priority.into(),
            start_time: render(roi.window.start),
            end_time: render(roi.window.end),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    error_code: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    provided_priority: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    valid_range: Option<String>,
}

impl ErrorResponse {
    fn new(err: &RoiError) -> Self {
        let provided_priority = match err {
            RoiError::InvalidPriority(v) => Some(*v),
            _ => None,
        };
        Self {
            error: err.to_string(),
            error_code: err.code(),
            provided_priority,
            valid_range: provided_priority.map(|_| format!("{PRIORITY_MIN}-{PRIORITY_MAX}")),
        }
    }
}

fn roi_error_response(err: &RoiError) -> Response {
    let status = match err {
        RoiError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ErrorResponse::new(err))).into_response()
}

fn db_error_response(state: &ApiState, err: &RoiDbError) -> Response {
    match err {
        RoiDbError::Validation(e) => roi_error_response(e),
        RoiDbError::Persist(e) => {
            state.logger.log(LogEntry::new(
                LogLevel::Error,
                "api",
                &format!("persist rois: {e}"),
            ));
            (StatusCode::INTERNAL_SERVER_ERROR, "error printed to logs").into_response()
        }
    }
}

pub async fn roi_create_handler(
    State(state): State<ApiState>,
    Json(data): Json<RoiData>,
) -> Response {
    match state.roidb.create(data).await {
        Ok(roi) => (StatusCode::CREATED, Json(RoiResponse::from(&roi))).into_response(),
        Err(e) => db_error_response(&state, &e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RoisQuery {
    camera_id: Option<CameraId>,
}

#[derive(Debug, Serialize)]
struct RoisResponse {
    rois: Vec<Roi>,
    count: usize,
}

pub async fn rois_handler(
    State(state): State<ApiState>,
    Query(query): Query<RoisQuery>,
) -> Response {
    let rois = state.roidb.list(query.camera_id.as_ref()).await;
    let count = rois.len();
    Json(RoisResponse { rois, count }).into_response()
}

pub async fn roi_get_handler(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let id = match parse_roi_id(id) {
        Ok(v) => v,
        Err(response) => return response,
    };
    match state.roidb.get(&id).await {
        Some(roi) => Json(roi).into_response(),
        None => roi_error_response(&RoiError::NotFound(id)),
    }
}

pub async fn roi_put_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(data): Json<RoiData>,
) -> Response {
    let id = match parse_roi_id(id) {
        Ok(v) => v,
        Err(response) => return response,
    };
    match state.roidb.update(id, data).await {
        Ok(roi) => Json(RoiResponse::from(&roi)).into_response(),
        Err(e) => db_error_response(&state, &e),
    }
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    roi_id: RoiId,
    camera_id: CameraId,
}

pub async fn roi_delete_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_roi_id(id) {
        Ok(v) => v,
        Err(response) => return response,
    };
    match state.roidb.delete(&id).await {
        Ok(roi) => Json(DeleteResponse {
            roi_id: roi.id,
            camera_id: roi.camera_id,
        })
        .into_response(),
        Err(e) => db_error_response(&state, &e),
    }
}

fn parse_roi_id(id: String) -> Result<RoiId, Response> {
    RoiId::try_from(id).map_err(|e| roi_error_response(&RoiError::InvalidId(e)))
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    operations: Vec<BulkOp>,
}

#[derive(Debug, Serialize)]
struct BulkErrorEntry {
    index: usize,
    error: String,
    error_code: &'static str,
}

#[derive(Debug, Serialize)]
struct BulkErrorResponse {
    error: String,
    error_code: &'static str,
    total_errors: usize,
    validation_errors: Vec<BulkErrorEntry>,
}

pub async fn roi_bulk_handler(
    State(state): State<ApiState>,
    Json(request): Json<BulkRequest>,
) -> Response {
    match state.roidb.bulk(request.operations).await {
        Ok(summary) => Json(summary).into_response(),
        Err(BulkError::Validation(errors)) => {
            let entries: Vec<BulkErrorEntry> = errors
                .iter()
                .map(|e| BulkErrorEntry {
                    index: e.index,
                    error: e.error.to_string(),
                    error_code: e.error.code(),
                })
                .collect();
            (
                StatusCode::BAD_REQUEST,
                Json(BulkErrorResponse {
                    error: "bulk request failed, no operations were applied".to_owned(),
                    error_code: "BULK_VALIDATION_FAILED",
                    total_errors: entries.len(),
                    validation_errors: entries,
                }),
            )
                .into_response()
        }
        Err(BulkError::Persist(e)) => {
            db_error_response(&state, &RoiDbError::Persist(e))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    camera_id: CameraId,

    // Override the clock, mainly for testing. "HH:MM" or "HH:MM:SS".
    time: Option<TimeOfDay>,
}

#[derive(Debug, Serialize)]
struct ActiveRoi {
    roi_id: RoiId,
    name: String,
    priority: i64,
    color: [u8; 3],
}

#[derive(Debug, Serialize)]
struct ActiveResponse {
    camera_id: CameraId,
    rois: Vec<ActiveRoi>,
    count: usize,
}

pub async fn rois_active_handler(
    State(state): State<ApiState>,
    Query(query): Query<ActiveQuery>,
) -> Response {
    let at = query.time.map_or_else(DaySecond::now, Into::into);
    let rois = state.roidb.list(Some(&query.camera_id)).await;
    let active = state
        .annotator
        .cache()
        .active_ids(&query.camera_id, &rois, at);

    let active: Vec<ActiveRoi> = rois
        .iter()
        .filter(|roi| active.contains(&roi.id))
        .map(|roi| ActiveRoi {
            roi_id: roi.id.clone(),
            name: roi.name.clone(),
            priority: roi.priority.into(),
            color: priority_color(roi.priority).0,
        })
        .collect();

    let count = active.len();
    Json(ActiveResponse {
        camera_id: query.camera_id,
        rois: active,
        count,
    })
    .into_response()
}

/// A detection event to resolve against the stored zones.
///
/// Either an explicit point or a bounding box must be provided. A box
/// is reduced to its center.
#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    camera_id: CameraId,
    point: Option<Point>,
    bbox: Option<Rect>,

    // Override the clock, mainly for testing.
    time: Option<TimeOfDay>,
}

#[derive(Debug, Serialize)]
struct DetectResponse {
    camera_id: CameraId,

    #[serde(flatten)]
    resolution: Resolution,
}

pub async fn detect_handler(
    State(state): State<ApiState>,
    Json(request): Json<DetectRequest>,
) -> Response {
    let Some(point) = request.point.or_else(|| request.bbox.map(|b| b.centroid())) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "either point or bbox is required".to_owned(),
                error_code: "MISSING_POINT",
                provided_priority: None,
                valid_range: None,
            }),
        )
            .into_response();
    };
    let at = request.time.map_or_else(DaySecond::now, Into::into);

    let rois = state.roidb.list(Some(&request.camera_id)).await;
    let resolution = resolve(&rois, point, at);

    if let Some(winner) = &resolution.winner {
        state.logger.log(LogEntry {
            level: LogLevel::Info,
            source: "detect".parse().expect("valid"),
            camera_id: Some(request.camera_id.clone()),
            message: format!(
                "detection in roi '{}' priority {}",
                winner.roi_id, winner.priority
            ),
        });
    }

    Json(DetectResponse {
        camera_id: request.camera_id,
        resolution,
    })
    .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use common::DummyLogger;
    use pretty_assertions::assert_eq;
    use roidb::RoiDb;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    async fn new_state(temp_dir: &TempDir) -> ApiState {
        let logger = DummyLogger::new();
        ApiState {
            roidb: Arc::new(RoiDb::new(temp_dir.path()).await.unwrap()),
            annotator: Arc::new(Annotator::new(logger.clone())),
            logger,
        }
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn data(id: &str, priority: i64) -> RoiData {
        RoiData {
            id: id.to_owned(),
            camera_id: "cam1".to_owned(),
            name: "Zone".to_owned(),
            polygon: vec![
                Point { x: 0.0, y: 0.0 },
                Point { x: 10.0, y: 0.0 },
                Point { x: 10.0, y: 10.0 },
                Point { x: 0.0, y: 10.0 },
            ],
            enabled: true,
            priority,
            start_time: String::new(),
            end_time: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create() {
        let temp_dir = TempDir::new().unwrap();
        let state = new_state(&temp_dir).await;

        let response =
            roi_create_handler(State(state.clone()), Json(data("zone1", 3))).await;
        assert_eq!(StatusCode::CREATED, response.status());

        let got = body_json(response).await;
        assert_eq!(
            json!({
                "roi_id": "zone1",
                "camera_id": "cam1",
                "name": "Zone",
                "polygon_points": 4,
                "priority": 3,
                "start_time": "",
                "end_time": "",
            }),
            got
        );
    }

    #[test_case::test_case(0)]
    #[test_case::test_case(6)]
    #[tokio::test]
    async fn test_create_invalid_priority(priority: i64) {
        let temp_dir = TempDir::new().unwrap();
        let state = new_state(&temp_dir).await;

        let response =
            roi_create_handler(State(state.clone()), Json(data("zone1", priority))).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());

        let got = body_json(response).await;
        assert_eq!("INVALID_PRIORITY", got["error_code"]);
        assert_eq!(json!(priority), got["provided_priority"]);
        assert_eq!("1-5", got["valid_range"]);
    }

    #[tokio::test]
    async fn test_list() {
        let temp_dir = TempDir::new().unwrap();
        let state = new_state(&temp_dir).await;

        state.roidb.create(data("a", 1)).await.unwrap();
        state.roidb.create(data("b", 5)).await.unwrap();

        let response = rois_handler(
            State(state.clone()),
            Query(RoisQuery { camera_id: None }),
        )
        .await;
        assert_eq!(StatusCode::OK, response.status());

        let got = body_json(response).await;
        assert_eq!(json!(2), got["count"]);
        assert_eq!("b", got["rois"][0]["id"]);

        let response = rois_handler(
            State(state),
            Query(RoisQuery {
                camera_id: Some("other".parse().unwrap()),
            }),
        )
        .await;
        let got = body_json(response).await;
        assert_eq!(json!(0), got["count"]);
    }

    #[tokio::test]
    async fn test_get_put_delete() {
        let temp_dir = TempDir::new().unwrap();
        let state = new_state(&temp_dir).await;
        state.roidb.create(data("zone1", 3)).await.unwrap();

        let response =
            roi_get_handler(State(state.clone()), Path("zone1".to_owned())).await;
        assert_eq!(StatusCode::OK, response.status());

        let response =
            roi_get_handler(State(state.clone()), Path("missing".to_owned())).await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());
        let got = body_json(response).await;
        assert_eq!("ROI_NOT_FOUND", got["error_code"]);

        let response = roi_put_handler(
            State(state.clone()),
            Path("zone1".to_owned()),
            Json(data("ignored", 5)),
        )
        .await;
        assert_eq!(StatusCode::OK, response.status());
        let got = body_json(response).await;
        assert_eq!("zone1", got["roi_id"]);
        assert_eq!(json!(5), got["priority"]);

        let response =
            roi_delete_handler(State(state.clone()), Path("zone1".to_owned())).await;
        assert_eq!(StatusCode::OK, response.status());
        let got = body_json(response).await;
        assert_eq!(json!({"roi_id": "zone1", "camera_id": "cam1"}), got);

        let response = roi_delete_handler(State(state), Path("zone1".to_owned())).await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());
    }

    #[tokio::test]
    async fn test_bulk() {
        let temp_dir = TempDir::new().unwrap();
        let state = new_state(&temp_dir).await;

        let request: BulkRequest = serde_json::from_value(json!({
            "operations": [
                {"operation": "create", "id": "a", "camera_id": "cam1", "priority": 1,
                 "polygon": [{"x":0.0,"y":0.0},{"x":1.0,"y":0.0},{"x":0.0,"y":1.0}]},
                {"operation": "create", "id": "b", "camera_id": "cam1", "priority": 2,
                 "polygon": [{"x":0.0,"y":0.0},{"x":1.0,"y":0.0},{"x":0.0,"y":1.0}]},
            ]
        }))
        .unwrap();
        let response = roi_bulk_handler(State(state.clone()), Json(request)).await;
        assert_eq!(StatusCode::OK, response.status());
        let got = body_json(response).await;
        assert_eq!(json!(2), got["created"]);
        assert_eq!(json!(2), got["operations_executed"]);

        let request: BulkRequest = serde_json::from_value(json!({
            "operations": [
                {"operation": "delete", "id": "a"},
                {"operation": "delete", "id": "missing"},
            ]
        }))
        .unwrap();
        let response = roi_bulk_handler(State(state.clone()), Json(request)).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        let got = body_json(response).await;
        assert_eq!("BULK_VALIDATION_FAILED", got["error_code"]);
        assert_eq!(json!(1), got["total_errors"]);
        assert_eq!(json!(1), got["validation_errors"][0]["index"]);

        // The failed batch must not have deleted 'a'.
        assert!(state.roidb.get(&"a".parse().unwrap()).await.is_some());
    }

    #[tokio::test]
    async fn test_active() {
        let temp_dir = TempDir::new().unwrap();
        let state = new_state(&temp_dir).await;

        let mut night = data("night", 4);
        night.start_time = "22:00".to_owned();
        night.end_time = "06:00".to_owned();
        state.roidb.create(night).await.unwrap();
        state.roidb.create(data("allday", 2)).await.unwrap();

        let response = rois_active_handler(
            State(state),
            Query(ActiveQuery {
                camera_id: "cam1".parse().unwrap(),
                time: Some("12:00".parse().unwrap()),
            }),
        )
        .await;
        assert_eq!(StatusCode::OK, response.status());
        let got = body_json(response).await;
        assert_eq!(json!(1), got["count"]);
        assert_eq!("allday", got["rois"][0]["roi_id"]);
        assert_eq!(json!([255, 255, 0]), got["rois"][0]["color"]);
    }

    #[tokio::test]
    async fn test_detect() {
        let temp_dir = TempDir::new().unwrap();
        let state = new_state(&temp_dir).await;
        state.roidb.create(data("zone1", 3)).await.unwrap();

        let request: DetectRequest = serde_json::from_value(json!({
            "camera_id": "cam1",
            "bbox": {"x": 2.0, "y": 2.0, "width": 4.0, "height": 4.0},
            "time": "12:00",
        }))
        .unwrap();
        let response = detect_handler(State(state.clone()), Json(request)).await;
        assert_eq!(StatusCode::OK, response.status());
        let got = body_json(response).await;
        assert_eq!("zone1", got["winner"]["roi_id"]);
        assert_eq!(json!(["zone1"]), got["candidates"]);

        // Outside every zone.
        let request: DetectRequest = serde_json::from_value(json!({
            "camera_id": "cam1",
            "point": {"x": 99.0, "y": 99.0},
            "time": "12:00",
        }))
        .unwrap();
        let response = detect_handler(State(state.clone()), Json(request)).await;
        let got = body_json(response).await;
        assert_eq!(Value::Null, got["winner"]);

        // Neither point nor bbox.
        let request: DetectRequest = serde_json::from_value(json!({
            "camera_id": "cam1",
        }))
        .unwrap();
        let response = detect_handler(State(state), Json(request)).await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        let got = body_json(response).await;
        assert_eq!("MISSING_POINT", got["error_code"]);
    }
}
