// SPDX-License-Identifier: GPL-2.0-or-later

pub mod bulk;

use common::{
    roi::{ParsePriorityError, Priority, Roi, RoiData, PRIORITY_MAX, PRIORITY_MIN},
    time::{ParseTimeOfDayError, TimeOfDay, TimeWindow, UnixMicro},
    write_file_atomic, CameraId, ParseCameraIdError, ParseRoiIdError, RoiId,
    WriteFileAtomicError,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::sync::RwLock;

pub use bulk::{BulkError, BulkOp, BulkOpError, BulkSummary, DeleteOp};

pub type ArcRoiDb = Arc<RoiDb>;

type Rois = HashMap<RoiId, Roi>;

/// Store of zone records, backed by a single json file.
///
/// Reads only take the read lock and may run in parallel. Every mutation
/// takes the write lock and holds it until the file is safely on disk, so
/// a reader never observes state that could be lost on crash.
pub struct RoiDb {
    file_path: PathBuf,
    temp_file_path: PathBuf,

    rois: RwLock<Rois>,
}

/// A reason a zone payload was rejected. Each variant maps to a stable
/// machine-readable code for api clients.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoiError {
    #[error("invalid roi id: {0}")]
    InvalidId(ParseRoiIdError),

    #[error("camera_id is required")]
    MissingCameraId,

    #[error("invalid camera id: {0}")]
    InvalidCameraId(ParseCameraIdError),

    #[error("polygon must have at least 3 points, got {0}")]
    InvalidPolygon(usize),

    #[error("priority must be between {PRIORITY_MIN} and {PRIORITY_MAX}, got {0}")]
    InvalidPriority(i64),

    #[error("invalid time format: {0}")]
    InvalidTimeFormat(ParseTimeOfDayError),

    #[error("roi '{0}' already exists")]
    DuplicateId(RoiId),

    #[error("roi '{0}' not found")]
    NotFound(RoiId),
}

impl RoiError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        use RoiError::*;
        match self {
            InvalidId(_) => "INVALID_ROI_ID",
            MissingCameraId => "MISSING_CAMERA_ID",
            InvalidCameraId(_) => "INVALID_CAMERA_ID",
            InvalidPolygon(_) => "INVALID_POLYGON",
            InvalidPriority(_) => "INVALID_PRIORITY",
            InvalidTimeFormat(_) => "INVALID_TIME_FORMAT",
            DuplicateId(_) => "DUPLICATE_ROI_ID",
            NotFound(_) => "ROI_NOT_FOUND",
        }
    }
}

#[derive(Debug, Error)]
pub enum RoiDbError {
    #[error(transparent)]
    Validation(#[from] RoiError),

    #[error("persist: {0}")]
    Persist(#[from] WriteFileAtomicError),
}

#[derive(Debug, Error)]
pub enum CreateRoiDbError {
    #[error("read file: {0}")]
    ReadFile(std::io::Error),

    #[error("deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl RoiDb {
    pub async fn new(storage_dir: &Path) -> Result<Self, CreateRoiDbError> {
        use CreateRoiDbError::*;
        let file_path = storage_dir.join("rois.json");
        let temp_file_path = storage_dir.join("rois.json.tmp");
        let rois = {
            if file_path.exists() {
                let json = tokio::fs::read(&file_path).await.map_err(ReadFile)?;
                tokio::task::spawn_blocking(move || serde_json::from_slice(&json))
                    .await
                    .expect("join")?
            } else {
                HashMap::new()
            }
        };

        Ok(Self {
            file_path,
            temp_file_path,
            rois: RwLock::new(rois),
        })
    }

    /// Validates and inserts a new zone.
    pub async fn create(&self, data: RoiData) -> Result<Roi, RoiDbError> {
        let mut rois = self.rois.write().await;

        let roi = validate(&data, UnixMicro::now())?;
        if rois.contains_key(&roi.id) {
            return Err(RoiError::DuplicateId(roi.id).into());
        }

        let mut staged = rois.clone();
        staged.insert(roi.id.clone(), roi.clone());
        self.persist(&staged).await?;

        *rois = staged;
        Ok(roi)
    }

    /// Replaces the zone with `id`. The id in the path is authoritative,
    /// any id in the payload is ignored.
    pub async fn update(&self, id: RoiId, data: RoiData) -> Result<Roi, RoiDbError> {
        let mut rois = self.rois.write().await;

        let Some(old) = rois.get(&id) else {
            return Err(RoiError::NotFound(id).into());
        };
        let mut data = data;
        data.id = id.to_string();

        let mut roi = validate(&data, UnixMicro::now())?;
        roi.created_at = old.created_at;

        let mut staged = rois.clone();
        staged.insert(roi.id.clone(), roi.clone());
        self.persist(&staged).await?;

        *rois = staged;
        Ok(roi)
    }

    /// Removes the zone with `id` and returns it.
    pub async fn delete(&self, id: &RoiId) -> Result<Roi, RoiDbError> {
        let mut rois = self.rois.write().await;

        let mut staged = rois.clone();
        let Some(roi) = staged.remove(id) else {
            return Err(RoiError::NotFound(id.clone()).into());
        };
        self.persist(&staged).await?;

        *rois = staged;
        Ok(roi)
    }

    pub async fn get(&self, id: &RoiId) -> Option<Roi> {
        self.rois.read().await.get(id).cloned()
    }

    /// Lists zones, optionally filtered by camera, ordered by descending
    /// priority and then by id.
    pub async fn list(&self, camera_id: Option<&CameraId>) -> Vec<Roi> {
        let rois = self.rois.read().await;
        let mut list: Vec<Roi> = rois
            .values()
            .filter(|roi| camera_id.map_or(true, |c| roi.camera_id == *c))
            .cloned()
            .collect();
        list.sort_unstable_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    // Caller must hold the write lock.
    async fn persist(&self, rois: &Rois) -> Result<(), WriteFileAtomicError> {
        let rois = rois.clone();
        let json = tokio::task::spawn_blocking(move || {
            serde_json::to_vec_pretty(&rois).expect("should be infallible")
        })
        .await
        .expect("join");

        write_file_atomic(self.file_path.clone(), self.temp_file_path.clone(), json).await
    }
}

// Checks every field of a raw payload and assembles the record.
fn validate(data: &RoiData, now: UnixMicro) -> Result<Roi, RoiError> {
    use RoiError::*;
    let id = RoiId::try_from(data.id.clone()).map_err(InvalidId)?;
    let camera_id = match CameraId::try_from(data.camera_id.clone()) {
        Ok(v) => v,
        Err(ParseCameraIdError::Empty) => return Err(MissingCameraId),
        Err(e) => return Err(InvalidCameraId(e)),
    };
    if data.polygon.len() < 3 {
        return Err(InvalidPolygon(data.polygon.len()));
    }
    let priority = Priority::try_from(data.priority)
        .map_err(|ParsePriorityError::OutOfRange(v)| InvalidPriority(v))?;
    let window = TimeWindow::new(
        parse_time(&data.start_time)?,
        parse_time(&data.end_time)?,
    );

    Ok(Roi {
        id,
        camera_id,
        name: data.name.clone(),
        polygon: data.polygon.clone(),
        enabled: data.enabled,
        priority,
        window,
        created_at: now,
        updated_at: now,
    })
}

fn parse_time(s: &str) -> Result<Option<TimeOfDay>, RoiError> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse().map(Some).map_err(RoiError::InvalidTimeFormat)
}
