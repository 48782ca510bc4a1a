// SPDX-License-Identifier: GPL-2.0-or-later

use crate::{validate, RoiError};
use common::{roi::RoiData, time::UnixMicro, RoiId, WriteFileAtomicError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single operation inside a bulk request. Operations are applied in
/// order, so a later operation can reference a zone created by an
/// earlier one in the same batch.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum BulkOp {
    Create(RoiData),
    Update(RoiData),
    Delete(DeleteOp),
}

#[derive(Clone, Debug, Deserialize)]
pub struct DeleteOp {
    pub id: String,
}

/// Counts of a committed batch.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub operations_executed: usize,
}

/// A failed operation paired with its position in the batch.
#[derive(Debug, PartialEq, Eq)]
pub struct BulkOpError {
    pub index: usize,
    pub error: RoiError,
}

#[derive(Debug, Error)]
pub enum BulkError {
    /// At least one operation failed. Nothing was applied.
    #[error("{} operation(s) failed validation", .0.len())]
    Validation(Vec<BulkOpError>),

    #[error("persist: {0}")]
    Persist(#[from] WriteFileAtomicError),
}

impl crate::RoiDb {
    /// Applies a batch of operations atomically.
    ///
    /// All operations are staged against a copy of the store. Every
    /// failing operation is collected rather than aborting at the first,
    /// so the client sees the full error list. The copy only replaces
    /// the live state after all operations succeeded and the file is on
    /// disk. A batch with any failure changes nothing.
    pub async fn bulk(&self, ops: Vec<BulkOp>) -> Result<BulkSummary, BulkError> {
        let mut rois = self.rois.write().await;
        let now = UnixMicro::now();

        let mut staged = rois.clone();
        let mut summary = BulkSummary::default();
        let mut errors = Vec::new();

        for (index, op) in ops.into_iter().enumerate() {
            let result = match op {
                BulkOp::Create(data) => apply_create(&mut staged, &data, now)
                    .map(|()| summary.created += 1),
                BulkOp::Update(data) => apply_update(&mut staged, &data, now)
                    .map(|()| summary.updated += 1),
                BulkOp::Delete(op) => {
                    apply_delete(&mut staged, &op.id).map(|()| summary.deleted += 1)
                }
            };
            match result {
                Ok(()) => summary.operations_executed += 1,
                Err(error) => errors.push(BulkOpError { index, error }),
            }
        }

        if !errors.is_empty() {
            return Err(BulkError::Validation(errors));
        }

        self.persist(&staged).await?;

        *rois = staged;
        Ok(summary)
    }
}

fn apply_create(
    staged: &mut crate::Rois,
    data: &RoiData,
    now: UnixMicro,
) -> Result<(), RoiError> {
    let roi = validate(data, now)?;
    if staged.contains_key(&roi.id) {
        return Err(RoiError::DuplicateId(roi.id));
    }
    staged.insert(roi.id.clone(), roi);
    Ok(())
}

fn apply_update(
    staged: &mut crate::Rois,
    data: &RoiData,
    now: UnixMicro,
) -> Result<(), RoiError> {
    let mut roi = validate(data, now)?;
    let Some(old) = staged.get(&roi.id) else {
        return Err(RoiError::NotFound(roi.id));
    };
    roi.created_at = old.created_at;
    staged.insert(roi.id.clone(), roi);
    Ok(())
}

fn apply_delete(staged: &mut crate::Rois, id: &str) -> Result<(), RoiError> {
    let id = RoiId::try_from(id.to_owned()).map_err(RoiError::InvalidId)?;
    if staged.remove(&id).is_none() {
        return Err(RoiError::NotFound(id));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        tests::{data, triangle},
        RoiDb,
    };
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_bulk_commit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = RoiDb::new(temp_dir.path()).await.unwrap();
        db.create(data("old", 1)).await.unwrap();

        let mut renamed = data("old", 5);
        renamed.name = "Renamed".to_owned();

        let summary = db
            .bulk(vec![
                BulkOp::Create(data("new1", 2)),
                BulkOp::Update(renamed),
                BulkOp::Create(data("new2", 4)),
                BulkOp::Delete(DeleteOp {
                    id: "new2".to_owned(),
                }),
            ])
            .await
            .unwrap();

        assert_eq!(
            BulkSummary {
                created: 2,
                updated: 1,
                deleted: 1,
                operations_executed: 4,
            },
            summary
        );

        assert!(db.get(&"new1".parse().unwrap()).await.is_some());
        assert!(db.get(&"new2".parse().unwrap()).await.is_none());
        let old = db.get(&"old".parse().unwrap()).await.unwrap();
        assert_eq!("Renamed", old.name);

        // The committed batch survives a restart.
        drop(db);
        let db = RoiDb::new(temp_dir.path()).await.unwrap();
        assert_eq!(2, db.list(None).await.len());
    }

    #[tokio::test]
    async fn test_bulk_atomic_rollback() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = RoiDb::new(temp_dir.path()).await.unwrap();

        let err = db
            .bulk(vec![
                BulkOp::Create(data("good1", 2)),
                BulkOp::Create(data("bad", 9)),
                BulkOp::Delete(DeleteOp {
                    id: "missing".to_owned(),
                }),
                BulkOp::Create(data("good2", 3)),
            ])
            .await
            .unwrap_err();

        // All failures are reported, not just the first.
        let BulkError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            vec![
                BulkOpError {
                    index: 1,
                    error: RoiError::InvalidPriority(9),
                },
                BulkOpError {
                    index: 2,
                    error: RoiError::NotFound("missing".parse().unwrap()),
                },
            ],
            errors
        );

        // Nothing was applied, including the valid operations.
        assert!(db.list(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_sequential_visibility() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = RoiDb::new(temp_dir.path()).await.unwrap();

        // An update may target a zone created earlier in the same batch.
        let mut updated = data("zone1", 5);
        updated.name = "Updated".to_owned();
        db.bulk(vec![
            BulkOp::Create(data("zone1", 1)),
            BulkOp::Update(updated),
        ])
        .await
        .unwrap();

        let roi = db.get(&"zone1".parse().unwrap()).await.unwrap();
        assert_eq!("Updated", roi.name);
        assert_eq!(5, roi.priority.as_u8());

        // Creating the same id twice in one batch is a duplicate.
        let err = db
            .bulk(vec![
                BulkOp::Create(data("dup", 1)),
                BulkOp::Create(data("dup", 2)),
            ])
            .await
            .unwrap_err();
        let BulkError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(1, errors[0].index);
        assert_eq!("DUPLICATE_ROI_ID", errors[0].error.code());
    }

    #[tokio::test]
    async fn test_bulk_op_deserialize() {
        let json = r#"{
            "operation": "create",
            "id": "zone1",
            "camera_id": "cam1",
            "polygon": [
                {"x": 0.0, "y": 0.0},
                {"x": 10.0, "y": 0.0},
                {"x": 5.0, "y": 10.0}
            ],
            "priority": 3
        }"#;
        let BulkOp::Create(data) = serde_json::from_str(json).unwrap() else {
            panic!("expected create");
        };
        assert_eq!("zone1", data.id);
        assert_eq!(triangle(), data.polygon);

        let json = r#"{"operation": "delete", "id": "zone1"}"#;
        let BulkOp::Delete(op) = serde_json::from_str(json).unwrap() else {
            panic!("expected delete");
        };
        assert_eq!("zone1", op.id);
    }
}
