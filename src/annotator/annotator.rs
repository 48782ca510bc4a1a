// SPDX-License-Identifier: GPL-2.0-or-later

pub mod font;

use common::{
    roi::{Priority, Roi},
    time::DaySecond,
    ArcLogger, CameraId, LogEntry, LogLevel, RoiId,
};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use std::{collections::HashMap, sync::Mutex};

/// Raw RGB24 frame. Width*height*3 bytes, rows top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Overlay color for a priority level, green through red.
#[must_use]
pub fn priority_color(priority: Priority) -> Rgb<u8> {
    match priority.as_u8() {
        1 => Rgb([0, 255, 0]),
        2 => Rgb([255, 255, 0]),
        3 => Rgb([255, 165, 0]),
        4 => Rgb([255, 100, 0]),
        _ => Rgb([255, 0, 0]),
    }
}

struct CacheEntry {
    at: DaySecond,
    ids: Vec<RoiId>,
}

/// Per-camera cache of which zones are active.
///
/// Window activation only changes at second granularity, so the set is
/// recomputed at most once per second per camera instead of on every
/// frame.
#[derive(Default)]
pub struct ActiveSetCache(Mutex<HashMap<CameraId, CacheEntry>>);

impl ActiveSetCache {
    /// Ids of zones that are enabled and whose window is active at `at`.
    pub fn active_ids(&self, camera_id: &CameraId, rois: &[Roi], at: DaySecond) -> Vec<RoiId> {
        let mut cache = self.0.lock().expect("poisoned");
        if let Some(entry) = cache.get(camera_id) {
            if entry.at == at {
                return entry.ids.clone();
            }
        }

        let ids: Vec<RoiId> = rois
            .iter()
            .filter(|roi| roi.enabled && roi.window.is_active(at))
            .map(|roi| roi.id.clone())
            .collect();
        cache.insert(
            camera_id.clone(),
            CacheEntry {
                at,
                ids: ids.clone(),
            },
        );
        ids
    }
}

/// Draws zone overlays onto camera frames.
pub struct Annotator {
    logger: ArcLogger,
    cache: ActiveSetCache,
}

impl Annotator {
    #[must_use]
    pub fn new(logger: ArcLogger) -> Self {
        Self {
            logger,
            cache: ActiveSetCache::default(),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ActiveSetCache {
        &self.cache
    }

    /// Draws every active zone of `camera_id` onto the frame.
    ///
    /// Each zone is outlined in its priority color with a label showing
    /// name, priority and window. A record that cannot be drawn is
    /// skipped and logged, a bad zone must never take down the video
    /// path.
    pub fn draw_overlay(
        &self,
        frame: &mut RgbFrame,
        camera_id: &CameraId,
        rois: &[Roi],
        at: DaySecond,
    ) {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.data.len() != expected {
            self.logger.log(LogEntry {
                level: LogLevel::Error,
                source: "overlay".parse().expect("valid"),
                camera_id: Some(camera_id.clone()),
                message: format!(
                    "frame buffer does not match {}x{}",
                    frame.width, frame.height
                ),
            });
            return;
        }
        let Some(mut img) = RgbImage::from_raw(
            frame.width,
            frame.height,
            std::mem::take(&mut frame.data),
        ) else {
            return;
        };

        let active = self.cache.active_ids(camera_id, rois, at);
        for roi in rois {
            if !active.contains(&roi.id) {
                continue;
            }
            if roi.polygon.len() < 3 {
                self.logger.log(LogEntry {
                    level: LogLevel::Warning,
                    source: "overlay".parse().expect("valid"),
                    camera_id: Some(camera_id.clone()),
                    message: format!("skipping roi '{}': malformed polygon", roi.id),
                });
                continue;
            }
            draw_roi(&mut img, roi);
        }

        frame.data = img.into_raw();
    }
}

fn draw_roi(img: &mut RgbImage, roi: &Roi) {
    let color = priority_color(roi.priority);

    // Closed outline, 2px thick.
    let n = roi.polygon.len();
    for i in 0..n {
        let a = roi.polygon[i];
        let b = roi.polygon[(i + 1) % n];
        #[allow(clippy::cast_possible_truncation)]
        let (a, b) = (
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
        );
        draw_line_segment_mut(img, a, b, color);
        draw_line_segment_mut(img, (a.0, a.1 + 1.0), (b.0, b.1 + 1.0), color);
    }

    let label = label(roi);
    #[allow(clippy::cast_possible_truncation)]
    let (x, y) = (
        roi.polygon[0].x as i64 + 4,
        roi.polygon[0].y as i64 + 4,
    );
    font::draw_text(img, &label, x, y, 1, color);
}

fn label(roi: &Roi) -> String {
    let mut label = if roi.name.is_empty() {
        roi.id.to_string()
    } else {
        roi.name.clone()
    };
    label.push_str(&format!(" P{}", roi.priority));
    if let (Some(start), Some(end)) = (roi.window.start, roi.window.end) {
        label.push_str(&format!(" {start}-{end}"));
    }
    label
}
