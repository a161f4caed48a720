// THEORY:
// A single webcam frame can contain several faces (a passer-by, a photo on the
// wall). The report is about one person, so one detection is chosen as
// canonical before formatting: the one with the largest bounding box, on the
// assumption that the subject is the face closest to the camera.
//
// The same bounding box drives the "detection confidence" shown in the report.
// It is a proxy derived from face size, not a calibrated probability: a bigger
// face is easier for the model, so it reads as more trustworthy.

use crate::core_modules::feature_formatter::round1;
use crate::core_modules::normalizer::{ModelMap, ModelValue};

/// Reported when the model returns no bounding box.
pub const DEFAULT_DETECTION_CONFIDENCE: f64 = 85.0;
pub const MIN_DETECTION_CONFIDENCE: f64 = 60.0;
pub const MAX_DETECTION_CONFIDENCE: f64 = 95.0;
/// Face area (px²) that maps to a 100% raw score before clamping.
pub const DETECTION_AREA_SCALE: f64 = 10_000.0;

/// One detected face as returned by the model: feature scores, dominant labels
/// and a `region` bounding box.
pub type RawFace = ModelMap;

/// Bounding-box area of a face's `region`, if it has one. Missing width or
/// height count as zero.
pub fn region_area(face: &RawFace) -> Option<f64> {
    let region = face.get("region")?.as_map()?;
    let side = |key: &str| region.get(key).and_then(ModelValue::as_f64).unwrap_or(0.0);
    Some(side("w") * side("h"))
}

/// Picks the face with the largest bounding box.
///
/// Faces without a region are skipped, ties keep the earlier face, and the
/// first face wins when no region has a positive area. Returns `None` only for
/// an empty slice.
pub fn select_best_face(faces: &[RawFace]) -> Option<&RawFace> {
    if faces.len() <= 1 {
        return faces.first();
    }

    let mut best = &faces[0];
    let mut max_area = 0.0;
    for face in faces {
        if let Some(area) = region_area(face) {
            if area > max_area {
                max_area = area;
                best = face;
            }
        }
    }
    Some(best)
}

/// Maps a bounding-box area onto the `[60, 95]` confidence band.
pub fn confidence_from_area(area: f64) -> f64 {
    round1((area / DETECTION_AREA_SCALE * 100.0).clamp(MIN_DETECTION_CONFIDENCE, MAX_DETECTION_CONFIDENCE))
}

pub fn detection_confidence(face: &RawFace) -> f64 {
    match region_area(face) {
        Some(area) if area.is_finite() => confidence_from_area(area),
        _ => DEFAULT_DETECTION_CONFIDENCE,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn face_with_region(x: i64, y: i64, w: i64, h: i64) -> RawFace {
        let mut region = ModelMap::new();
        region.insert("x".into(), ModelValue::I64(x));
        region.insert("y".into(), ModelValue::I64(y));
        region.insert("w".into(), ModelValue::I64(w));
        region.insert("h".into(), ModelValue::I64(h));
        let mut face = RawFace::new();
        face.insert("region".into(), ModelValue::Map(region));
        face
    }

    #[test]
    fn largest_face_wins() {
        let faces = vec![face_with_region(0, 0, 50, 50), face_with_region(10, 10, 200, 200)];
        assert_eq!(select_best_face(&faces), Some(&faces[1]));
    }

    #[test]
    fn ties_keep_first_seen() {
        let faces = vec![face_with_region(0, 0, 100, 100), face_with_region(5, 5, 100, 100)];
        assert!(std::ptr::eq(select_best_face(&faces).unwrap(), &faces[0]));
    }

    #[test]
    fn faces_without_regions_are_skipped() {
        let faces = vec![RawFace::new(), face_with_region(0, 0, 20, 20), RawFace::new()];
        assert!(std::ptr::eq(select_best_face(&faces).unwrap(), &faces[1]));
    }

    #[test]
    fn zero_area_faces_fall_back_to_first() {
        let faces = vec![face_with_region(0, 0, 0, 10), face_with_region(0, 0, 10, 0)];
        assert!(std::ptr::eq(select_best_face(&faces).unwrap(), &faces[0]));
        assert_eq!(select_best_face(&[]), None);
    }

    #[test]
    fn confidence_is_clamped_to_band() {
        assert_eq!(confidence_from_area(10_000.0), 95.0);
        assert_eq!(confidence_from_area(0.0), 60.0);
        assert_eq!(confidence_from_area(7_000.0), 70.0);
        assert_eq!(confidence_from_area(7_777.0), 77.8);
        assert_eq!(confidence_from_area(7_725.0), 77.2);
    }

    #[test]
    fn confidence_defaults_without_region() {
        assert_eq!(detection_confidence(&RawFace::new()), 85.0);
        assert_eq!(detection_confidence(&face_with_region(0, 0, 100, 100)), 95.0);
    }

    #[test]
    fn missing_side_counts_as_zero() {
        let mut face = face_with_region(0, 0, 80, 80);
        if let Some(ModelValue::Map(region)) = face.get_mut("region") {
            region.shift_remove("h");
        }
        assert_eq!(region_area(&face), Some(0.0));
        assert_eq!(detection_confidence(&face), 60.0);
    }
}
