//! Compact, serializable per-frame reports for downstream consumers.

use nalgebra::Isometry3;
use serde::Serialize;
use sightline_pipeline::{CalibrationProgress, PipelineResult};
use sightline_pipes::TrackedTarget;

/// Rigid transform as translation (metres) and unit quaternion `[w, x, y, z]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PoseReport {
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
}

impl From<&Isometry3<f64>> for PoseReport {
    fn from(pose: &Isometry3<f64>) -> Self {
        let t = pose.translation.vector;
        let q = pose.rotation.quaternion();
        Self {
            translation: [t.x, t.y, t.z],
            rotation: [q.w, q.i, q.j, q.k],
        }
    }
}

/// Both PnP hypotheses of a target with their reprojection errors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TargetPoseReport {
    pub best: PoseReport,
    pub best_reproj_error: f64,
    pub alt: PoseReport,
    pub alt_reproj_error: f64,
    pub ambiguity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TargetReport {
    pub yaw: f64,
    pub pitch: f64,
    pub area_percent: f64,
    pub skew: f64,
    pub centroid: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corners: Option<[[f64; 2]; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<TargetPoseReport>,
}

impl From<&TrackedTarget> for TargetReport {
    fn from(t: &TrackedTarget) -> Self {
        let pose = t.pose_valid.then(|| TargetPoseReport {
            best: PoseReport::from(&t.best_camera_to_target),
            best_reproj_error: t.best_reproj_error,
            alt: PoseReport::from(&t.alt_camera_to_target),
            alt_reproj_error: t.alt_reproj_error,
            ambiguity: t.ambiguity,
        });
        Self {
            yaw: t.yaw,
            pitch: t.pitch,
            area_percent: t.area_percent,
            skew: t.skew,
            centroid: [t.centroid.x, t.centroid.y],
            corners: t.corners.map(|c| c.map(|p| [p.x, p.y])),
            pose,
        }
    }
}

/// One pipeline run without its images and contours.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameReport {
    pub sequence: u64,
    pub capture_timestamp_nanos: i64,
    pub latency_millis: f64,
    pub targets: Vec<TargetReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationProgress>,
}

impl From<&PipelineResult> for FrameReport {
    fn from(r: &PipelineResult) -> Self {
        Self {
            sequence: r.sequence,
            capture_timestamp_nanos: r.capture_timestamp_nanos,
            latency_millis: r.latency_millis,
            targets: r.targets.iter().map(TargetReport::from).collect(),
            calibration: r.calibration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Translation3, UnitQuaternion};
    use sightline_core::{Contour, PnpResult};
    use sightline_pipes::{Collect2dTargetsPipe, Pipe, PotentialTarget};

    fn target() -> TrackedTarget {
        let square = Contour::new(vec![
            Point2::new(10.0, 10.0),
            Point2::new(30.0, 10.0),
            Point2::new(30.0, 30.0),
            Point2::new(10.0, 30.0),
        ]);
        let mut out = Collect2dTargetsPipe::default()
            .apply(vec![PotentialTarget::from_contour(square)])
            .output;
        out.remove(0)
    }

    #[test]
    fn pose_is_reported_only_when_solved() {
        let bare = TargetReport::from(&target());
        assert!(bare.pose.is_none());
        let json = serde_json::to_value(&bare).expect("json");
        assert!(json.get("pose").is_none());

        let best = Isometry3::from_parts(
            Translation3::new(2.0, 0.5, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.25),
        );
        let solved = target().with_pose(&PnpResult {
            is_present: true,
            best,
            best_reproj_err: 0.4,
            alt: Isometry3::identity(),
            alt_reproj_err: 1.2,
            ambiguity: 0.33,
        });
        let report = TargetReport::from(&solved).pose.expect("pose");
        assert_eq!(report.best.translation, [2.0, 0.5, 0.0]);
        assert_relative_eq!(report.best.rotation[0], (0.125f64).cos(), epsilon = 1e-12);
        assert_relative_eq!(report.best.rotation[3], (0.125f64).sin(), epsilon = 1e-12);
        assert_eq!(report.alt.rotation, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(report.ambiguity, 0.33);
    }

    #[test]
    fn frame_report_carries_run_metadata() {
        let result = PipelineResult {
            sequence: 7,
            capture_timestamp_nanos: 99,
            latency_millis: 1.5,
            targets: vec![target()],
            ..PipelineResult::default()
        };
        let report = FrameReport::from(&result);
        assert_eq!(report.sequence, 7);
        assert_eq!(report.targets.len(), 1);
        assert_relative_eq!(report.targets[0].centroid[0], 20.0, epsilon = 1e-9);
        let json = serde_json::to_string(&report).expect("json");
        assert!(!json.contains("calibration"));
    }
}
