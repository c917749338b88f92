//! Per-pipeline settings: one record per pipeline type behind the
//! [`PipelineSettings`] sum type.
//!
//! Records are flat (numbers, flags, ranges and mode ordinals) so they
//! persist as-is. Everything a configuration interface may change goes
//! through [`PipelineSettings::set_field`], which validates the value before
//! writing it.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use sightline_calib::BoardType;
use sightline_core::TargetModel;
use sightline_pipes::{
    ordinal_enum, ContourGroupingMode, ContourIntersectionDirection, ContourShape, ContourSortMode,
    CornerDetectionStrategy, FrameDivisor, ImageRotationMode, RobotOffsetPointMode,
    TargetOffsetPointEdge, TargetOrientation, ValueRange,
};

use crate::fields::{Field, FieldRegistry, FieldValue, SettingsError};

ordinal_enum! {
    #[derive(Default)]
    pub enum PipelineType {
        #[default]
        Reflective = 0,
        ColoredShape = 1,
        DriverMode = 2,
        Calibration3d = 3,
    }
}

ordinal_enum! {
    /// Physical target used for pose estimation.
    #[derive(Default)]
    pub enum TargetModelKind {
        #[default]
        Apriltag36h11 = 0,
        Apriltag16h5 = 1,
        /// Planar rectangle of `target_width x target_height` metres.
        Rectangle = 2,
    }
}

/// Fields every pipeline type carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseSettings {
    pub nickname: String,
    pub pipeline_index: i32,
    pub rotation: ImageRotationMode,
    pub divisor: FrameDivisor,
    pub smooth_resize: bool,
    pub draw_overlay: bool,
}

impl Default for BaseSettings {
    fn default() -> Self {
        Self {
            nickname: "New Pipeline".to_string(),
            pipeline_index: 0,
            rotation: ImageRotationMode::Deg0,
            divisor: FrameDivisor::None,
            smooth_resize: false,
            draw_overlay: true,
        }
    }
}

/// Thresholding, grouping, sorting and pose fields shared by the
/// target-finding pipelines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetingSettings {
    pub hsv_hue: ValueRange<u8>,
    pub hsv_saturation: ValueRange<u8>,
    pub hsv_value: ValueRange<u8>,
    pub hue_inverted: bool,
    pub erode: bool,
    pub dilate: bool,
    pub morph_radius: u8,
    pub speckle_percent: f64,
    pub contour_grouping: ContourGroupingMode,
    pub contour_intersection: ContourIntersectionDirection,
    pub contour_sort_mode: ContourSortMode,
    pub max_targets: u32,
    pub offset_edge: TargetOffsetPointEdge,
    pub target_orientation: TargetOrientation,
    pub robot_offset_mode: RobotOffsetPointMode,
    pub robot_offset_point: [f64; 2],
    pub robot_offset_first: [f64; 2],
    /// Target area in pixels at which `robot_offset_first` was measured.
    pub robot_offset_first_area: f64,
    pub robot_offset_second: [f64; 2],
    pub robot_offset_second_area: f64,
    pub solve_pnp: bool,
    pub target_model: TargetModelKind,
    /// Metres; only used by [`TargetModelKind::Rectangle`].
    pub target_width: f64,
    pub target_height: f64,
    pub corner_strategy: CornerDetectionStrategy,
    pub corner_use_convex_hull: bool,
    pub corner_accuracy_percentage: f64,
}

impl Default for TargetingSettings {
    fn default() -> Self {
        Self {
            hsv_hue: ValueRange::new(50, 180),
            hsv_saturation: ValueRange::new(50, 255),
            hsv_value: ValueRange::new(50, 255),
            hue_inverted: false,
            erode: false,
            dilate: false,
            morph_radius: 1,
            speckle_percent: 5.0,
            contour_grouping: ContourGroupingMode::Single,
            contour_intersection: ContourIntersectionDirection::Up,
            contour_sort_mode: ContourSortMode::Largest,
            max_targets: 20,
            offset_edge: TargetOffsetPointEdge::Center,
            target_orientation: TargetOrientation::Landscape,
            robot_offset_mode: RobotOffsetPointMode::None,
            robot_offset_point: [0.0, 0.0],
            robot_offset_first: [0.0, 0.0],
            robot_offset_first_area: 0.0,
            robot_offset_second: [0.0, 0.0],
            robot_offset_second_area: 0.0,
            solve_pnp: false,
            target_model: TargetModelKind::Apriltag36h11,
            target_width: 0.5,
            target_height: 0.25,
            corner_strategy: CornerDetectionStrategy::ApproxPolyExtremes,
            corner_use_convex_hull: true,
            corner_accuracy_percentage: 5.0,
        }
    }
}

impl TargetingSettings {
    pub fn model(&self) -> TargetModel {
        match self.target_model {
            TargetModelKind::Apriltag36h11 => TargetModel::apriltag_36h11(),
            TargetModelKind::Apriltag16h5 => TargetModel::apriltag_16h5(),
            TargetModelKind::Rectangle => {
                TargetModel::rectangle("rectangle", self.target_width, self.target_height)
            }
        }
    }
}

/// Retro-reflective tape: threshold, then filter raw contours.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectiveSettings {
    #[serde(flatten)]
    pub base: BaseSettings,
    #[serde(flatten)]
    pub targeting: TargetingSettings,
    pub contour_area: ValueRange<f64>,
    pub contour_ratio: ValueRange<f64>,
    pub contour_fullness: ValueRange<f64>,
}

impl Default for ReflectiveSettings {
    fn default() -> Self {
        Self {
            base: BaseSettings::default(),
            targeting: TargetingSettings::default(),
            contour_area: ValueRange::new(0.0, 100.0),
            contour_ratio: ValueRange::new(0.0, 20.0),
            contour_fullness: ValueRange::new(0.0, 100.0),
        }
    }
}

/// Colored game pieces: threshold, then classify contours into shapes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColoredShapeSettings {
    #[serde(flatten)]
    pub base: BaseSettings,
    #[serde(flatten)]
    pub targeting: TargetingSettings,
    pub desired_shape: ContourShape,
    pub contour_area: ValueRange<f64>,
    pub contour_perimeter: ValueRange<f64>,
    pub accuracy_percentage: f64,
    pub circle_radius: ValueRange<f64>,
    pub circle_edge_threshold: f64,
    pub circle_accuracy: f64,
    pub circle_min_dist: f64,
}

impl Default for ColoredShapeSettings {
    fn default() -> Self {
        Self {
            base: BaseSettings::default(),
            targeting: TargetingSettings::default(),
            desired_shape: ContourShape::Circle,
            contour_area: ValueRange::new(0.0, 100.0),
            contour_perimeter: ValueRange::new(0.0, 1.0e6),
            accuracy_percentage: 10.0,
            circle_radius: ValueRange::new(0.0, 1.0e4),
            circle_edge_threshold: 0.8,
            circle_accuracy: 10.0,
            circle_min_dist: 10.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverModeSettings {
    #[serde(flatten)]
    pub base: BaseSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration3dSettings {
    #[serde(flatten)]
    pub base: BaseSettings,
    pub board_type: BoardType,
    pub board_cols: u32,
    pub board_rows: u32,
    /// Square edge or dot pitch, metres.
    pub square_size: f64,
    pub use_fisheye: bool,
    pub min_snapshots: usize,
}

impl Default for Calibration3dSettings {
    fn default() -> Self {
        Self {
            base: BaseSettings::default(),
            board_type: BoardType::Chessboard,
            board_cols: 8,
            board_rows: 8,
            square_size: 0.0254,
            use_fisheye: false,
            min_snapshots: 12,
        }
    }
}

/// Settings of one pipeline, tagged by pipeline type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pipeline_type")]
pub enum PipelineSettings {
    Reflective(ReflectiveSettings),
    ColoredShape(ColoredShapeSettings),
    DriverMode(DriverModeSettings),
    Calibration3d(Calibration3dSettings),
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings::Reflective(ReflectiveSettings::default())
    }
}

impl PipelineSettings {
    /// Stock settings of `kind`.
    pub fn new(kind: PipelineType, nickname: impl Into<String>, pipeline_index: i32) -> Self {
        let mut settings = match kind {
            PipelineType::Reflective => PipelineSettings::Reflective(Default::default()),
            PipelineType::ColoredShape => PipelineSettings::ColoredShape(Default::default()),
            PipelineType::DriverMode => PipelineSettings::DriverMode(Default::default()),
            PipelineType::Calibration3d => PipelineSettings::Calibration3d(Default::default()),
        };
        let base = settings.base_mut();
        base.nickname = nickname.into();
        base.pipeline_index = pipeline_index;
        settings
    }

    pub fn pipeline_type(&self) -> PipelineType {
        match self {
            PipelineSettings::Reflective(_) => PipelineType::Reflective,
            PipelineSettings::ColoredShape(_) => PipelineType::ColoredShape,
            PipelineSettings::DriverMode(_) => PipelineType::DriverMode,
            PipelineSettings::Calibration3d(_) => PipelineType::Calibration3d,
        }
    }

    pub fn base(&self) -> &BaseSettings {
        match self {
            PipelineSettings::Reflective(s) => &s.base,
            PipelineSettings::ColoredShape(s) => &s.base,
            PipelineSettings::DriverMode(s) => &s.base,
            PipelineSettings::Calibration3d(s) => &s.base,
        }
    }

    pub(crate) fn base_mut(&mut self) -> &mut BaseSettings {
        match self {
            PipelineSettings::Reflective(s) => &mut s.base,
            PipelineSettings::ColoredShape(s) => &mut s.base,
            PipelineSettings::DriverMode(s) => &mut s.base,
            PipelineSettings::Calibration3d(s) => &mut s.base,
        }
    }

    pub fn nickname(&self) -> &str {
        &self.base().nickname
    }

    pub fn pipeline_index(&self) -> i32 {
        self.base().pipeline_index
    }

    /// Validate and write one named field.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SettingsError> {
        match self {
            PipelineSettings::Reflective(s) => s.set_field(name, value),
            PipelineSettings::ColoredShape(s) => s.set_field(name, value),
            PipelineSettings::DriverMode(s) => s.set_field(name, value),
            PipelineSettings::Calibration3d(s) => s.set_field(name, value),
        }
    }

    pub fn get_field(&self, name: &str) -> Result<FieldValue, SettingsError> {
        match self {
            PipelineSettings::Reflective(s) => s.get_field(name),
            PipelineSettings::ColoredShape(s) => s.get_field(name),
            PipelineSettings::DriverMode(s) => s.get_field(name),
            PipelineSettings::Calibration3d(s) => s.get_field(name),
        }
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        fn names<S: FieldRegistry>() -> Vec<&'static str> {
            S::fields().iter().map(Field::name).collect()
        }
        match self {
            PipelineSettings::Reflective(_) => names::<ReflectiveSettings>(),
            PipelineSettings::ColoredShape(_) => names::<ColoredShapeSettings>(),
            PipelineSettings::DriverMode(_) => names::<DriverModeSettings>(),
            PipelineSettings::Calibration3d(_) => names::<Calibration3dSettings>(),
        }
    }

    /// Check every field, e.g. after loading settings from a file.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.nickname().trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "nickname",
                reason: "must not be blank".to_string(),
            });
        }
        match self {
            PipelineSettings::Reflective(s) => s.validate_fields(),
            PipelineSettings::ColoredShape(s) => s.validate_fields(),
            PipelineSettings::DriverMode(s) => s.validate_fields(),
            PipelineSettings::Calibration3d(s) => s.validate_fields(),
        }
    }
}

macro_rules! field {
    ($s:ty, $kind:ident, $name:literal, $($path:ident).+) => {
        Field::<$s>::$kind($name, |s| &s.$($path).+, |s| &mut s.$($path).+)
    };
    ($s:ty, $kind:ident, $name:literal, $bounds:expr, $($path:ident).+) => {
        Field::<$s>::$kind($name, $bounds, |s| &s.$($path).+, |s| &mut s.$($path).+)
    };
}

macro_rules! base_fields {
    ($s:ty) => {
        vec![
            field!($s, ordinal, "rotation", base.rotation),
            field!($s, ordinal, "divisor", base.divisor),
            field!($s, flag, "smooth_resize", base.smooth_resize),
            field!($s, flag, "draw_overlay", base.draw_overlay),
        ]
    };
}

macro_rules! targeting_fields {
    ($s:ty) => {
        vec![
            field!($s, byte_range, "hsv_hue", 0..=180, targeting.hsv_hue),
            field!($s, byte_range, "hsv_saturation", 0..=255, targeting.hsv_saturation),
            field!($s, byte_range, "hsv_value", 0..=255, targeting.hsv_value),
            field!($s, flag, "hue_inverted", targeting.hue_inverted),
            field!($s, flag, "erode", targeting.erode),
            field!($s, flag, "dilate", targeting.dilate),
            field!($s, integer, "morph_radius", 1..=15, targeting.morph_radius),
            field!($s, number, "speckle_percent", 0.0..=100.0, targeting.speckle_percent),
            field!($s, ordinal, "contour_grouping", targeting.contour_grouping),
            field!($s, ordinal, "contour_intersection", targeting.contour_intersection),
            field!($s, ordinal, "contour_sort_mode", targeting.contour_sort_mode),
            field!($s, integer, "max_targets", 1..=100, targeting.max_targets),
            field!($s, ordinal, "offset_edge", targeting.offset_edge),
            field!($s, ordinal, "target_orientation", targeting.target_orientation),
            field!($s, ordinal, "robot_offset_mode", targeting.robot_offset_mode),
            field!($s, point, "robot_offset_point", targeting.robot_offset_point),
            field!($s, point, "robot_offset_first", targeting.robot_offset_first),
            field!(
                $s,
                number,
                "robot_offset_first_area",
                0.0..=1.0e9,
                targeting.robot_offset_first_area
            ),
            field!($s, point, "robot_offset_second", targeting.robot_offset_second),
            field!(
                $s,
                number,
                "robot_offset_second_area",
                0.0..=1.0e9,
                targeting.robot_offset_second_area
            ),
            field!($s, flag, "solve_pnp", targeting.solve_pnp),
            field!($s, ordinal, "target_model", targeting.target_model),
            field!($s, number, "target_width", 0.001..=10.0, targeting.target_width),
            field!($s, number, "target_height", 0.001..=10.0, targeting.target_height),
            field!($s, ordinal, "corner_strategy", targeting.corner_strategy),
            field!($s, flag, "corner_use_convex_hull", targeting.corner_use_convex_hull),
            field!(
                $s,
                number,
                "corner_accuracy_percentage",
                0.1..=100.0,
                targeting.corner_accuracy_percentage
            ),
        ]
    };
}

impl FieldRegistry for ReflectiveSettings {
    const PIPELINE_TYPE: PipelineType = PipelineType::Reflective;

    fn fields() -> &'static [Field<Self>] {
        static FIELDS: OnceLock<Vec<Field<ReflectiveSettings>>> = OnceLock::new();
        FIELDS.get_or_init(|| {
            let mut fields = base_fields!(Self);
            fields.extend(targeting_fields!(Self));
            fields.extend([
                field!(Self, number_range, "contour_area", 0.0..=100.0, contour_area),
                field!(Self, number_range, "contour_ratio", 0.0..=100.0, contour_ratio),
                field!(Self, number_range, "contour_fullness", 0.0..=100.0, contour_fullness),
            ]);
            fields
        })
    }
}

impl FieldRegistry for ColoredShapeSettings {
    const PIPELINE_TYPE: PipelineType = PipelineType::ColoredShape;

    fn fields() -> &'static [Field<Self>] {
        static FIELDS: OnceLock<Vec<Field<ColoredShapeSettings>>> = OnceLock::new();
        FIELDS.get_or_init(|| {
            let mut fields = base_fields!(Self);
            fields.extend(targeting_fields!(Self));
            fields.extend([
                field!(Self, ordinal, "desired_shape", desired_shape),
                field!(Self, number_range, "contour_area", 0.0..=100.0, contour_area),
                field!(Self, number_range, "contour_perimeter", 0.0..=1.0e6, contour_perimeter),
                field!(Self, number, "accuracy_percentage", 0.0..=100.0, accuracy_percentage),
                field!(Self, number_range, "circle_radius", 0.0..=1.0e4, circle_radius),
                field!(Self, number, "circle_edge_threshold", 0.0..=1.0, circle_edge_threshold),
                field!(Self, number, "circle_accuracy", 0.0..=100.0, circle_accuracy),
                field!(Self, number, "circle_min_dist", 0.0..=1.0e4, circle_min_dist),
            ]);
            fields
        })
    }
}

impl FieldRegistry for DriverModeSettings {
    const PIPELINE_TYPE: PipelineType = PipelineType::DriverMode;

    fn fields() -> &'static [Field<Self>] {
        static FIELDS: OnceLock<Vec<Field<DriverModeSettings>>> = OnceLock::new();
        FIELDS.get_or_init(|| base_fields!(Self))
    }
}

impl FieldRegistry for Calibration3dSettings {
    const PIPELINE_TYPE: PipelineType = PipelineType::Calibration3d;

    fn fields() -> &'static [Field<Self>] {
        static FIELDS: OnceLock<Vec<Field<Calibration3dSettings>>> = OnceLock::new();
        FIELDS.get_or_init(|| {
            let mut fields = base_fields!(Self);
            fields.extend([
                field!(Self, ordinal, "board_type", board_type),
                field!(Self, integer, "board_cols", 2..=50, board_cols),
                field!(Self, integer, "board_rows", 2..=50, board_rows),
                field!(Self, number, "square_size", 1.0e-4..=1.0, square_size),
                field!(Self, flag, "use_fisheye", use_fisheye),
                field!(Self, integer, "min_snapshots", 3..=100, min_snapshots),
            ]);
            fields
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_field_validates_before_writing() {
        let mut s = PipelineSettings::new(PipelineType::Reflective, "tape", 0);
        s.set_field("hsv_hue", FieldValue::IntPair([60, 90])).expect("in range");
        assert_eq!(s.get_field("hsv_hue"), Ok(FieldValue::IntPair([60, 90])));

        let before = s.clone();
        assert!(matches!(
            s.set_field("hsv_hue", FieldValue::IntPair([60, 200])),
            Err(SettingsError::OutOfRange { field: "hsv_hue", .. })
        ));
        assert!(matches!(
            s.set_field("hsv_hue", FieldValue::IntPair([90, 60])),
            Err(SettingsError::Unordered { .. })
        ));
        assert!(matches!(
            s.set_field("hsv_hue", FieldValue::Bool(true)),
            Err(SettingsError::WrongType { .. })
        ));
        assert_eq!(s, before);
    }

    #[test]
    fn unknown_field_is_reported_with_pipeline_type() {
        let mut s = PipelineSettings::new(PipelineType::DriverMode, "driver", -1);
        let err = s
            .set_field("hsv_hue", FieldValue::IntPair([0, 10]))
            .expect_err("driver mode has no threshold");
        assert_eq!(
            err,
            SettingsError::NoSuchField {
                pipeline: PipelineType::DriverMode,
                field: "hsv_hue".to_string(),
            }
        );
    }

    #[test]
    fn modes_are_set_by_ordinal() {
        let mut s = PipelineSettings::new(PipelineType::ColoredShape, "ball", 1);
        s.set_field("contour_sort_mode", FieldValue::Int(6)).expect("centermost");
        let PipelineSettings::ColoredShape(c) = &s else {
            panic!("variant changed");
        };
        assert_eq!(c.targeting.contour_sort_mode, ContourSortMode::Centermost);
        assert!(matches!(
            s.set_field("contour_sort_mode", FieldValue::Int(9)),
            Err(SettingsError::Ordinal { .. })
        ));
        assert!(matches!(
            s.set_field("contour_sort_mode", FieldValue::Int(-1)),
            Err(SettingsError::OutOfRange { .. })
        ));
    }

    #[test]
    fn integer_and_number_fields_accept_either_json_form() {
        let mut s = PipelineSettings::new(PipelineType::Calibration3d, "calib", -2);
        s.set_field("square_size", FieldValue::Double(0.03)).expect("double");
        s.set_field("board_cols", FieldValue::Int(9)).expect("int");
        assert!(s.set_field("board_cols", FieldValue::Double(9.0)).is_err());
        assert!(s.set_field("board_rows", FieldValue::Int(1)).is_err());
        assert_eq!(s.get_field("board_cols"), Ok(FieldValue::Int(9)));
    }

    #[test]
    fn every_registered_field_round_trips_its_stock_value() {
        for kind in PipelineType::ALL {
            let s = PipelineSettings::new(*kind, "stock", 0);
            s.validate().expect("stock settings are valid");
            assert!(!s.field_names().is_empty());
        }
    }

    #[test]
    fn persisted_form_is_flat_and_tagged() {
        let s = PipelineSettings::new(PipelineType::Reflective, "tape", 3);
        let json = serde_json::to_value(&s).expect("json");
        assert_eq!(json["pipeline_type"], "Reflective");
        assert_eq!(json["nickname"], "tape");
        assert_eq!(json["contour_sort_mode"], 0);
        assert_eq!(json["hsv_hue"], serde_json::json!([50, 180]));

        let back: PipelineSettings = serde_json::from_value(json).expect("parse");
        assert_eq!(back, s);
    }

    #[test]
    fn missing_fields_take_stock_values() {
        let json = r#"{"pipeline_type":"ColoredShape","nickname":"ball","desired_shape":1}"#;
        let s: PipelineSettings = serde_json::from_str(json).expect("parse");
        assert_eq!(s.pipeline_type(), PipelineType::ColoredShape);
        assert_eq!(s.nickname(), "ball");
        assert_eq!(s.get_field("max_targets"), Ok(FieldValue::Int(20)));
    }

    #[test]
    fn rectangle_model_uses_configured_size() {
        let t = TargetingSettings {
            target_model: TargetModelKind::Rectangle,
            target_width: 0.4,
            target_height: 0.2,
            ..TargetingSettings::default()
        };
        let m = t.model();
        assert!((m.width() - 0.4).abs() < 1e-12);
        assert!((m.height() - 0.2).abs() < 1e-12);
    }
}
