//! Enumerated stage modes.
//!
//! Every mode persists as its ordinal (`u8`), the flat form settings files
//! use.

/// Unknown ordinal for a mode enum.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{value} is not a valid {type_name} ordinal")]
pub struct OrdinalError {
    pub type_name: &'static str,
    pub value: u8,
}

/// Declare a fieldless enum that serializes as its `u8` ordinal.
#[macro_export]
macro_rules! ordinal_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "u8", into = "u8")]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl From<$name> for u8 {
            fn from(v: $name) -> u8 {
                v as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = $crate::OrdinalError;

            fn try_from(v: u8) -> Result<Self, Self::Error> {
                match v {
                    $($value => Ok($name::$variant),)+
                    _ => Err($crate::OrdinalError {
                        type_name: stringify!($name),
                        value: v,
                    }),
                }
            }
        }
    };
}

ordinal_enum! {
    /// Polygon class of an extracted shape.
    #[derive(Default)]
    pub enum ContourShape {
        /// Any vertex count other than 3 or 4.
        #[default]
        Custom = 0,
        Circle = 1,
        Triangle = 2,
        Quadrilateral = 3,
    }
}

impl ContourShape {
    pub fn from_vertex_count(n: usize) -> Self {
        match n {
            3 => ContourShape::Triangle,
            4 => ContourShape::Quadrilateral,
            _ => ContourShape::Custom,
        }
    }
}

ordinal_enum! {
    #[derive(Default)]
    pub enum ContourSortMode {
        #[default]
        Largest = 0,
        Smallest = 1,
        Highest = 2,
        Lowest = 3,
        Leftmost = 4,
        Rightmost = 5,
        Centermost = 6,
    }
}

ordinal_enum! {
    #[derive(Default)]
    pub enum ContourGroupingMode {
        #[default]
        Single = 0,
        Dual = 1,
    }
}

ordinal_enum! {
    /// Where the major-axis lines of a `Dual` pair must meet.
    #[derive(Default)]
    pub enum ContourIntersectionDirection {
        #[default]
        None = 0,
        Up = 1,
        Down = 2,
        Left = 3,
        Right = 4,
    }
}

ordinal_enum! {
    #[derive(Default)]
    pub enum TargetOffsetPointEdge {
        #[default]
        Center = 0,
        Top = 1,
        Bottom = 2,
        Left = 3,
        Right = 4,
    }
}

ordinal_enum! {
    #[derive(Default)]
    pub enum TargetOrientation {
        Portrait = 0,
        #[default]
        Landscape = 1,
    }
}

ordinal_enum! {
    #[derive(Default)]
    pub enum RobotOffsetPointMode {
        #[default]
        None = 0,
        Single = 1,
        Dual = 2,
    }
}

ordinal_enum! {
    #[derive(Default)]
    pub enum CornerDetectionStrategy {
        ApproxPoly = 0,
        #[default]
        ApproxPolyExtremes = 1,
        ExactSideCount = 2,
    }
}

ordinal_enum! {
    #[derive(Default)]
    pub enum ImageRotationMode {
        #[default]
        Deg0 = 0,
        Deg90 = 1,
        Deg180 = 2,
        Deg270 = 3,
    }
}

impl ImageRotationMode {
    /// Whether the rotation swaps width and height.
    pub fn is_transposing(self) -> bool {
        matches!(self, ImageRotationMode::Deg90 | ImageRotationMode::Deg270)
    }
}

ordinal_enum! {
    #[derive(Default)]
    pub enum FrameDivisor {
        #[default]
        None = 0,
        Half = 1,
        Quarter = 2,
        Sixth = 3,
    }
}

impl FrameDivisor {
    pub fn factor(self) -> u32 {
        match self {
            FrameDivisor::None => 1,
            FrameDivisor::Half => 2,
            FrameDivisor::Quarter => 4,
            FrameDivisor::Sixth => 6,
        }
    }
}
