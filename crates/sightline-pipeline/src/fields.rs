//! Typed field registry behind [`crate::PipelineSettings::set_field`].
//!
//! Every settings record lists its externally settable fields once, each with
//! a getter and a validating setter. A configuration message names a field
//! and carries a [`FieldValue`]; unknown names and out-of-range values are
//! rejected before the record is touched.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use sightline_pipes::{OrdinalError, ValueRange};

use crate::settings::PipelineType;

/// Untyped value carried by a configuration message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    IntPair([i64; 2]),
    DoublePair([f64; 2]),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Double(_) => "double",
            FieldValue::IntPair(_) => "int pair",
            FieldValue::DoublePair(_) => "double pair",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
            FieldValue::IntPair([a, b]) => write!(f, "[{a}, {b}]"),
            FieldValue::DoublePair([a, b]) => write!(f, "[{a}, {b}]"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("{pipeline:?} settings have no field `{field}`")]
    NoSuchField { pipeline: PipelineType, field: String },
    #[error("field `{field}` expects {expected}, got {got}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        got: &'static str,
    },
    #[error("field `{field}`: {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("field `{field}`: minimum {min} exceeds maximum {max}")]
    Unordered { field: &'static str, min: f64, max: f64 },
    #[error("field `{field}`: {source}")]
    Ordinal {
        field: &'static str,
        #[source]
        source: OrdinalError,
    },
    #[error("field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

type Getter<S> = Box<dyn Fn(&S) -> FieldValue + Send + Sync>;
type Setter<S> = Box<dyn Fn(&mut S, FieldValue) -> Result<(), SettingsError> + Send + Sync>;

/// One settable field of settings record `S`.
pub struct Field<S> {
    name: &'static str,
    get: Getter<S>,
    set: Setter<S>,
}

impl<S> fmt::Debug for Field<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

fn check_bounds(field: &'static str, v: f64, bounds: &RangeInclusive<f64>) -> Result<(), SettingsError> {
    if v.is_finite() && bounds.contains(&v) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            value: v,
            min: *bounds.start(),
            max: *bounds.end(),
        })
    }
}

fn wrong_type(field: &'static str, expected: &'static str, got: &FieldValue) -> SettingsError {
    SettingsError::WrongType {
        field,
        expected,
        got: got.kind(),
    }
}

fn as_f64(field: &'static str, v: &FieldValue) -> Result<f64, SettingsError> {
    match *v {
        FieldValue::Double(x) => Ok(x),
        FieldValue::Int(x) => Ok(x as f64),
        _ => Err(wrong_type(field, "double", v)),
    }
}

fn as_f64_pair(field: &'static str, v: &FieldValue) -> Result<[f64; 2], SettingsError> {
    match *v {
        FieldValue::DoublePair(p) => Ok(p),
        FieldValue::IntPair([a, b]) => Ok([a as f64, b as f64]),
        _ => Err(wrong_type(field, "double pair", v)),
    }
}

impl<S: 'static> Field<S> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, settings: &S) -> FieldValue {
        (self.get)(settings)
    }

    /// Validate `value` and write it; `settings` is untouched on error.
    pub fn set(&self, settings: &mut S, value: FieldValue) -> Result<(), SettingsError> {
        (self.set)(settings, value)
    }

    pub fn flag(name: &'static str, get: fn(&S) -> &bool, get_mut: fn(&mut S) -> &mut bool) -> Self {
        Self {
            name,
            get: Box::new(move |s: &S| FieldValue::Bool(*get(s))),
            set: Box::new(move |s: &mut S, v: FieldValue| match v {
                FieldValue::Bool(b) => {
                    *get_mut(s) = b;
                    Ok(())
                }
                other => Err(wrong_type(name, "bool", &other)),
            }),
        }
    }

    pub fn number(
        name: &'static str,
        bounds: RangeInclusive<f64>,
        get: fn(&S) -> &f64,
        get_mut: fn(&mut S) -> &mut f64,
    ) -> Self {
        Self {
            name,
            get: Box::new(move |s: &S| FieldValue::Double(*get(s))),
            set: Box::new(move |s: &mut S, v: FieldValue| {
                let x = as_f64(name, &v)?;
                check_bounds(name, x, &bounds)?;
                *get_mut(s) = x;
                Ok(())
            }),
        }
    }

    /// Integer field of any width; `bounds` must fit in `T`.
    pub fn integer<T>(
        name: &'static str,
        bounds: RangeInclusive<i64>,
        get: fn(&S) -> &T,
        get_mut: fn(&mut S) -> &mut T,
    ) -> Self
    where
        T: Copy + TryFrom<i64> + 'static,
        i64: TryFrom<T>,
    {
        Self {
            name,
            get: Box::new(move |s: &S| FieldValue::Int(i64::try_from(*get(s)).unwrap_or(i64::MAX))),
            set: Box::new(move |s: &mut S, v: FieldValue| {
                let FieldValue::Int(x) = v else {
                    return Err(wrong_type(name, "int", &v));
                };
                if !bounds.contains(&x) {
                    return Err(SettingsError::OutOfRange {
                        field: name,
                        value: x as f64,
                        min: *bounds.start() as f64,
                        max: *bounds.end() as f64,
                    });
                }
                *get_mut(s) = T::try_from(x).map_err(|_| SettingsError::Invalid {
                    field: name,
                    reason: format!("{x} does not fit the field type"),
                })?;
                Ok(())
            }),
        }
    }

    /// Inclusive `u8` range such as an HSV channel band.
    pub fn byte_range(
        name: &'static str,
        bounds: RangeInclusive<u8>,
        get: fn(&S) -> &ValueRange<u8>,
        get_mut: fn(&mut S) -> &mut ValueRange<u8>,
    ) -> Self {
        Self {
            name,
            get: Box::new(move |s: &S| {
                let r = get(s);
                FieldValue::IntPair([r.min as i64, r.max as i64])
            }),
            set: Box::new(move |s: &mut S, v: FieldValue| {
                let FieldValue::IntPair([lo, hi]) = v else {
                    return Err(wrong_type(name, "int pair", &v));
                };
                let (min, max) = (*bounds.start() as i64, *bounds.end() as i64);
                for x in [lo, hi] {
                    if !(min..=max).contains(&x) {
                        return Err(SettingsError::OutOfRange {
                            field: name,
                            value: x as f64,
                            min: min as f64,
                            max: max as f64,
                        });
                    }
                }
                if lo > hi {
                    return Err(SettingsError::Unordered {
                        field: name,
                        min: lo as f64,
                        max: hi as f64,
                    });
                }
                *get_mut(s) = ValueRange::new(lo as u8, hi as u8);
                Ok(())
            }),
        }
    }

    pub fn number_range(
        name: &'static str,
        bounds: RangeInclusive<f64>,
        get: fn(&S) -> &ValueRange<f64>,
        get_mut: fn(&mut S) -> &mut ValueRange<f64>,
    ) -> Self {
        Self {
            name,
            get: Box::new(move |s: &S| {
                let r = get(s);
                FieldValue::DoublePair([r.min, r.max])
            }),
            set: Box::new(move |s: &mut S, v: FieldValue| {
                let [lo, hi] = as_f64_pair(name, &v)?;
                check_bounds(name, lo, &bounds)?;
                check_bounds(name, hi, &bounds)?;
                if lo > hi {
                    return Err(SettingsError::Unordered {
                        field: name,
                        min: lo,
                        max: hi,
                    });
                }
                *get_mut(s) = ValueRange::new(lo, hi);
                Ok(())
            }),
        }
    }

    /// Image-space point stored as `[x, y]`.
    pub fn point(name: &'static str, get: fn(&S) -> &[f64; 2], get_mut: fn(&mut S) -> &mut [f64; 2]) -> Self {
        Self {
            name,
            get: Box::new(move |s: &S| FieldValue::DoublePair(*get(s))),
            set: Box::new(move |s: &mut S, v: FieldValue| {
                let p = as_f64_pair(name, &v)?;
                if p.iter().any(|x| !x.is_finite()) {
                    return Err(SettingsError::Invalid {
                        field: name,
                        reason: "coordinates must be finite".to_string(),
                    });
                }
                *get_mut(s) = p;
                Ok(())
            }),
        }
    }

    /// Mode enum persisted as its ordinal.
    pub fn ordinal<E>(name: &'static str, get: fn(&S) -> &E, get_mut: fn(&mut S) -> &mut E) -> Self
    where
        E: Copy + Into<u8> + TryFrom<u8, Error = OrdinalError> + 'static,
    {
        Self {
            name,
            get: Box::new(move |s: &S| FieldValue::Int(Into::<u8>::into(*get(s)) as i64)),
            set: Box::new(move |s: &mut S, v: FieldValue| {
                let FieldValue::Int(x) = v else {
                    return Err(wrong_type(name, "int", &v));
                };
                let byte = u8::try_from(x).map_err(|_| SettingsError::OutOfRange {
                    field: name,
                    value: x as f64,
                    min: 0.0,
                    max: u8::MAX as f64,
                })?;
                *get_mut(s) = E::try_from(byte).map_err(|source| SettingsError::Ordinal { field: name, source })?;
                Ok(())
            }),
        }
    }
}

/// Settings record with a static field table.
pub trait FieldRegistry: Sized + 'static {
    const PIPELINE_TYPE: PipelineType;

    fn fields() -> &'static [Field<Self>];

    fn field(name: &str) -> Result<&'static Field<Self>, SettingsError> {
        Self::fields()
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| SettingsError::NoSuchField {
                pipeline: Self::PIPELINE_TYPE,
                field: name.to_string(),
            })
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), SettingsError> {
        Self::field(name)?.set(self, value)
    }

    fn get_field(&self, name: &str) -> Result<FieldValue, SettingsError> {
        Ok(Self::field(name)?.get(self))
    }

    /// Re-check every field against its setter, e.g. after loading a file.
    fn validate_fields(&self) -> Result<(), SettingsError>
    where
        Self: Clone,
    {
        let mut scratch = self.clone();
        for f in Self::fields() {
            f.set(&mut scratch, f.get(self))?;
        }
        Ok(())
    }
}
