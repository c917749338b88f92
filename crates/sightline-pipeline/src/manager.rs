//! Named, ordered pipeline settings of one camera.

use std::collections::HashMap;

use log::{debug, info};

use crate::fields::{FieldValue, SettingsError};
use crate::settings::{PipelineSettings, PipelineType};

/// Index of the built-in driver mode pipeline.
pub const DRIVER_MODE_INDEX: i32 = -1;
/// Index of the built-in calibration pipeline.
pub const CALIBRATION_INDEX: i32 = -2;

const DEFAULT_NICKNAME: &str = "New Pipeline";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ManagerError {
    #[error("no pipeline at index {0}")]
    NoSuchPipeline(i32),
    #[error("the last user pipeline cannot be deleted")]
    LastPipeline,
    #[error("built-in pipelines cannot be renamed, duplicated or deleted")]
    BuiltIn,
    #[error("pipeline names must not be blank")]
    BlankName,
    #[error("a pipeline named {0:?} already exists")]
    NameTaken(String),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Strip a trailing `" (n)"` from a nickname.
fn base_name(nickname: &str) -> &str {
    if let Some(open) = nickname.rfind(" (") {
        let rest = &nickname[open + 2..];
        if let Some(digits) = rest.strip_suffix(')') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return &nickname[..open];
            }
        }
    }
    nickname
}

/// Owns a camera's user pipelines plus the driver mode and calibration
/// pipelines, and the selection between them.
///
/// User pipelines are indexed `0..n` in list order; the built-ins use
/// [`DRIVER_MODE_INDEX`] and [`CALIBRATION_INDEX`].
#[derive(Clone, Debug)]
pub struct PipelineManager {
    user: Vec<PipelineSettings>,
    driver_mode: PipelineSettings,
    calibration: PipelineSettings,
    current: i32,
    /// User pipeline to return to when leaving driver mode.
    last_user: i32,
    /// Highest `" (n)"` suffix issued per base name.
    suffix_counters: HashMap<String, u32>,
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PipelineManager {
    /// Manager over `user` pipelines; a stock reflective pipeline is added
    /// when the list is empty. Indices are reassigned in list order.
    pub fn new(user: Vec<PipelineSettings>) -> Self {
        let mut manager = Self {
            user,
            driver_mode: PipelineSettings::new(PipelineType::DriverMode, "Driver Mode", DRIVER_MODE_INDEX),
            calibration: PipelineSettings::new(
                PipelineType::Calibration3d,
                "Calibration",
                CALIBRATION_INDEX,
            ),
            current: 0,
            last_user: 0,
            suffix_counters: HashMap::new(),
        };
        if manager.user.is_empty() {
            manager
                .user
                .push(PipelineSettings::new(PipelineType::Reflective, DEFAULT_NICKNAME, 0));
        }
        manager.reindex();
        manager
    }

    /// Replace the built-in settings, e.g. with ones loaded from disk.
    pub fn with_builtins(mut self, driver_mode: PipelineSettings, calibration: PipelineSettings) -> Self {
        self.driver_mode = driver_mode;
        self.driver_mode.base_mut().pipeline_index = DRIVER_MODE_INDEX;
        self.calibration = calibration;
        self.calibration.base_mut().pipeline_index = CALIBRATION_INDEX;
        self
    }

    fn reindex(&mut self) {
        for (i, s) in self.user.iter_mut().enumerate() {
            s.base_mut().pipeline_index = i as i32;
        }
    }

    pub fn user_pipelines(&self) -> &[PipelineSettings] {
        &self.user
    }

    pub fn driver_mode(&self) -> &PipelineSettings {
        &self.driver_mode
    }

    pub fn calibration(&self) -> &PipelineSettings {
        &self.calibration
    }

    pub fn nicknames(&self) -> Vec<&str> {
        self.user.iter().map(PipelineSettings::nickname).collect()
    }

    pub fn len(&self) -> usize {
        self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty()
    }

    pub fn settings(&self, index: i32) -> Option<&PipelineSettings> {
        match index {
            DRIVER_MODE_INDEX => Some(&self.driver_mode),
            CALIBRATION_INDEX => Some(&self.calibration),
            i => usize::try_from(i).ok().and_then(|i| self.user.get(i)),
        }
    }

    fn settings_mut(&mut self, index: i32) -> Result<&mut PipelineSettings, ManagerError> {
        match index {
            DRIVER_MODE_INDEX => Ok(&mut self.driver_mode),
            CALIBRATION_INDEX => Ok(&mut self.calibration),
            i => usize::try_from(i)
                .ok()
                .and_then(|i| self.user.get_mut(i))
                .ok_or(ManagerError::NoSuchPipeline(index)),
        }
    }

    fn user_slot(&self, index: i32) -> Result<usize, ManagerError> {
        if index == DRIVER_MODE_INDEX || index == CALIBRATION_INDEX {
            return Err(ManagerError::BuiltIn);
        }
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.user.len())
            .ok_or(ManagerError::NoSuchPipeline(index))
    }

    pub fn current_index(&self) -> i32 {
        self.current
    }

    pub fn current_settings(&self) -> &PipelineSettings {
        self.settings(self.current).unwrap_or(&self.driver_mode)
    }

    /// Copy of the active settings for one run, taken under the caller's
    /// lock so the run never sees a half-applied change.
    pub fn snapshot(&self) -> PipelineSettings {
        self.current_settings().clone()
    }

    /// Select the pipeline run from the next frame on.
    pub fn set_current(&mut self, index: i32) -> Result<(), ManagerError> {
        if self.settings(index).is_none() {
            return Err(ManagerError::NoSuchPipeline(index));
        }
        if index >= 0 {
            self.last_user = index;
        }
        if index != self.current {
            info!("switching to pipeline {index} ({})", self.settings(index).map_or("", |s| s.nickname()));
        }
        self.current = index;
        Ok(())
    }

    /// Enter driver mode, or return to the last user pipeline.
    pub fn set_driver_mode(&mut self, on: bool) {
        let index = if on { DRIVER_MODE_INDEX } else { self.last_user };
        // last_user always names an existing pipeline
        if self.set_current(index).is_err() {
            self.current = 0;
        }
    }

    pub fn is_driver_mode(&self) -> bool {
        self.current == DRIVER_MODE_INDEX
    }

    /// `requested` if free, else its base name with the lowest `" (n)"`
    /// suffix above every suffix issued so far for that base.
    fn unique_name(&mut self, requested: &str) -> String {
        if !self.nicknames().contains(&requested) {
            return requested.to_string();
        }
        let base = base_name(requested).to_string();
        let mut n = self.suffix_counters.get(&base).copied().unwrap_or(0) + 1;
        loop {
            let candidate = format!("{base} ({n})");
            if !self.nicknames().contains(&candidate.as_str()) {
                self.suffix_counters.insert(base, n);
                return candidate;
            }
            n += 1;
        }
    }

    /// Append stock settings of `kind`; returns the new index.
    pub fn add(&mut self, kind: PipelineType, nickname: &str) -> Result<i32, ManagerError> {
        if matches!(kind, PipelineType::DriverMode | PipelineType::Calibration3d) {
            return Err(ManagerError::BuiltIn);
        }
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(ManagerError::BlankName);
        }
        let name = self.unique_name(nickname);
        let index = self.user.len() as i32;
        debug!("adding {kind:?} pipeline {name:?} at {index}");
        self.user.push(PipelineSettings::new(kind, name, index));
        Ok(index)
    }

    /// Append a copy of pipeline `index` under a suffixed nickname.
    pub fn duplicate(&mut self, index: i32) -> Result<i32, ManagerError> {
        let slot = self.user_slot(index)?;
        let mut copy = self.user[slot].clone();
        let name = self.unique_name(copy.nickname());
        let new_index = self.user.len() as i32;
        let base = copy.base_mut();
        base.nickname = name;
        base.pipeline_index = new_index;
        debug!("duplicated pipeline {index} as {:?}", copy.nickname());
        self.user.push(copy);
        Ok(new_index)
    }

    /// Rename pipeline `index`; its index is unchanged.
    pub fn rename(&mut self, index: i32, nickname: &str) -> Result<(), ManagerError> {
        let slot = self.user_slot(index)?;
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(ManagerError::BlankName);
        }
        let taken = self
            .user
            .iter()
            .enumerate()
            .any(|(i, s)| i != slot && s.nickname() == nickname);
        if taken {
            return Err(ManagerError::NameTaken(nickname.to_string()));
        }
        self.user[slot].base_mut().nickname = nickname.to_string();
        Ok(())
    }

    /// Remove pipeline `index`; later pipelines move down by one.
    pub fn delete(&mut self, index: i32) -> Result<(), ManagerError> {
        let slot = self.user_slot(index)?;
        if self.user.len() == 1 {
            return Err(ManagerError::LastPipeline);
        }
        let removed = self.user.remove(slot);
        debug!("deleted pipeline {index} ({:?})", removed.nickname());
        self.reindex();

        let last = self.user.len() as i32 - 1;
        let shift = |i: i32| if i > index { i - 1 } else { i.min(last) };
        self.last_user = shift(self.last_user);
        if self.current >= 0 {
            self.current = shift(self.current);
        }
        Ok(())
    }

    /// Replace pipeline `index` with stock settings of another type,
    /// keeping its nickname and index.
    pub fn change_type(&mut self, index: i32, kind: PipelineType) -> Result<(), ManagerError> {
        let slot = self.user_slot(index)?;
        if matches!(kind, PipelineType::DriverMode | PipelineType::Calibration3d) {
            return Err(ManagerError::BuiltIn);
        }
        let old = &self.user[slot];
        if old.pipeline_type() != kind {
            self.user[slot] = PipelineSettings::new(kind, old.nickname(), index);
        }
        Ok(())
    }

    /// Validated write of one field of pipeline `index`.
    pub fn set_field(&mut self, index: i32, name: &str, value: FieldValue) -> Result<(), ManagerError> {
        self.settings_mut(index)?.set_field(name, value)?;
        Ok(())
    }
}
