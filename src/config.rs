//! Engine configuration
//!
//! The model artifact fixes what a dataplane knows; [`EngineConfig`] fixes
//! how a prediction call uses it: whether the default fallback is allowed,
//! its dampening weight, and optional amplification toward a target value set.

use crate::model::{NumberSetKind, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

/// Dampening applied to default-accumulator probabilities on fallback.
pub const DEFAULT_WEIGHT: f64 = 0.2;

/// Margin by which a forced recall winner is placed above the previous top.
pub const WIN_MARGIN: f64 = 0.1;

/// Options for one [`crate::PredictionEngine`].
///
/// # Examples
///
/// ```
/// use framewise::{AmplifyMode, EngineConfig};
///
/// let config = EngineConfig::default();
/// assert!(!config.no_defaults);
/// assert_eq!(config.default_weight, 0.2);
///
/// let strict = EngineConfig::strict();
/// assert!(strict.no_defaults);
///
/// let amp = EngineConfig::amplified([3, 4], AmplifyMode::Limit);
/// assert!(amp.amplify.unwrap().is_target(3));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Report `Fail` instead of falling back to the default accumulator.
    pub no_defaults: bool,
    pub default_weight: f64,
    pub win_margin: f64,
    /// Reuse the previous window when positions advance by one.
    pub shift_frames: bool,
    pub amplify: Option<Amplify>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            no_defaults: false,
            default_weight: DEFAULT_WEIGHT,
            win_margin: WIN_MARGIN,
            shift_frames: true,
            amplify: None,
        }
    }
}

impl EngineConfig {
    /// No fallback: positions nothing contributes to report `Fail`.
    pub fn strict() -> Self {
        EngineConfig {
            no_defaults: true,
            ..Self::default()
        }
    }

    /// Amplify toward `targets` with the given mode.
    pub fn amplified(targets: impl IntoIterator<Item = Value>, mode: AmplifyMode) -> Self {
        EngineConfig {
            amplify: Some(Amplify::new(targets, mode)),
            ..Self::default()
        }
    }

    /// Read a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(io::Error::other)
    }
}

/// How non-target values are treated under amplification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmplifyMode {
    /// Boost targets, keep everything else.
    #[default]
    Soft,
    /// Boost targets, drop everything else.
    Limit,
}

/// Reweighting of candidate values toward a target set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Amplify {
    pub targets: BTreeSet<Value>,
    #[serde(default)]
    pub mode: AmplifyMode,
    /// Non-target ranks excluded from the gain denominator for focus sets; 0 means all.
    #[serde(default)]
    pub noise_limit_focus: usize,
    /// As `noise_limit_focus`, for context sets.
    #[serde(default)]
    pub noise_limit_context: usize,
    /// When positive, identity-set values are scaled by this and skip filtering.
    #[serde(default)]
    pub identity_gain: f64,
}

impl Amplify {
    pub fn new(targets: impl IntoIterator<Item = Value>, mode: AmplifyMode) -> Self {
        Amplify {
            targets: targets.into_iter().collect(),
            mode,
            noise_limit_focus: 0,
            noise_limit_context: 0,
            identity_gain: 0.0,
        }
    }

    pub fn with_noise_limits(mut self, focus: usize, context: usize) -> Self {
        self.noise_limit_focus = focus;
        self.noise_limit_context = context;
        self
    }

    pub fn with_identity_gain(mut self, gain: f64) -> Self {
        self.identity_gain = gain;
        self
    }

    #[inline]
    pub fn is_target(&self, value: Value) -> bool {
        self.targets.contains(&value)
    }

    pub fn noise_limit(&self, kind: NumberSetKind) -> usize {
        match kind {
            NumberSetKind::Focus => self.noise_limit_focus,
            NumberSetKind::Context => self.noise_limit_context,
        }
    }
}
