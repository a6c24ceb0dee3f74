//! Mission configuration
//!
//! [`MissionConfig`] is the loose, deserializable surface: every field is
//! optional. [`MissionConfig::resolve`] checks it and produces the
//! [`MissionSettings`] the worker runs with.

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::observation::ObservationKind;
use crate::types::results::LatLon;
use crate::types::spaces::{PlanarCovariance, StateCovariance};
use crate::utils::ConfidenceLevel;

// ============================================================================
// Errors
// ============================================================================

/// Configuration problems detected before a mission starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("required setting '{0}' was not provided")]
    MissingField(&'static str),

    #[error("setting '{field}' is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("there were no observations, couldn't start the mission")]
    NoObservations,

    #[error("initial state selection needs at least one asset position")]
    NoAssets,

    #[error("initial state mode 'specified' requires a specified location")]
    MissingSpecifiedLocation,

    #[error("unknown initial state mode '{0}'")]
    UnknownInitialStateMode(String),

    #[error("unknown mission mode '{0}'")]
    UnknownMissionMode(String),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

// ============================================================================
// Modes
// ============================================================================

/// Single converged estimate, or continuous re-estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionMode {
    Fix,
    Track,
}

impl FromStr for MissionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fix" => Ok(MissionMode::Fix),
            "track" => Ok(MissionMode::Track),
            other => Err(ConfigError::UnknownMissionMode(other.to_string())),
        }
    }
}

/// How the filter's starting position(s) are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialStateMode {
    Specified,
    Random,
    TopRight,
    BottomRight,
    BottomLeft,
    TopLeft,
    /// Try the four box corners in turn, stop at the first converged one.
    BoxSingleOut,
    /// Run all four box corners and keep every result.
    BoxAllOut,
}

impl InitialStateMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            InitialStateMode::Specified => "specified",
            InitialStateMode::Random => "random",
            InitialStateMode::TopRight => "top_right",
            InitialStateMode::BottomRight => "bottom_right",
            InitialStateMode::BottomLeft => "bottom_left",
            InitialStateMode::TopLeft => "top_left",
            InitialStateMode::BoxSingleOut => "box_single_out",
            InitialStateMode::BoxAllOut => "box_all_out",
        }
    }
}

impl fmt::Display for InitialStateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitialStateMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        [
            InitialStateMode::Specified,
            InitialStateMode::Random,
            InitialStateMode::TopRight,
            InitialStateMode::BottomRight,
            InitialStateMode::BottomLeft,
            InitialStateMode::TopLeft,
            InitialStateMode::BoxSingleOut,
            InitialStateMode::BoxAllOut,
        ]
        .into_iter()
        .find(|mode| mode.as_str() == normalized)
        .ok_or(ConfigError::UnknownInitialStateMode(normalized))
    }
}

// ============================================================================
// Configuration Surface
// ============================================================================

/// The entity being located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    pub name: String,
}

impl TargetConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Fallback measurement variances for observations submitted without one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultVariances {
    pub range: Option<f64>,
    pub tdoa: Option<f64>,
    pub aoa: Option<f64>,
}

impl DefaultVariances {
    /// The same variance for every kind.
    pub fn uniform(variance: f64) -> Self {
        Self {
            range: Some(variance),
            tdoa: Some(variance),
            aoa: Some(variance),
        }
    }

    #[inline]
    pub fn for_kind(&self, kind: ObservationKind) -> Option<f64> {
        match kind {
            ObservationKind::Range => self.range,
            ObservationKind::Tdoa => self.tdoa,
            ObservationKind::Aoa => self.aoa,
        }
    }
}

/// Deserializable mission configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub mission_id: Option<String>,
    pub target: Option<TargetConfig>,
    pub mode: Option<MissionMode>,
    pub initial_state: Option<InitialStateMode>,
    pub specified_location: Option<LatLon>,
    /// Process noise matrix Q, row major.
    pub process_noise: Option<[[f64; 2]; 2]>,
    pub convergence_threshold: Option<f64>,
    pub dispatch_threshold: Option<f64>,
    pub dispatch_period_ms: Option<u64>,
    /// Fix-mode iteration cap. Track mode never caps.
    pub max_iterations: Option<u64>,
    /// Pause between Track-mode iterations.
    pub throttle_ms: Option<u64>,
    pub initial_covariance_scale: Option<f64>,
    pub box_margin: Option<f64>,
    pub random_jitter: Option<f64>,
    pub rng_seed: Option<u64>,
    pub confidence: Option<ConfidenceLevel>,
    pub default_variances: DefaultVariances,
    pub show_measurements: Option<bool>,
}

/// Library defaults.
pub mod defaults {
    pub const DISPATCH_PERIOD_MS: u64 = 1000;
    pub const CONVERGENCE_THRESHOLD: f64 = 0.01;
    pub const DISPATCH_THRESHOLD: f64 = 0.1;
    pub const MAX_ITERATIONS: u64 = 100_000;
    pub const PROCESS_NOISE: f64 = 0.1;
    pub const MEASUREMENT_VARIANCE: f64 = 0.25;
    pub const INITIAL_COVARIANCE_SCALE: f64 = 0.01;
    pub const BOX_MARGIN: f64 = 5000.0;
    pub const RANDOM_JITTER: f64 = 1000.0;
}

impl MissionConfig {
    /// Creates an empty configuration for the given mission and mode.
    pub fn new(mission_id: impl Into<String>, mode: MissionMode) -> Self {
        Self {
            mission_id: Some(mission_id.into()),
            mode: Some(mode),
            ..Self::default()
        }
    }

    /// Fills every unset tunable with its library default.
    pub fn with_defaults(mut self) -> Self {
        let q = defaults::PROCESS_NOISE;
        self.initial_state.get_or_insert(InitialStateMode::Random);
        self.process_noise.get_or_insert([[q, 0.0], [0.0, q]]);
        self.convergence_threshold
            .get_or_insert(defaults::CONVERGENCE_THRESHOLD);
        self.dispatch_threshold.get_or_insert(defaults::DISPATCH_THRESHOLD);
        self.dispatch_period_ms.get_or_insert(defaults::DISPATCH_PERIOD_MS);
        self.max_iterations.get_or_insert(defaults::MAX_ITERATIONS);
        self.initial_covariance_scale
            .get_or_insert(defaults::INITIAL_COVARIANCE_SCALE);
        self.box_margin.get_or_insert(defaults::BOX_MARGIN);
        self.random_jitter.get_or_insert(defaults::RANDOM_JITTER);
        self.confidence.get_or_insert(ConfidenceLevel::Cep50);
        let v = defaults::MEASUREMENT_VARIANCE;
        self.default_variances.range.get_or_insert(v);
        self.default_variances.tdoa.get_or_insert(v);
        self.default_variances.aoa.get_or_insert(v);
        self
    }

    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_initial_state(mut self, mode: InitialStateMode) -> Self {
        self.initial_state = Some(mode);
        self
    }

    pub fn with_specified_location(mut self, location: LatLon) -> Self {
        self.specified_location = Some(location);
        self
    }

    /// Sets Q = `q * I`.
    pub fn with_process_noise(mut self, q: f64) -> Self {
        self.process_noise = Some([[q, 0.0], [0.0, q]]);
        self
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = Some(threshold);
        self
    }

    pub fn with_dispatch_threshold(mut self, threshold: f64) -> Self {
        self.dispatch_threshold = Some(threshold);
        self
    }

    pub fn with_dispatch_period(mut self, period: Duration) -> Self {
        self.dispatch_period_ms = Some(period.as_millis() as u64);
        self
    }

    pub fn with_max_iterations(mut self, max: Option<u64>) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle_ms = Some(throttle.as_millis() as u64);
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_confidence(mut self, level: ConfidenceLevel) -> Self {
        self.confidence = Some(level);
        self
    }

    pub fn with_default_variances(mut self, variances: DefaultVariances) -> Self {
        self.default_variances = variances;
        self
    }

    pub fn with_show_measurements(mut self, show: bool) -> Self {
        self.show_measurements = Some(show);
        self
    }

    /// Validates the configuration and resolves it into runnable settings.
    pub fn resolve(&self) -> Result<MissionSettings, ConfigError> {
        let mission_id = self
            .mission_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::MissingField("mission_id"))?;
        let target = self.target.clone().ok_or(ConfigError::MissingField("target"))?;
        if target.id.trim().is_empty() || target.name.trim().is_empty() {
            return Err(invalid("target", "target id and name must both be set"));
        }
        let mode = self.mode.ok_or(ConfigError::MissingField("mode"))?;
        let initial_state = self
            .initial_state
            .ok_or(ConfigError::MissingField("initial_state"))?;

        let specified_location = match (initial_state, self.specified_location) {
            (InitialStateMode::Specified, None) => {
                return Err(ConfigError::MissingSpecifiedLocation)
            }
            (_, Some(loc))
                if !loc.lat.is_finite()
                    || !loc.lon.is_finite()
                    || loc.lat.abs() > 90.0
                    || loc.lon.abs() > 180.0 =>
            {
                return Err(invalid(
                    "specified_location",
                    format!("({}, {}) is not a valid position", loc.lat, loc.lon),
                ))
            }
            (_, loc) => loc,
        };

        let q = self
            .process_noise
            .ok_or(ConfigError::MissingField("process_noise"))?;
        if q.iter().flatten().any(|v| !v.is_finite()) {
            return Err(invalid("process_noise", "entries must be finite"));
        }
        let process_noise: PlanarCovariance =
            StateCovariance::from_matrix(nalgebra::matrix![q[0][0], q[0][1]; q[1][0], q[1][1]]);

        let convergence_threshold = positive(
            "convergence_threshold",
            self.convergence_threshold
                .ok_or(ConfigError::MissingField("convergence_threshold"))?,
        )?;
        let dispatch_threshold = positive(
            "dispatch_threshold",
            self.dispatch_threshold
                .ok_or(ConfigError::MissingField("dispatch_threshold"))?,
        )?;
        let dispatch_period = Duration::from_millis(
            self.dispatch_period_ms
                .ok_or(ConfigError::MissingField("dispatch_period_ms"))?,
        );

        if self.max_iterations == Some(0) {
            return Err(invalid("max_iterations", "must be at least 1"));
        }

        let initial_covariance_scale = positive(
            "initial_covariance_scale",
            self.initial_covariance_scale
                .unwrap_or(defaults::INITIAL_COVARIANCE_SCALE),
        )?;
        let box_margin = non_negative("box_margin", self.box_margin.unwrap_or(defaults::BOX_MARGIN))?;
        let random_jitter = non_negative(
            "random_jitter",
            self.random_jitter.unwrap_or(defaults::RANDOM_JITTER),
        )?;

        let confidence = self.confidence.unwrap_or(ConfidenceLevel::Cep50);
        if !(confidence.multiplier().is_finite() && confidence.multiplier() > 0.0) {
            return Err(invalid("confidence", "multiplier must be positive"));
        }

        for kind in [ObservationKind::Range, ObservationKind::Tdoa, ObservationKind::Aoa] {
            if let Some(v) = self.default_variances.for_kind(kind) {
                if !v.is_finite() || v < 0.0 {
                    return Err(invalid("default_variances", format!("{kind} variance {v} is invalid")));
                }
            }
        }

        Ok(MissionSettings {
            mission_id,
            target,
            mode,
            initial_state,
            specified_location,
            process_noise,
            convergence_threshold,
            dispatch_threshold,
            dispatch_period,
            max_iterations: self.max_iterations,
            throttle: self.throttle_ms.map(Duration::from_millis),
            initial_covariance_scale,
            box_margin,
            random_jitter,
            rng_seed: self.rng_seed,
            confidence,
            default_variances: self.default_variances,
            show_measurements: self.show_measurements.unwrap_or(false),
        })
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(field, format!("{value} must be a positive number")))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(field, format!("{value} must be zero or positive")))
    }
}

// ============================================================================
// Resolved Settings
// ============================================================================

/// Validated mission context used by the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionSettings {
    pub mission_id: String,
    pub target: TargetConfig,
    pub mode: MissionMode,
    pub initial_state: InitialStateMode,
    pub specified_location: Option<LatLon>,
    pub process_noise: PlanarCovariance,
    pub convergence_threshold: f64,
    pub dispatch_threshold: f64,
    pub dispatch_period: Duration,
    pub max_iterations: Option<u64>,
    pub throttle: Option<Duration>,
    pub initial_covariance_scale: f64,
    pub box_margin: f64,
    pub random_jitter: f64,
    pub rng_seed: Option<u64>,
    pub confidence: ConfidenceLevel,
    pub default_variances: DefaultVariances,
    pub show_measurements: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MissionConfig {
        MissionConfig::new("m-1", MissionMode::Fix)
            .with_target(TargetConfig::new("t-1", "beacon"))
            .with_defaults()
    }

    #[test]
    fn test_defaults_resolve() {
        let settings = base().resolve().unwrap();

        assert_eq!(settings.initial_state, InitialStateMode::Random);
        assert_eq!(settings.dispatch_period, Duration::from_millis(1000));
        assert_eq!(settings.max_iterations, Some(100_000));
        assert!((settings.convergence_threshold - 0.01).abs() < 1e-12);
        assert!((settings.dispatch_threshold - 0.1).abs() < 1e-12);
        assert!((settings.process_noise.trace() - 0.2).abs() < 1e-12);
        assert_eq!(settings.default_variances.for_kind(ObservationKind::Aoa), Some(0.25));
        assert!(!settings.show_measurements);
    }

    #[test]
    fn test_missing_mode() {
        let mut config = base();
        config.mode = None;
        assert_eq!(config.resolve(), Err(ConfigError::MissingField("mode")));
    }

    #[test]
    fn test_missing_target() {
        let mut config = base();
        config.target = None;
        assert_eq!(config.resolve(), Err(ConfigError::MissingField("target")));
    }

    #[test]
    fn test_missing_process_noise_without_defaults() {
        let config = MissionConfig::new("m-1", MissionMode::Track)
            .with_target(TargetConfig::new("t-1", "beacon"))
            .with_initial_state(InitialStateMode::Random);
        assert_eq!(config.resolve(), Err(ConfigError::MissingField("process_noise")));
    }

    #[test]
    fn test_specified_requires_location() {
        let config = base().with_initial_state(InitialStateMode::Specified);
        assert_eq!(config.resolve(), Err(ConfigError::MissingSpecifiedLocation));
    }

    #[test]
    fn test_non_finite_specified_location_rejected() {
        for loc in [LatLon::new(f64::NAN, 115.8), LatLon::new(-31.9, f64::INFINITY)] {
            let config = base()
                .with_initial_state(InitialStateMode::Specified)
                .with_specified_location(loc);
            assert!(matches!(
                config.resolve(),
                Err(ConfigError::InvalidValue { field: "specified_location", .. })
            ));
        }
    }

    #[test]
    fn test_invalid_threshold() {
        let config = base().with_convergence_threshold(-1.0);
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidValue { field: "convergence_threshold", .. })
        ));
    }

    #[test]
    fn test_zero_max_iterations_rejected() {
        let config = base().with_max_iterations(Some(0));
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidValue { field: "max_iterations", .. })
        ));
    }

    #[test]
    fn test_initial_state_mode_parsing() {
        assert_eq!("box_all_out".parse::<InitialStateMode>(), Ok(InitialStateMode::BoxAllOut));
        assert_eq!(" Top_Left ".parse::<InitialStateMode>(), Ok(InitialStateMode::TopLeft));
        assert!(matches!(
            "middle".parse::<InitialStateMode>(),
            Err(ConfigError::UnknownInitialStateMode(_))
        ));
        assert_eq!("TRACK".parse::<MissionMode>(), Ok(MissionMode::Track));
    }
}
