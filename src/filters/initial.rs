//! Initial state selection
//!
//! Range and bearing geometry often has mirror-image local optima, so a fix
//! may be started from several seeds. Seeds come from a caller-specified
//! location, from a randomized point between known assets, or from the
//! corners of the asset bounding box expanded by a margin.

use std::collections::BTreeMap;

use rand::Rng;

use crate::filters::ekf::FilterExecution;
use crate::types::mission::{ConfigError, InitialStateMode, MissionSettings};
use crate::types::observation::AssetId;
use crate::types::spaces::PlanarState;

// ============================================================================
// Bounding Box
// ============================================================================

/// Corner of the expanded asset bounding box. North is "top", east is "right".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxCorner {
    TopRight,
    BottomRight,
    BottomLeft,
    TopLeft,
}

impl BoxCorner {
    /// Order in which box modes visit the corners.
    pub const ALL: [BoxCorner; 4] = [
        BoxCorner::TopRight,
        BoxCorner::BottomRight,
        BoxCorner::BottomLeft,
        BoxCorner::TopLeft,
    ];

    pub const fn label(&self) -> &'static str {
        match self {
            BoxCorner::TopRight => "top_right",
            BoxCorner::BottomRight => "bottom_right",
            BoxCorner::BottomLeft => "bottom_left",
            BoxCorner::TopLeft => "top_left",
        }
    }
}

/// Axis-aligned planar bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_easting: f64,
    pub max_easting: f64,
    pub min_northing: f64,
    pub max_northing: f64,
}

impl Bounds {
    /// Bounds of a set of positions, `None` when empty.
    pub fn of<'a>(positions: impl IntoIterator<Item = &'a PlanarState>) -> Option<Self> {
        positions.into_iter().fold(None, |acc, p| {
            let (e, n) = (p.easting(), p.northing());
            Some(match acc {
                None => Bounds {
                    min_easting: e,
                    max_easting: e,
                    min_northing: n,
                    max_northing: n,
                },
                Some(b) => Bounds {
                    min_easting: b.min_easting.min(e),
                    max_easting: b.max_easting.max(e),
                    min_northing: b.min_northing.min(n),
                    max_northing: b.max_northing.max(n),
                },
            })
        })
    }

    /// A corner of the bounds pushed outward by `margin` on both axes.
    pub fn corner(&self, corner: BoxCorner, margin: f64) -> PlanarState {
        let right = self.max_easting + margin;
        let left = self.min_easting - margin;
        let top = self.max_northing + margin;
        let bottom = self.min_northing - margin;

        match corner {
            BoxCorner::TopRight => PlanarState::planar(right, top),
            BoxCorner::BottomRight => PlanarState::planar(right, bottom),
            BoxCorner::BottomLeft => PlanarState::planar(left, bottom),
            BoxCorner::TopLeft => PlanarState::planar(left, top),
        }
    }
}

// ============================================================================
// Selector
// ============================================================================

/// A labelled starting position.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub label: String,
    pub position: PlanarState,
}

impl Seed {
    fn new(label: impl Into<String>, position: PlanarState) -> Self {
        Self {
            label: label.into(),
            position,
        }
    }
}

/// Produces the initial states for a mission.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialStateSelector {
    pub mode: InitialStateMode,
    /// Planar position for [`InitialStateMode::Specified`].
    pub specified: Option<PlanarState>,
    /// Bounding box expansion, metres. Also the single-asset offset in random mode.
    pub margin: f64,
    /// Half-width of the uniform jitter added in random mode, metres.
    pub jitter: f64,
    /// Initial covariance is `covariance_scale · I`.
    pub covariance_scale: f64,
}

impl InitialStateSelector {
    /// Builds a selector from resolved settings; `specified` is the projected
    /// specified location, if any.
    pub fn from_settings(settings: &MissionSettings, specified: Option<PlanarState>) -> Self {
        Self {
            mode: settings.initial_state,
            specified,
            margin: settings.box_margin,
            jitter: settings.random_jitter,
            covariance_scale: settings.initial_covariance_scale,
        }
    }

    /// Computes the seeds for the configured mode.
    pub fn seeds<R: Rng + ?Sized>(
        &self,
        assets: &BTreeMap<AssetId, PlanarState>,
        rng: &mut R,
    ) -> Result<Vec<Seed>, ConfigError> {
        let corner = |c: BoxCorner| -> Result<Seed, ConfigError> {
            let bounds = Bounds::of(assets.values()).ok_or(ConfigError::NoAssets)?;
            Ok(Seed::new(c.label(), bounds.corner(c, self.margin)))
        };

        let seeds = match self.mode {
            InitialStateMode::Specified => {
                let position = self.specified.ok_or(ConfigError::MissingSpecifiedLocation)?;
                vec![Seed::new("specified", position)]
            }
            InitialStateMode::Random => vec![self.random_seed(assets, rng)?],
            InitialStateMode::TopRight => vec![corner(BoxCorner::TopRight)?],
            InitialStateMode::BottomRight => vec![corner(BoxCorner::BottomRight)?],
            InitialStateMode::BottomLeft => vec![corner(BoxCorner::BottomLeft)?],
            InitialStateMode::TopLeft => vec![corner(BoxCorner::TopLeft)?],
            InitialStateMode::BoxSingleOut | InitialStateMode::BoxAllOut => BoxCorner::ALL
                .iter()
                .map(|&c| corner(c))
                .collect::<Result<Vec<_>, _>>()?,
        };

        for seed in &seeds {
            tracing::debug!(
                mode = %self.mode,
                seed = %seed.label,
                easting = seed.position.easting(),
                northing = seed.position.northing(),
                "initial state"
            );
        }
        Ok(seeds)
    }

    /// Seeds wrapped as fresh filter executions.
    pub fn executions<R: Rng + ?Sized>(
        &self,
        assets: &BTreeMap<AssetId, PlanarState>,
        rng: &mut R,
    ) -> Result<Vec<FilterExecution>, ConfigError> {
        Ok(self
            .seeds(assets, rng)?
            .into_iter()
            .map(|seed| FilterExecution::new(seed.label, seed.position, self.covariance_scale))
            .collect())
    }

    fn random_seed<R: Rng + ?Sized>(
        &self,
        assets: &BTreeMap<AssetId, PlanarState>,
        rng: &mut R,
    ) -> Result<Seed, ConfigError> {
        let positions: Vec<(&AssetId, &PlanarState)> = assets.iter().collect();
        match positions.len() {
            0 => Err(ConfigError::NoAssets),
            1 => {
                let (id, p) = positions[0];
                tracing::debug!(asset = %id, "random initial state near single asset");
                Ok(Seed::new(
                    "random",
                    PlanarState::planar(p.easting() + self.margin, p.northing() - self.margin),
                ))
            }
            n => {
                let picked = rand::seq::index::sample(rng, n, 2);
                let (id_a, a) = positions[picked.index(0)];
                let (id_b, b) = positions[picked.index(1)];
                let jitter_e = rng.random_range(-self.jitter..=self.jitter);
                let jitter_n = rng.random_range(-self.jitter..=self.jitter);
                tracing::debug!(asset_a = %id_a, asset_b = %id_b, "random initial state between assets");
                Ok(Seed::new(
                    "random",
                    PlanarState::planar(
                        (a.easting() + b.easting()) / 2.0 + jitter_e,
                        (a.northing() + b.northing()) / 2.0 + jitter_n,
                    ),
                ))
            }
        }
    }
}
