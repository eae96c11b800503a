//! Seed shapes and stickiness (`ETA = n / m`) regimes.

use crate::SimulationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Radius used by `circle` seeds when none is given.
pub const DEFAULT_CIRCLE_RADIUS: i64 = 10;
/// Particle count used by `random_walk` seeds when none is given.
pub const DEFAULT_SEED_PARTICLES: i64 = 50;

/// Initial cluster placed on an empty lattice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Seed {
    /// Single occupied center cell.
    Dot,
    /// Every cell within Euclidean `radius` of center.
    Circle { radius: i64 },
    /// Center cell plus `particles` cells grown by classic DLA.
    RandomWalk { particles: i64 },
}

impl Seed {
    /// Builds a seed from its kind name and optional size parameter.
    pub fn from_parts(kind: &str, value: Option<i64>) -> Result<Self, SimulationError> {
        let seed = match kind.parse::<SeedKind>()? {
            SeedKind::Dot => Seed::Dot,
            SeedKind::Circle => Seed::Circle {
                radius: value.unwrap_or(DEFAULT_CIRCLE_RADIUS),
            },
            SeedKind::RandomWalk => Seed::RandomWalk {
                particles: value.unwrap_or(DEFAULT_SEED_PARTICLES),
            },
        };
        seed.validate()?;
        Ok(seed)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        match *self {
            Seed::Dot => Ok(()),
            Seed::Circle { radius } if radius < 0 => Err(SimulationError::InvalidConfiguration(
                format!("circle radius must be non-negative, got {radius}"),
            )),
            Seed::RandomWalk { particles } if particles < 0 => {
                Err(SimulationError::InvalidConfiguration(format!(
                    "seed particle count must be non-negative, got {particles}"
                )))
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> SeedKind {
        match self {
            Seed::Dot => SeedKind::Dot,
            Seed::Circle { .. } => SeedKind::Circle,
            Seed::RandomWalk { .. } => SeedKind::RandomWalk,
        }
    }
}

/// Seed shape names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedKind {
    Dot,
    Circle,
    RandomWalk,
}

impl SeedKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SeedKind::Dot => "dot",
            SeedKind::Circle => "circle",
            SeedKind::RandomWalk => "random_walk",
        }
    }
}

impl FromStr for SeedKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dot" => Ok(SeedKind::Dot),
            "circle" => Ok(SeedKind::Circle),
            "random_walk" => Ok(SeedKind::RandomWalk),
            other => Err(SimulationError::InvalidConfiguration(format!(
                "unknown seed kind `{other}` (expected dot, circle or random_walk)"
            ))),
        }
    }
}

impl fmt::Display for SeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a candidate site is accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// `(1, 1)`: accept every candidate.
    Classic,
    /// `(n > 1, 1)`: accept only if all `walkers` sub-walks are lost.
    Erosion { walkers: u32 },
    /// `(1, m > 1)`: accept only if all `walkers` sub-walks attach at distinct sites.
    Dendritic { walkers: u32 },
}

/// Stickiness parameter `n / m` restricted to the supported regimes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Eta {
    n: u32,
    m: u32,
    regime: Regime,
}

impl Eta {
    /// Classic DLA, `ETA = 1`.
    pub const CLASSIC: Eta = Eta {
        n: 1,
        m: 1,
        regime: Regime::Classic,
    };

    pub fn new(n: u32, m: u32) -> Result<Self, SimulationError> {
        let regime = match (n, m) {
            (1, 1) => Regime::Classic,
            (n, 1) if n > 1 => Regime::Erosion { walkers: n },
            (1, m) if m > 1 => Regime::Dendritic { walkers: m },
            _ => {
                return Err(SimulationError::InvalidConfiguration(format!(
                    "unsupported ETA {n}/{m}: one of n, m must be 1 and both positive"
                )));
            }
        };
        Ok(Self { n, m, regime })
    }

    #[must_use]
    pub const fn n(&self) -> u32 {
        self.n
    }

    #[must_use]
    pub const fn m(&self) -> u32 {
        self.m
    }

    #[must_use]
    pub const fn regime(&self) -> Regime {
        self.regime
    }

    #[must_use]
    pub fn ratio(&self) -> f64 {
        f64::from(self.n) / f64::from(self.m)
    }
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ETA={}/{}", self.n, self.m)
    }
}
