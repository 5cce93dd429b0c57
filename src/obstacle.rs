//! Obstacles and the spawn/advance/despawn stream.

use crate::config::ObstacleConfig;
use crate::geometry::Rect;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Obstacle kinds; each has a fixed vertical placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObstacleKind {
    /// Small cactus
    GroundLow,
    /// Large cactus
    GroundHigh,
    /// Bird at crouch height
    FlyingLow,
    /// Bird above a standing agent
    FlyingHigh,
}

impl ObstacleKind {
    pub const ALL: [ObstacleKind; 4] = [
        ObstacleKind::GroundLow,
        ObstacleKind::GroundHigh,
        ObstacleKind::FlyingLow,
        ObstacleKind::FlyingHigh,
    ];

    /// Ground kinds spawn in clusters, flying kinds alone
    pub fn is_ground(self) -> bool {
        matches!(self, ObstacleKind::GroundLow | ObstacleKind::GroundHigh)
    }
}

/// A single obstacle scrolling towards the agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub kind: ObstacleKind,
    /// Index into the kind's hitbox variants
    pub variant: usize,
    pub rect: Rect,
}

impl Obstacle {
    pub fn new(kind: ObstacleKind, variant: usize, rect: Rect) -> Self {
        Self {
            kind,
            variant,
            rect,
        }
    }

    /// Build an obstacle of `kind` with its left edge at `x`
    pub fn spawn(kind: ObstacleKind, variant: usize, x: f32, config: &ObstacleConfig) -> Option<Self> {
        let spec = config.kinds.get(kind);
        let size = spec.variants.get(variant)?;
        Some(Self::new(kind, variant, Rect::new(x, spec.y, size.width, size.height)))
    }

    /// Fully past the left edge of the field
    pub fn is_off_field(&self) -> bool {
        self.rect.right() < 0.0
    }
}

/// Live obstacles, ordered by spawn time (and so by x)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObstacleStream {
    obstacles: Vec<Obstacle>,
    /// Tick of the last spawn event
    last_spawn_tick: u64,
}

impl ObstacleStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter()
    }

    /// Obstacle the agents react to: the oldest live one
    pub fn nearest(&self) -> Option<&Obstacle> {
        self.obstacles.first()
    }

    /// Insert an obstacle directly (scenarios and tests)
    pub fn push(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
    }

    /// Consider one spawn event at `tick`. Returns the number of obstacles
    /// spawned.
    ///
    /// The gate fires when the live count is below a freshly drawn cap and
    /// the spawn clock plus jitter exceeds the cooldown. The clock counts
    /// simulated milliseconds, so pacing never changes the stream.
    pub fn maybe_spawn(
        &mut self,
        tick: u64,
        fps: u32,
        spawn_x: f32,
        config: &ObstacleConfig,
        rng: &mut impl Rng,
    ) -> usize {
        let (cap_lo, cap_hi) = config.live_cap;
        if self.obstacles.len() >= rng.gen_range(cap_lo..=cap_hi) {
            return 0;
        }

        let elapsed_ms = tick.saturating_sub(self.last_spawn_tick) as f64 * 1000.0 / fps as f64;
        let (jitter_lo, jitter_hi) = config.jitter_ms;
        let jitter = rng.gen_range(jitter_lo..=jitter_hi) as f64;
        if elapsed_ms + jitter <= config.spawn_cooldown_ms {
            return 0;
        }

        let Some(&kind) = ObstacleKind::ALL.choose(rng) else {
            return 0;
        };
        let count = if kind.is_ground() {
            let (lo, hi) = config.cluster_size;
            rng.gen_range(lo..=hi)
        } else {
            1
        };

        let variants = config.kinds.get(kind).variants.len();
        let mut spawned = 0;
        for _ in 0..count {
            let variant = rng.gen_range(0..variants);
            if let Some(obstacle) = Obstacle::spawn(kind, variant, spawn_x, config) {
                self.obstacles.push(obstacle);
                spawned += 1;
            }
        }

        self.last_spawn_tick = tick;
        log::debug!("tick {}: spawned {} x {:?}", tick, spawned, kind);
        spawned
    }

    /// Scroll every obstacle left by `speed`, then drop those fully off field.
    /// Returns the number removed.
    pub fn advance(&mut self, speed: f32) -> usize {
        for obstacle in &mut self.obstacles {
            obstacle.rect.x -= speed;
        }
        let before = self.obstacles.len();
        self.obstacles.retain(|o| !o.is_off_field());
        before - self.obstacles.len()
    }
}
