//! Landing zones and the debounced come-to-rest scorer.
#![forbid(unsafe_code)]

use jumper::{JumperBody, JumperState};
use rapier3d::math::Vector;
use rapier3d::prelude::Real;
use tracing::info;

/// A circular landing zone on the outrun. Zones may overlap; the scorer
/// awards the highest-valued zone containing the rest point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoringZone {
    pub center: Vector<Real>,
    pub radius: Real,
    pub points: u32,
}

impl ScoringZone {
    pub fn contains(&self, point: Vector<Real>) -> bool {
        (point - self.center).norm_squared() <= self.radius * self.radius
    }
}

/// Points accumulated across the attempts of one round.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunTotal {
    total: u32,
}

impl RunTotal {
    pub fn reset(&mut self) {
        self.total = 0;
    }

    pub fn add(&mut self, points: u32) {
        self.total += points;
    }

    pub fn total(&self) -> u32 {
        self.total
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ScorerConfig {
    /// Speed at or below which the jumper counts as stopped.
    pub stop_speed: Real,
    /// How long the jumper must stay stopped inside one zone.
    pub hold_time: Real,
    /// Offset subtracted from the body position before the zone test;
    /// pushes the check point down to roughly ground level.
    pub check_offset: Vector<Real>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            stop_speed: 0.25,
            hold_time: 0.6,
            check_offset: Vector::new(0.0, 0.1, 0.0),
        }
    }
}

/// Debounced scorer: once the jumper is past landing, stopped, and inside
/// the same zone for `hold_time`, awards that zone's points exactly once
/// per attempt.
pub struct LandingScorer {
    config: ScorerConfig,
    zones: Vec<ScoringZone>,
    hold_timer: Real,
    held_zone: Option<usize>,
    scored: bool,
}

impl LandingScorer {
    pub fn new(config: ScorerConfig, zones: Vec<ScoringZone>) -> Self {
        Self {
            config,
            zones,
            hold_timer: 0.0,
            held_zone: None,
            scored: false,
        }
    }

    pub fn zones(&self) -> &[ScoringZone] {
        &self.zones
    }

    /// Re-arms the scorer for a fresh attempt.
    pub fn reset_attempt(&mut self) {
        self.hold_timer = 0.0;
        self.held_zone = None;
        self.scored = false;
    }

    /// Evaluates one tick. Returns the awarded points on the single tick
    /// the debounce completes, `None` otherwise.
    pub fn tick(
        &mut self,
        state: JumperState,
        body: &JumperBody,
        total: &mut RunTotal,
        dt: Real,
    ) -> Option<u32> {
        if self.scored || !state.is_post_landing() {
            self.hold_timer = 0.0;
            self.held_zone = None;
            return None;
        }
        let check_point = body.position - self.config.check_offset;
        let zone = self.best_zone(check_point);
        let stopped =
            body.velocity.norm_squared() <= self.config.stop_speed * self.config.stop_speed;
        match zone {
            Some(index) if stopped && self.held_zone == Some(index) => {
                self.hold_timer += dt;
                if self.hold_timer >= self.config.hold_time {
                    let points = self.zones[index].points;
                    self.scored = true;
                    total.add(points);
                    info!(points, total = total.total(), "landing scored");
                    return Some(points);
                }
            }
            Some(index) if stopped => {
                self.held_zone = Some(index);
                self.hold_timer = 0.0;
            }
            _ => {
                self.held_zone = None;
                self.hold_timer = 0.0;
            }
        }
        None
    }

    /// Highest-valued containing zone; on a points tie the later zone in
    /// declaration order wins, which keeps results deterministic.
    fn best_zone(&self, point: Vector<Real>) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (index, zone) in self.zones.iter().enumerate() {
            if !zone.contains(point) {
                continue;
            }
            match best {
                Some(current) if zone.points < self.zones[current].points => {}
                _ => best = Some(index),
            }
        }
        best
    }
}
