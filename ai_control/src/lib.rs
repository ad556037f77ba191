//! Automated jumper: probe-based terrain senses plus a seeded jump policy.
#![forbid(unsafe_code)]

use jumper::{ControlIntent, ControlSource, JumperBody, JumperState};
use physics_env::{EnvironmentQuery, SurfaceLayer};
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;
use tracing::debug;

/// Skill knobs for one automated jumper. `seed` makes the whole attempt
/// reproducible and is stamped into the run summary.
#[derive(Clone, Copy, Debug)]
pub struct AiDifficulty {
    /// Systematic shift of the jump trigger distance, meters. Negative
    /// means the jumper waits longer before leaving the lip.
    pub timing_bias: Real,
    /// Half-width of the per-attempt random spread on the trigger, meters.
    pub timing_jitter: Real,
    /// How aggressively the jumper steers back to the centerline in air.
    pub tilt_strength: Real,
    pub seed: u64,
}

impl Default for AiDifficulty {
    fn default() -> Self {
        Self {
            timing_bias: 0.0,
            timing_jitter: 0.02,
            tilt_strength: 0.6,
            seed: 0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SenseConfig {
    /// How far ahead the lip scan looks, meters.
    pub forward_probe: Real,
    /// Spacing between scan samples.
    pub probe_step: Real,
    /// Depth of each downward scan ray.
    pub down_probe: Real,
    /// Height above the body the scan rays start from.
    pub origin_lift: Real,
    /// Normals whose dot with the current ground normal falls below this
    /// count as a slope break.
    pub lip_normal_dot: Real,
}

impl Default for SenseConfig {
    fn default() -> Self {
        Self {
            forward_probe: 5.0,
            probe_step: 0.25,
            down_probe: 5.0,
            origin_lift: 0.2,
            lip_normal_dot: 0.98,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SenseSample {
    pub grounded: bool,
    pub ground_normal: Vector<Real>,
    /// Distance along the body's forward axis to the first slope break or
    /// terrain edge; `forward_probe` when the scan finds neither.
    pub lip_distance: Real,
}

/// Terrain senses: a downward probe under the body plus a stepped forward
/// scan that reports where the surface under the jumper ends.
#[derive(Clone, Copy, Debug)]
pub struct AiSenses {
    pub config: SenseConfig,
}

impl Default for AiSenses {
    fn default() -> Self {
        Self {
            config: SenseConfig::default(),
        }
    }
}

impl AiSenses {
    pub fn sample(&self, env: &dyn EnvironmentQuery, body: &JumperBody) -> SenseSample {
        let lift = Vector::y() * self.config.origin_lift;
        let under = env.probe_down(
            Point::from(body.position + lift),
            self.config.down_probe,
            SurfaceLayer::Ground,
        );
        let (grounded, ground_normal) = match &under {
            Some(sample) => (true, sample.normal),
            None => (false, Vector::y()),
        };

        let mut lip_distance = self.config.forward_probe;
        if grounded {
            let forward = body.forward();
            let mut offset = self.config.probe_step;
            while offset <= self.config.forward_probe {
                let origin = Point::from(body.position + forward * offset + lift);
                match env.probe_down(origin, self.config.down_probe, SurfaceLayer::Ground) {
                    Some(sample) if sample.normal.dot(&ground_normal) >= self.config.lip_normal_dot => {}
                    _ => {
                        lip_distance = offset;
                        break;
                    }
                }
                offset += self.config.probe_step;
            }
        }

        SenseSample {
            grounded,
            ground_normal,
            lip_distance,
        }
    }
}

/// Coarse phase the automated jumper believes it is in; follows the run
/// one way and re-arms on reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiState {
    Rolling,
    Jumping,
    Flying,
    Landing,
    Finished,
}

/// A [`ControlSource`] that rides the in-run and releases at the lip using
/// a seeded trigger distance.
pub struct AiControlSource {
    difficulty: AiDifficulty,
    senses: AiSenses,
    rng: fastrand::Rng,
    trigger_distance: Real,
    state: AiState,
    jumped: bool,
}

const BASE_TRIGGER: Real = 1.2;

impl AiControlSource {
    pub fn new(difficulty: AiDifficulty) -> Self {
        let mut source = Self {
            difficulty,
            senses: AiSenses::default(),
            rng: fastrand::Rng::with_seed(difficulty.seed),
            trigger_distance: BASE_TRIGGER,
            state: AiState::Rolling,
            jumped: false,
        };
        source.reset();
        source
    }

    pub fn trigger_distance(&self) -> Real {
        self.trigger_distance
    }

    pub fn state(&self) -> AiState {
        self.state
    }
}

impl ControlSource for AiControlSource {
    fn intent(
        &mut self,
        env: &dyn EnvironmentQuery,
        body: &JumperBody,
        state: JumperState,
        _dt: Real,
    ) -> ControlIntent {
        match state {
            JumperState::Gate => {
                self.state = AiState::Rolling;
                ControlIntent {
                    jump_pressed: true,
                    ..Default::default()
                }
            }
            JumperState::Inrun => {
                let sample = self.senses.sample(env, body);
                let jump_pressed =
                    !self.jumped && sample.grounded && sample.lip_distance <= self.trigger_distance;
                if jump_pressed {
                    self.jumped = true;
                    self.state = AiState::Jumping;
                    debug!(
                        lip_distance = sample.lip_distance,
                        trigger = self.trigger_distance,
                        "ai jump"
                    );
                }
                ControlIntent {
                    jump_pressed,
                    ..Default::default()
                }
            }
            JumperState::Takeoff | JumperState::Flight | JumperState::PreLanding => {
                self.state = AiState::Flying;
                ControlIntent {
                    lateral: (-body.position.x * self.difficulty.tilt_strength).clamp(-1.0, 1.0),
                    ..Default::default()
                }
            }
            JumperState::Landing | JumperState::Passing => {
                self.state = AiState::Landing;
                ControlIntent::default()
            }
            JumperState::Braking => {
                self.state = AiState::Finished;
                ControlIntent::default()
            }
        }
    }

    fn reset(&mut self) {
        // Re-seeding keeps every attempt of a round identical for one seed.
        self.rng = fastrand::Rng::with_seed(self.difficulty.seed);
        let jitter = self.difficulty.timing_jitter * (self.rng.f32() * 2.0 - 1.0);
        self.trigger_distance = (BASE_TRIGGER + self.difficulty.timing_bias + jitter).max(0.1);
        self.state = AiState::Rolling;
        self.jumped = false;
    }

    fn seed(&self) -> u64 {
        self.difficulty.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jumper::{GateFrame, Jumper, JumperConfig, NullObserver};
    use physics_env::GroundSample;
    use rapier3d::na::UnitQuaternion;

    const DT: Real = 1.0 / 60.0;

    /// Flat ground that ends in a drop at `edge_z` (travel direction -Z).
    struct Ledge {
        edge_z: Real,
    }

    impl EnvironmentQuery for Ledge {
        fn cast_ray(
            &self,
            origin: Point<Real>,
            direction: Vector<Real>,
            max_distance: Real,
            _layer: SurfaceLayer,
        ) -> Option<GroundSample> {
            if direction.y >= 0.0 || origin.y < 0.0 || origin.z < self.edge_z {
                return None;
            }
            let t = origin.y / -direction.y;
            if t > max_distance {
                return None;
            }
            Some(GroundSample {
                point: Point::from(origin.coords + direction * t),
                normal: Vector::y(),
                distance: t,
            })
        }
    }

    fn gate() -> GateFrame {
        GateFrame {
            position: Vector::new(0.0, 0.1, 0.0),
            rotation: UnitQuaternion::identity(),
        }
    }

    fn takeoff_tick(seed: u64) -> Option<usize> {
        let env = Ledge { edge_z: -6.0 };
        let mut jumper = Jumper::new(JumperConfig::default(), gate());
        let mut source = AiControlSource::new(AiDifficulty {
            seed,
            ..Default::default()
        });
        let mut observer = NullObserver;
        for tick in 0..600 {
            jumper.tick(&env, &mut source, DT, &mut observer);
            if jumper.state() >= JumperState::Takeoff {
                return Some(tick);
            }
        }
        None
    }

    #[test]
    fn senses_report_the_upcoming_edge() {
        let env = Ledge { edge_z: -2.0 };
        let body = JumperBody {
            position: Vector::new(0.0, 0.1, 0.0),
            rotation: UnitQuaternion::identity(),
            velocity: Vector::zeros(),
            angular_velocity: Vector::zeros(),
            kinematic: false,
        };
        let sample = AiSenses::default().sample(&env, &body);
        assert!(sample.grounded);
        assert!(sample.lip_distance >= 2.0);
        assert!(sample.lip_distance < 2.5);
    }

    #[test]
    fn senses_report_airborne_over_the_drop() {
        let env = Ledge { edge_z: -2.0 };
        let body = JumperBody {
            position: Vector::new(0.0, 0.1, -3.0),
            rotation: UnitQuaternion::identity(),
            velocity: Vector::zeros(),
            angular_velocity: Vector::zeros(),
            kinematic: false,
        };
        let sample = AiSenses::default().sample(&env, &body);
        assert!(!sample.grounded);
    }

    #[test]
    fn same_seed_jumps_on_the_same_tick() {
        let first = takeoff_tick(7);
        let second = takeoff_tick(7);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn reset_restores_the_trigger_after_an_attempt() {
        let mut source = AiControlSource::new(AiDifficulty {
            timing_jitter: 0.4,
            seed: 42,
            ..Default::default()
        });
        let trigger = source.trigger_distance();
        source.reset();
        assert_eq!(source.trigger_distance(), trigger);
    }

    #[test]
    fn bias_shifts_the_trigger() {
        let early = AiControlSource::new(AiDifficulty {
            timing_bias: 0.5,
            timing_jitter: 0.0,
            seed: 1,
            ..Default::default()
        });
        let late = AiControlSource::new(AiDifficulty {
            timing_bias: -0.5,
            timing_jitter: 0.0,
            seed: 1,
            ..Default::default()
        });
        assert!(early.trigger_distance() > late.trigger_distance());
    }
}
