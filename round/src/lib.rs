//! Round orchestration: prepares attempts, waits for scores, settles the
//! jumper and closes the round after the attempt limit.
#![forbid(unsafe_code)]

use jumper::{ControlSource, Jumper, JumperState, NullControl, RunObserver};
use physics_env::EnvironmentQuery;
use rapier3d::prelude::Real;
use scoring::{LandingScorer, RunTotal};
use tracing::{info, warn};

/// Anything the round toggles on and off around an attempt, such as the
/// input handler or a follow camera.
pub trait Switchable {
    fn set_enabled(&mut self, enabled: bool);
}

/// No-op switch for callers without a peripheral to drive.
#[derive(Default)]
pub struct NullSwitch;

impl Switchable for NullSwitch {
    fn set_enabled(&mut self, _enabled: bool) {}
}

/// The peripherals the orchestrator enables while an attempt is live.
pub struct Peripherals<'a> {
    pub input: &'a mut dyn Switchable,
    pub camera: &'a mut dyn Switchable,
}

impl Peripherals<'_> {
    fn set_enabled(&mut self, enabled: bool) {
        self.input.set_enabled(enabled);
        self.camera.set_enabled(enabled);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RoundConfig {
    pub max_attempts: u32,
    /// Pause between one attempt closing and the next being prepared.
    pub between_attempts_delay: Real,
    /// How long Settling waits for the jumper to brake before forcing the
    /// attempt closed.
    pub braking_wait_timeout: Real,
    /// Residual speed tolerated when declaring the jumper settled.
    pub settle_speed: Real,
    /// Scoreless attempts are closed with zero points after this long.
    pub attempt_timeout: Real,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            between_attempts_delay: 2.0,
            braking_wait_timeout: 8.0,
            settle_speed: 0.1,
            attempt_timeout: 60.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    /// Next attempt is about to be set up.
    Preparing,
    /// Attempt is live; waiting for a score or the attempt timeout.
    Awaiting,
    /// Score is in; waiting for the jumper to brake to a stop.
    Settling,
    /// Pause before the next attempt.
    Cooldown,
    GameOver,
}

/// One closed attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub points: u32,
    /// How long Settling lasted before the attempt closed.
    pub braking_wait: Real,
}

/// Drives the attempt lifecycle. Call [`RoundOrchestrator::step`] once per
/// fixed physics tick; it ticks the jumper and scorer itself so control is
/// guaranteed cut while no attempt is live.
pub struct RoundOrchestrator {
    config: RoundConfig,
    phase: RoundPhase,
    attempts: u32,
    wait_timer: Real,
    pending_score: Option<u32>,
    current_points: u32,
    records: Vec<AttemptRecord>,
    control_enabled: bool,
}

impl RoundOrchestrator {
    pub fn new(config: RoundConfig) -> Self {
        Self {
            config,
            phase: RoundPhase::Preparing,
            attempts: 0,
            wait_timer: 0.0,
            pending_score: None,
            current_points: 0,
            records: Vec::new(),
            control_enabled: false,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn is_finished(&self) -> bool {
        self.phase == RoundPhase::GameOver
    }

    /// Clears all round state and zeroes the running total. The next
    /// [`RoundOrchestrator::step`] prepares attempt one.
    pub fn start_round(&mut self, total: &mut RunTotal) {
        self.phase = RoundPhase::Preparing;
        self.attempts = 0;
        self.wait_timer = 0.0;
        self.pending_score = None;
        self.current_points = 0;
        self.records.clear();
        self.control_enabled = false;
        total.reset();
        info!(max_attempts = self.config.max_attempts, "round started");
    }

    /// Reports a score for the live attempt. Ignored outside Awaiting, so
    /// late or duplicate reports cannot corrupt a closed attempt.
    pub fn note_score(&mut self, points: u32) {
        if self.phase == RoundPhase::Awaiting {
            self.pending_score = Some(points);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        env: &dyn EnvironmentQuery,
        jumper: &mut Jumper,
        source: &mut dyn ControlSource,
        scorer: &mut LandingScorer,
        total: &mut RunTotal,
        peripherals: &mut Peripherals<'_>,
        observer: &mut dyn RunObserver,
        dt: Real,
    ) {
        if self.phase == RoundPhase::GameOver {
            return;
        }
        if self.phase == RoundPhase::Preparing {
            self.prepare(jumper, source, scorer, peripherals);
        }

        if self.control_enabled {
            jumper.tick(env, source, dt, observer);
        } else {
            let mut idle = NullControl;
            jumper.tick(env, &mut idle, dt, observer);
        }
        if let Some(points) = scorer.tick(jumper.state(), jumper.body(), total, dt) {
            self.note_score(points);
        }

        self.advance(jumper, peripherals, dt);
    }

    fn prepare(
        &mut self,
        jumper: &mut Jumper,
        source: &mut dyn ControlSource,
        scorer: &mut LandingScorer,
        peripherals: &mut Peripherals<'_>,
    ) {
        scorer.reset_attempt();
        source.reset();
        jumper.reset();
        peripherals.set_enabled(true);
        self.control_enabled = true;
        self.pending_score = None;
        self.current_points = 0;
        info!(attempt = self.attempts + 1, "attempt prepared");
        self.set_phase(RoundPhase::Awaiting);
    }

    fn advance(&mut self, jumper: &Jumper, peripherals: &mut Peripherals<'_>, dt: Real) {
        self.wait_timer += dt;
        match self.phase {
            RoundPhase::Awaiting => {
                if let Some(points) = self.pending_score.take() {
                    self.current_points = points;
                    self.control_enabled = false;
                    self.set_phase(RoundPhase::Settling);
                } else if self.wait_timer >= self.config.attempt_timeout {
                    warn!(
                        attempt = self.attempts + 1,
                        "attempt timed out without a score"
                    );
                    self.current_points = 0;
                    self.control_enabled = false;
                    self.set_phase(RoundPhase::Settling);
                }
            }
            RoundPhase::Settling => {
                let settled = jumper.state() == JumperState::Braking
                    && jumper.body().speed() <= self.config.settle_speed;
                if settled || self.wait_timer >= self.config.braking_wait_timeout {
                    if !settled {
                        warn!("jumper never braked, forcing the attempt closed");
                    }
                    self.finish_attempt(peripherals);
                }
            }
            RoundPhase::Cooldown => {
                if self.wait_timer >= self.config.between_attempts_delay {
                    self.set_phase(RoundPhase::Preparing);
                }
            }
            RoundPhase::Preparing | RoundPhase::GameOver => {}
        }
    }

    fn finish_attempt(&mut self, peripherals: &mut Peripherals<'_>) {
        peripherals.set_enabled(false);
        self.control_enabled = false;
        self.attempts += 1;
        let record = AttemptRecord {
            attempt: self.attempts,
            points: self.current_points,
            braking_wait: self.wait_timer,
        };
        info!(
            attempt = record.attempt,
            points = record.points,
            "attempt closed"
        );
        self.records.push(record);
        if self.attempts >= self.config.max_attempts {
            self.set_phase(RoundPhase::GameOver);
        } else {
            self.set_phase(RoundPhase::Cooldown);
        }
    }

    fn set_phase(&mut self, next: RoundPhase) {
        if next == self.phase {
            return;
        }
        info!(prev = ?self.phase, ?next, "round phase change");
        self.phase = next;
        self.wait_timer = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jumper::{
        ControlIntent, GateFrame, JumperBody, JumperConfig, NullObserver,
    };
    use physics_env::{GroundSample, SurfaceLayer};
    use rapier3d::math::{Point, Vector};
    use rapier3d::na::UnitQuaternion;
    use scoring::{ScorerConfig, ScoringZone};

    const DT: Real = 1.0 / 60.0;

    struct FlatGround;

    impl EnvironmentQuery for FlatGround {
        fn cast_ray(
            &self,
            origin: Point<Real>,
            direction: Vector<Real>,
            max_distance: Real,
            _layer: SurfaceLayer,
        ) -> Option<GroundSample> {
            if direction.y >= 0.0 || origin.y < 0.0 {
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

    struct BottomlessPit;

    impl EnvironmentQuery for BottomlessPit {
        fn cast_ray(
            &self,
            _origin: Point<Real>,
            _direction: Vector<Real>,
            _max_distance: Real,
            _layer: SurfaceLayer,
        ) -> Option<GroundSample> {
            None
        }
    }

    /// Presses jump whenever a press would advance the run.
    struct EagerJumper;

    impl ControlSource for EagerJumper {
        fn intent(
            &mut self,
            _env: &dyn EnvironmentQuery,
            _body: &JumperBody,
            state: JumperState,
            _dt: Real,
        ) -> ControlIntent {
            ControlIntent {
                jump_pressed: matches!(state, JumperState::Gate | JumperState::Inrun),
                ..Default::default()
            }
        }
    }

    #[derive(Default)]
    struct RecordingSwitch {
        enabled: bool,
        toggles: u32,
    }

    impl Switchable for RecordingSwitch {
        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
            self.toggles += 1;
        }
    }

    fn gate() -> GateFrame {
        GateFrame {
            position: Vector::new(0.0, 0.1, 0.0),
            rotation: UnitQuaternion::identity(),
        }
    }

    fn wide_zone(points: u32) -> ScoringZone {
        ScoringZone {
            center: Vector::zeros(),
            radius: 500.0,
            points,
        }
    }

    struct Harness {
        jumper: Jumper,
        scorer: LandingScorer,
        total: RunTotal,
        orchestrator: RoundOrchestrator,
    }

    impl Harness {
        fn new(round: RoundConfig, zones: Vec<ScoringZone>) -> Self {
            let jumper = Jumper::new(JumperConfig::default(), gate());
            let scorer = LandingScorer::new(ScorerConfig::default(), zones);
            let mut total = RunTotal::default();
            let mut orchestrator = RoundOrchestrator::new(round);
            orchestrator.start_round(&mut total);
            Self {
                jumper,
                scorer,
                total,
                orchestrator,
            }
        }

        fn run(&mut self, env: &dyn EnvironmentQuery, ticks: usize) {
            let mut input = NullSwitch;
            let mut camera = NullSwitch;
            let mut observer = NullObserver;
            for _ in 0..ticks {
                let mut peripherals = Peripherals {
                    input: &mut input,
                    camera: &mut camera,
                };
                self.orchestrator.step(
                    env,
                    &mut self.jumper,
                    &mut EagerJumper,
                    &mut self.scorer,
                    &mut self.total,
                    &mut peripherals,
                    &mut observer,
                    DT,
                );
                if self.orchestrator.is_finished() {
                    break;
                }
            }
        }
    }

    #[test]
    fn scored_round_closes_after_three_attempts() {
        let mut harness = Harness::new(RoundConfig::default(), vec![wide_zone(50)]);
        harness.run(&FlatGround, 6000);
        assert_eq!(harness.orchestrator.phase(), RoundPhase::GameOver);
        assert_eq!(harness.orchestrator.attempts(), 3);
        let points: Vec<u32> = harness
            .orchestrator
            .records()
            .iter()
            .map(|r| r.points)
            .collect();
        assert_eq!(points, vec![50, 50, 50]);
        assert_eq!(harness.total.total(), 150);
    }

    #[test]
    fn scoreless_attempts_close_by_timeout_with_zero_points() {
        let config = RoundConfig {
            attempt_timeout: 0.5,
            between_attempts_delay: 0.1,
            ..Default::default()
        };
        let mut harness = Harness::new(config, Vec::new());
        harness.run(&FlatGround, 3000);
        assert_eq!(harness.orchestrator.phase(), RoundPhase::GameOver);
        assert!(harness.orchestrator.records().iter().all(|r| r.points == 0));
        assert_eq!(harness.total.total(), 0);
    }

    #[test]
    fn braking_timeout_forces_the_attempt_closed() {
        let config = RoundConfig {
            max_attempts: 1,
            attempt_timeout: 0.2,
            braking_wait_timeout: 0.5,
            ..Default::default()
        };
        let mut harness = Harness::new(config, Vec::new());
        // No ground at all: the jumper falls forever and never brakes.
        harness.run(&BottomlessPit, 600);
        assert_eq!(harness.orchestrator.phase(), RoundPhase::GameOver);
        let record = harness.orchestrator.records()[0];
        assert_eq!(record.points, 0);
        assert!(record.braking_wait >= 0.5);
    }

    #[test]
    fn late_scores_after_game_over_are_ignored() {
        let config = RoundConfig {
            max_attempts: 1,
            attempt_timeout: 0.2,
            braking_wait_timeout: 0.5,
            ..Default::default()
        };
        let mut harness = Harness::new(config, Vec::new());
        harness.run(&BottomlessPit, 600);
        assert!(harness.orchestrator.is_finished());
        harness.orchestrator.note_score(99);
        harness.run(&BottomlessPit, 10);
        assert_eq!(harness.orchestrator.records().len(), 1);
        assert_eq!(harness.total.total(), 0);
    }

    #[test]
    fn peripherals_are_cut_once_the_round_ends() {
        let config = RoundConfig {
            max_attempts: 1,
            attempt_timeout: 0.2,
            braking_wait_timeout: 0.5,
            ..Default::default()
        };
        let mut jumper = Jumper::new(JumperConfig::default(), gate());
        let mut scorer = LandingScorer::new(ScorerConfig::default(), Vec::new());
        let mut total = RunTotal::default();
        let mut orchestrator = RoundOrchestrator::new(config);
        orchestrator.start_round(&mut total);
        let mut input = RecordingSwitch::default();
        let mut camera = RecordingSwitch::default();
        let mut observer = NullObserver;
        for _ in 0..600 {
            let mut peripherals = Peripherals {
                input: &mut input,
                camera: &mut camera,
            };
            orchestrator.step(
                &BottomlessPit,
                &mut jumper,
                &mut EagerJumper,
                &mut scorer,
                &mut total,
                &mut peripherals,
                &mut observer,
                DT,
            );
        }
        assert!(orchestrator.is_finished());
        assert!(!input.enabled);
        assert!(!camera.enabled);
        assert!(input.toggles >= 2);
    }
}
