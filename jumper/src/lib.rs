//! Jumper body, control contract and the run state machine.
#![forbid(unsafe_code)]

use flight_model::{
    aerial_step, glide_step, glue_position, passing_step, ramp_tangent, slerp_toward,
    slope_rotation, takeoff_velocity, AerialConfig, AerialInput, AerialState, GlideConfig,
    PassingConfig, SlopeGlueConfig,
};
use physics_env::{EnvironmentQuery, GroundSample, SurfaceLayer};
use rapier3d::math::{Point, Vector};
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::Real;
use tracing::debug;

const AXIS_EPS: Real = 1.0e-4;

/// Phases of a single run. Happy-path transitions are strictly forward;
/// Braking is terminal until an explicit [`Jumper::reset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum JumperState {
    Gate,
    Inrun,
    Takeoff,
    Flight,
    PreLanding,
    Landing,
    Passing,
    Braking,
}

impl JumperState {
    /// States during which landing zones are evaluated.
    pub fn is_post_landing(self) -> bool {
        matches!(
            self,
            JumperState::Landing | JumperState::Passing | JumperState::Braking
        )
    }
}

/// Per-tick movement intent. `jump_pressed` is edge-triggered: true only on
/// the tick the intent first becomes active.
#[derive(Clone, Copy, Debug, Default)]
pub struct ControlIntent {
    pub lateral: Real,
    pub forward: Real,
    pub jump_pressed: bool,
}

/// Supplies per-tick intent; satisfied by human input or an automated
/// policy. The jumper consults `can_jump` before honoring a jump press.
pub trait ControlSource {
    fn intent(
        &mut self,
        env: &dyn EnvironmentQuery,
        body: &JumperBody,
        state: JumperState,
        dt: Real,
    ) -> ControlIntent;

    fn can_jump(&self) -> bool {
        true
    }

    /// Re-arms the source for a fresh attempt.
    fn reset(&mut self) {}

    /// Seed recorded into the attempt summary; 0 for human input.
    fn seed(&self) -> u64 {
        0
    }
}

/// Control source that never does anything; used while input is disabled.
#[derive(Default)]
pub struct NullControl;

impl ControlSource for NullControl {
    fn intent(
        &mut self,
        _env: &dyn EnvironmentQuery,
        _body: &JumperBody,
        _state: JumperState,
        _dt: Real,
    ) -> ControlIntent {
        ControlIntent::default()
    }

    fn can_jump(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LandingGrade {
    Perfect,
    Good,
    Sketchy,
    Crash,
}

/// Result record emitted once per attempt at touchdown.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub distance: Real,
    pub flight_time: Real,
    pub grade: LandingGrade,
    pub seed: u64,
}

/// Outbound notification sink for state changes and attempt results.
pub trait RunObserver {
    fn state_changed(&mut self, _old: JumperState, _new: JumperState) {}
    fn attempt_finished(&mut self, _summary: &RunSummary) {}
}

#[derive(Default)]
pub struct NullObserver;

impl RunObserver for NullObserver {}

/// The jumper's physical body. Owned by [`Jumper`], mutated only inside a
/// tick. While `kinematic` the body ignores gravity and integration.
#[derive(Clone, Debug)]
pub struct JumperBody {
    pub position: Vector<Real>,
    pub rotation: UnitQuaternion<Real>,
    pub velocity: Vector<Real>,
    pub angular_velocity: Vector<Real>,
    pub kinematic: bool,
}

impl JumperBody {
    pub fn forward(&self) -> Vector<Real> {
        flight_model::forward_axis(&self.rotation)
    }

    pub fn right(&self) -> Vector<Real> {
        flight_model::right_axis(&self.rotation)
    }

    pub fn speed(&self) -> Real {
        self.velocity.norm()
    }
}

/// The start-gate frame the body is parented to while seated.
#[derive(Clone, Copy, Debug)]
pub struct GateFrame {
    pub position: Vector<Real>,
    pub rotation: UnitQuaternion<Real>,
}

impl GateFrame {
    pub fn forward(&self) -> Vector<Real> {
        flight_model::forward_axis(&self.rotation)
    }
}

/// Downward probe ranges for the landing detector.
#[derive(Clone, Copy, Debug)]
pub struct LandingProbeConfig {
    /// Long-range probe that arms the pre-landing approach.
    pub flight_probe: Real,
    /// Short-range probe used while approaching.
    pub approach_probe: Real,
    /// Probe distance at or below which the jumper counts as touched down.
    pub touchdown_distance: Real,
}

impl Default for LandingProbeConfig {
    fn default() -> Self {
        Self {
            flight_probe: 0.5,
            approach_probe: 2.0,
            touchdown_distance: 0.3,
        }
    }
}

/// Touchdown detection via short-range downward probes.
#[derive(Clone, Copy, Debug, Default)]
pub struct LandingDetector {
    pub config: LandingProbeConfig,
}

impl LandingDetector {
    pub fn probe_pre_landing(
        &self,
        env: &dyn EnvironmentQuery,
        position: Vector<Real>,
    ) -> Option<GroundSample> {
        env.probe_down(
            Point::from(position),
            self.config.flight_probe,
            SurfaceLayer::Ground,
        )
    }

    pub fn probe_approach(
        &self,
        env: &dyn EnvironmentQuery,
        position: Vector<Real>,
    ) -> Option<GroundSample> {
        env.probe_down(
            Point::from(position),
            self.config.approach_probe,
            SurfaceLayer::Ground,
        )
    }

    pub fn is_touchdown(&self, sample: &GroundSample) -> bool {
        sample.distance <= self.config.touchdown_distance
    }
}

#[derive(Clone, Copy, Debug)]
pub struct JumperConfig {
    pub gravity: Real,
    /// Instantaneous push along the ramp tangent when leaving the gate.
    pub release_push: Real,
    /// Instantaneous boost along the ground normal at takeoff.
    pub takeoff_boost: Real,
    /// Forward speed clamp applied at takeoff.
    pub max_takeoff_speed: Real,
    /// Seat position relative to the gate frame.
    pub seat_offset: Vector<Real>,
    /// Seat yaw relative to the gate frame, radians.
    pub seat_yaw: Real,
    /// Height above the body the tangent/alignment probes start from.
    pub probe_lift: Real,
    pub tangent_probe_range: Real,
    pub takeoff_probe_range: Real,
    /// Slope alignment rate during flight/pre-landing, 1/s.
    pub approach_align_rate: Real,
    /// Speed below which Passing hands over to Braking.
    pub braking_speed: Real,
    pub glue: SlopeGlueConfig,
    pub aerial: AerialConfig,
    pub glide: GlideConfig,
    pub passing: PassingConfig,
    pub probes: LandingProbeConfig,
}

impl Default for JumperConfig {
    fn default() -> Self {
        let takeoff_boost = 5.0;
        Self {
            gravity: 9.81,
            release_push: 6.0,
            takeoff_boost,
            max_takeoff_speed: 40.0,
            seat_offset: Vector::zeros(),
            seat_yaw: 0.0,
            probe_lift: 0.2,
            tangent_probe_range: 2.0,
            takeoff_probe_range: 3.0,
            approach_align_rate: 6.0,
            braking_speed: 1.0,
            glue: SlopeGlueConfig::default(),
            aerial: AerialConfig {
                max_lift: takeoff_boost,
                ..Default::default()
            },
            glide: GlideConfig::default(),
            passing: PassingConfig::default(),
            probes: LandingProbeConfig::default(),
        }
    }
}

/// The run state machine. Owns the body, delegates per-state physics to
/// `flight_model` and the landing detector, and reports transitions and
/// attempt results to a [`RunObserver`].
pub struct Jumper {
    config: JumperConfig,
    gate: GateFrame,
    body: JumperBody,
    state: JumperState,
    detector: LandingDetector,
    flight_time: Real,
    takeoff_point: Vector<Real>,
    /// Set once the landing probe has missed after takeoff; until then the
    /// surface under the body is still the ramp, not a landing target.
    airborne: bool,
    last_summary: Option<RunSummary>,
}

impl Jumper {
    pub fn new(config: JumperConfig, gate: GateFrame) -> Self {
        let detector = LandingDetector {
            config: config.probes,
        };
        let (position, rotation) = seat_pose(&gate, &config);
        let body = JumperBody {
            position,
            rotation,
            velocity: Vector::zeros(),
            angular_velocity: Vector::zeros(),
            kinematic: true,
        };
        Self {
            config,
            gate,
            body,
            state: JumperState::Gate,
            detector,
            flight_time: 0.0,
            takeoff_point: position,
            airborne: false,
            last_summary: None,
        }
    }

    pub fn state(&self) -> JumperState {
        self.state
    }

    pub fn body(&self) -> &JumperBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut JumperBody {
        &mut self.body
    }

    pub fn config(&self) -> &JumperConfig {
        &self.config
    }

    pub fn flight_time(&self) -> Real {
        self.flight_time
    }

    pub fn last_summary(&self) -> Option<RunSummary> {
        self.last_summary
    }

    /// Seats the body back at the gate: state Gate, motion zeroed, body
    /// kinematic, pose parented to the gate frame.
    pub fn reset(&mut self) {
        let (position, rotation) = seat_pose(&self.gate, &self.config);
        self.body.position = position;
        self.body.rotation = rotation;
        self.body.velocity = Vector::zeros();
        self.body.angular_velocity = Vector::zeros();
        self.body.kinematic = true;
        self.state = JumperState::Gate;
        self.flight_time = 0.0;
        self.takeoff_point = position;
        self.airborne = false;
        self.last_summary = None;
    }

    /// Advances exactly one fixed physics step.
    pub fn tick(
        &mut self,
        env: &dyn EnvironmentQuery,
        source: &mut dyn ControlSource,
        dt: Real,
        observer: &mut dyn RunObserver,
    ) {
        let dt = dt.max(0.0);
        let intent = source.intent(env, &self.body, self.state, dt);
        let jump = intent.jump_pressed && source.can_jump();

        // Integrate before state logic so instantaneous velocity changes
        // (release push, takeoff boost) are observable unmodified after the
        // call returns.
        if !self.body.kinematic {
            self.body.velocity.y -= self.config.gravity * dt;
            self.body.position += self.body.velocity * dt;
        }

        match self.state {
            JumperState::Gate => {
                let (position, rotation) = seat_pose(&self.gate, &self.config);
                self.body.position = position;
                self.body.rotation = rotation;
                if jump {
                    self.release_from_gate(env, observer);
                }
            }
            JumperState::Inrun => {
                self.align_with_slope(env, dt);
                if jump {
                    self.take_off(env, observer);
                }
            }
            JumperState::Takeoff => {
                // Pass-through kept distinct for animation/event hooks.
                self.set_state(JumperState::Flight, observer);
            }
            JumperState::Flight => {
                self.flight_time += dt;
                let out = aerial_step(
                    &self.config.aerial,
                    AerialState {
                        velocity: self.body.velocity,
                        rotation: self.body.rotation,
                    },
                    AerialInput {
                        lateral: intent.lateral.clamp(-1.0, 1.0),
                        // Pushing forward pitches the nose down.
                        pitch: -intent.forward.clamp(-1.0, 1.0),
                    },
                    dt,
                );
                self.body.velocity = out.velocity;
                self.body.rotation = out.rotation;
                // Right after takeoff the probe still sees the ramp; only a
                // hit after at least one miss is a landing surface.
                match self.detector.probe_pre_landing(env, self.body.position) {
                    Some(sample) if self.airborne => {
                        self.align_to_approach(&sample, dt);
                        self.set_state(JumperState::PreLanding, observer);
                    }
                    Some(_) => {}
                    None => self.airborne = true,
                }
            }
            JumperState::PreLanding => {
                self.flight_time += dt;
                // A probe miss skips the whole approach adjustment this tick.
                if let Some(sample) = self.detector.probe_approach(env, self.body.position) {
                    self.align_to_approach(&sample, dt);
                    self.body.velocity = glide_step(&self.config.glide, self.body.velocity, dt);
                    if self.detector.is_touchdown(&sample) {
                        self.touch_down(source.seed(), observer);
                    }
                }
            }
            JumperState::Landing => {
                self.follow_ground(env, dt);
                self.set_state(JumperState::Passing, observer);
            }
            JumperState::Passing => {
                self.follow_ground(env, dt);
                self.body.velocity = passing_step(&self.config.passing, self.body.velocity, dt);
                if self.body.speed() < self.config.braking_speed {
                    self.set_state(JumperState::Braking, observer);
                }
            }
            JumperState::Braking => {
                self.body.velocity = Vector::zeros();
                self.body.angular_velocity = Vector::zeros();
            }
        }
    }

    fn release_from_gate(&mut self, env: &dyn EnvironmentQuery, observer: &mut dyn RunObserver) {
        self.set_state(JumperState::Inrun, observer);
        // Detach from the gate frame preserving world pose.
        self.body.kinematic = false;
        if self.config.release_push > 0.0 {
            let tangent = self.ramp_tangent_dir(env);
            self.body.velocity += tangent * self.config.release_push;
        }
    }

    fn take_off(&mut self, env: &dyn EnvironmentQuery, observer: &mut dyn RunObserver) {
        self.set_state(JumperState::Takeoff, observer);
        self.body.kinematic = false;
        let tangent = self.ramp_tangent_dir(env);
        let normal = env
            .probe_down(
                Point::from(self.body.position),
                self.config.takeoff_probe_range,
                SurfaceLayer::Ground,
            )
            .map(|s| s.normal)
            .unwrap_or_else(|| Vector::y());
        self.body.velocity = takeoff_velocity(
            self.body.velocity,
            tangent,
            normal,
            self.config.max_takeoff_speed,
            self.config.takeoff_boost,
        );
        self.takeoff_point = self.body.position;
        self.flight_time = 0.0;
        self.airborne = false;
    }

    fn touch_down(&mut self, seed: u64, observer: &mut dyn RunObserver) {
        let summary = RunSummary {
            distance: (self.body.position - self.takeoff_point).norm(),
            flight_time: self.flight_time,
            grade: grade_from_impact(-self.body.velocity.y),
            seed,
        };
        self.last_summary = Some(summary);
        observer.attempt_finished(&summary);
        self.set_state(JumperState::Landing, observer);
    }

    /// Ramp tangent under the body: gate forward projected onto the sensed
    /// in-run plane, falling back to the gate's axis, then the body's own.
    fn ramp_tangent_dir(&self, env: &dyn EnvironmentQuery) -> Vector<Real> {
        let origin = Point::from(self.body.position + Vector::y() * self.config.probe_lift);
        if let Some(sample) =
            env.probe_down(origin, self.config.tangent_probe_range, SurfaceLayer::Inrun)
        {
            if let Some(tangent) = ramp_tangent(self.gate.forward(), sample.normal) {
                return tangent;
            }
        }
        let fallback = self.gate.forward();
        if fallback.norm_squared() > AXIS_EPS {
            fallback.normalize()
        } else {
            self.body.forward()
        }
    }

    /// In-run slope following: orientation slerped toward the leaned slope
    /// pose, position glued to the terrain skin. Misses skip the tick.
    fn align_with_slope(&mut self, env: &dyn EnvironmentQuery, dt: Real) {
        let origin = Point::from(self.body.position + Vector::y() * self.config.probe_lift);
        let Some(sample) =
            env.probe_down(origin, self.config.tangent_probe_range, SurfaceLayer::Inrun)
        else {
            return;
        };
        if let Some(target) = slope_rotation(
            self.body.forward(),
            sample.normal,
            self.config.glue.pitch_bias,
        ) {
            self.body.rotation = slerp_toward(
                &self.body.rotation,
                &target,
                self.config.glue.rotation_rate,
                dt,
            );
        }
        self.body.position = glue_position(
            &self.config.glue,
            self.body.position,
            sample.point.coords,
            sample.normal,
            dt,
        );
    }

    /// Ground following for the rollout states: position glued to the
    /// surface, orientation leveled to it, and any velocity component into
    /// the surface cancelled so gravity cannot pull the body through.
    fn follow_ground(&mut self, env: &dyn EnvironmentQuery, dt: Real) {
        let origin = Point::from(self.body.position + Vector::y() * self.config.probe_lift);
        let Some(sample) = env.probe_down(
            origin,
            self.config.tangent_probe_range,
            SurfaceLayer::Ground,
        ) else {
            return;
        };
        self.align_to_approach(&sample, dt);
        self.body.position = glue_position(
            &self.config.glue,
            self.body.position,
            sample.point.coords,
            sample.normal,
            dt,
        );
        let into = self.body.velocity.dot(&sample.normal);
        if into < 0.0 {
            self.body.velocity -= sample.normal * into;
        }
    }

    fn align_to_approach(&mut self, sample: &GroundSample, dt: Real) {
        if let Some(target) = slope_rotation(self.body.forward(), sample.normal, 0.0) {
            self.body.rotation = slerp_toward(
                &self.body.rotation,
                &target,
                self.config.approach_align_rate,
                dt,
            );
        }
    }

    fn set_state(&mut self, next: JumperState, observer: &mut dyn RunObserver) {
        if next == self.state {
            return;
        }
        let prev = self.state;
        self.state = next;
        debug!(?prev, ?next, "jumper state change");
        observer.state_changed(prev, next);
    }
}

fn seat_pose(gate: &GateFrame, config: &JumperConfig) -> (Vector<Real>, UnitQuaternion<Real>) {
    let position = gate.position + gate.rotation * config.seat_offset;
    let rotation =
        gate.rotation * UnitQuaternion::from_axis_angle(&Vector::y_axis(), config.seat_yaw);
    (position, rotation)
}

fn grade_from_impact(fall_speed: Real) -> LandingGrade {
    if fall_speed <= 2.0 {
        LandingGrade::Perfect
    } else if fall_speed <= 5.0 {
        LandingGrade::Good
    } else if fall_speed <= 8.0 {
        LandingGrade::Sketchy
    } else {
        LandingGrade::Crash
    }
}
