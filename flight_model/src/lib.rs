//! Per-tick ski-jump physics: slope following, aerial flight, landing glide.
#![forbid(unsafe_code)]

use rapier3d::math::Vector;
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::Real;

const AXIS_EPS: Real = 1.0e-4;

/// Forward axis of a body frame. Identity faces -Z.
pub fn forward_axis(rotation: &UnitQuaternion<Real>) -> Vector<Real> {
    rotation * Vector::new(0.0, 0.0, -1.0)
}

pub fn right_axis(rotation: &UnitQuaternion<Real>) -> Vector<Real> {
    rotation * Vector::x()
}

/// Rotation whose forward axis matches `forward` with `up` kept roughly up.
pub fn look_rotation(forward: Vector<Real>, up: Vector<Real>) -> Option<UnitQuaternion<Real>> {
    if forward.norm_squared() <= AXIS_EPS || up.norm_squared() <= AXIS_EPS {
        return None;
    }
    Some(UnitQuaternion::face_towards(&-forward, &up))
}

pub fn project_on_plane(v: Vector<Real>, normal: Vector<Real>) -> Vector<Real> {
    v - normal * v.dot(&normal)
}

/// Normalized plane projection, `None` when the projection degenerates.
pub fn project_unit(v: Vector<Real>, normal: Vector<Real>) -> Option<Vector<Real>> {
    let projected = project_on_plane(v, normal);
    if projected.norm_squared() > AXIS_EPS {
        Some(projected.normalize())
    } else {
        None
    }
}

/// Forward direction projected onto the sensed ground plane; the direction
/// used to preserve forward speed along terrain.
pub fn ramp_tangent(reference_forward: Vector<Real>, normal: Vector<Real>) -> Option<Vector<Real>> {
    project_unit(reference_forward, normal)
}

pub fn lerp(a: Real, b: Real, t: Real) -> Real {
    a + (b - a) * t
}

pub fn lerp_vector(a: Vector<Real>, b: Vector<Real>, t: Real) -> Vector<Real> {
    a + (b - a) * t
}

/// Rate-scaled slerp step toward a target orientation.
pub fn slerp_toward(
    current: &UnitQuaternion<Real>,
    target: &UnitQuaternion<Real>,
    rate: Real,
    dt: Real,
) -> UnitQuaternion<Real> {
    let t = (rate * dt).clamp(0.0, 1.0);
    current.try_slerp(target, t, 1.0e-6).unwrap_or(*target)
}

/// Target orientation on a slope: slope-projected forward plus the sensed
/// normal, pitched by `pitch_bias` toward the slope. `None` when the
/// projected forward degenerates (straight-down normal).
pub fn slope_rotation(
    body_forward: Vector<Real>,
    normal: Vector<Real>,
    pitch_bias: Real,
) -> Option<UnitQuaternion<Real>> {
    let slope_forward = project_unit(body_forward, normal)?;
    let base = look_rotation(slope_forward, normal)?;
    if pitch_bias == 0.0 {
        return Some(base);
    }
    let lean = UnitQuaternion::from_axis_angle(&Vector::x_axis(), -pitch_bias);
    Some(base * lean)
}

/// In-run terrain glue: position blended toward the contact point offset by
/// a thin skin along the normal.
#[derive(Clone, Copy, Debug)]
pub struct SlopeGlueConfig {
    /// Gap kept between skis and terrain in meters.
    pub skin_offset: Real,
    /// Orientation blend rate in 1/s.
    pub rotation_rate: Real,
    /// Position blend rate in 1/s.
    pub position_rate: Real,
    /// Nose-down lean into the slope in radians.
    pub pitch_bias: Real,
}

impl Default for SlopeGlueConfig {
    fn default() -> Self {
        Self {
            skin_offset: 0.07,
            rotation_rate: 8.0,
            position_rate: 16.0,
            pitch_bias: 10.0_f32.to_radians(),
        }
    }
}

pub fn glue_position(
    config: &SlopeGlueConfig,
    position: Vector<Real>,
    contact_point: Vector<Real>,
    normal: Vector<Real>,
    dt: Real,
) -> Vector<Real> {
    let target = contact_point + normal * config.skin_offset;
    lerp_vector(position, target, (config.position_rate * dt).clamp(0.0, 1.0))
}

#[derive(Clone, Copy, Debug)]
pub struct AerialConfig {
    /// World gravity magnitude the counter-acceleration is computed against.
    pub gravity: Real,
    /// Effective gravity fraction while airborne.
    pub gravity_scale: Real,
    /// Upward acceleration per m/s of forward speed.
    pub lift_per_speed: Real,
    /// Forward speed below which lift cuts out.
    pub min_lift_speed: Real,
    /// Lift acceleration cap; tied to the takeoff boost.
    pub max_lift: Real,
    /// Lateral steering acceleration at full input.
    pub steer_accel: Real,
    pub input_deadzone: Real,
    /// Nose pitch rate at full input, radians/sec.
    pub pitch_rate: Real,
    pub max_speed: Real,
    /// Auto-level blend rate toward upright-forward, 1/s.
    pub level_rate: Real,
}

impl Default for AerialConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            gravity_scale: 0.2,
            lift_per_speed: 0.1,
            min_lift_speed: 1.0,
            max_lift: 5.0,
            steer_accel: 15.0,
            input_deadzone: 0.05,
            pitch_rate: 20.0_f32.to_radians(),
            max_speed: 35.0,
            level_rate: 1.5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AerialInput {
    pub lateral: Real,
    pub pitch: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct AerialState {
    pub velocity: Vector<Real>,
    pub rotation: UnitQuaternion<Real>,
}

/// One airborne step: counter-gravity so the effective pull is
/// `gravity * gravity_scale`, speed-proportional lift, lateral steering,
/// pitch control, a hard speed clamp and a gentle auto-level.
pub fn aerial_step(
    config: &AerialConfig,
    state: AerialState,
    input: AerialInput,
    dt: Real,
) -> AerialState {
    let mut velocity = state.velocity;
    let mut rotation = state.rotation;

    // The integrator applies full gravity; cancel all but the scaled part.
    velocity.y += config.gravity * (1.0 - config.gravity_scale) * dt;

    let forward = forward_axis(&rotation);
    let forward_speed = velocity.dot(&forward);
    if forward_speed > config.min_lift_speed {
        let lift = (forward_speed * config.lift_per_speed).clamp(0.0, config.max_lift);
        velocity.y += lift * dt;
    }

    if input.lateral.abs() > config.input_deadzone {
        velocity += right_axis(&rotation) * input.lateral * config.steer_accel * dt;
    }

    if input.pitch.abs() > config.input_deadzone {
        let delta = UnitQuaternion::from_axis_angle(
            &Vector::x_axis(),
            input.pitch * config.pitch_rate * dt,
        );
        rotation *= delta;
    }

    let speed = velocity.norm();
    if speed > config.max_speed {
        velocity = velocity * (config.max_speed / speed);
    }

    if let Some(level) = look_rotation(
        project_on_plane(forward_axis(&rotation), Vector::y()),
        Vector::y(),
    ) {
        rotation = slerp_toward(&rotation, &level, config.level_rate, dt);
    }

    AerialState { velocity, rotation }
}

/// Takeoff velocity: forward speed along the ramp tangent clamped to
/// `max_speed`, plus an instantaneous boost along the sensed normal.
pub fn takeoff_velocity(
    velocity: Vector<Real>,
    tangent: Vector<Real>,
    normal: Vector<Real>,
    max_speed: Real,
    boost: Real,
) -> Vector<Real> {
    let forward_speed = velocity.dot(&tangent).clamp(0.0, max_speed);
    tangent * forward_speed + normal * boost
}

/// Pre-landing glide damping.
#[derive(Clone, Copy, Debug)]
pub struct GlideConfig {
    /// Fall speed the approach is damped toward, m/s (positive value).
    pub max_fall_speed: Real,
    /// Vertical damping blend rate, 1/s.
    pub damp_rate: Real,
    /// Small stabilizing upward acceleration.
    pub stabilize_accel: Real,
}

impl Default for GlideConfig {
    fn default() -> Self {
        Self {
            max_fall_speed: 5.0,
            damp_rate: 3.0,
            stabilize_accel: 1.5,
        }
    }
}

/// Clamps a fast fall toward the gentle limit and applies the stabilizing
/// lift. Slower falls pass through untouched apart from the lift.
pub fn glide_step(config: &GlideConfig, velocity: Vector<Real>, dt: Real) -> Vector<Real> {
    let mut velocity = velocity;
    if velocity.y < -config.max_fall_speed {
        velocity.y = lerp(
            velocity.y,
            -config.max_fall_speed,
            (config.damp_rate * dt).clamp(0.0, 1.0),
        );
    }
    velocity.y += config.stabilize_accel * dt;
    velocity
}

/// Post-landing horizontal run-out damping.
#[derive(Clone, Copy, Debug)]
pub struct PassingConfig {
    /// Velocity blend rate toward rest, 1/s.
    pub damp_rate: Real,
}

impl Default for PassingConfig {
    fn default() -> Self {
        Self { damp_rate: 1.5 }
    }
}

pub fn passing_step(config: &PassingConfig, velocity: Vector<Real>, dt: Real) -> Vector<Real> {
    lerp_vector(
        velocity,
        Vector::zeros(),
        (config.damp_rate * dt).clamp(0.0, 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: Real = 1.0 / 60.0;

    #[test]
    fn takeoff_clamps_earned_speed() {
        let tangent = Vector::new(0.0, 0.0, -1.0);
        let v = takeoff_velocity(tangent * 10.0, tangent, Vector::y(), 8.0, 3.0);
        assert!((v.dot(&tangent) - 8.0).abs() < 1.0e-5);
        assert!((v.y - 3.0).abs() < 1.0e-5);
    }

    #[test]
    fn takeoff_never_goes_backward() {
        let tangent = Vector::new(0.0, 0.0, -1.0);
        let v = takeoff_velocity(tangent * -4.0, tangent, Vector::y(), 8.0, 3.0);
        assert!(v.dot(&tangent).abs() < 1.0e-5);
    }

    #[test]
    fn ramp_tangent_follows_slope() {
        let normal = Vector::new(0.0, 1.0, -1.0).normalize();
        let tangent = ramp_tangent(Vector::new(0.0, 0.0, -1.0), normal).expect("tangent");
        assert!((tangent.norm() - 1.0).abs() < 1.0e-5);
        assert!(tangent.dot(&normal).abs() < 1.0e-5);
        assert!(tangent.z < 0.0);
        assert!(tangent.y < 0.0, "downhill forward should descend");
    }

    #[test]
    fn ramp_tangent_degenerates_on_parallel_normal() {
        assert!(ramp_tangent(Vector::new(0.0, 0.0, -1.0), Vector::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn aerial_counter_gravity_softens_fall() {
        let config = AerialConfig::default();
        let state = AerialState {
            velocity: Vector::new(0.0, -2.0, -20.0),
            rotation: UnitQuaternion::identity(),
        };
        let out = aerial_step(&config, state, AerialInput::default(), DT);
        // Counter-gravity plus lift both push up.
        assert!(out.velocity.y > state.velocity.y);
    }

    #[test]
    fn aerial_clamps_speed() {
        let config = AerialConfig {
            max_speed: 10.0,
            ..Default::default()
        };
        let state = AerialState {
            velocity: Vector::new(0.0, 0.0, -50.0),
            rotation: UnitQuaternion::identity(),
        };
        let out = aerial_step(&config, state, AerialInput::default(), DT);
        assert!(out.velocity.norm() <= 10.0 + 1.0e-4);
    }

    #[test]
    fn aerial_steering_adds_lateral_velocity() {
        let config = AerialConfig::default();
        let state = AerialState {
            velocity: Vector::new(0.0, 0.0, -20.0),
            rotation: UnitQuaternion::identity(),
        };
        let out = aerial_step(
            &config,
            state,
            AerialInput {
                lateral: 1.0,
                pitch: 0.0,
            },
            DT,
        );
        assert!(out.velocity.x > 0.0);
    }

    #[test]
    fn glide_damps_only_fast_falls() {
        let config = GlideConfig::default();
        let fast = glide_step(&config, Vector::new(0.0, -12.0, -10.0), DT);
        assert!(fast.y > -12.0);
        let slow = glide_step(&config, Vector::new(0.0, -2.0, -10.0), DT);
        assert!((slow.y - (-2.0 + config.stabilize_accel * DT)).abs() < 1.0e-5);
    }

    #[test]
    fn passing_decays_toward_rest() {
        let config = PassingConfig::default();
        let mut v = Vector::new(3.0, 0.0, -6.0);
        for _ in 0..600 {
            v = passing_step(&config, v, DT);
        }
        assert!(v.norm() < 0.05);
    }

    #[test]
    fn slope_rotation_faces_downhill() {
        let normal = Vector::new(0.0, 1.0, -1.0).normalize();
        let rotation =
            slope_rotation(Vector::new(0.0, 0.0, -1.0), normal, 0.0).expect("rotation");
        let forward = forward_axis(&rotation);
        assert!(forward.z < 0.0);
        assert!(forward.y < 0.0);
    }
}
