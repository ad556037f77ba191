//! Rapier world wrapper and the ray-cast contract used by the jumper sim.
#![forbid(unsafe_code)]

use rapier3d::prelude::*;

/// Which collision surfaces a probe is interested in.
///
/// The in-run track and the landing hill live on separate layers so the
/// slope-alignment probes only ever see the track while the landing probes
/// only ever see the hill. A solid may belong to both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceLayer {
    Ground,
    Inrun,
}

impl SurfaceLayer {
    pub fn group(self) -> Group {
        match self {
            SurfaceLayer::Ground => Group::GROUP_1,
            SurfaceLayer::Inrun => Group::GROUP_2,
        }
    }
}

pub fn membership_of(layers: &[SurfaceLayer]) -> Group {
    let mut group = Group::NONE;
    for layer in layers {
        group |= layer.group();
    }
    group
}

/// Result of a single environment ray-cast. Recomputed every tick it is
/// needed, never persisted.
#[derive(Clone, Copy, Debug)]
pub struct GroundSample {
    pub point: Point<Real>,
    pub normal: Vector<Real>,
    pub distance: Real,
}

/// Ray-cast access to the collision geometry. A probe miss is a normal
/// branch, not a failure.
pub trait EnvironmentQuery {
    fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        layer: SurfaceLayer,
    ) -> Option<GroundSample>;

    fn probe_down(
        &self,
        origin: Point<Real>,
        max_distance: Real,
        layer: SurfaceLayer,
    ) -> Option<GroundSample> {
        self.cast_ray(origin, -Vector::y(), max_distance, layer)
    }
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<Real>) -> Self {
        Self {
            gravity,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn query_pipeline(&self) -> &QueryPipeline {
        &self.query_pipeline
    }

    pub fn step(&mut self, dt: Real) {
        self.integration_parameters.dt = dt;
        let physics_hooks = ();
        let event_handler = ();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &physics_hooks,
            &event_handler,
        );
        self.query_pipeline.update(&self.colliders);
    }

    pub fn insert_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        let handle = self.colliders.insert(collider);
        self.query_pipeline.update(&self.colliders);
        handle
    }

    /// Inserts a static collider reachable from probes of the given layers.
    pub fn insert_surface(
        &mut self,
        collider: Collider,
        layers: &[SurfaceLayer],
    ) -> ColliderHandle {
        let mut collider = collider;
        collider.set_collision_groups(InteractionGroups::new(membership_of(layers), Group::ALL));
        self.insert_static_collider(collider)
    }
}

impl EnvironmentQuery for PhysicsWorld {
    fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        layer: SurfaceLayer,
    ) -> Option<GroundSample> {
        let ray = Ray::new(origin, direction);
        let filter =
            QueryFilter::default().groups(InteractionGroups::new(Group::ALL, layer.group()));
        let mut result = self.query_pipeline.cast_ray_and_get_normal(
            &self.bodies,
            &self.colliders,
            &ray,
            max_distance,
            true,
            filter,
        );
        // An origin inside a solid reports a zero-length hit with no usable
        // normal; re-cast against boundaries only.
        if matches!(result, Some((_, hit)) if hit.time_of_impact == 0.0) {
            result = self.query_pipeline.cast_ray_and_get_normal(
                &self.bodies,
                &self.colliders,
                &ray,
                max_distance,
                false,
                filter,
            );
        }
        let (_, hit) = result?;
        Some(GroundSample {
            point: ray.point_at(hit.time_of_impact),
            normal: hit.normal,
            distance: hit.time_of_impact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_world() -> PhysicsWorld {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let floor = ColliderBuilder::cuboid(10.0, 0.1, 10.0)
            .translation(vector![0.0, -0.1, 0.0])
            .build();
        world.insert_surface(floor, &[SurfaceLayer::Ground]);
        world
    }

    #[test]
    fn down_probe_reports_distance_and_normal() {
        let world = flat_world();
        let sample = world
            .probe_down(point![0.0, 2.0, 0.0], 5.0, SurfaceLayer::Ground)
            .expect("floor below");
        assert!((sample.distance - 2.0).abs() < 1.0e-3);
        assert!(sample.normal.y > 0.99);
        assert!(sample.point.y.abs() < 1.0e-3);
    }

    #[test]
    fn layers_do_not_leak_across_probes() {
        let world = flat_world();
        assert!(world
            .probe_down(point![0.0, 2.0, 0.0], 5.0, SurfaceLayer::Inrun)
            .is_none());
    }

    #[test]
    fn probe_miss_is_none() {
        let world = flat_world();
        assert!(world
            .probe_down(point![0.0, 2.0, 0.0], 1.0, SurfaceLayer::Ground)
            .is_none());
    }
}
