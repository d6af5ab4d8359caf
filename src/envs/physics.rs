use std::collections::HashMap;

use crossbeam_channel::Receiver;
use derive_more::Display;
use nalgebra::Vector2;
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::hparams::{BODY_MASS, WALL_FRICTION};

pub type BodyHandle = RigidBodyHandle;

/// Collision tag carried by every shape and reported by ray hits.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[display(fmt = "predator")]
    Predator = 1,
    #[display(fmt = "prey")]
    Prey = 2,
    /// Nothing hit, or a boundary wall.
    #[display(fmt = "open")]
    Open = 4,
}

impl Category {
    pub fn code(self) -> f32 {
        self as u8 as f32
    }

    fn from_user_data(data: u128) -> Self {
        match data {
            1 => Self::Predator,
            2 => Self::Prey,
            _ => Self::Open,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BallSpec {
    pub position: Vector2<f32>,
    pub angle: f32,
    pub radius: f32,
    pub category: Category,
    pub max_velocity: f32,
    pub pivot_max_force: f32,
}

#[derive(Debug, Clone, Copy)]
struct MotionLimits {
    mass: f32,
    max_velocity: f32,
    pivot_max_force: f32,
    pending_force: Vector2<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Fraction of the queried segment at which the hit occurs.
    pub alpha: f32,
    pub body: Option<BodyHandle>,
    pub category: Category,
}

/// One episode's physics context. Owns every rapier set; nothing is global.
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    events: ChannelEventCollector,
    collision_recv: Receiver<CollisionEvent>,
    contact_force_recv: Receiver<ContactForceEvent>,
    limits: HashMap<BodyHandle, MotionLimits>,
}

impl PhysicsWorld {
    pub fn new(dt: f32) -> Self {
        let (collision_send, collision_recv) = crossbeam_channel::unbounded();
        let (contact_force_send, contact_force_recv) = crossbeam_channel::unbounded();
        let integration_parameters = IntegrationParameters {
            dt,
            ..Default::default()
        };
        Self {
            gravity: vector![0.0, 0.0],
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            events: ChannelEventCollector::new(collision_send, contact_force_send),
            collision_recv,
            contact_force_recv,
            limits: HashMap::new(),
        }
    }

    pub fn dt(&self) -> f32 {
        self.integration_parameters.dt
    }

    /// Four static segments enclosing `[0, width] x [0, height]`.
    pub fn add_boundary(&mut self, width: f32, height: f32) {
        let corners = [
            (point![0.0, 0.0], point![width, 0.0]),
            (point![0.0, 0.0], point![0.0, height]),
            (point![0.0, height], point![width, height]),
            (point![width, 0.0], point![width, height]),
        ];
        for (a, b) in corners {
            let wall = ColliderBuilder::segment(a, b)
                .friction(WALL_FRICTION)
                .user_data(Category::Open as u128)
                .build();
            self.colliders.insert(wall);
        }
        self.refresh_queries();
    }

    pub fn add_ball(&mut self, spec: BallSpec) -> BodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(spec.position)
            .rotation(spec.angle)
            .can_sleep(false)
            .build();
        let handle = self.bodies.insert(body);
        let collider = ColliderBuilder::ball(spec.radius)
            .mass(BODY_MASS)
            .user_data(spec.category as u128)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.limits.insert(
            handle,
            MotionLimits {
                mass: BODY_MASS,
                max_velocity: spec.max_velocity,
                pivot_max_force: spec.pivot_max_force,
                pending_force: Vector2::zeros(),
            },
        );
        self.refresh_queries();
        handle
    }

    pub fn position(&self, handle: BodyHandle) -> Vector2<f32> {
        self.bodies
            .get(handle)
            .map(|b| *b.translation())
            .unwrap_or_else(Vector2::zeros)
    }

    pub fn angle(&self, handle: BodyHandle) -> f32 {
        self.bodies
            .get(handle)
            .map(|b| b.rotation().angle())
            .unwrap_or_default()
    }

    pub fn velocity(&self, handle: BodyHandle) -> Vector2<f32> {
        self.bodies
            .get(handle)
            .map(|b| *b.linvel())
            .unwrap_or_else(Vector2::zeros)
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, linvel: Vector2<f32>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(linvel, true);
        }
    }

    /// Teleports a body, keeping its attached shapes in sync for queries.
    pub fn set_position(&mut self, handle: BodyHandle, position: Vector2<f32>) {
        let angle = self.angle(handle);
        self.set_pose(handle, position, angle);
        self.refresh_queries();
    }

    pub fn rotate(&mut self, handle: BodyHandle, delta: f32) {
        let position = self.position(handle);
        let angle = self.angle(handle);
        self.set_pose(handle, position, angle + delta);
    }

    fn set_pose(&mut self, handle: BodyHandle, position: Vector2<f32>, angle: f32) {
        let pose = Isometry::new(position, angle);
        let Some(body) = self.bodies.get_mut(handle) else {
            return;
        };
        body.set_position(pose, true);
        for collider in body.colliders().to_vec() {
            if let Some(collider) = self.colliders.get_mut(collider) {
                collider.set_position(pose);
            }
        }
    }

    /// Force in the body's own frame, applied at its centre for the next tick only.
    pub fn apply_local_force(&mut self, handle: BodyHandle, local_force: Vector2<f32>) {
        let Some(body) = self.bodies.get_mut(handle) else {
            return;
        };
        let force = body.rotation() * local_force;
        body.add_force(force, true);
        if let Some(limits) = self.limits.get_mut(&handle) {
            limits.pending_force += force;
        }
    }

    /// Advances one tick and returns the predator/prey body pairs whose contact began.
    pub fn step(&mut self) -> Vec<(BodyHandle, BodyHandle)> {
        let dt = self.dt();
        self.apply_pivot_friction(dt);

        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &self.events,
        );

        for (handle, limits) in self.limits.iter_mut() {
            limits.pending_force = Vector2::zeros();
            let Some(body) = self.bodies.get_mut(*handle) else {
                continue;
            };
            body.reset_forces(true);
            let speed = body.linvel().norm();
            if speed > limits.max_velocity {
                let clamped = body.linvel() * (limits.max_velocity / speed);
                body.set_linvel(clamped, true);
            }
        }
        self.refresh_queries();

        while self.contact_force_recv.try_recv().is_ok() {}
        let mut began = Vec::new();
        while let Ok(event) = self.collision_recv.try_recv() {
            if let CollisionEvent::Started(c1, c2, _) = event {
                if let Some(pair) = self.predator_prey_pair(c1, c2) {
                    began.push(pair);
                }
            }
        }
        began
    }

    // A zero-bias pivot pinned to the static world: it only ever removes linear
    // velocity, and never more than `pivot_max_force * dt` per tick.
    fn apply_pivot_friction(&mut self, dt: f32) {
        for (handle, limits) in self.limits.iter() {
            let Some(body) = self.bodies.get_mut(*handle) else {
                continue;
            };
            let predicted = body.linvel() + limits.pending_force * (dt / limits.mass);
            let mut impulse = -predicted * limits.mass;
            let max_impulse = limits.pivot_max_force * dt;
            let magnitude = impulse.norm();
            if magnitude > max_impulse {
                impulse *= max_impulse / magnitude;
            }
            let linvel = body.linvel() + impulse / limits.mass;
            body.set_linvel(linvel, true);
        }
    }

    fn predator_prey_pair(
        &self,
        c1: ColliderHandle,
        c2: ColliderHandle,
    ) -> Option<(BodyHandle, BodyHandle)> {
        let a = self.colliders.get(c1)?;
        let b = self.colliders.get(c2)?;
        let categories = (
            Category::from_user_data(a.user_data),
            Category::from_user_data(b.user_data),
        );
        match categories {
            (Category::Predator, Category::Prey) | (Category::Prey, Category::Predator) => {
                Some((a.parent()?, b.parent()?))
            }
            _ => None,
        }
    }

    fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.bodies, &self.colliders);
    }

    /// Every shape crossed by the segment `from -> to`, nearest first.
    pub fn segment_query(&self, from: Vector2<f32>, to: Vector2<f32>) -> Vec<RayHit> {
        let ray = Ray::new(Point::from(from), to - from);
        let mut hits = Vec::new();
        self.query_pipeline.intersections_with_ray(
            &self.bodies,
            &self.colliders,
            &ray,
            1.0,
            true,
            QueryFilter::default(),
            |handle, intersection| {
                if let Some(collider) = self.colliders.get(handle) {
                    hits.push(RayHit {
                        alpha: intersection.toi,
                        body: collider.parent(),
                        category: Category::from_user_data(collider.user_data),
                    });
                }
                true
            },
        );
        hits.sort_by(|a, b| a.alpha.total_cmp(&b.alpha));
        hits
    }
}
