use derive_more::Display;
use nalgebra::Vector2;
use rand::Rng;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};

use crate::hparams::{
    BODY_HEALTH, PREDATOR_MAX_VEL, PREDATOR_RADIUS, PREY_MAX_VEL, PREY_RADIUS,
};

use super::physics::{BodyHandle, Category, PhysicsWorld};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[display(fmt = "predator")]
    Predator,
    #[display(fmt = "prey")]
    Prey,
}

/// Per-role constants. Looked up, never overridden per entity.
#[derive(Debug, Clone, Copy)]
pub struct RoleTraits {
    pub radius: f32,
    pub max_velocity: f32,
    pub category: Category,
    pub first_id: i32,
    pub id_step: i32,
}

const PREDATOR_TRAITS: RoleTraits = RoleTraits {
    radius: PREDATOR_RADIUS,
    max_velocity: PREDATOR_MAX_VEL,
    category: Category::Predator,
    first_id: -10,
    id_step: -1,
};

const PREY_TRAITS: RoleTraits = RoleTraits {
    radius: PREY_RADIUS,
    max_velocity: PREY_MAX_VEL,
    category: Category::Prey,
    first_id: 10,
    id_step: 1,
};

impl Role {
    pub fn traits(self) -> &'static RoleTraits {
        match self {
            Self::Predator => &PREDATOR_TRAITS,
            Self::Prey => &PREY_TRAITS,
        }
    }

    pub fn radius(self) -> f32 {
        self.traits().radius
    }

    pub fn category(self) -> Category {
        self.traits().category
    }
}

/// Signed identity: positive for prey, negative for predators.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub i32);

impl EntityId {
    pub fn role(self) -> Role {
        if self.0 < 0 {
            Role::Predator
        } else {
            Role::Prey
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WanderState {
    pub angle: f32,
    pub strength: f32,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub role: Role,
    pub body: BodyHandle,
    pub radius: f32,
    pub health: f32,
    pub contact_count: u32,
    pub wander: WanderState,
}

impl Entity {
    pub fn new(id: EntityId, role: Role, body: BodyHandle) -> Self {
        Self {
            id,
            role,
            body,
            radius: role.radius(),
            health: BODY_HEALTH,
            contact_count: 0,
            wander: WanderState::default(),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }

    pub fn rotate(&self, world: &mut PhysicsWorld, angle: f32) {
        world.rotate(self.body, angle);
    }

    pub fn thrust(&self, world: &mut PhysicsWorld, force: f32) {
        world.apply_local_force(self.body, Vector2::new(force, 0.0));
    }

    /// Scripted random walk for baselines that are not driven by a policy.
    pub fn wander<R: Rng + ?Sized>(&mut self, world: &mut PhysicsWorld, force: f32, rng: &mut R) {
        let unit = Uniform::new_inclusive(-1.0f32, 1.0);
        self.wander.angle += rng.sample(unit) * 0.1;
        self.wander.strength += rng.sample(unit) * 1000.0;
        if self.wander.strength > 1500.0 {
            self.wander.strength = 0.0;
        }
        self.thrust(world, force);
        self.rotate(world, self.wander.angle * 0.01);
    }
}
