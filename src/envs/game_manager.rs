use std::collections::HashMap;

use nalgebra::Vector2;
use rand::Rng;
use tracing::trace;

use super::{
    entity::{Entity, EntityId, Role},
    perception::{observe, RayFan, RayObservation},
    physics::{BallSpec, BodyHandle, PhysicsWorld},
};

/// Owns the entity arena for one episode and the body -> entity index.
pub struct GameManager {
    width: f32,
    height: f32,
    pivot_max_force: f32,
    entities: Vec<Entity>,
    by_body: HashMap<BodyHandle, usize>,
    next_prey_id: i32,
    next_predator_id: i32,
}

impl GameManager {
    pub fn new(world: &mut PhysicsWorld, width: f32, height: f32, pivot_max_force: f32) -> Self {
        world.add_boundary(width, height);
        Self {
            width,
            height,
            pivot_max_force,
            entities: Vec::new(),
            by_body: HashMap::new(),
            next_prey_id: Role::Prey.traits().first_id,
            next_predator_id: Role::Predator.traits().first_id,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn add_prey(&mut self, world: &mut PhysicsWorld, position: Vector2<f32>) -> EntityId {
        self.spawn(world, Role::Prey, position)
    }

    pub fn add_predator(&mut self, world: &mut PhysicsWorld, position: Vector2<f32>) -> EntityId {
        self.spawn(world, Role::Predator, position)
    }

    /// Spawns at a uniformly random point of the arena.
    pub fn randomly_place<R: Rng + ?Sized>(
        &mut self,
        world: &mut PhysicsWorld,
        is_prey: bool,
        rng: &mut R,
    ) -> EntityId {
        let position = Vector2::new(
            rng.gen_range(0.0..=self.width),
            rng.gen_range(0.0..=self.height),
        );
        if is_prey {
            self.add_prey(world, position)
        } else {
            self.add_predator(world, position)
        }
    }

    fn spawn(&mut self, world: &mut PhysicsWorld, role: Role, position: Vector2<f32>) -> EntityId {
        let traits = role.traits();
        let counter = match role {
            Role::Prey => &mut self.next_prey_id,
            Role::Predator => &mut self.next_predator_id,
        };
        let id = EntityId(*counter);
        *counter += traits.id_step;

        let body = world.add_ball(BallSpec {
            position,
            angle: 0.0,
            radius: traits.radius,
            category: traits.category,
            max_velocity: traits.max_velocity,
            pivot_max_force: self.pivot_max_force,
        });
        self.by_body.insert(body, self.entities.len());
        self.entities.push(Entity::new(id, role, body));
        trace!(%id, %role, x = position.x, y = position.y, "spawned");
        id
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    pub fn entity_by_body(&self, body: BodyHandle) -> Option<&Entity> {
        self.by_body.get(&body).map(|&i| &self.entities[i])
    }

    pub fn observe(&self, world: &PhysicsWorld, id: EntityId, fan: &RayFan) -> Option<RayObservation> {
        self.entity(id).map(|entity| observe(entity, world, fan))
    }

    pub fn observe_all(&self, world: &PhysicsWorld, fan: &RayFan) -> Vec<(EntityId, RayObservation)> {
        self.entities
            .iter()
            .map(|entity| (entity.id, observe(entity, world, fan)))
            .collect()
    }

    pub fn wander_all<R: Rng + ?Sized>(&mut self, world: &mut PhysicsWorld, force: f32, rng: &mut R) {
        for entity in self.entities.iter_mut() {
            entity.wander(world, force, rng);
        }
    }

    /// Advances physics by one tick and counts every predator/prey contact
    /// that began on both participants.
    pub fn tick(&mut self, world: &mut PhysicsWorld) {
        for (a, b) in world.step() {
            for body in [a, b] {
                if let Some(&i) = self.by_body.get(&body) {
                    self.entities[i].contact_count += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn setup() -> (PhysicsWorld, GameManager) {
        let mut world = PhysicsWorld::new(1.0 / 30.0);
        let gm = GameManager::new(&mut world, 1200.0, 800.0, 700.0);
        (world, gm)
    }

    #[test]
    fn identities_diverge_by_role() {
        let (mut world, mut gm) = setup();
        let ids = [
            gm.add_prey(&mut world, Vector2::new(800.0, 200.0)),
            gm.add_predator(&mut world, Vector2::new(400.0, 200.0)),
            gm.add_prey(&mut world, Vector2::new(800.0, 400.0)),
            gm.add_predator(&mut world, Vector2::new(400.0, 400.0)),
        ];
        assert_eq!(ids.map(|id| id.0), [10, -10, 11, -11]);
        for id in ids {
            assert_eq!(gm.entity(id).unwrap().role, id.role());
        }
    }

    #[test]
    fn body_index_resolves_entities() {
        let (mut world, mut gm) = setup();
        let id = gm.add_predator(&mut world, Vector2::new(100.0, 100.0));
        let body = gm.entity(id).unwrap().body;
        assert_eq!(gm.entity_by_body(body).unwrap().id, id);
        assert_eq!(gm.entity(id).unwrap().radius, 30.0);
    }

    #[test]
    fn random_placement_stays_in_arena() {
        let (mut world, mut gm) = setup();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for i in 0..10 {
            let id = gm.randomly_place(&mut world, i % 2 == 0, &mut rng);
            let pos = world.position(gm.entity(id).unwrap().body);
            assert!((0.0..=1200.0).contains(&pos.x));
            assert!((0.0..=800.0).contains(&pos.y));
        }
        assert_eq!(gm.entities().len(), 10);
    }

    #[test]
    fn contact_increments_both_sides_only() {
        let (mut world, mut gm) = setup();
        let predator = gm.add_predator(&mut world, Vector2::new(300.0, 300.0));
        let prey = gm.add_prey(&mut world, Vector2::new(900.0, 300.0));
        let bystander = gm.add_predator(&mut world, Vector2::new(600.0, 700.0));
        let prey_body = gm.entity(prey).unwrap().body;
        world.set_position(prey_body, Vector2::new(300.0, 300.0));
        gm.tick(&mut world);
        assert!(gm.entity(predator).unwrap().contact_count > 0);
        assert!(gm.entity(prey).unwrap().contact_count > 0);
        assert_eq!(gm.entity(bystander).unwrap().contact_count, 0);
    }

    #[test]
    fn observe_all_covers_every_entity() {
        let (mut world, mut gm) = setup();
        gm.add_predator(&mut world, Vector2::new(400.0, 400.0));
        gm.add_prey(&mut world, Vector2::new(800.0, 400.0));
        let fan = RayFan {
            num_rays: 20,
            length: 500.0,
            selection: Default::default(),
        };
        let all = gm.observe_all(&world, &fan);
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|(_, obs)| obs.0.len() == 40));
    }
}
