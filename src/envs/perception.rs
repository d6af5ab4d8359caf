use std::f32::consts::{FRAC_PI_2, PI};

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use super::{
    entity::Entity,
    physics::{Category, PhysicsWorld, RayHit},
    Observation,
};

/// Which non-self hit along a ray is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaySelection {
    /// Last shape crossed before the ray's end.
    #[default]
    Farthest,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayFan {
    pub num_rays: usize,
    pub length: f32,
    pub selection: RaySelection,
}

impl RayFan {
    /// Ray directions span 180 degrees centred on `heading`, both edges included.
    pub fn angles(&self, heading: f32) -> impl Iterator<Item = f32> + '_ {
        let increment = if self.num_rays > 1 {
            PI / (self.num_rays - 1) as f32
        } else {
            0.0
        };
        (0..self.num_rays).map(move |i| heading - FRAC_PI_2 + i as f32 * increment)
    }

    fn pick(&self, hits: &[RayHit]) -> Option<RayHit> {
        match self.selection {
            RaySelection::Farthest => hits.iter().rev().next().copied(),
            RaySelection::Nearest => hits.first().copied(),
        }
    }
}

/// Interleaved `(category, distance)` pairs, one per ray.
#[derive(Debug, Clone, PartialEq)]
pub struct RayObservation(pub Box<[f32]>);

impl RayObservation {
    pub fn num_rays(&self) -> usize {
        self.0.len() / 2
    }

    pub fn ray(&self, i: usize) -> (f32, f32) {
        (self.0[2 * i], self.0[2 * i + 1])
    }

    pub fn count_category(&self, category: Category) -> usize {
        (0..self.num_rays())
            .filter(|i| self.ray(*i).0 == category.code())
            .count()
    }
}

impl Observation for RayObservation {
    fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Casts the fan for one entity. Pure read of the world.
pub fn observe(entity: &Entity, world: &PhysicsWorld, fan: &RayFan) -> RayObservation {
    let origin = world.position(entity.body);
    let heading = world.angle(entity.body);
    let mut out = Vec::with_capacity(2 * fan.num_rays);
    for angle in fan.angles(heading) {
        let end = origin + Vector2::new(angle.cos(), angle.sin()) * fan.length;
        let hits = world
            .segment_query(origin, end)
            .into_iter()
            .filter(|hit| hit.body != Some(entity.body))
            .collect::<Vec<_>>();
        match fan.pick(&hits) {
            Some(hit) => {
                out.push(hit.category.code());
                out.push(hit.alpha * fan.length);
            }
            None => {
                out.push(Category::Open.code());
                out.push(fan.length);
            }
        }
    }
    RayObservation(out.into_boxed_slice())
}
