//! Game builder and headless frame driver.
//!
//! [`Game`] wraps a [`World`] and drives the frame phases in a fixed order:
//! startup systems (once), fixed-update steps, per-frame systems, the
//! scene-graph `update` dispatch, then `draw`. There is no window or event
//! loop here — callers feed deltas into [`step`](Game::step), which makes
//! the whole pipeline deterministic under test.
//!
//! # Example
//!
//! ```ignore
//! use kvika::prelude::*;
//!
//! fn main() {
//!     let mut game = Game::new()
//!         .setup(|world| {
//!             world.add([
//!                 Comp::new("pos").field("pos", Vec2::ZERO).into(),
//!                 "player".into(),
//!             ]).unwrap();
//!         })
//!         .system(|world| {
//!             let dt = world.resource::<Time>().delta_secs();
//!             log::debug!("frame dt = {dt}");
//!         });
//!     game.run_frames(60, 1.0 / 60.0);
//! }
//! ```

use std::mem;

use crate::scene::World;
use crate::time::Time;

/// A plugin bundles related components, resources, and systems.
pub trait Plugin {
    fn build(&self, game: &mut Game);
}

type System = Box<dyn FnMut(&mut World)>;

/// The entry point: owns the [`World`] and steps it frame by frame.
pub struct Game {
    world: World,
    startup_systems: Vec<System>,
    systems: Vec<System>,
    started: bool,
}

impl Game {
    /// A game with an empty world and a 60 Hz fixed clock.
    pub fn new() -> Self {
        let mut world = World::new();
        world.insert_resource(Time::default());
        Self {
            world,
            startup_systems: Vec::new(),
            systems: Vec::new(),
            started: false,
        }
    }

    /// Change the fixed-update rate (builder pattern).
    pub fn fixed_rate(mut self, hz: f32) -> Self {
        self.world.insert_resource(Time::new(hz));
        self
    }

    /// Register a startup system that runs once, on the first step.
    pub fn setup(mut self, system: impl FnMut(&mut World) + 'static) -> Self {
        self.startup_systems.push(Box::new(system));
        self
    }

    /// Register a system that runs every frame, before scene dispatch.
    pub fn system(mut self, system: impl FnMut(&mut World) + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    /// Apply a plugin, which can register resources and systems.
    pub fn plugin(mut self, plugin: impl Plugin) -> Self {
        plugin.build(&mut self);
        self
    }

    /// Insert a resource (non-consuming, for use by plugins).
    pub fn insert_resource<T: 'static>(&mut self, value: T) {
        self.world.insert_resource(value);
    }

    /// Register a startup system (non-consuming, for use by plugins).
    pub fn add_startup_system(&mut self, system: impl FnMut(&mut World) + 'static) {
        self.startup_systems.push(Box::new(system));
    }

    /// Register a per-frame system (non-consuming, for use by plugins).
    pub fn add_system(&mut self, system: impl FnMut(&mut World) + 'static) {
        self.systems.push(Box::new(system));
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Advance one frame: startup (first call only), fixed steps, frame
    /// systems, scene `update`, scene `draw`.
    pub fn step(&mut self, dt: f32) {
        if !self.started {
            self.started = true;
            log::info!("starting game loop");
            let mut startup = mem::take(&mut self.startup_systems);
            for system in &mut startup {
                system(&mut self.world);
            }
        }

        self.world.resource_mut::<Time>().advance(dt);
        let fixed_dt = self.world.resource::<Time>().fixed_delta_secs();
        while self.world.resource_mut::<Time>().consume_fixed_step() {
            self.world.fixed_update(fixed_dt);
        }

        // Systems take the world mutably, so they are lifted out for the
        // duration of the pass.
        let mut systems = mem::take(&mut self.systems);
        for system in &mut systems {
            system(&mut self.world);
        }
        systems.append(&mut self.systems);
        self.systems = systems;

        self.world.update(dt);
        self.world.draw();
    }

    /// Step `frames` times with a constant delta.
    pub fn run_frames(&mut self, frames: u32, dt: f32) {
        for _ in 0..frames {
            self.step(dt);
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}
