//! Swarm — headless composition demo.
//!
//! A ring of drones closes in on the core; each drone despawns when it
//! arrives. A live query keeps a running drone count without re-scanning
//! the scene, and the whole thing runs frame-by-frame with no window.
//!
//! Run with: `RUST_LOG=info cargo run -p kvika --example swarm`

use kvika::prelude::*;

const DRONES: u32 = 8;
const RING_RADIUS: f32 = 240.0;
const DRONE_SPEED: f32 = 60.0;

// ── Components ──────────────────────────────────────────────────────────

fn pos(at: Vec2) -> Comp {
    Comp::new("pos").field("pos", at)
}

/// Flies toward the origin; despawns on arrival.
fn seeker() -> Comp {
    Comp::new("seeker")
        .require("pos")
        .on_update(|world, e, dt| {
            let at = *world.field::<Vec2>(e, "pos").unwrap();
            let next = at - at.normalize_or_zero() * DRONE_SPEED * dt;
            if next.length() < 5.0 {
                log::info!("{e} reached the core");
                world.destroy(e).unwrap();
            } else {
                *world.field_mut::<Vec2>(e, "pos").unwrap() = next;
            }
        })
}

// ── State ────────────────────────────────────────────────────────────────

struct Drones(LiveQuery);

fn main() {
    env_logger::init();

    let mut game = Game::new()
        .fixed_rate(50.0)
        .setup(|world| {
            world
                .add([pos(Vec2::ZERO).into(), "core".into()])
                .unwrap();
            for i in 0..DRONES {
                let angle = i as f32 * std::f32::consts::TAU / DRONES as f32;
                world
                    .add([
                        pos(Vec2::from_angle(angle) * RING_RADIUS).into(),
                        seeker().into(),
                        "drone".into(),
                    ])
                    .unwrap();
            }
            let root = world.root();
            let query = world.get_live(root, &["drone"], GetOpts::default()).unwrap();
            world.insert_resource(Drones(query));
        })
        .system(|world| {
            let frame = world.resource::<Time>().frame_count();
            if frame % 50 == 0 {
                log::info!("frame {frame}: {} drones inbound", world.resource::<Drones>().0.len());
            }
        });

    game.run_frames(300, 1.0 / 50.0);

    let remaining = game.world().resource::<Drones>().0.len();
    log::info!("simulation over: {remaining} drones remaining");
}
