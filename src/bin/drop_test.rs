//! Drops a bouncy ball onto the ground plane and logs what happens.
//!
//! Run with `RUST_LOG=debug` for the world's internal logging on top of the
//! bounce report.

use glam::Vec3;
use tumble::consts::DEFAULT_DT;
use tumble::{Body, ContactMaterial, Event, Material, Shape, World};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut world = World::new(Vec3::new(0.0, -9.82, 0.0));
    let ground_mat = world.add_material(Material::default());
    let ball_mat = world.add_material(Material::default());
    world.add_contact_material(ground_mat, ball_mat, ContactMaterial::new(0.3, 0.6));

    world.add_body(
        Body::fixed()
            .with_shape(Shape::plane())
            .with_material(ground_mat),
    );
    let ball = world.add_body(
        Body::dynamic(1.0)
            .with_shape(Shape::sphere(0.5).expect("valid radius"))
            .with_position(Vec3::new(0.0, 5.0, 0.0))
            .with_material(ball_mat),
    );

    log::info!("dropping a 0.5 m ball from 5 m, restitution 0.6");

    let mut bounces = 0u32;
    for _ in 0..900 {
        world.step(DEFAULT_DT);
        let events: Vec<Event> = world.drain_events().collect();
        for event in events {
            if let Event::BeginContact { .. } = event {
                bounces += 1;
                if let Some(body) = world.body(ball) {
                    log::info!(
                        "bounce {bounces} at t={:.2}s, rebound speed {:.2} m/s",
                        world.time(),
                        body.velocity.length()
                    );
                }
            }
        }
        if world.body(ball).is_some_and(|b| b.is_sleeping()) {
            log::info!("ball fell asleep at t={:.2}s after {bounces} bounces", world.time());
            break;
        }
    }

    if let Some(body) = world.body(ball) {
        log::info!(
            "final position {:.3}, state {:?}",
            body.position,
            body.sleep_state
        );
    }
}
