#![deny(clippy::all, clippy::pedantic)]

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use glam::{Quat, Vec3};
use jobs::{JobSystem, SingleThreaded, ThreadPool};
use physics::{
    Activation, BodyCreationSettings, BodyId, MotionType, PhysicsSystem, RVec3, ShapeSettings, MOVING, NON_MOVING,
};
use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;

/// Drops a sphere onto a floor and steps the world until it sleeps.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Maximum number of updates to run.
    #[arg(long, default_value_t = 600)]
    steps: u32,
    /// Seconds per update.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,
    /// Collision steps per update.
    #[arg(long, default_value_t = 1)]
    collision_steps: u32,
    /// Worker threads; 0 uses every core, 1 runs inline.
    #[arg(long, default_value_t = 0)]
    threads: usize,
    /// JSON file with `physics` and `limits` sections.
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn job_system(threads: usize) -> Result<Arc<dyn JobSystem>> {
    Ok(match threads {
        0 => jobs::default_job_system(),
        1 => Arc::new(SingleThreaded::new()),
        n => Arc::new(ThreadPool::new(n)?),
    })
}

/// Static floor box with its top at y = 0 and a unit ball two meters up.
fn hello_world(system: &mut PhysicsSystem) -> Result<BodyId> {
    let floor = ShapeSettings::box_shape(Vec3::new(100.0, 1.0, 100.0)).create()?;
    system.create_and_add_body(
        &BodyCreationSettings::new(floor, RVec3::new(0.0, -1.0, 0.0), Quat::IDENTITY, MotionType::Static, NON_MOVING),
        Activation::DontActivate,
    )?;
    let ball = ShapeSettings::sphere(0.5).create()?;
    let sphere = system.create_and_add_body(
        &BodyCreationSettings::new(ball, RVec3::new(0.0, 2.0, 0.0), Quat::IDENTITY, MotionType::Dynamic, MOVING)
            .with_linear_velocity(Vec3::new(0.0, -5.0, 0.0)),
        Activation::Activate,
    )?;
    system.optimize_broad_phase();
    Ok(sphere)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.settings {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    let jobs = job_system(args.threads)?;

    tracing::info!("Initializing physics simulation...");
    let mut system = PhysicsSystem::with_default_layers(config.physics, config.limits);
    let sphere = hello_world(&mut system)?;

    tracing::info!(
        "Starting simulation loop for up to {} steps with dt = {}...",
        args.steps,
        args.dt
    );
    let mut step = 0;
    while step < args.steps && system.is_active(sphere) {
        let errors = system.update(args.dt, args.collision_steps, 1, &*jobs);
        if !errors.is_empty() {
            tracing::error!("Update {} overflowed: {:?}", step, errors);
        }
        step += 1;
        if step % 60 == 0 {
            tracing::info!(
                "Step {}: sphere position {:?}, velocity {:?}",
                step,
                system.position(sphere),
                system.linear_velocity(sphere)
            );
        }
    }

    if system.is_active(sphere) {
        tracing::warn!("Sphere still moving after {} steps.", step);
    } else {
        tracing::info!("Sphere came to rest after {} steps.", step);
    }
    tracing::info!("Final sphere position: {:?}", system.position(sphere));

    Ok(())
}
