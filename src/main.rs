// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Walk-Tracker command line
//!
//! `walk-tracker walker <walk-id>` starts an accepted walk, publishes the
//! walker's position (replayed along the selected route) until Ctrl-C,
//! then ends the walk.
//!
//! `walk-tracker client <walk-id>` follows a walk and logs the live
//! tracking view until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walk_tracker::{
    config::Config,
    models::{LatLng, WalkStatus},
    services::{RouteReplaySource, TrackingObserver},
    AppContext,
};

/// How often the client re-reads the walk to notice status changes.
const CLIENT_RELOAD_INTERVAL: Duration = Duration::from_secs(15);

const USAGE: &str = "usage: walk-tracker <walker|client> <walk-id>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    let mut args = std::env::args().skip(1);
    let (mode, walk_id) = match (args.next(), args.next()) {
        (Some(mode), Some(walk_id)) => (mode, walk_id),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(mode = %mode, walk_id = %walk_id, "Starting Walk-Tracker");

    let ctx = AppContext::connect(config).await?;

    match mode.as_str() {
        "walker" => run_walker(&ctx, &walk_id).await?,
        "client" => run_client(&ctx, &walk_id).await?,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
    Ok(())
}

async fn run_walker(ctx: &AppContext, walk_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let walk = ctx.api.get_walk(walk_id).await?;
    if walk.status != WalkStatus::Accepted {
        return Err(format!("walk {} is {}, expected ACCEPTED", walk_id, walk.status).into());
    }

    let source = match walk.selected_route_polyline_encoded.as_deref() {
        Some(encoded) if !encoded.is_empty() => RouteReplaySource::from_polyline(encoded)?,
        _ => RouteReplaySource::new(vec![walk.origin]),
    };
    tracing::info!(vertices = source.len(), "Replaying selected route");

    let manager = ctx.walker_manager(Arc::new(source));
    manager.load(walk_id).await?;
    manager.start(walk.origin).await?;

    tracing::info!(walk_id, "Tracking; press Ctrl-C to end the walk");
    tokio::signal::ctrl_c().await?;

    let drop_off: LatLng = walk.destination.unwrap_or(walk.origin);
    match manager.end(drop_off).await {
        Ok(done) => tracing::info!(walk_id, status = %done.status, "Walk ended"),
        Err(e) => {
            // Keep the task from outliving the process silently.
            manager.shutdown().await;
            return Err(e.into());
        }
    }
    Ok(())
}

async fn run_client(ctx: &AppContext, walk_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let manager = ctx.client_manager();
    let walk = manager.load(walk_id).await?;
    tracing::info!(walk_id, status = %walk.status, "Following walk");

    let observer = TrackingObserver::start(ctx.channel.clone(), walk_id, manager.subscribe());
    let mut views = observer.subscribe_view();
    let mut reload = tokio::time::interval(CLIENT_RELOAD_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = reload.tick() => {
                match manager.reload().await {
                    Ok(walk) if walk.status.is_terminal() => {
                        tracing::info!(walk_id, status = %walk.status, "Walk finished");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(walk_id, error = %e, "Walk reload failed"),
                }
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                tracing::info!(
                    walk_id,
                    active = view.active,
                    session = view.session,
                    lat = view.walker_position.map(|p| p.lat),
                    lng = view.walker_position.map(|p| p.lng),
                    ts = view.walker_position.map(|p| p.timestamp_millis),
                    error = view.error.as_deref(),
                    "Tracking view"
                );
            }
        }
    }

    observer.close().await;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("walk_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
