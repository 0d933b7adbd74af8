//! hookline-server/src/server.rs
//!
//! Wires the context together, serves the REST API, and tears everything
//! down on Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use hookline_core::eventbus::inbound_consumer::spawn_inbound_consumer;
use hookline_core::tasks::run_autostart;
use hookline_core::Error;

use crate::api;
use crate::context::ServerContext;
use crate::Args;

pub async fn run_server(args: Args) -> Result<(), Error> {
    let ctx = ServerContext::new(&args).await?;

    let consumer = spawn_inbound_consumer(&ctx.event_bus, Arc::clone(&ctx.message_service)).await;

    let addr: SocketAddr = args
        .server_addr
        .parse()
        .map_err(|e| Error::Parse(format!("invalid server address {}: {}", args.server_addr, e)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("REST API listening on http://{}", addr);

    let app = api::router(ctx.state.clone());

    let eb_clone = ctx.event_bus.clone();
    let _ctrlc_handle = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down event bus...");
        eb_clone.shutdown();
    });

    let mut shutdown_rx = ctx.event_bus.shutdown_rx.clone();
    let srv_handle = tokio::spawn(async move {
        let shutdown = async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!("HTTP server error: {:?}", e);
        }
    });

    if args.skip_autostart {
        info!("Autostart skipped by flag");
    } else {
        match run_autostart(&ctx.manager).await {
            Ok(n) => info!("Autostart restored {} session(s)", n),
            Err(e) => error!("Autostart failed: {}", e),
        }
    }

    if let Err(e) = srv_handle.await {
        error!("HTTP server task ended abnormally: {:?}", e);
    }

    info!("Stopping live sessions...");
    ctx.manager.shutdown().await;
    info!("Bridge routes still open after shutdown: {}", ctx.bridge.open_routes());

    if let Err(e) = consumer.await {
        error!("Inbound consumer ended abnormally: {:?}", e);
    }
    ctx.db.pool().close().await;
    info!("Database pool closed");
    Ok(())
}
