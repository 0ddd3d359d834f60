//! Counter client example
//!
//! Bumps a remote counter a few times, then reads it back, first with the
//! async API and then from `spawn_blocking` with the blocking API.
//!
//! Run with: cargo run --example counter_client
//!
//! Requires: a state-machine server exposing `counter.increment` and
//! `counter.current`, listening on SM_HOST:SM_PORT (default localhost:3001)

use anyhow::Result;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sm_rpc::{Command, ConnectionConfig, Query, RpcError, DEFAULT_HOST, DEFAULT_PORT};

#[derive(Debug, Serialize)]
struct Increment {
    by: i64,
}

impl Command for Increment {
    const NAME: &'static str = "counter.increment";
}

#[derive(Debug, Serialize)]
struct Current;

impl Query for Current {
    const NAME: &'static str = "counter.current";
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_ansi(false)
        .with_line_number(true)
        .init();

    let host = std::env::var("SM_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = match std::env::var("SM_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => DEFAULT_PORT,
    };

    let config = ConnectionConfig::new(&host, port).with_nodelay(true);
    let conn = sm_rpc::connect_with(&config).await?;

    // ---
    // Commands are acknowledged; faults come back as RpcError::Fault
    for by in [1, 2, 3] {
        match conn.execute_command(&Increment { by }).await {
            Ok(()) => println!("incremented by {by}"),
            Err(RpcError::Fault(fault)) => println!("server refused increment: {fault}"),
            Err(err) => return Err(err.into()),
        }
    }

    let value: i64 = conn.execute_query(&Current).await?;
    println!("counter = {value}");

    // ---
    // Same connection, blocking API, from synchronous code on the blocking pool
    let c = conn.clone();
    let total: i64 = tokio::task::spawn_blocking(move || {
        c.execute_command_with_result_blocking(&Increment { by: 10 })
    })
    .await??;
    println!("counter after blocking increment = {total}");

    conn.dispose().await;
    Ok(())
}
