#![deny(clippy::nursery, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use actix::Supervisor;
use actix_rt::System;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Config};
use crate::server::Server;

pub mod channel;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod party;
pub mod server;

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    // parse CLI arguments
    let opts = Args::parse();

    // overrides the RUST_LOG variable to our own value based on the
    // amount of `-v`s that were passed when calling the service
    std::env::set_var(
        "RUST_LOG",
        match opts.verbose {
            1 => "debug",
            2.. => "trace",
            _ => "info",
        },
    );

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty();
    subscriber.init();

    let config = Config::load(opts.config.as_deref())?;

    // the coordinator gets its own arbiter so its mailbox is never competing with a channel
    // actor's for scheduling time on the same executor.
    let server_arbiter = actix_rt::Arbiter::new();
    let _server = Supervisor::start_in_arbiter(&server_arbiter.handle(), move |_ctx| Server::new(config));

    info!(
        "Coordinator is up. This binary only hosts the in-process core -- wire a transport \
         (a TCP/IRC front-end, an HTTP web layer) against its envelope::ServerControlMessage \
         API to actually serve clients."
    );

    tokio::signal::ctrl_c().await?;
    System::current().stop();

    Ok(())
}
