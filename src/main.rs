use std::sync::Arc;

use clap::Parser;

mod args;
mod auth;
mod backend;
mod config;
mod creds;
mod routes;
mod server;
mod session;
mod time;
mod user;

use crate::args::Args;
use crate::backend::Backend;
use crate::config::Config;
use crate::server::BookClub;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let args = Args::parse();
    let addr = args.addr().expect("invalid listen address");

    let config = Config::from_env(args.secure());

    let backend = Backend::new(args.data_dir()).await;

    session::spawn_purge(backend.clone(), config.purge_interval);

    let club = Arc::new(BookClub::new(backend, config));

    warp::serve(routes::routes(club)).run(addr).await;
}
