// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod arch;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod index;
pub mod model;
pub mod routes;
pub mod sign;
pub mod upstream;
pub mod xml;

use clap::Parser;
use config::{Args, SubCommand};
use env_logger::Env;
use error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let log_level = match args.verbose {
        0 => "gateway=info",
        1 => "info,gateway=debug",
        2 => "debug",
        3 => "debug,gateway=trace",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match args.subcommand {
        SubCommand::Serve(args) => routes::run(&args).await,
    }
}
