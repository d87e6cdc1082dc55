// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-wide, init-only configuration: CLI flags backed by environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};

use crate::cache::DEFAULT_CONTENT_TTL;

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Increase logging output (can be used multiple times)
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    #[command(subcommand)]
    pub subcommand: SubCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubCommand {
    /// Run the gateway's HTTP server
    Serve(Serve),
}

#[derive(Debug, Parser)]
pub struct Serve {
    /// Address to bind the HTTP server to
    #[arg(short = 'B', long = "bind-addr", env = "BIND", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Armored OpenPGP private key; enables signing of InRelease/Release.gpg/repomd.xml.asc
    #[arg(long, env)]
    pub gpg_private_key: Option<String>,

    /// Passphrase for GPG_PRIVATE_KEY
    #[arg(long, env, default_value = "")]
    pub gpg_passphrase: String,

    /// Armored OpenPGP public key; short-circuits deriving one from GPG_PRIVATE_KEY
    #[arg(long, env)]
    pub gpg_public_key: Option<String>,

    /// Authorization token sent to the upstream release feed
    #[arg(long, env)]
    pub upstream_token: Option<String>,

    /// Seconds a generated artifact remains cacheable
    #[arg(long, env, default_value_t = DEFAULT_CONTENT_TTL.as_secs())]
    pub cache_ttl: u64,
}

impl Serve {
    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}
