//! syncdeck: command-line client for the dashboard file manager and audit log.
//! Every command runs against one cached session that is torn down on exit.
#![deny(clippy::all, clippy::pedantic)]

mod error;
mod handlers;
mod print;

use clap::Parser;

use error::CliError;
use handlers::{audit, files};
use syncdeck::Session;
use syncdeck::config::{self, CliArgs, Command};
use syncdeck::infra::telemetry;

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = CliArgs::parse();
    let settings = config::load(&cli)?;
    telemetry::init(&settings.logging)?;

    let session = Session::connect(&settings)?;
    let result = match cli.command {
        Command::Files(cmd) => files::handle(&session, cmd.action).await,
        Command::Audit(cmd) => audit::handle(&session, cmd.action).await,
    };
    session.logout();

    result
}
