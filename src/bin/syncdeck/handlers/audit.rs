#![deny(clippy::all, clippy::pedantic)]

use syncdeck::Session;
use syncdeck::application::AuditLogQuery;
use syncdeck::config::AuditCmd;

use crate::error::CliError;
use crate::print::{print_audit_page, print_json};

pub async fn handle(session: &Session, cmd: AuditCmd) -> Result<(), CliError> {
    match cmd {
        AuditCmd::Ls {
            page,
            page_size,
            search,
            json,
        } => {
            let query = AuditLogQuery {
                page,
                page_size,
                search,
            };
            let logs = session.audit().list(&query).await?;
            if json {
                print_json(&logs)?;
            } else {
                print_audit_page(&logs);
            }
            Ok(())
        }
    }
}
