#![deny(clippy::all, clippy::pedantic)]

use serde::Serialize;
use syncdeck_api_types::{AuditLogPage, FileData, FileType};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::CliError;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

pub fn print_listing(files: &[FileData]) {
    for line in listing_lines(files) {
        println!("{line}");
    }
}

pub fn print_audit_page(page: &AuditLogPage) {
    for line in audit_lines(page) {
        println!("{line}");
    }
}

pub(crate) fn listing_lines(files: &[FileData]) -> Vec<String> {
    files
        .iter()
        .map(|file| {
            let kind = match file.file_type {
                FileType::Directory => 'd',
                FileType::File => '-',
                FileType::Symlink => 'l',
                FileType::Other => '?',
            };
            format!(
                "{kind} {:>12} {} {}",
                file.size,
                timestamp(file.updated_at),
                file.name
            )
        })
        .collect()
}

pub(crate) fn audit_lines(page: &AuditLogPage) -> Vec<String> {
    let mut lines: Vec<String> = page
        .logs
        .iter()
        .map(|log| {
            format!(
                "{} {:<7} {} {} by {}",
                timestamp(log.created_at),
                wire_name(&log.action),
                wire_name(&log.resource_type),
                log.resource_id,
                log.user_id
            )
        })
        .collect();
    lines.push(format!(
        "page {} ({} per page), {} total",
        page.page, page.page_size, page.total_count
    ));
    lines
}

fn timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

/// Wire name of a unit enum variant, e.g. `delete`.
fn wire_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => String::new(),
    }
}
