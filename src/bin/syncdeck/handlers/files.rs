#![deny(clippy::all, clippy::pedantic)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use syncdeck::Session;
use syncdeck::application::{FileManagerError, FileMutation, QueryData};
use syncdeck::cache::EntryStatus;
use syncdeck::config::FilesCmd;
use syncdeck_api_types::FileData;
use tracing::warn;

use crate::error::CliError;
use crate::print::{print_json, print_listing};

pub async fn handle(session: &Session, cmd: FilesCmd) -> Result<(), CliError> {
    match cmd {
        FilesCmd::Ls { path, all, json } => list(session, &path, all, json).await,
        FilesCmd::Mkdir { parent, name } => {
            session.files().create_directory(&parent, &name).await?;
            println!("created {}", FileMutation::created_path(&parent, &name));
            Ok(())
        }
        FilesCmd::Rm { path } => {
            session.files().delete_directory(&path).await?;
            println!("deleted {path}");
            Ok(())
        }
        FilesCmd::Mv { from, to } => {
            session.files().move_or_rename(&from, &to).await?;
            println!("moved {from} -> {to}");
            Ok(())
        }
        FilesCmd::Cp { from, to } => {
            session.files().copy(&from, &to).await?;
            println!("copied {from} -> {to}");
            Ok(())
        }
        FilesCmd::Du { path } => {
            let size = session.files().calculate_directory_size(&path).await?;
            println!("{}\t{}", size.size, size.path);
            Ok(())
        }
        FilesCmd::Upload { file, dest } => upload(session, &file, &dest).await,
        FilesCmd::Watch {
            path,
            interval_seconds,
            count,
        } => watch(session, &path, interval_seconds, count).await,
    }
}

async fn list(session: &Session, path: &str, all: bool, json: bool) -> Result<(), CliError> {
    let files = visible(session.files().list_files(path).await?, all);
    if json {
        print_json(&files)?;
    } else {
        print_listing(&files);
    }
    Ok(())
}

pub(crate) fn visible(files: Vec<FileData>, all: bool) -> Vec<FileData> {
    if all {
        return files;
    }
    files.into_iter().filter(|file| !file.is_hidden).collect()
}

async fn upload(session: &Session, file: &Path, dest: &str) -> Result<(), CliError> {
    let name = upload_name(file)?;
    let content = tokio::fs::read(file)
        .await
        .map_err(|source| CliError::InputFile {
            path: file.to_path_buf(),
            source,
        })?;
    session
        .files()
        .upload_file(dest, &name, Bytes::from(content))
        .await?;
    println!("uploaded {name} to {dest}");
    Ok(())
}

fn upload_name(file: &Path) -> Result<String, CliError> {
    file.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CliError::InvalidInput(format!("{} has no usable file name", file.display()))
        })
}

/// Print the listing whenever its cached state changes, refreshing it every
/// `interval_seconds` until `count` listings were printed or Ctrl-C.
async fn watch(
    session: &Session,
    path: &str,
    interval_seconds: u64,
    count: Option<usize>,
) -> Result<(), CliError> {
    if interval_seconds == 0 {
        return Err(CliError::InvalidInput(
            "--interval-seconds must be greater than zero".to_string(),
        ));
    }
    let mut subscription = session.files().watch_files(path)?;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
    ticker.tick().await;

    let mut printed = 0usize;
    let mut last: Option<Arc<QueryData>> = None;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = subscription.changed() => {
                let Some(entry) = changed else { break };
                match entry.status {
                    EntryStatus::Success => {
                        let Some(data) = entry.data else { continue };
                        if last.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &data)) {
                            continue;
                        }
                        print_listing(data.files().map_err(FileManagerError::from)?);
                        println!();
                        last = Some(data);
                        printed += 1;
                        if count.is_some_and(|limit| printed >= limit) {
                            break;
                        }
                    }
                    EntryStatus::Error => {
                        if let Some(err) = entry.error {
                            warn!(path, error = %err, "Listing refresh failed");
                        }
                    }
                    EntryStatus::Evicted => break,
                    EntryStatus::Uninitialized | EntryStatus::Pending => {}
                }
            }
            _ = ticker.tick() => {
                if let Err(err) = session.files().refresh_files(path).await {
                    warn!(path, error = %err, "Listing refresh failed");
                }
            }
            _ = &mut shutdown => break,
        }
    }
    Ok(())
}
