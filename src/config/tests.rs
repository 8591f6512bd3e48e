use clap::Parser;

use super::*;

fn raw_with_base_url() -> RawSettings {
    let mut raw = RawSettings::default();
    raw.api.base_url = Some("https://dash.example.com/v0".to_string());
    raw
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = raw_with_base_url();
    raw.api.timeout_seconds = Some(10);
    raw.logging.level = Some("info".to_string());

    let overrides = GlobalOverrides {
        timeout_seconds: Some(3),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.api.timeout, Duration::from_secs(3));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn base_url_is_required() {
    let err = Settings::from_raw(RawSettings::default()).unwrap_err();
    assert!(matches!(err, LoadError::Invalid { key: "api.base_url", .. }));
}

#[test]
fn base_url_gains_trailing_slash() {
    let settings = Settings::from_raw(raw_with_base_url()).expect("valid settings");
    assert_eq!(settings.api.base_url.as_str(), "https://dash.example.com/v0/");
    assert_eq!(
        settings
            .api
            .base_url
            .join("api/v1/file-manager")
            .expect("join")
            .as_str(),
        "https://dash.example.com/v0/api/v1/file-manager"
    );
}

#[test]
fn base_url_rejects_non_http_scheme() {
    let mut raw = RawSettings::default();
    raw.api.base_url = Some("ftp://dash.example.com".to_string());
    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(err, LoadError::Invalid { key: "api.base_url", .. }));
}

#[test]
fn blank_tokens_are_treated_as_absent() {
    let mut raw = raw_with_base_url();
    raw.api.access_token = Some("  ".to_string());
    raw.api.refresh_token = Some(" refresh ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(settings.api.access_token.is_none());
    assert_eq!(settings.api.refresh_token.as_deref(), Some("refresh"));
}

#[test]
fn zero_timeout_is_rejected() {
    let mut raw = raw_with_base_url();
    raw.api.timeout_seconds = Some(0);
    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "api.timeout_seconds",
            ..
        }
    ));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = raw_with_base_url();
    let overrides = GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn defaults_are_applied() {
    let settings = Settings::from_raw(raw_with_base_url()).expect("valid settings");

    assert_eq!(settings.api.timeout, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::WARN);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.idle_entry_limit.get(), 128);
    assert!(settings.cache.refetch_on_invalidate);
}

#[test]
fn cache_settings_can_be_overridden_via_cli() {
    let mut raw = raw_with_base_url();
    let overrides = GlobalOverrides {
        cache_idle_entry_limit: Some(16),
        cache_refetch_on_invalidate: Some(false),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.idle_entry_limit.get(), 16);
    assert!(!settings.cache.refetch_on_invalidate);
}

#[test]
fn zero_idle_entry_limit_is_rejected() {
    let mut raw = raw_with_base_url();
    raw.cache.idle_entry_limit = Some(0);
    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.idle_entry_limit",
            ..
        }
    ));
}

#[test]
fn parse_files_ls_arguments() {
    let args = CliArgs::parse_from(["syncdeck", "files", "ls", "/docs", "--all"]);

    match args.command {
        Command::Files(files) => match files.action {
            FilesCmd::Ls { path, all, json } => {
                assert_eq!(path, "/docs");
                assert!(all);
                assert!(!json);
            }
            other => panic!("wrong files action parsed: {other:?}"),
        },
        Command::Audit(_) => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_global_overrides_after_subcommand() {
    let args = CliArgs::parse_from([
        "syncdeck",
        "files",
        "mv",
        "/a/b",
        "/c/b",
        "--base-url",
        "https://dash.example.com",
        "--cache-refetch-on-invalidate=false",
    ]);

    assert_eq!(
        args.overrides.base_url.as_deref(),
        Some("https://dash.example.com")
    );
    assert_eq!(args.overrides.cache_refetch_on_invalidate, Some(false));
    match args.command {
        Command::Files(files) => match files.action {
            FilesCmd::Mv { from, to } => {
                assert_eq!(from, "/a/b");
                assert_eq!(to, "/c/b");
            }
            other => panic!("wrong files action parsed: {other:?}"),
        },
        Command::Audit(_) => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_audit_ls_arguments() {
    let args = CliArgs::parse_from([
        "syncdeck",
        "audit",
        "ls",
        "--page",
        "2",
        "--page-size",
        "50",
        "--search",
        "deploy",
    ]);

    match args.command {
        Command::Audit(audit) => match audit.action {
            AuditCmd::Ls {
                page,
                page_size,
                search,
                json,
            } => {
                assert!(!json);
                assert_eq!(page, 2);
                assert_eq!(page_size, 50);
                assert_eq!(search.as_deref(), Some("deploy"));
            }
        },
        Command::Files(_) => panic!("wrong command parsed"),
    }
}
