use super::*;

fn with_secret() -> RawSettings {
    let mut raw = RawSettings::default();
    raw.auth.token_secret = Some("0123456789abcdef0123456789abcdef".to_string());
    raw
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = with_secret();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(with_secret()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert!(settings.database.url.is_none());
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
    assert_eq!(settings.cache.default_ttl, Duration::from_secs(300));
    assert_eq!(
        settings.pipeline.slow_operation_threshold,
        Duration::from_millis(500)
    );
    assert_eq!(
        settings.messaging.on_publish_failure,
        PublishFailurePolicy::Fail
    );
    assert!(settings.messaging.webhook_url.is_none());
    assert_eq!(settings.storage.max_cover_bytes.get(), 5 * 1024 * 1024);
    assert_eq!(settings.auth.token_lifetime, Duration::from_secs(3600));
    assert!(!settings.auth.ephemeral_secret);
}

#[test]
fn missing_token_secret_is_generated() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert!(settings.auth.ephemeral_secret);
    assert!(settings.auth.token_secret.len() >= MIN_TOKEN_SECRET_LEN);
}

#[test]
fn short_token_secret_is_rejected() {
    let mut raw = RawSettings::default();
    raw.auth.token_secret = Some("too-short".to_string());
    let err = Settings::from_raw(raw).expect_err("short secret");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "auth.token_secret",
            ..
        }
    ));
}

#[test]
fn redis_backend_requires_url() {
    let mut raw = with_secret();
    raw.cache.backend = Some("redis".to_string());
    let err = Settings::from_raw(raw.clone()).expect_err("missing redis url");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.redis_url",
            ..
        }
    ));

    raw.cache.redis_url = Some("redis://127.0.0.1:6379".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.backend, CacheBackend::Redis);
}

#[test]
fn unknown_enumerations_are_rejected() {
    let mut raw = with_secret();
    raw.cache.backend = Some("memcached".to_string());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = with_secret();
    raw.messaging.on_publish_failure = Some("retry".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn publish_policy_can_be_relaxed() {
    let mut raw = with_secret();
    raw.messaging.on_publish_failure = Some("warn".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.messaging.on_publish_failure,
        PublishFailurePolicy::Warn
    );
}

#[test]
fn zero_limits_are_rejected() {
    let mut raw = with_secret();
    raw.storage.max_cover_bytes = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = with_secret();
    raw.cache.default_ttl_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = with_secret();
    raw.database.max_connections = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cache_ttl_has_an_upper_bound() {
    let mut raw = with_secret();
    raw.cache.default_ttl_seconds = Some(u64::MAX);
    let err = Settings::from_raw(raw).expect_err("ttl beyond bound");
    assert!(err.to_string().contains("cache.default_ttl_seconds"));

    let mut raw = with_secret();
    raw.cache.default_ttl_seconds = Some(MAX_CACHE_TTL_SECS);
    let settings = Settings::from_raw(raw).expect("ttl at bound");
    assert_eq!(
        settings.cache.default_ttl,
        Duration::from_secs(MAX_CACHE_TTL_SECS)
    );
}

#[test]
fn password_hash_cost_is_bounded() {
    let settings = Settings::from_raw(with_secret()).expect("defaults");
    assert_eq!(settings.auth.password_hash_cost, 12);

    for cost in [3, 32] {
        let mut raw = with_secret();
        raw.auth.password_hash_cost = Some(cost);
        assert!(Settings::from_raw(raw).is_err(), "{cost}");
    }
}

#[test]
fn blank_database_url_means_in_memory() {
    let mut raw = with_secret();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = with_secret();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["shelfmark"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_migrate_arguments() {
    let args = CliArgs::parse_from([
        "shelfmark",
        "migrate",
        "--database-url",
        "postgres://example",
    ]);

    match args.command.expect("migrate command") {
        Command::Migrate(migrate) => {
            assert_eq!(
                migrate.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "shelfmark",
        "serve",
        "--cache-backend",
        "redis",
        "--cache-redis-url",
        "redis://cache:6379",
        "--storage-max-cover-bytes",
        "1048576",
    ]);

    let Some(Command::Serve(serve)) = args.command else {
        panic!("wrong command parsed");
    };
    let mut raw = with_secret();
    raw.apply_serve_overrides(&serve.overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.backend, CacheBackend::Redis);
    assert_eq!(settings.storage.max_cover_bytes.get(), 1_048_576);
}
