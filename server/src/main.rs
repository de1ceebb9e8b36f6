use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use stake_execution::SystemClock;
use stake_server::{spawn_sweeper, Api, DataSourceKind, Server, ServerConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "stake-server".to_string());
        let rate = std::env::var("OTEL_SAMPLING_RATE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer("stake-server");
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Entity store: live (SQLite) or fixture (in-memory JSON seed).
    #[arg(long, default_value = "live")]
    data_source: DataSourceKind,

    /// SQLite database file (required with --data-source live).
    #[arg(long)]
    sqlite_path: Option<PathBuf>,

    /// JSON fixture seeding the in-memory store.
    #[arg(long)]
    fixture_path: Option<PathBuf>,

    /// JSON file with users, circles, friendships and follows.
    #[arg(long)]
    directory_path: Option<PathBuf>,

    /// Directory proof files are written to.
    #[arg(long)]
    proof_dir: Option<PathBuf>,

    /// Public URL prefix proof files are served under.
    #[arg(long)]
    proof_base_url: Option<String>,

    /// Max proof upload size in bytes (0 uses default).
    #[arg(long)]
    proof_max_bytes: Option<usize>,

    /// Interval between deadline sweeps in milliseconds (0 disables the sweeper).
    #[arg(long)]
    sweep_interval_ms: Option<u64>,

    /// HTTP rate limit per IP in requests per second (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_per_second: Option<u64>,

    /// HTTP rate limit burst size (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_burst: Option<u32>,

    /// Proof upload rate limit per IP in requests per minute (0 disables).
    #[arg(long)]
    upload_rate_limit_per_minute: Option<u64>,

    /// Proof upload rate limit burst size (0 disables).
    #[arg(long)]
    upload_rate_limit_burst: Option<u32>,

    /// Max request body size in bytes for non-upload routes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,
}

fn is_production() -> bool {
    matches!(
        std::env::var("NODE_ENV").as_deref(),
        Ok("production") | Ok("prod")
    )
}

/// Maps an optional arg value to Option: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn parse_allowed_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();
    let config = ServerConfig {
        data_source: args.data_source,
        sqlite_path: args.sqlite_path.clone(),
        fixture_path: args.fixture_path.clone(),
        directory_path: args.directory_path.clone(),
        proof_dir: args.proof_dir.clone().unwrap_or(defaults.proof_dir),
        proof_base_url: args
            .proof_base_url
            .clone()
            .unwrap_or(defaults.proof_base_url),
        proof_max_bytes: match args.proof_max_bytes {
            Some(0) | None => defaults.proof_max_bytes,
            Some(value) => value,
        },
        sweep_interval_ms: map_optional_limit(args.sweep_interval_ms, defaults.sweep_interval_ms),
        http_rate_limit_per_second: map_optional_limit(
            args.http_rate_limit_per_second,
            defaults.http_rate_limit_per_second,
        ),
        http_rate_limit_burst: map_optional_limit(
            args.http_rate_limit_burst,
            defaults.http_rate_limit_burst,
        ),
        upload_rate_limit_per_minute: map_optional_limit(
            args.upload_rate_limit_per_minute,
            defaults.upload_rate_limit_per_minute,
        ),
        upload_rate_limit_burst: map_optional_limit(
            args.upload_rate_limit_burst,
            defaults.upload_rate_limit_burst,
        ),
        http_body_limit_bytes: map_optional_limit(
            args.http_body_limit_bytes,
            defaults.http_body_limit_bytes,
        ),
        allowed_origins: std::env::var("ALLOWED_HTTP_ORIGINS")
            .map(|value| parse_allowed_origins(&value))
            .unwrap_or_default(),
        allow_no_origin: std::env::var("ALLOW_HTTP_NO_ORIGIN")
            .map(|value| parse_flag(&value))
            .unwrap_or(defaults.allow_no_origin),
        metrics_auth_token: std::env::var("METRICS_AUTH_TOKEN")
            .ok()
            .filter(|value| !value.trim().is_empty()),
    };
    config.validate()?;
    Ok(config)
}

fn require_env(var: &str) -> Result<String> {
    let value = std::env::var(var).unwrap_or_default();
    if value.trim().is_empty() {
        anyhow::bail!("Missing required env: {var}");
    }
    Ok(value)
}

fn require_positive_u64(var: &str) -> Result<()> {
    let value = require_env(var)?;
    let parsed: u64 = value
        .parse()
        .with_context(|| format!("Invalid {var}: {value}"))?;
    if parsed == 0 {
        anyhow::bail!("Invalid {var}: {value}");
    }
    Ok(())
}

fn ensure_production_env() -> Result<()> {
    if !is_production() {
        return Ok(());
    }
    require_env("ALLOWED_HTTP_ORIGINS")?;
    require_env("METRICS_AUTH_TOKEN")?;
    require_positive_u64("RATE_LIMIT_HTTP_PER_SEC")?;
    require_positive_u64("RATE_LIMIT_HTTP_BURST")?;
    require_positive_u64("RATE_LIMIT_UPLOAD_PER_MIN")?;
    require_positive_u64("RATE_LIMIT_UPLOAD_BURST")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing()?;
    ensure_production_env()?;

    let config = build_config(&args)?;
    let sweep_interval = config.sweep_interval();
    let server = Arc::new(
        Server::open(config, Arc::new(SystemClock))
            .await
            .context("open server")?,
    );
    info!(
        data_source = ?server.config.data_source,
        proof_dir = %server.config.proof_dir.display(),
        "stake server initialized"
    );

    let _sweeper = match sweep_interval {
        Some(interval) => {
            info!(interval_ms = interval.as_millis() as u64, "deadline sweeper started");
            Some(spawn_sweeper(server.clone(), interval))
        }
        None => {
            info!("deadline sweeper disabled; deadlines are applied on read");
            None
        }
    };

    let api = Api::new(server);
    let app = api.router();

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixture_config() {
        let args = Args::parse_from([
            "stake-server",
            "--data-source",
            "fixture",
            "--sweep-interval-ms",
            "0",
            "--http-rate-limit-per-second",
            "0",
            "--proof-max-bytes",
            "1024",
        ]);
        let config = build_config(&args).expect("config should parse");
        assert_eq!(config.data_source, DataSourceKind::Fixture);
        assert_eq!(config.sweep_interval_ms, None);
        assert_eq!(config.http_rate_limit_per_second, None);
        assert_eq!(config.proof_max_bytes, 1024);
        assert_eq!(config.proof_base_url, "/proofs");
    }

    #[test]
    fn rejects_live_without_sqlite_path() {
        let args = Args::parse_from(["stake-server"]);
        let err = build_config(&args).unwrap_err();
        assert!(err.to_string().contains("sqlite-path"), "unexpected error: {err}");
    }

    #[test]
    fn rejects_unknown_data_source() {
        let result = Args::try_parse_from(["stake-server", "--data-source", "postgres"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_origin_list_and_flags() {
        assert_eq!(
            parse_allowed_origins(" https://a.example , ,https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("no"));
        assert_eq!(map_optional_limit(Some(0u64), Some(5)), None);
        assert_eq!(map_optional_limit(None, Some(5u64)), Some(5));
    }
}
