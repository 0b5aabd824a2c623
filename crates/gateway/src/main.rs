use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::trace::SdkTracerProvider;

use pc_domain::config::{LogFormat, ObservabilityConfig};
use pc_gateway::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = pc_gateway::cli::load_config()?;
            let valid = pc_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = pc_gateway::cli::load_config()?;
            pc_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Config(ConfigCommand::SetSecret { target })) => {
            let (config, _config_path) = pc_gateway::cli::load_config()?;
            pc_gateway::cli::config::set_secret(&config, target)
        }
        Some(Command::Version) => {
            println!("pangea-chat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        // Default to chat when no subcommand is given.
        None | Some(Command::Chat) => {
            let (config, _) = pc_gateway::cli::load_config()?;
            let tracer_provider = init_tracing(&config.observability, cli.verbose);
            let result = pc_gateway::cli::chat::chat(Arc::new(config)).await;
            shutdown_tracing(tracer_provider);
            result
        }
        Some(Command::Run { message, json }) => {
            let (config, _) = pc_gateway::cli::load_config()?;
            let tracer_provider = init_tracing(&config.observability, cli.verbose);
            let result = pc_gateway::cli::run::run(Arc::new(config), message, json).await;
            shutdown_tracing(tracer_provider);
            if !result? {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::History { json }) => {
            let (config, _) = pc_gateway::cli::load_config()?;
            let tracer_provider = init_tracing(&config.observability, cli.verbose);
            let result = pc_gateway::cli::history::history(Arc::new(config), json).await;
            shutdown_tracing(tracer_provider);
            result
        }
    }
}

/// Initialize stderr tracing, so stdout stays clean for chat text.
///
/// Defaults to `warn` (or `info,pc_gateway=debug` with `--verbose`);
/// `RUST_LOG` overrides both. When `otlp_endpoint` is configured, an
/// OpenTelemetry layer is added so every `tracing` span is also exported
/// via OTLP/gRPC. The returned [`SdkTracerProvider`] must be shut down on
/// exit to flush pending spans.
fn init_tracing(obs: &ObservabilityConfig, verbose: bool) -> Option<SdkTracerProvider> {
    let default_filter = if verbose { "info,pc_gateway=debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match obs.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let tracer_provider = obs
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| build_tracer_provider(obs, endpoint));
    let otel_layer = tracer_provider
        .as_ref()
        .map(|tp| tracing_opentelemetry::layer().with_tracer(tp.tracer("pangea-chat")));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(otel_layer)
        .with(env_filter)
        .init();

    tracer_provider
}

fn build_tracer_provider(obs: &ObservabilityConfig, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!(
                "WARNING: failed to create OTLP exporter for {endpoint}: {e}; \
                 starting without OpenTelemetry"
            );
            return None;
        }
    };

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(obs.service_name.clone())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
                obs.sample_rate,
            ))
            .with_resource(resource)
            .build(),
    )
}

/// Flush and shut down the OTel tracer provider so pending spans are
/// exported before the process exits.
fn shutdown_tracing(tracer_provider: Option<SdkTracerProvider>) {
    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
        }
    }
}
