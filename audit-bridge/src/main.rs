use anyhow::Context;
use audit_bridge::{server, BridgeConfig, BridgeMetrics, DeliveryPipeline, HttpSink, WindowRateLimiter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let boot = Instant::now();
    let config = BridgeConfig::from_env();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!(log_level = %config.log_level, "log level");

    let metrics = BridgeMetrics::new().context("failed to register bridge metrics")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let http_metrics = metrics.clone();
    let mut http = tokio::spawn(async move { server::serve(addr, http_metrics).await });

    let sink = HttpSink::new(config.falco_url.clone(), config.delivery_timeout)
        .context("failed to build falco http client")?;
    let limiter = WindowRateLimiter::new(config.rate_limit_ceiling(), config.rate_limit_window());
    info!(
        falco_url = %config.falco_url,
        subscription = %config.subscription,
        ceiling = limiter.limit(),
        window_ms = limiter.window().as_millis() as u64,
        max_retries = config.max_retries,
        "configured delivery pipeline"
    );
    let pipeline = DeliveryPipeline::new(Arc::new(sink), Arc::new(limiter), metrics)
        .with_retry(config.retry_policy())
        .with_worker_concurrency(config.worker_concurrency)
        .with_verbose(config.verbose());
    let (intake, _drained) = pipeline.start(config.max_in_flight);

    let mut subscription = tokio::spawn(subscribe(config.clone(), intake));
    info!(elapsed_ms = boot.elapsed().as_millis() as u64, "application started");

    // In-flight deliveries are abandoned on exit; their messages stay
    // unacknowledged and are redelivered.
    tokio::select! {
        res = &mut subscription => {
            match res {
                Ok(Err(err)) => error!(error = %err, "subscription failed"),
                Ok(Ok(())) => error!("subscription closed unexpectedly"),
                Err(err) => error!(error = %err, "subscription task panicked"),
            }
            std::process::exit(1);
        }
        res = &mut http => {
            match res {
                Ok(Err(err)) => error!(error = %err, "http server failed"),
                _ => error!("http server stopped"),
            }
            std::process::exit(1);
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, exiting");
        }
    }
    Ok(())
}

#[cfg(feature = "kafka")]
async fn subscribe(config: BridgeConfig, intake: audit_bridge::Intake) -> anyhow::Result<()> {
    let subscription = audit_bridge::kafka::KafkaSubscription::connect(&config)?;
    subscription.forward(intake).await
}

#[cfg(not(feature = "kafka"))]
async fn subscribe(_config: BridgeConfig, _intake: audit_bridge::Intake) -> anyhow::Result<()> {
    anyhow::bail!("audit-bridge was built without the `kafka` feature; no subscription available")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
