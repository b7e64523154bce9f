use clap::Parser;
use miette::{IntoDiagnostic, Result};
use orderflow::bootstrap::{Pipeline, init_tracing};
use orderflow::config::Config;
use orderflow::infrastructure::http_provider::HttpProviderGateway;
use orderflow::infrastructure::in_memory::in_memory_repositories;
use orderflow::infrastructure::mailer::LogMailer;
use orderflow::infrastructure::seed::Seed;
use orderflow::infrastructure::stripe::StripeProcessor;
use orderflow::interfaces::http::router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing();

    let processor = Arc::new(StripeProcessor::new(
        config.stripe_secret_key.clone(),
        config.stripe_api_base.clone(),
    ));
    let mut pipeline = Pipeline::new(
        in_memory_repositories(),
        processor,
        config.webhook_secret.clone(),
        config.webhook_tolerance(),
    );

    if let Some(path) = &config.seed {
        Seed::from_file(path)
            .await
            .into_diagnostic()?
            .apply(&pipeline.repos.catalog, &pipeline.ledger)
            .await
            .into_diagnostic()?;
    }
    if config.stripe_secret_key.is_empty() {
        warn!("No Stripe secret key configured, deposits will fail");
    }

    let shutdown = CancellationToken::new();
    let gateway = Arc::new(HttpProviderGateway::new(config.provider_timeout()).into_diagnostic()?);
    let workers = pipeline
        .spawn_workers(gateway, Arc::new(LogMailer), &shutdown)
        .into_diagnostic()?;
    let reconciler = tokio::spawn(
        pipeline
            .reconciler(config.schedule())
            .run(shutdown.clone()),
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .into_diagnostic()?;
    info!(addr = %config.bind, "Listening");

    let signal = shutdown.clone();
    axum::serve(listener, router(pipeline.state.clone()))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Could not listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
            signal.cancel();
        })
        .await
        .into_diagnostic()?;

    shutdown.cancel();
    reconciler.await.into_diagnostic()?;
    for worker in workers {
        worker.await.into_diagnostic()?;
    }
    Ok(())
}
