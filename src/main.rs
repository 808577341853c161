use std::net::ToSocketAddrs;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};
use skyfan::config::read_config;
use skyfan::provider::{spawn_fixed_data_refresh, spawn_track_purge, spawn_upstream_feed, Provider};
use skyfan::track::build_backend;
use tokio::sync::watch;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
struct Args {
  #[arg(short, long)]
  config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let args = Args::parse();
  let cfg = read_config(args.config.as_deref());

  TermLogger::init(
    cfg.log_level,
    LogConfig::default(),
    TerminalMode::Stdout,
    ColorChoice::Auto,
  )?;

  info!("starting skyfan version {VERSION}");

  let backend = match build_backend(&cfg.track).await {
    Ok(b) => b,
    Err(err) => {
      error!("fatal: could not set up track store: {err}");
      std::process::exit(1);
    }
  };
  let provider = Provider::new(backend);

  info!("loading fixed reference data");
  let fixed = match skyfan::provider::feed::load_fixed_with_boot_retries(&cfg).await {
    Ok(f) => f,
    Err(err) => {
      error!("fatal: could not load fixed reference data: {err}");
      std::process::exit(1);
    }
  };
  let (fir_bounds_tx, fir_bounds_rx) = watch::channel(fixed.fir_bounds.clone());
  {
    let tx = provider.upstream_sender();
    for airport in fixed.airports {
      let _ = tx.try_send(skyfan::provider::UpstreamEvent::SetAirport(airport));
    }
  }

  info!("performing boot-time upstream poll");
  if let Err(err) = skyfan::provider::feed::poll_with_boot_retries(&cfg).await {
    error!("fatal: could not reach upstream feed after boot retries: {err}");
    std::process::exit(1);
  }

  let cfg = Arc::new(cfg);
  {
    let provider = provider.clone();
    tokio::spawn(async move { provider.run().await });
  }
  spawn_upstream_feed(cfg.clone(), provider.clone(), fir_bounds_rx);
  spawn_fixed_data_refresh(cfg.clone(), provider.clone(), fir_bounds_tx);
  spawn_track_purge(provider.clone(), cfg.track.options.purge_period);

  let app = skyfan::http::router(provider.clone(), &cfg);
  let addr = cfg
    .web
    .addr
    .to_socket_addrs()?
    .next()
    .ok_or_else(|| format!("could not resolve web.addr {:?}", cfg.web.addr))?;
  info!("listening on {addr}");

  let server = axum::Server::bind(&addr)
    .serve(app.into_make_service())
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!("received shutdown signal, draining connections");
    });
  match tokio::time::timeout(std::time::Duration::from_secs(5), server).await {
    Ok(result) => result?,
    Err(_) => info!("graceful shutdown timed out after 5s, forcing close of remaining connections"),
  }

  provider.stop();
  let _ = tokio::time::timeout(std::time::Duration::from_secs(5), provider.tracks.close()).await;
  info!("shutdown complete");
  Ok(())
}
