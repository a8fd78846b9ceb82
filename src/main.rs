#![allow(clippy::upper_case_acronyms)]

use std::{sync::Arc, time::Duration};

use pingora::services::listening::Service;
use pingora_core::server::{configuration::Opt, Server};
use sentry::IntoDsn;

use ral::{
    config::{Config, Ral},
    core::{status, ServiceContainer},
    logging::{init_stderr_logger, Logger},
    orchestration::{ComponentLifecycle, PoolDrainService},
    service::{AggregateHttpApp, StatusHttpApp},
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() {
    // Load configuration and command-line arguments
    let cli_options = Opt::parse_args();
    let config = match Config::load_yaml_with_opt_override(&cli_options) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let logger = if let Some(log_cfg) = &config.ral.log {
        let logger = Logger::new(log_cfg.clone());
        logger.init_env_logger();
        Some(logger)
    } else {
        init_stderr_logger();
        None
    };

    // Assemble collaborators, pools and strategies
    let container = match ComponentLifecycle::initialize(&config) {
        Ok(container) => container,
        Err(e) => {
            eprintln!("Failed to initialize components: {e}");
            std::process::exit(1);
        }
    };

    let mut ral_server = Server::new_with_opt_and_conf(Some(cli_options), config.pingora);

    if let Some(log_service) = logger {
        log::info!("Adding log sync service...");
        ral_server.add_service(log_service);
    }

    log::info!("Adding listeners...");
    let http_service =
        match AggregateHttpApp::aggregate_http_service(&config.ral.listeners, container.clone()) {
            Ok(service) => service,
            Err(e) => {
                eprintln!("Failed to add listeners: {e}");
                std::process::exit(1);
            }
        };

    log::info!("Adding pool drain service...");
    ral_server.add_service(PoolDrainService::new(container.clone(), SHUTDOWN_GRACE));

    add_optional_services(&mut ral_server, &config.ral, &container);

    log::info!("Bootstrapping...");
    ral_server.bootstrap();
    log::info!("Bootstrapped. Adding Services...");
    ral_server.add_service(http_service);
    status::mark_ready();

    log::info!("Starting Server...");
    ral_server.run_forever();
}

/// Add optional services (Sentry, Status, Prometheus)
fn add_optional_services(
    server: &mut Server,
    cfg: &Ral,
    container: &Arc<ServiceContainer>,
) {
    if let Some(sentry_cfg) = &cfg.sentry {
        log::info!("Adding Sentry config...");
        match sentry_cfg.dsn.clone().into_dsn() {
            Ok(Some(dsn)) => {
                server.sentry = Some(sentry::ClientOptions {
                    dsn: Some(dsn),
                    ..Default::default()
                });
            }
            Ok(None) => log::warn!("Sentry DSN is empty or invalid, Sentry disabled."),
            Err(e) => log::error!("Error parsing Sentry DSN: {e}"),
        }
    }

    if let Some(status_cfg) = &cfg.status {
        log::info!("Adding Status HTTP...");
        server.add_service(StatusHttpApp::status_http_service(
            status_cfg,
            container.clone(),
        ));
    }

    if let Some(prometheus_cfg) = &cfg.prometheus {
        log::info!("Adding Prometheus HTTP...");
        let mut prometheus_service_http = Service::prometheus_http_service();
        prometheus_service_http.add_tcp(&prometheus_cfg.address.to_string());
        server.add_service(prometheus_service_http);
    }
}
