use std::sync::Arc;

use async_trait::async_trait;
use http::{Response, StatusCode};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use serde::Serialize;

use crate::{
    config::Status,
    core::{container::ServiceContainer, status},
    utils::response::{CommonErrors, ResponseBuilder},
};

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// HTTP application for the readiness probe and pool occupancy.
///
/// Served on its own listener so load balancers can probe it independently
/// of the aggregate endpoints.
pub struct StatusHttpApp {
    config: Status,
    container: Arc<ServiceContainer>,
}

impl StatusHttpApp {
    pub fn new(cfg: &Status, container: Arc<ServiceContainer>) -> Self {
        Self {
            config: cfg.clone(),
            container,
        }
    }

    pub fn status_http_service(cfg: &Status, container: Arc<ServiceContainer>) -> Service<Self> {
        let app = Self::new(cfg, container);
        let addr = app.config.address.to_string();
        let mut service = Service::new("Status HTTP".to_string(), app);
        service.add_tcp(&addr);
        service
    }

    fn route(&self, path: &str) -> Response<Vec<u8>> {
        match path {
            "/status/ready" => handle_ready_endpoint(),
            "/status/pools" => ResponseBuilder::success_json(&self.container.pool_stats()),
            _ => CommonErrors::not_found(),
        }
    }
}

#[async_trait]
impl ServeHttp for StatusHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        http_session.set_keepalive(None);
        self.route(http_session.req_header().uri.path())
    }
}

fn handle_ready_endpoint() -> Response<Vec<u8>> {
    if status::is_ready() {
        let response = StatusResponse {
            status: "ok".to_string(),
            error: None,
        };
        ResponseBuilder::json(StatusCode::OK, &response)
    } else {
        let response = StatusResponse {
            status: "error".to_string(),
            error: Some("Engine not assembled yet".to_string()),
        };
        ResponseBuilder::json(StatusCode::SERVICE_UNAVAILABLE, &response)
    }
}
