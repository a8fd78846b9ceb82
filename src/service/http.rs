use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderValue, Method, Response};
use log::{debug, error};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use pingora_http::RequestHeader;

use crate::{
    config::Listener,
    core::{container::ServiceContainer, context::RequestContext},
    executor::list_workers,
    orchestration::{Route, StrategyKind},
    utils::{
        request::{get_req_header_value, query_values, request_from_query, REQUEST_ID_HEADER},
        response::{CommonErrors, ResponseBuilder},
    },
};

/// HTTP application serving the aggregate endpoints and the worker listing.
pub struct AggregateHttpApp {
    container: Arc<ServiceContainer>,
}

impl AggregateHttpApp {
    pub fn new(container: Arc<ServiceContainer>) -> Self {
        Self { container }
    }

    pub fn aggregate_http_service(
        listeners: &[Listener],
        container: Arc<ServiceContainer>,
    ) -> pingora_error::Result<Service<Self>> {
        let mut service = Service::new("Ral HTTP".to_string(), Self::new(container));
        for listener in listeners {
            let addr = listener.address.to_string();
            match &listener.tls {
                Some(tls) => service.add_tls(&addr, &tls.cert_path, &tls.key_path)?,
                None => service.add_tcp(&addr),
            }
        }
        Ok(service)
    }

    /// Answer one request from its header.
    pub async fn handle(&self, req_header: &RequestHeader) -> Response<Vec<u8>> {
        if req_header.method != Method::GET {
            return CommonErrors::method_not_allowed();
        }

        match self.container.router().match_path(req_header.uri.path()) {
            Some(Route::Aggregate(kind)) => self.aggregate(kind, req_header).await,
            Some(Route::Threads) => {
                let prefix = query_values(req_header, "prefix").into_iter().next();
                ResponseBuilder::success_json(&list_workers(prefix.as_deref()))
            }
            None => CommonErrors::not_found(),
        }
    }

    async fn aggregate(&self, kind: StrategyKind, req_header: &RequestHeader) -> Response<Vec<u8>> {
        let ctx = match get_req_header_value(req_header, REQUEST_ID_HEADER) {
            Some(id) if !id.trim().is_empty() => RequestContext::new(id.trim()),
            _ => RequestContext::generate(),
        };
        debug!(
            correlation_id = ctx.correlation_id();
            "{} {} via {kind}", req_header.method, req_header.uri
        );

        let mut response = match request_from_query(req_header) {
            Ok(request) => match self.container.executor().execute(kind, &request, &ctx).await {
                Ok(aggregate) => ResponseBuilder::success_json(&aggregate),
                Err(err) => ResponseBuilder::error_json(&err),
            },
            Err(err) => ResponseBuilder::error_json(&err),
        };

        match HeaderValue::from_str(ctx.correlation_id()) {
            Ok(value) => {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            Err(e) => error!("Cannot echo correlation id: {e}"),
        }
        response
    }
}

#[async_trait]
impl ServeHttp for AggregateHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        self.handle(http_session.req_header()).await
    }
}
