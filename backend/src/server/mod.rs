//! Server construction and middleware wiring.

mod config;

pub use config::ServerConfig;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer};

use crate::domain::ports::QueueBackend;
use crate::inbound::http::routes::configure_api;
use crate::inbound::http::spa::SpaAssets;
use crate::inbound::http::state::HttpState;
use crate::middleware::RequestTrace;

/// Assemble the application: request tracing, the API routes, and the
/// single-page-app fallback for everything else.
pub fn build_app<B: QueueBackend>(
    state: HttpState<B>,
    assets: SpaAssets,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .wrap(RequestTrace)
        .configure(|cfg| configure_api(cfg, &state))
        .default_service(assets.service())
}

/// Construct an Actix HTTP server serving the admin API.
///
/// # Returns
/// A spawned [`Server`] that must be awaited to drive the listener.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server<B: QueueBackend>(
    state: HttpState<B>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let ServerConfig { bind_addr, assets } = config;
    let server = HttpServer::new(move || build_app(state.clone(), assets.clone()))
        .bind(bind_addr)?
        .run();
    Ok(server)
}
