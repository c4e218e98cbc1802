use std::{io, sync::Arc};

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod auth;
mod balance;
mod config;
mod draft;
mod error;
mod listing;
mod routes;
mod schemas;
mod split;
mod state;
#[cfg(test)]
mod test_utils;

use api::HttpApi;
use auth::SessionSigner;
use config::Config;
use state::AppState;

#[actix_web::main]
async fn main() -> io::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading configuration...");
    let config = Config::load().map_err(io::Error::other)?;
    let api = HttpApi::new(&config.api_base_url, config.request_timeout).map_err(io::Error::other)?;
    let signer = SessionSigner::new(&config.session_secret)
        .ok_or_else(|| io::Error::other("session secret cannot key HMAC-SHA256"))?;
    info!("Backend API at {}", config.api_base_url);

    let port = config.port;
    let origin = config.allowed_origin.clone();
    let state = web::Data::new(AppState::new(config, Arc::new(api), signer));

    info!("Binding to 0.0.0.0:{port}");
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
