use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;

mod agents;
mod ai;
mod config;
mod controllers;
mod markdown;
mod models;
mod staging;
mod tools;

use agents::AgentFactory;
use config::Config;

pub struct AppState {
    pub config: Config,
    pub factory: Arc<AgentFactory>,
}

const FRONTEND_DIRS: [&str; 2] = ["./recovery-frontend", "../recovery-frontend"];

/// Serves the form page for any path the static files don't cover
async fn index_fallback() -> actix_web::Result<NamedFile> {
    let index = FRONTEND_DIRS
        .iter()
        .map(|dir| Path::new(dir).join("index.html"))
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new(FRONTEND_DIRS[0]).join("index.html"));
    Ok(NamedFile::open(index)?)
}

fn frontend_dir() -> Option<String> {
    // Set DISABLE_FRONTEND=1 when serving the page from elsewhere
    if std::env::var("DISABLE_FRONTEND").map(|v| config::parse_flag(&v)).unwrap_or(false) {
        log::info!("Frontend serving disabled via DISABLE_FRONTEND env var");
        return None;
    }
    if let Ok(dir) = std::env::var("STATIC_DIR") {
        return Some(dir);
    }
    let found = FRONTEND_DIRS.iter().find(|dir| Path::new(dir).exists());
    if found.is_none() {
        log::warn!(
            "Frontend not found in {} - static file serving disabled",
            FRONTEND_DIRS.join(" or ")
        );
    }
    found.map(|dir| dir.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let bind_addr = config.bind_addr.clone();
    let port = config.port;

    log::info!("Staging uploaded images in {}", config.staging_dir.display());
    if let Err(e) = tokio::fs::create_dir_all(&config.staging_dir).await {
        log::error!("Failed to create staging directory {}: {}", config.staging_dir.display(), e);
    }

    log::info!("Initializing agent factory (model: {})", config.model);
    let factory = Arc::new(AgentFactory::from_config(&config));

    let frontend = frontend_dir();

    log::info!("Starting Recovery Squad server on {}:{}", bind_addr, port);
    if let Some(dir) = &frontend {
        log::info!("Serving frontend from: {}", dir);
    }

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let mut app = App::new()
            .app_data(web::Data::new(AppState {
                config: config.clone(),
                factory: Arc::clone(&factory),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::recovery::config);

        if let Some(dir) = &frontend {
            app = app.service(
                Files::new("/", dir.clone())
                    .index_file("index.html")
                    .default_handler(web::to(index_fallback)),
            );
        }

        app
    })
    .bind((bind_addr.as_str(), port))?
    .run()
    .await
}
