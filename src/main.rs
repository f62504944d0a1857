use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sysdiagram_backend::handlers;
use sysdiagram_backend::services::ai_client::{OpenAiConfig, OpenAiProvider};
use sysdiagram_backend::services::diagram_files::DiagramFiles;
use sysdiagram_backend::services::generation_orchestrator::GenerationOrchestrator;
use sysdiagram_backend::services::generation_watchdog::start_generation_watchdog;
use sysdiagram_backend::utils::{
    config::Config, db::establish_connection, validators::validate_url,
};

fn fail(message: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", message, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", message, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file FIRST before anything else
    dotenv::dotenv().ok();

    // Initialize logger with default level if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=================================================");
    println!("🚀 SysDiagramAI Backend Server");
    println!("=================================================");

    // Load configuration
    let config = Config::from_env().map_err(|e| fail("Failed to load configuration", e))?;
    validate_url(&config.ai_base_url).map_err(|e| fail("AI_BASE_URL is not usable", e))?;
    let host = config.host.clone();
    let port = config.port;

    println!("📝 Configuration loaded:");
    println!(
        "   - Database: {}",
        config.database_url.split('@').last().unwrap_or("***")
    );
    println!("   - Host: {}", host);
    println!("   - Port: {}", port);
    println!("   - AI model: {} ({})", config.ai_model, config.ai_base_url);
    println!("   - Diagrams dir: {}", config.diagrams_dir);
    println!(
        "   - Generation timeout: {}",
        config
            .generation_timeout_minutes
            .map(|m| format!("{} min", m))
            .unwrap_or_else(|| "DISABLED".to_string())
    );
    println!(
        "   - Log level: {}",
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    );

    // Establish database connection
    print!("🔌 Connecting to database... ");
    let db = establish_connection(&config.database_url)
        .await
        .map_err(|e| fail("Failed to connect to database", e))?;
    println!("✅ Connected!");

    log::info!("Database connection established");

    let provider = OpenAiProvider::new(OpenAiConfig::from(&config))
        .map_err(|e| fail("Failed to build AI client", e))?;
    let files = DiagramFiles::new(&config.diagrams_dir);
    let orchestrator = GenerationOrchestrator::new(db.clone(), Arc::new(provider), files.clone());

    // Time out attempts that never finish, when a policy is configured
    start_generation_watchdog(db.clone(), &config);

    // Start HTTP server
    println!("🌐 Starting HTTP server at http://{}:{}", host, port);
    println!("📍 Available endpoints (JWT required):");
    println!("   - POST   http://{}:{}/requirements", host, port);
    println!("   - GET    http://{}:{}/requirements", host, port);
    println!("   - GET    http://{}:{}/requirements/{{id}}", host, port);
    println!("   - PATCH  http://{}:{}/requirements/{{id}}", host, port);
    println!("   - DELETE http://{}:{}/requirements/{{id}}", host, port);
    println!("   - POST   http://{}:{}/generation/status/init", host, port);
    println!("   - GET    http://{}:{}/generation/status", host, port);
    println!("   - POST   http://{}:{}/generation/generate", host, port);
    println!("   - POST   http://{}:{}/generation/retry", host, port);
    println!("   - GET    http://{}:{}/diagrams/{{requirement_id}}/{{file}}", host, port);
    println!("=================================================");

    log::info!("Server started at http://{}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://localhost:3000")
            .allowed_origin(&config.frontend_url)
            .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(db.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(files.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .wrap(Logger::default())
            .wrap(cors) // CORS must be wrapped AFTER Logger to ensure headers are added to all responses
            .configure(handlers::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
