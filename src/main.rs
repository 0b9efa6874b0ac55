use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use log::{error, info, LevelFilter};
use rust_manga_sync::app_state::AppState;
use rust_manga_sync::{config, crawler, scheduler, store};

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

#[get("/")]
async fn index(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().body(format!(
        "Welcome to the manga sync service (source: {})",
        data.config.source
    ))
}

#[post("/crawl")]
async fn trigger_crawl(data: web::Data<AppState>) -> impl Responder {
    if crawler::spawn_crawl(data.clone()) {
        HttpResponse::Accepted().json(serde_json::json!({"status": "started"}))
    } else {
        HttpResponse::Conflict().json(serde_json::json!({"error": "Crawl already in progress"}))
    }
}

#[get("/crawl/status")]
async fn crawl_status(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.progress_snapshot())
}

#[get("/stats")]
async fn get_stats(data: web::Data<AppState>) -> impl Responder {
    match data.store.stats().await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => {
            error!("stats query failed: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({"error": e.to_string()}))
        }
    }
}

async fn not_found() -> impl Responder {
    HttpResponse::NotFound().json(serde_json::json!({"error": "Route not found"}))
}

fn init_logging() {
    if let Err(e) = log4rs::init_file("log4rs.yml", Default::default()) {
        use log4rs::append::console::ConsoleAppender;
        use log4rs::config::{Appender, Config, Root};
        use log4rs::encode::pattern::PatternEncoder;

        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}",
            )))
            .build();
        let config = Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Info));

        match config.map(log4rs::init_config) {
            Ok(Ok(_)) => info!("log4rs.yml unavailable ({}), logging to console", e),
            Ok(Err(err)) => eprintln!("logger already set: {}", err),
            Err(err) => eprintln!("invalid console logging config: {}", err),
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();

    let cfg = config::Config::load();
    let store = store::open_store(&cfg.storage)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    info!("Manga sync service starting:");
    info!("  Source: {}", cfg.source);
    info!(
        "  Pages: {}..={} ({:?}), concurrency {}",
        cfg.crawl.first_page, cfg.crawl.last_page, cfg.crawl.order, cfg.crawl.concurrency
    );
    info!("  Browser enabled: {}", cfg.bot_detection.enable_browser);

    let addr = (cfg.server.host.clone(), cfg.server.port);
    let data = web::Data::new(AppState::new(cfg, store));

    // start background scheduler
    scheduler::spawn(data.clone());

    info!("Listening on {}:{}", addr.0, addr.1);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(health)
            .service(index)
            .service(trigger_crawl)
            .service(crawl_status)
            .service(get_stats)
            .default_service(web::route().to(not_found))
    })
    .bind(addr)?
    .run()
    .await
}
