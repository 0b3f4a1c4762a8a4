use actix_web::{App, HttpServer, middleware, web};

use stagegate::auth::roles::RoleResolver;
use stagegate::config::AppConfig;
use stagegate::handlers::api_v1;
use stagegate::service::{AccessService, AppState};
use stagegate::store::PgStore;
use stagegate::warnings::{AlertQueue, scheduler};
use stagegate::db;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = AppConfig::from_env().expect("Invalid configuration");
    let database_url = config.require_database_url().expect("DATABASE_URL must be set");

    let pool = db::init_pool(database_url, config.db_max_connections)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool).await.expect("Failed to run migrations");

    let store = PgStore::new(pool);
    let retry = config.retry_policy();
    let alerts = AlertQueue::new(config.alert_capacity);

    scheduler::spawn_scheduler(store.clone(), alerts.clone(), retry, config.degraded_scan_interval);

    let resolver = RoleResolver::new(config.system_admin_group.clone());
    let service = AccessService::new(store, resolver, retry, alerts);
    let bind_addr = config.bind_addr.clone();
    let state = web::Data::new(AppState { service, config });

    log::info!("Starting server at http://{bind_addr}");

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(web::scope("/api/v1").configure(api_v1::configure::<PgStore>))
            .default_service(web::to(|| async {
                actix_web::HttpResponse::NotFound().json(serde_json::json!({
                    "error": "Not found",
                    "code": "not_found",
                }))
            }))
    })
    .bind(bind_addr)?
    .run()
    .await
}
