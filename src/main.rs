use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pacepulse::config::Config;
use pacepulse::gateway::{PaymentGateway, SslcommerzGateway};
use pacepulse::openapi::ApiDoc;
use pacepulse::repo::{inmem::InMemRepo, mongo::MongoRepo, Repo};
use pacepulse::routes;
use pacepulse::{AppState, RedirectUrls};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Environment comes from the deployment (systemd, Docker, shell); load a
    // .env automatically only in debug builds to cut local setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = Config::from_env()?;
    info!("Bootstrapping Pace Pulse server");

    let repo: Arc<dyn Repo> = match cfg.mongodb_uri.as_deref() {
        Some(uri) => {
            let repo = MongoRepo::connect(uri, &cfg.mongodb_db, cfg.clamp_reg_count_at_zero)
                .await
                .map_err(|e| anyhow::anyhow!("mongodb connection failed: {e}"))?;
            info!("Using MongoDB store (db '{}')", cfg.mongodb_db);
            Arc::new(repo)
        }
        None => {
            info!("MONGODB_URI not set; using in-memory store");
            Arc::new(InMemRepo::new(cfg.clamp_reg_count_at_zero))
        }
    };

    let gateway: Option<Arc<dyn PaymentGateway>> = match cfg.payment.as_ref() {
        Some(p) => {
            let gw = SslcommerzGateway::new(&*p.store_id, &*p.store_passwd, p.live, p.timeout)
                .map_err(|e| anyhow::anyhow!("gateway http client init failed: {e}"))?;
            Some(Arc::new(gw) as Arc<dyn PaymentGateway>)
        }
        None => None,
    };
    info!("Payment checkout enabled: {}", gateway.is_some());

    let urls = RedirectUrls {
        server_base: cfg
            .server_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", cfg.port)),
        client_base: cfg.client_base_url.clone(),
    };
    let state = AppState { repo, gateway, urls };
    let openapi = ApiDoc::openapi();
    let client_origin = cfg.client_base_url.clone();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&client_origin)
            // local frontend dev server
            .allowed_origin("http://localhost:5173")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(routes::config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(("0.0.0.0", cfg.port))?;

    info!("Listening on http://0.0.0.0:{}", cfg.port);

    server.run().await?;
    Ok(())
}
