mod auth;
mod health;
mod metrics;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(health::configure)
            .configure(metrics::configure)
            .configure(auth::configure),
    );
}
