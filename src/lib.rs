pub mod auth;
pub mod config;
pub mod ephemeral;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod hub;
pub mod messages;
pub mod models;
pub mod presence;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod repository;
pub mod routes;
pub mod transport;

use std::sync::Arc;

use rocket_cors::{AllowedOrigins, CorsOptions};

use ephemeral::EphemeralStore;
use hub::Hub;

/// Assemble the Rocket application around an already-constructed hub. The
/// caller chooses the adapters: Redis + Supabase in production, in-memory
/// doubles in tests.
pub fn build_rocket(hub: Arc<Hub>) -> rocket::Rocket<rocket::Build> {
    let allowed_origins = match hub.config.cors_origin_list() {
        None => AllowedOrigins::all(),
        Some(origins) => AllowedOrigins::some_exact(&origins),
    };
    let cors = CorsOptions { allowed_origins, ..Default::default() }
        .to_cors()
        .expect("Failed to create CORS");

    let figment = rocket::Config::figment()
        .merge(("address", hub.config.host.clone()))
        .merge(("port", hub.config.port));

    rocket::custom(figment)
        .manage(hub)
        .attach(cors)
        .mount(
            "/",
            rocket::routes![routes::health, routes::root, routes::socket_connect],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Startup Banner", |rocket| {
            Box::pin(async move {
                let hub = rocket
                    .state::<Arc<Hub>>()
                    .expect("hub state is managed above");
                println!(
                    "🚀 Starting {} v{}",
                    hub.config.app_name, hub.config.app_version
                );
                println!("Environment: {}", hub.config.environment);
                match hub.ephemeral.ping().await {
                    Ok(()) => println!("Redis connected"),
                    Err(e) => eprintln!("⚠️  Redis connection failed: {e}"),
                }
            })
        }))
}
