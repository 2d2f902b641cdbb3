use std::sync::Arc;

use chat_hub::config::Config;
use chat_hub::ephemeral::{EphemeralStore, RedisStore};
use chat_hub::hub::Hub;
use chat_hub::repository::SupabaseRepository;

#[rocket::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Fatal: {e}");
            std::process::exit(1);
        }
    };

    let ephemeral: Arc<dyn EphemeralStore> =
        match RedisStore::connect(&config.redis_url, config.redis_password.as_deref()).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                // The ephemeral store is the coordination substrate; without
                // it every handler would degrade.
                eprintln!("Fatal: Redis connection failed: {e}");
                std::process::exit(1);
            }
        };

    let repo = match SupabaseRepository::new(&config.supabase_url, &config.supabase_service_key) {
        Ok(repo) => Arc::new(repo),
        Err(e) => {
            eprintln!("Fatal: failed to build Supabase client: {e}");
            std::process::exit(1);
        }
    };

    let hub = Arc::new(Hub::new(config, ephemeral, repo));
    if let Err(e) = chat_hub::build_rocket(hub).launch().await {
        eprintln!("Fatal: {e}");
        std::process::exit(1);
    }
    println!("Goodbye!");
}
