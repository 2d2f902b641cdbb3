use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{State, get};

use crate::ephemeral::EphemeralStore;
use crate::hub::Hub;

#[get("/health")]
pub async fn health(hub: &State<Arc<Hub>>) -> Json<serde_json::Value> {
    let redis_status = match hub.ephemeral.ping().await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Json(serde_json::json!({
        "status": "healthy",
        "app": hub.config.app_name,
        "version": hub.config.app_version,
        "redis": redis_status
    }))
}

#[get("/")]
pub fn root(hub: &State<Arc<Hub>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": format!("Welcome to {}", hub.config.app_name),
        "version": hub.config.app_version,
        "socket": "/ws"
    }))
}
