use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::ephemeral::EphemeralStore;
use crate::fanout::FanoutEngine;
use crate::messages::MessageService;
use crate::presence::PresenceService;
use crate::rate_limit::RateLimiter;
use crate::registry::SessionRegistry;
use crate::repository::Repository;
use crate::transport::Transport;

/// Per-IP concurrent connection counter, checked at WebSocket upgrade and
/// released on disconnect.
#[derive(Default)]
pub struct IpConnectionCounter {
    counts: Mutex<HashMap<String, usize>>,
}

impl IpConnectionCounter {
    pub fn acquire(&self, ip: &str, max: usize) -> bool {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts.entry(ip.to_string()).or_insert(0);
        if *count >= max {
            return false;
        }
        *count += 1;
        true
    }

    pub fn release(&self, ip: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = counts.get_mut(ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(ip);
            }
        }
    }
}

/// Process-scoped hub state, constructed once at startup and handed to
/// routes and connection tasks by reference.
pub struct Hub {
    pub config: Config,
    pub ephemeral: Arc<dyn EphemeralStore>,
    pub repo: Arc<dyn Repository>,
    pub registry: SessionRegistry,
    pub transport: Transport,
    pub presence: PresenceService,
    pub messages: MessageService,
    pub fanout: FanoutEngine,
    pub rate_limiter: RateLimiter,
    pub ip_connections: IpConnectionCounter,
}

impl Hub {
    pub fn new(config: Config, ephemeral: Arc<dyn EphemeralStore>, repo: Arc<dyn Repository>) -> Self {
        let presence = PresenceService::new(Arc::clone(&ephemeral), Arc::clone(&repo));
        let messages = MessageService::new(Arc::clone(&repo));
        let fanout = FanoutEngine::new(
            Arc::clone(&ephemeral),
            Arc::clone(&repo),
            config.message_queue_retention,
        );
        let rate_limiter =
            RateLimiter::new(Arc::clone(&ephemeral), config.max_messages_per_minute, 60);
        Hub {
            config,
            ephemeral,
            repo,
            registry: SessionRegistry::new(),
            transport: Transport::new(),
            presence,
            messages,
            fanout,
            rate_limiter,
            ip_connections: IpConnectionCounter::default(),
        }
    }
}
