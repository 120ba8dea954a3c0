use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::presence::PresenceRegistry;
use crate::relay::EventRelay;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub registry: Arc<PresenceRegistry>,
    pub relay: Arc<EventRelay>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));
        let registry = Arc::new(PresenceRegistry::new());
        let relay = Arc::new(EventRelay::new(registry.clone()));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            registry,
            relay,
            start_time: Instant::now(),
        }
    }
}
