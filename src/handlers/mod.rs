pub mod addresses;
pub mod checkout;
pub mod common;
pub mod orders;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    gateway::{HttpPaymentGateway, PaymentGateway, SignatureVerifier},
    services::{
        addresses::AddressService, checkout::CheckoutService, notifications::NotificationFanout,
        orders::OrderLedger, pricing::PricingService,
    },
};

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub addresses: Arc<AddressService>,
    pub orders: Arc<OrderLedger>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    /// Build the service container, constructing the HTTP gateway client
    /// from configuration when online payments are enabled.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let gateway: Option<Arc<dyn PaymentGateway>> = match (
            config.gateway_base_url.clone(),
            config.gateway_key_id.clone(),
            config.gateway_key_secret.clone(),
        ) {
            (Some(base_url), Some(key_id), Some(key_secret)) => {
                Some(Arc::new(HttpPaymentGateway::new(base_url, key_id, key_secret)))
            }
            _ => None,
        };

        Self::with_gateway(db_pool, event_sender, config, gateway)
    }

    /// Same as [`AppServices::new`] but with an explicit gateway, so tests
    /// can substitute a scripted double.
    pub fn with_gateway(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let addresses = Arc::new(AddressService::new(db_pool.clone()));
        let ledger = Arc::new(OrderLedger::new(db_pool));
        let pricing = PricingService::from_config(config);
        let notifications = Arc::new(NotificationFanout::new(
            config.chat_webhook_url.clone(),
            config.team_webhook_url.clone(),
        ));
        let verifier = config
            .gateway_key_secret
            .as_ref()
            .map(|secret| SignatureVerifier::new(secret.clone()));

        let checkout = Arc::new(CheckoutService::new(
            ledger.clone(),
            addresses.clone(),
            pricing,
            gateway,
            verifier,
            notifications,
            event_sender,
            config.currency.clone(),
            config.gateway_key_id.clone(),
        ));

        Self {
            addresses,
            orders: ledger,
            checkout,
        }
    }
}
