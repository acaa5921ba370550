use crate::domain::price::AlertEvent;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

pub mod email;

pub use email::EmailNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("EMAIL_USER or EMAIL_PASSWORD is not configured")]
    MissingCredentials,

    #[error("invalid email address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("failed to build alert email: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

pub fn format_alert(event: &AlertEvent) -> AlertMessage {
    let pct = money(event.drop_percent());
    let previous = money(event.previous_price);
    let current = money(event.current_price);
    let drop = money(event.drop_amount());

    AlertMessage {
        subject: format!(
            "ALERTA DE PRECIO: {} cayó un {pct:.2}%",
            event.product_id
        ),
        body: format!(
            "Componente: {}\n\
             Precio Anterior: ${previous:.2}\n\
             Precio Actual: ${current:.2}\n\
             Caída Total: ${drop:.2}\n\
             URL: {}",
            event.product_id, event.source_url
        ),
    }
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
