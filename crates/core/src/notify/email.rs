use crate::config::Settings;
use crate::domain::price::AlertEvent;
use crate::notify::{format_alert, AlertMessage, NotifyError, Notifier};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Sends alerts to the sender's own mailbox over SMTP with implicit TLS (port 465).
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    user: Option<String>,
    password: Option<String>,
    smtp_host: String,
}

impl EmailNotifier {
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.email_credentials().is_none() {
            tracing::warn!("EMAIL_USER/EMAIL_PASSWORD not configured; alerts will not be emailed");
        }

        Self {
            user: settings.email_user.clone(),
            password: settings.email_password.clone(),
            smtp_host: settings.smtp_host.clone(),
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.user.as_deref()?, self.password.as_deref()?))
    }
}

pub fn build_message(address: &str, alert: &AlertMessage) -> Result<Message, NotifyError> {
    let mailbox = address
        .parse::<Mailbox>()
        .map_err(|source| NotifyError::Address {
            address: address.to_string(),
            source,
        })?;

    Ok(Message::builder()
        .from(mailbox.clone())
        .to(mailbox)
        .subject(alert.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(alert.body.clone())?)
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let (user, password) = self.credentials().ok_or(NotifyError::MissingCredentials)?;

        let message = build_message(user, &format_alert(event))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_host)?
            .credentials(Credentials::new(user.to_string(), password.to_string()))
            .build();

        tracing::info!(product_id = %event.product_id, to = %user, "sending price alert email");
        transport.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn settings(user: Option<&str>, password: Option<&str>) -> Settings {
        Settings {
            email_user: user.map(str::to_string),
            email_password: password.map(str::to_string),
            smtp_host: crate::config::DEFAULT_SMTP_HOST.to_string(),
            sentry_dsn: None,
            history_path: "unused.csv".into(),
            drop_threshold: crate::config::default_drop_threshold(),
            fetch_timeout_secs: crate::config::DEFAULT_FETCH_TIMEOUT_SECS,
            products: Vec::new(),
        }
    }

    fn event() -> AlertEvent {
        AlertEvent {
            product_id: "M.2 1TB".to_string(),
            previous_price: Decimal::new(80, 0),
            current_price: Decimal::new(60, 0),
            drop_fraction: Decimal::new(-25, 2),
            source_url: "https://shop.example/ssd".to_string(),
        }
    }

    #[tokio::test]
    async fn missing_credentials_short_circuit() {
        for (user, password) in [(None, Some("pw")), (Some("me@example.com"), None), (None, None)] {
            let notifier = EmailNotifier::from_settings(&settings(user, password));
            let err = notifier.notify(&event()).await.unwrap_err();
            assert!(matches!(err, NotifyError::MissingCredentials));
        }
    }

    #[test]
    fn message_is_addressed_to_sender() {
        let message = build_message("me@example.com", &format_alert(&event())).unwrap();
        let envelope = message.envelope();
        assert_eq!(envelope.from().unwrap().to_string(), "me@example.com");
        assert_eq!(envelope.to().len(), 1);
        assert_eq!(envelope.to()[0].to_string(), "me@example.com");
    }

    #[test]
    fn invalid_sender_address_is_reported() {
        let err = build_message("not an address", &format_alert(&event())).unwrap_err();
        assert!(matches!(err, NotifyError::Address { .. }));
    }
}
