use crate::config::SmtpConfig;
use crate::models::PriceChangeRecord;
use crate::plugins::traits::{ChangeNotifier, NotificationResult};
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use lettre::message::{header, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rust_decimal::Decimal;

const DEFAULT_APP_URL: &str = "https://your-app-url.com";

/// Sends a price change table over SMTP.
pub struct EmailNotifier {
    config: SmtpConfig,
    currency_code: String,
    app_url: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: SmtpConfig, currency_code: &str, app_url: Option<&str>) -> Result<Self> {
        let username = config
            .username
            .clone()
            .ok_or_else(|| AppError::Notification("SMTP username is not set".to_string()))?;
        let password = config
            .password
            .clone()
            .ok_or_else(|| AppError::Notification("SMTP password is not set".to_string()))?;
        let credentials = Credentials::new(username, password);

        let mailer = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| AppError::Notification(format!("Invalid SMTP relay '{}': {}", config.host, e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port)
        .credentials(credentials)
        .build();

        Ok(Self {
            config,
            currency_code: currency_code.to_string(),
            app_url: app_url.unwrap_or(DEFAULT_APP_URL).trim_end_matches('/').to_string(),
            mailer,
        })
    }

    fn format_subject(&self, price_changes: &[PriceChangeRecord]) -> String {
        format!("Price Change Alert - {} products updated", price_changes.len())
    }

    fn format_html_body(&self, price_changes: &[PriceChangeRecord]) -> String {
        let mut html = String::new();

        html.push_str(&format!(
            r#"
<h2>Price Change Notification</h2>
<p>The following products have price changes:</p>
<table border="1" cellpadding="5" style="border-collapse: collapse;">
  <tr>
    <th>Product</th>
    <th>Previous Price ({code})</th>
    <th>New Price ({code})</th>
    <th>Difference</th>
    <th>% Change</th>
    <th>On Offer</th>
  </tr>
"#,
            code = self.currency_code
        ));

        for change in price_changes {
            let color = if change.is_increase() { "color: red;" } else { "color: green;" };
            html.push_str(&format!(
                r#"  <tr>
    <td><a href="{url}">{name}</a></td>
    <td>{old}</td>
    <td>{new}</td>
    <td style="{color}">{difference}</td>
    <td style="{color}">{percentage}</td>
    <td>{offer}</td>
  </tr>
"#,
                url = escape_html(&change.url),
                name = escape_html(&change.name),
                old = money(change.old_price),
                new = money(change.new_price),
                color = color,
                difference = signed_difference(change),
                percentage = signed_percentage(change),
                offer = self.offer_label(change),
            ));
        }

        html.push_str(&format!(
            r#"</table>
<p>View all products: <a href="{}/products">Open Product Dashboard</a></p>
"#,
            self.app_url
        ));

        html
    }

    fn format_text_body(&self, price_changes: &[PriceChangeRecord]) -> String {
        let mut text = String::new();

        text.push_str("PRICE CHANGE NOTIFICATION\n\n");
        for change in price_changes {
            text.push_str(&format!("{}\n", change.name));
            text.push_str(&format!(
                "  {} {} -> {} {} ({}, {})\n",
                self.currency_code,
                money(change.old_price),
                self.currency_code,
                money(change.new_price),
                signed_difference(change),
                signed_percentage(change)
            ));
            text.push_str(&format!("  On offer: {}\n", self.offer_label(change)));
            text.push_str(&format!("  {}\n\n", change.url));
        }
        text.push_str(&format!("View all products: {}/products\n", self.app_url));

        text
    }

    fn offer_label(&self, change: &PriceChangeRecord) -> String {
        match (change.is_on_offer, change.original_price) {
            (true, Some(original)) => format!("Yes (Original: {} {})", self.currency_code, money(original)),
            (true, None) => "Yes".to_string(),
            (false, _) => "No".to_string(),
        }
    }

    fn build_message(&self, price_changes: &[PriceChangeRecord]) -> Result<Message> {
        let sender = self
            .config
            .sender()
            .ok_or_else(|| AppError::Notification("No sender address configured".to_string()))?;
        let recipient = self
            .config
            .recipient()
            .ok_or_else(|| AppError::Notification("No recipient address configured".to_string()))?;

        let from = format!("{} <{}>", self.config.from_name, sender)
            .parse()
            .map_err(|e| AppError::Notification(format!("Invalid sender address: {}", e)))?;
        let to = recipient
            .parse()
            .map_err(|e| AppError::Notification(format!("Invalid recipient address: {}", e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(self.format_subject(price_changes))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(self.format_text_body(price_changes)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(self.format_html_body(price_changes)),
                    ),
            )
            .map_err(|e| AppError::Notification(format!("Failed to build email: {}", e)))
    }
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value)
}

fn signed_difference(change: &PriceChangeRecord) -> String {
    let sign = if change.is_increase() { "+" } else { "" };
    format!("{}{:.2}", sign, change.difference)
}

fn signed_percentage(change: &PriceChangeRecord) -> String {
    match &change.percentage_change {
        Some(percentage) => {
            let sign = if change.is_increase() { "+" } else { "" };
            format!("{}{}%", sign, percentage)
        }
        None => "n/a".to_string(),
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl ChangeNotifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, price_changes: &[PriceChangeRecord]) -> Result<NotificationResult> {
        let email = self.build_message(price_changes)?;

        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| AppError::Notification(format!("SMTP delivery failed: {}", e)))?;

        tracing::info!(count = price_changes.len(), "Price change email sent");
        Ok(NotificationResult::delivered(
            response.message().next().map(|line| line.to_string()),
        ))
    }
}
