use crate::dates::{format_date, format_date_time};
use crate::errors::AppResult;
use crate::models::{EmailConfig, EmailMessage, Notification};
use crate::redaction::Redactor;
use chrono::{DateTime, Utc};

/// Outbound mail seam. A real SMTP or provider transport replaces
/// [`LogMailer`] here.
pub trait Mailer: Send + Sync {
    fn deliver(&self, message: &EmailMessage, config: Option<&EmailConfig>) -> AppResult<()>;
}

/// Simulated transport: the composed message is only written to the log.
#[derive(Debug, Default, Clone)]
pub struct LogMailer {
    redactor: Redactor,
}

impl LogMailer {
    pub fn new() -> Self {
        Self {
            redactor: Redactor::new(true),
        }
    }
}

impl Mailer for LogMailer {
    fn deliver(&self, message: &EmailMessage, config: Option<&EmailConfig>) -> AppResult<()> {
        let transport = match config {
            Some(config) => self.redactor.redact(&serde_json::to_string(config)?).content,
            None => "unconfigured".to_string(),
        };
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            transport = %transport,
            body = %message.body,
            "sending contract expiration email"
        );
        Ok(())
    }
}

pub fn compose_message(notification: &Notification, recipient: &str, now: DateTime<Utc>) -> EmailMessage {
    EmailMessage {
        to: recipient.to_string(),
        subject: format!("Contract expiring in {} days", notification.days_until_expiration),
        body: render_body(notification, now),
    }
}

fn render_body(notification: &Notification, now: DateTime<Utc>) -> String {
    format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
      <h2 style="color: #e74c3c;">Contract expiration alert</h2>
      <div style="background-color: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0;">
        <h3 style="margin-top: 0; color: #2c3e50;">Contract details</h3>
        <p><strong>Branch:</strong> {branch}</p>
        <p><strong>Operator:</strong> {operator}</p>
        <p><strong>Plan:</strong> {plan}</p>
        <p><strong>Expiration date:</strong> {expires}</p>
        <p><strong>Days until expiration:</strong> <span style="color: #e74c3c; font-weight: bold;">{days} days</span></p>
      </div>
      <div style="background-color: #fff3cd; border: 1px solid #ffeaa7; padding: 15px; border-radius: 8px; margin: 20px 0;">
        <p style="margin: 0;"><strong>Action required:</strong></p>
        <p style="margin: 5px 0 0 0;">Contact the operator to renew or renegotiate the contract before it expires.</p>
      </div>
      <p style="margin-top: 30px; font-size: 12px; color: #666;">
        Automatic message from the telecom management system.<br>
        Sent at: {sent}
      </p>
    </div>
  </body>
</html>"#,
        branch = escape_html(&notification.branch_name),
        operator = escape_html(&notification.operator_name),
        plan = escape_html(&notification.plan),
        expires = format_date(notification.expiration_date),
        days = notification.days_until_expiration,
        sent = format_date_time(now),
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::{compose_message, LogMailer, Mailer};
    use crate::models::{EmailConfig, Notification};
    use chrono::{TimeZone, Utc};

    fn notification() -> Notification {
        Notification {
            id: "notif_c-1_abc".to_string(),
            contract_id: "c-1".to_string(),
            branch_name: "Filial <Centro>".to_string(),
            operator_name: "Claro".to_string(),
            plan: "Internet Fibra 500MB".to_string(),
            expiration_date: Utc.with_ymd_and_hms(2024, 9, 30, 0, 0, 0).unwrap(),
            days_until_expiration: 3,
            email_sent: false,
            sent_at: None,
        }
    }

    #[test]
    fn subject_and_body_carry_contract_fields() {
        let now = Utc.with_ymd_and_hms(2024, 9, 27, 8, 15, 0).unwrap();
        let message = compose_message(&notification(), "admin@empresa.com", now);

        assert_eq!(message.to, "admin@empresa.com");
        assert_eq!(message.subject, "Contract expiring in 3 days");
        assert!(message.body.contains("Filial &lt;Centro&gt;"));
        assert!(message.body.contains("Claro"));
        assert!(message.body.contains("Internet Fibra 500MB"));
        assert!(message.body.contains("30/09/2024"));
        assert!(message.body.contains("27/09/2024 08:15"));
    }

    #[test]
    fn log_mailer_accepts_with_and_without_config() {
        let mailer = LogMailer::new();
        let message = compose_message(&notification(), "noc@example.com", Utc::now());
        assert!(mailer.deliver(&message, None).is_ok());

        let config = EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 465,
            smtp_user: "alerts".to_string(),
            smtp_password: "secret".to_string(),
            from_email: "alerts@example.com".to_string(),
            from_name: "Alerts".to_string(),
        };
        assert!(mailer.deliver(&message, Some(&config)).is_ok());
    }
}
