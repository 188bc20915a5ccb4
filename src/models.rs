use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    Mobile,
    Fixed,
    Internet,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "Mobile",
            Self::Fixed => "Fixed",
            Self::Internet => "Internet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    Active,
    Inactive,
}

impl ContractStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Paid,
    Pending,
    Overdue,
}

impl InvoiceStatus {
    /// Fixed reporting order; dashboard colors are keyed on it.
    pub const ALL: [InvoiceStatus; 3] = [Self::Paid, Self::Pending, Self::Overdue];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "Paid",
            Self::Pending => "Pending",
            Self::Overdue => "Overdue",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: String,
    pub name: String,
    pub service_type: ServiceType,
    pub support_contact: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: String,
    pub branch_name: String,
    pub operator_id: String,
    pub plan: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub monthly_value: f64,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub contract_id: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub amount: f64,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorInput {
    pub name: String,
    pub service_type: ServiceType,
    pub support_contact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInput {
    pub branch_name: String,
    pub operator_id: String,
    pub plan: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub monthly_value: f64,
    pub status: ContractStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInput {
    pub contract_id: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub amount: f64,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    #[serde(flatten)]
    pub contract: Contract,
    pub operator_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub contract_label: String,
}

/// Expiration reminder. Branch/operator/plan/date are captured when the
/// reminder is created and never re-synced with the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub contract_id: String,
    pub branch_name: String,
    pub operator_name: String,
    pub plan: String,
    pub expiration_date: DateTime<Utc>,
    pub days_until_expiration: i64,
    pub email_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyInvoices {
    pub month: String,
    pub issued: usize,
    pub paid: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdown {
    pub status: InvoiceStatus,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_invoices: usize,
    pub total_amount: f64,
    pub monthly_invoices: Vec<MonthlyInvoices>,
    pub invoices_by_status: Vec<StatusBreakdown>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    pub scan_interval_secs: u64,
    pub expiration_window_days: i64,
    pub send_delay_ms: u64,
    pub send_spacing_ms: u64,
    pub retention_days: i64,
    pub recipient: String,
    pub auto_send_pending: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 3600,
            expiration_window_days: 5,
            send_delay_ms: 1000,
            send_spacing_ms: 2000,
            retention_days: 30,
            recipient: "admin@empresa.com".to_string(),
            auto_send_pending: false,
        }
    }
}

const MAX_WINDOW_DAYS: i64 = 3650;
const MAX_SCAN_INTERVAL_SECS: u64 = 7 * 24 * 3600;
const MAX_DELAY_MS: u64 = 10 * 60 * 1000;

impl AppSettings {
    pub fn validate(&self) -> AppResult<()> {
        if !(0..=MAX_WINDOW_DAYS).contains(&self.expiration_window_days) {
            return Err(AppError::validation("expirationWindowDays", "must be between 0 and 3650"));
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&self.retention_days) {
            return Err(AppError::validation("retentionDays", "must be between 0 and 3650"));
        }
        if !(1..=MAX_SCAN_INTERVAL_SECS).contains(&self.scan_interval_secs) {
            return Err(AppError::validation("scanIntervalSecs", "must be between 1 and 604800"));
        }
        if self.send_delay_ms > MAX_DELAY_MS || self.send_spacing_ms > MAX_DELAY_MS {
            return Err(AppError::validation("sendDelayMs", "delays must not exceed 600000"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppSettings, ContractStatus, InvoiceStatus, Notification, ServiceType};
    use crate::errors::AppError;

    #[test]
    fn enums_use_pascal_case_wire_names() {
        assert_eq!(serde_json::to_string(&ContractStatus::Active).expect("json"), "\"Active\"");
        let status: InvoiceStatus = serde_json::from_str("\"Overdue\"").expect("status");
        assert_eq!(status, InvoiceStatus::Overdue);
    }

    #[test]
    fn notification_without_sent_at_parses() {
        let raw = r#"{
            "id": "notif_1_1700000000000",
            "contractId": "1",
            "branchName": "Filial Recife",
            "operatorName": "Vivo",
            "plan": "Plano 20GB",
            "expirationDate": "2024-01-01T00:00:00.000Z",
            "daysUntilExpiration": 4,
            "emailSent": false
        }"#;
        let parsed: Notification = serde_json::from_str(raw).expect("notification");
        assert!(!parsed.email_sent);
        assert!(parsed.sent_at.is_none());
        assert_eq!(parsed.days_until_expiration, 4);
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let parsed: AppSettings = serde_json::from_str(r#"{"retentionDays": 7}"#).expect("settings");
        assert_eq!(parsed.retention_days, 7);
        assert_eq!(parsed.scan_interval_secs, 3600);
        assert_eq!(parsed.expiration_window_days, 5);
    }

    #[test]
    fn as_str_matches_wire_names() {
        for status in InvoiceStatus::ALL {
            assert_eq!(serde_json::to_string(&status).expect("json"), format!("\"{}\"", status.as_str()));
        }
        for status in [ContractStatus::Active, ContractStatus::Inactive] {
            assert_eq!(serde_json::to_string(&status).expect("json"), format!("\"{}\"", status.as_str()));
        }
        for service in [ServiceType::Mobile, ServiceType::Fixed, ServiceType::Internet] {
            assert_eq!(serde_json::to_string(&service).expect("json"), format!("\"{}\"", service.as_str()));
        }
    }

    #[test]
    fn settings_validation_bounds_windows() {
        assert!(AppSettings::default().validate().is_ok());

        let huge = AppSettings {
            expiration_window_days: i64::MAX,
            ..AppSettings::default()
        };
        assert!(matches!(huge.validate(), Err(AppError::Validation(_))));

        let negative = AppSettings {
            retention_days: -1,
            ..AppSettings::default()
        };
        assert!(negative.validate().is_err());

        let zero_interval = AppSettings {
            scan_interval_secs: 0,
            ..AppSettings::default()
        };
        assert!(zero_interval.validate().is_err());
    }
}
