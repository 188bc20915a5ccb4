use crate::dashboard::DashboardCore;
use crate::models::{
    AppSettings, BooleanResponse, Contract, ContractInput, ContractView, DashboardStats, EmailConfig, Invoice,
    InvoiceInput, InvoiceView, Notification, Operator, OperatorInput, SendSummary,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<DashboardCore>,
}

impl AppState {
    pub fn new(core: Arc<DashboardCore>) -> Self {
        Self { core }
    }
}

pub fn operators_list(state: &AppState) -> Result<Vec<Operator>, String> {
    Ok(state.core.list_operators())
}

/// Creates when `id` is absent, updates in place otherwise.
pub fn operator_save(state: &AppState, id: Option<String>, input: OperatorInput) -> Result<Operator, String> {
    match id {
        Some(id) => state.core.update_operator(&id, input),
        None => state.core.create_operator(input),
    }
    .map_err(to_client_error)
}

pub fn operator_delete(state: &AppState, id: String) -> Result<BooleanResponse, String> {
    state
        .core
        .delete_operator(&id)
        .map(|ok| BooleanResponse { ok })
        .map_err(to_client_error)
}

pub fn contracts_list(state: &AppState) -> Result<Vec<ContractView>, String> {
    Ok(state.core.list_contract_views())
}

pub fn contract_save(state: &AppState, id: Option<String>, input: ContractInput) -> Result<Contract, String> {
    match id {
        Some(id) => state.core.update_contract(&id, input),
        None => state.core.create_contract(input),
    }
    .map_err(to_client_error)
}

pub fn contract_delete(state: &AppState, id: String) -> Result<BooleanResponse, String> {
    state
        .core
        .delete_contract(&id)
        .map(|ok| BooleanResponse { ok })
        .map_err(to_client_error)
}

pub fn invoices_list(state: &AppState) -> Result<Vec<InvoiceView>, String> {
    Ok(state.core.list_invoice_views())
}

pub fn invoice_save(state: &AppState, id: Option<String>, input: InvoiceInput) -> Result<Invoice, String> {
    match id {
        Some(id) => state.core.update_invoice(&id, input),
        None => state.core.create_invoice(input),
    }
    .map_err(to_client_error)
}

pub fn invoice_delete(state: &AppState, id: String) -> Result<BooleanResponse, String> {
    state
        .core
        .delete_invoice(&id)
        .map(|ok| BooleanResponse { ok })
        .map_err(to_client_error)
}

pub fn dashboard_stats(state: &AppState) -> Result<DashboardStats, String> {
    Ok(state.core.dashboard_stats())
}

pub fn notifications_list(state: &AppState) -> Result<Vec<Notification>, String> {
    Ok(state.core.notifications().get_notifications())
}

pub fn notifications_check(state: &AppState) -> Result<Vec<Notification>, String> {
    Ok(state.core.refresh_notifications())
}

pub async fn notification_send(state: &AppState, notification_id: String) -> Result<BooleanResponse, String> {
    let engine = state.core.notifications();
    let notification = engine
        .get_notifications()
        .into_iter()
        .find(|notification| notification.id == notification_id)
        .ok_or_else(|| format!("NOT_FOUND: Notification {} not found", notification_id))?;
    let ok = engine.send_email_notification(&notification).await;
    Ok(BooleanResponse { ok })
}

pub async fn notifications_send_pending(state: &AppState) -> Result<SendSummary, String> {
    Ok(state.core.notifications().send_pending_notifications().await)
}

pub fn notification_mark_read(state: &AppState, notification_id: String) -> Result<BooleanResponse, String> {
    state
        .core
        .notifications()
        .mark_as_read(&notification_id)
        .map(|ok| BooleanResponse { ok })
        .map_err(to_client_error)
}

pub fn notifications_clean(state: &AppState) -> Result<usize, String> {
    state
        .core
        .notifications()
        .clean_old_notifications()
        .map_err(to_client_error)
}

pub fn email_configure(state: &AppState, config: EmailConfig) -> Result<BooleanResponse, String> {
    state
        .core
        .notifications()
        .configure_email(config)
        .map(|_| BooleanResponse { ok: true })
        .map_err(to_client_error)
}

pub fn get_settings(state: &AppState) -> Result<AppSettings, String> {
    state.core.get_settings().map_err(to_client_error)
}

pub fn update_settings(state: &AppState, settings: serde_json::Value) -> Result<AppSettings, String> {
    state.core.update_settings(settings).map_err(to_client_error)
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContractStatus, ServiceType};
    use chrono::{Duration, Utc};

    fn state(dir: &tempfile::TempDir) -> AppState {
        let core = DashboardCore::new(dir.path().to_path_buf()).expect("core");
        core.update_settings(serde_json::json!({ "sendDelayMs": 0, "sendSpacingMs": 0 }))
            .expect("settings");
        AppState::new(core)
    }

    #[test]
    fn save_creates_then_updates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(&dir);
        let input = OperatorInput {
            name: "Vivo".to_string(),
            service_type: ServiceType::Mobile,
            support_contact: "(11) 1058-8888".to_string(),
        };

        let created = operator_save(&state, None, input.clone()).expect("create");
        let updated = operator_save(
            &state,
            Some(created.id.clone()),
            OperatorInput {
                name: "Vivo Empresas".to_string(),
                ..input
            },
        )
        .expect("update");

        assert_eq!(updated.id, created.id);
        assert_eq!(operators_list(&state).expect("list").len(), 1);
    }

    #[test]
    fn errors_surface_as_prefixed_strings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(&dir);
        let error = operator_save(
            &state,
            None,
            OperatorInput {
                name: String::new(),
                service_type: ServiceType::Fixed,
                support_contact: "x".to_string(),
            },
        )
        .expect_err("validation");
        assert!(error.starts_with("VALIDATION:"));
    }

    #[tokio::test]
    async fn send_by_id_marks_notification_sent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(&dir);
        let now = Utc::now();
        contract_save(
            &state,
            None,
            ContractInput {
                branch_name: "Filial Manaus".to_string(),
                operator_id: "missing".to_string(),
                plan: "Fixo Ilimitado".to_string(),
                start_date: now - Duration::days(200),
                end_date: now + Duration::days(1),
                monthly_value: 89.99,
                status: ContractStatus::Active,
            },
        )
        .expect("contract");

        let pending = notifications_list(&state).expect("list");
        assert_eq!(pending.len(), 1);

        let response = notification_send(&state, pending[0].id.clone()).await.expect("send");
        assert!(response.ok);
        assert!(notification_send(&state, "nope".to_string()).await.is_err());
        assert!(notifications_list(&state).expect("list")[0].email_sent);
    }
}
