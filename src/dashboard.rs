use crate::db::{Database, StoreKey};
use crate::errors::{AppError, AppResult};
use crate::models::{
    AppSettings, Contract, ContractInput, ContractView, DashboardStats, Invoice, InvoiceInput, InvoiceView,
    Notification, Operator, OperatorInput,
};
use crate::notifications::mailer::{LogMailer, Mailer};
use crate::notifications::{NotificationEngine, OPERATOR_NOT_FOUND};
use crate::stats::compute_stats;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const CONTRACT_NOT_FOUND: &str = "Contract not found";

trait StoredEntity: Serialize + DeserializeOwned + Clone {
    const KEY: StoreKey;
    const LABEL: &'static str;

    fn id(&self) -> &str;
}

impl StoredEntity for Operator {
    const KEY: StoreKey = StoreKey::Operators;
    const LABEL: &'static str = "Operator";

    fn id(&self) -> &str {
        &self.id
    }
}

impl StoredEntity for Contract {
    const KEY: StoreKey = StoreKey::Contracts;
    const LABEL: &'static str = "Contract";

    fn id(&self) -> &str {
        &self.id
    }
}

impl StoredEntity for Invoice {
    const KEY: StoreKey = StoreKey::Invoices;
    const LABEL: &'static str = "Invoice";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Name of the referenced operator, or a placeholder for dangling ids.
pub fn operator_name(operators: &[Operator], operator_id: &str) -> String {
    operators
        .iter()
        .find(|operator| operator.id == operator_id)
        .map(|operator| operator.name.clone())
        .unwrap_or_else(|| OPERATOR_NOT_FOUND.to_string())
}

pub fn contract_label(contracts: &[Contract], contract_id: &str) -> String {
    contracts
        .iter()
        .find(|contract| contract.id == contract_id)
        .map(|contract| format!("{} - {}", contract.branch_name, contract.plan))
        .unwrap_or_else(|| CONTRACT_NOT_FOUND.to_string())
}

fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(field, "is required"));
    }
    Ok(())
}

fn require_positive(field: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::validation(field, "must be greater than zero"));
    }
    Ok(())
}

pub fn validate_operator(input: &OperatorInput) -> AppResult<()> {
    require("name", &input.name)?;
    require("supportContact", &input.support_contact)
}

pub fn validate_contract(input: &ContractInput) -> AppResult<()> {
    require("branchName", &input.branch_name)?;
    require("operatorId", &input.operator_id)?;
    require("plan", &input.plan)?;
    require_positive("monthlyValue", input.monthly_value)
}

pub fn validate_invoice(input: &InvoiceInput) -> AppResult<()> {
    require("contractId", &input.contract_id)?;
    require_positive("amount", input.amount)
}

/// Service facade over the store and the notification engine. Entity
/// references are plain ids; deletes never cascade.
pub struct DashboardCore {
    db: Arc<Database>,
    engine: Arc<NotificationEngine>,
    write_lock: Mutex<()>,
    data_dir: PathBuf,
}

impl DashboardCore {
    pub fn new(data_dir: PathBuf) -> AppResult<Arc<Self>> {
        Self::with_mailer(data_dir, Arc::new(LogMailer::new()))
    }

    pub fn with_mailer(data_dir: PathBuf, mailer: Arc<dyn Mailer>) -> AppResult<Arc<Self>> {
        let db = Arc::new(Database::new(&data_dir.join("state.sqlite"))?);
        let engine = Arc::new(NotificationEngine::new(db.clone(), mailer)?);

        tracing::info!(path = %db.path().display(), "dashboard store opened");

        Ok(Arc::new(Self {
            db,
            engine,
            write_lock: Mutex::new(()),
            data_dir,
        }))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn notifications(&self) -> &Arc<NotificationEngine> {
        &self.engine
    }

    fn list<T: StoredEntity>(&self) -> Vec<T> {
        self.db.read_collection(T::KEY)
    }

    fn get<T: StoredEntity>(&self, id: &str) -> Option<T> {
        self.list::<T>().into_iter().find(|item| item.id() == id)
    }

    fn insert<T: StoredEntity>(&self, build: impl FnOnce(String, DateTime<Utc>) -> T) -> AppResult<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Internal("write lock poisoned".to_string()))?;
        let mut items = self.list::<T>();
        let item = build(Uuid::new_v4().to_string(), Utc::now());
        items.push(item.clone());
        self.db.write_collection(T::KEY, &items)?;
        tracing::info!(entity = T::LABEL, id = item.id(), "created");
        Ok(item)
    }

    fn replace<T: StoredEntity>(&self, id: &str, build: impl FnOnce(&T, DateTime<Utc>) -> T) -> AppResult<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Internal("write lock poisoned".to_string()))?;
        let mut items = self.list::<T>();
        let slot = items
            .iter_mut()
            .find(|item| item.id() == id)
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", T::LABEL, id)))?;
        let updated = build(&*slot, Utc::now());
        *slot = updated.clone();
        self.db.write_collection(T::KEY, &items)?;
        tracing::info!(entity = T::LABEL, id, "updated");
        Ok(updated)
    }

    fn remove<T: StoredEntity>(&self, id: &str) -> AppResult<bool> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Internal("write lock poisoned".to_string()))?;
        let mut items = self.list::<T>();
        let before = items.len();
        items.retain(|item| item.id() != id);
        if items.len() == before {
            return Ok(false);
        }
        self.db.write_collection(T::KEY, &items)?;
        tracing::info!(entity = T::LABEL, id, "deleted");
        Ok(true)
    }

    // ─── Operators ──────────────────────────────────────────────────────────

    pub fn list_operators(&self) -> Vec<Operator> {
        self.list()
    }

    pub fn get_operator(&self, id: &str) -> Option<Operator> {
        self.get(id)
    }

    pub fn create_operator(&self, input: OperatorInput) -> AppResult<Operator> {
        validate_operator(&input)?;
        let created = self.insert(|id, now| Operator {
            id,
            name: input.name,
            service_type: input.service_type,
            support_contact: input.support_contact,
            created_at: now,
            updated_at: now,
        })?;
        tracing::debug!(id = %created.id, service_type = created.service_type.as_str(), "operator registered");
        self.refresh_notifications();
        Ok(created)
    }

    pub fn update_operator(&self, id: &str, input: OperatorInput) -> AppResult<Operator> {
        validate_operator(&input)?;
        let updated = self.replace(id, |existing: &Operator, now| Operator {
            id: existing.id.clone(),
            name: input.name,
            service_type: input.service_type,
            support_contact: input.support_contact,
            created_at: existing.created_at,
            updated_at: now,
        })?;
        self.refresh_notifications();
        Ok(updated)
    }

    pub fn delete_operator(&self, id: &str) -> AppResult<bool> {
        self.remove::<Operator>(id)
    }

    // ─── Contracts ──────────────────────────────────────────────────────────

    pub fn list_contracts(&self) -> Vec<Contract> {
        self.list()
    }

    pub fn list_contract_views(&self) -> Vec<ContractView> {
        let operators = self.list_operators();
        self.list_contracts()
            .into_iter()
            .map(|contract| ContractView {
                operator_name: operator_name(&operators, &contract.operator_id),
                contract,
            })
            .collect()
    }

    pub fn get_contract(&self, id: &str) -> Option<Contract> {
        self.get(id)
    }

    pub fn create_contract(&self, input: ContractInput) -> AppResult<Contract> {
        validate_contract(&input)?;
        let created = self.insert(|id, now| Contract {
            id,
            branch_name: input.branch_name,
            operator_id: input.operator_id,
            plan: input.plan,
            start_date: input.start_date,
            end_date: input.end_date,
            monthly_value: input.monthly_value,
            status: input.status,
            created_at: now,
            updated_at: now,
        })?;
        self.refresh_notifications();
        Ok(created)
    }

    pub fn update_contract(&self, id: &str, input: ContractInput) -> AppResult<Contract> {
        validate_contract(&input)?;
        let updated = self.replace(id, |existing: &Contract, now| Contract {
            id: existing.id.clone(),
            branch_name: input.branch_name,
            operator_id: input.operator_id,
            plan: input.plan,
            start_date: input.start_date,
            end_date: input.end_date,
            monthly_value: input.monthly_value,
            status: input.status,
            created_at: existing.created_at,
            updated_at: now,
        })?;
        tracing::debug!(id = %updated.id, status = updated.status.as_str(), "contract revised");
        self.refresh_notifications();
        Ok(updated)
    }

    /// Invoices pointing at the contract are kept and resolve to a placeholder.
    pub fn delete_contract(&self, id: &str) -> AppResult<bool> {
        self.remove::<Contract>(id)
    }

    // ─── Invoices ───────────────────────────────────────────────────────────

    pub fn list_invoices(&self) -> Vec<Invoice> {
        self.list()
    }

    pub fn list_invoice_views(&self) -> Vec<InvoiceView> {
        let contracts = self.list_contracts();
        self.list_invoices()
            .into_iter()
            .map(|invoice| InvoiceView {
                contract_label: contract_label(&contracts, &invoice.contract_id),
                invoice,
            })
            .collect()
    }

    pub fn get_invoice(&self, id: &str) -> Option<Invoice> {
        self.get(id)
    }

    pub fn create_invoice(&self, input: InvoiceInput) -> AppResult<Invoice> {
        validate_invoice(&input)?;
        tracing::debug!(contract_id = %input.contract_id, status = input.status.as_str(), "recording invoice");
        self.insert(|id, now| Invoice {
            id,
            contract_id: input.contract_id,
            issue_date: input.issue_date,
            due_date: input.due_date,
            amount: input.amount,
            status: input.status,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_invoice(&self, id: &str, input: InvoiceInput) -> AppResult<Invoice> {
        validate_invoice(&input)?;
        self.replace(id, |existing: &Invoice, now| Invoice {
            id: existing.id.clone(),
            contract_id: input.contract_id,
            issue_date: input.issue_date,
            due_date: input.due_date,
            amount: input.amount,
            status: input.status,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    pub fn delete_invoice(&self, id: &str) -> AppResult<bool> {
        self.remove::<Invoice>(id)
    }

    // ─── Dashboard & notifications ──────────────────────────────────────────

    pub fn dashboard_stats(&self) -> DashboardStats {
        compute_stats(&self.list_invoices(), &self.list_contracts())
    }

    /// Re-runs the expiration check against the current contracts and
    /// operators; called after every contract or operator change.
    pub fn refresh_notifications(&self) -> Vec<Notification> {
        self.engine
            .check_expiring_contracts(&self.list_contracts(), &self.list_operators())
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        self.db.get_settings()
    }

    /// Applies a JSON merge patch. A new scan interval takes effect on the next
    /// background service start.
    pub fn update_settings(&self, patch: serde_json::Value) -> AppResult<AppSettings> {
        let updated = self.db.update_settings(patch)?;
        self.engine.apply_settings(&updated);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::{contract_label, operator_name, DashboardCore, CONTRACT_NOT_FOUND};
    use crate::errors::AppError;
    use crate::models::{
        ContractInput, ContractStatus, InvoiceInput, InvoiceStatus, OperatorInput, ServiceType,
    };
    use crate::notifications::OPERATOR_NOT_FOUND;
    use chrono::{Duration, Utc};

    fn operator_input(name: &str) -> OperatorInput {
        OperatorInput {
            name: name.to_string(),
            service_type: ServiceType::Internet,
            support_contact: "(11) 1052-5555".to_string(),
        }
    }

    fn contract_input(operator_id: &str, ends_in: Duration) -> ContractInput {
        let now = Utc::now();
        ContractInput {
            branch_name: "Filial Salvador".to_string(),
            operator_id: operator_id.to_string(),
            plan: "Internet Fibra 500MB".to_string(),
            start_date: now - Duration::days(300),
            end_date: now + ends_in,
            monthly_value: 189.99,
            status: ContractStatus::Active,
        }
    }

    fn invoice_input(contract_id: &str, amount: f64, status: InvoiceStatus) -> InvoiceInput {
        let now = Utc::now();
        InvoiceInput {
            contract_id: contract_id.to_string(),
            issue_date: now,
            due_date: now + Duration::days(10),
            amount,
            status,
        }
    }

    #[test]
    fn operator_crud_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = DashboardCore::new(dir.path().to_path_buf()).expect("core");
        assert_eq!(core.data_dir(), dir.path());
        assert!(core.database().path().starts_with(core.data_dir()));

        let created = core.create_operator(operator_input("Claro")).expect("create");
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(core.list_operators().len(), 1);

        let updated = core
            .update_operator(&created.id, operator_input("Claro Empresas"))
            .expect("update");
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(core.get_operator(&created.id).expect("get").name, "Claro Empresas");

        assert!(core.delete_operator(&created.id).expect("delete"));
        assert!(!core.delete_operator(&created.id).expect("delete again"));
        assert!(core.list_operators().is_empty());
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = DashboardCore::new(dir.path().to_path_buf()).expect("core");
        let error = core
            .update_invoice("missing", invoice_input("c-1", 10.0, InvoiceStatus::Paid))
            .expect_err("should fail");
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[test]
    fn validation_rejects_blank_and_non_positive_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = DashboardCore::new(dir.path().to_path_buf()).expect("core");

        let error = core.create_operator(operator_input("   ")).expect_err("blank name");
        assert!(error.to_string().contains("name"));

        let mut contract = contract_input("op-1", Duration::days(30));
        contract.monthly_value = 0.0;
        let error = core.create_contract(contract).expect_err("zero value");
        assert!(error.to_string().contains("monthlyValue"));

        let error = core
            .create_invoice(invoice_input("c-1", -5.0, InvoiceStatus::Pending))
            .expect_err("negative amount");
        assert!(matches!(error, AppError::Validation(_)));
        assert!(core.list_invoices().is_empty());
    }

    #[test]
    fn dangling_references_resolve_to_placeholders() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = DashboardCore::new(dir.path().to_path_buf()).expect("core");
        let operator = core.create_operator(operator_input("TIM")).expect("operator");
        let contract = core
            .create_contract(contract_input(&operator.id, Duration::days(90)))
            .expect("contract");
        core.create_invoice(invoice_input(&contract.id, 89.99, InvoiceStatus::Pending))
            .expect("invoice");

        let views = core.list_invoice_views();
        assert_eq!(views[0].contract_label, "Filial Salvador - Internet Fibra 500MB");

        assert!(core.delete_operator(&operator.id).expect("delete operator"));
        assert!(core.delete_contract(&contract.id).expect("delete contract"));

        assert_eq!(core.list_invoices().len(), 1);
        assert_eq!(core.list_invoice_views()[0].contract_label, CONTRACT_NOT_FOUND);
        assert_eq!(operator_name(&core.list_operators(), &operator.id), OPERATOR_NOT_FOUND);
        assert_eq!(contract_label(&[], "x"), CONTRACT_NOT_FOUND);
    }

    #[test]
    fn contract_changes_trigger_expiration_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = DashboardCore::new(dir.path().to_path_buf()).expect("core");
        let operator = core.create_operator(operator_input("Vivo")).expect("operator");

        let contract = core
            .create_contract(contract_input(&operator.id, Duration::days(60)))
            .expect("contract");
        assert!(core.notifications().get_notifications().is_empty());

        core.update_contract(&contract.id, contract_input(&operator.id, Duration::days(2)))
            .expect("update");
        let pending = core.notifications().get_pending_notifications();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operator_name, "Vivo");
        assert_eq!(core.list_contract_views()[0].operator_name, "Vivo");
    }

    #[test]
    fn stats_reflect_stored_invoices() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = DashboardCore::new(dir.path().to_path_buf()).expect("core");
        core.create_invoice(invoice_input("c-1", 100.0, InvoiceStatus::Paid)).expect("invoice");
        core.create_invoice(invoice_input("c-1", 50.0, InvoiceStatus::Overdue)).expect("invoice");

        let stats = core.dashboard_stats();
        assert_eq!(stats.total_invoices, 2);
        assert!((stats.total_amount - 150.0).abs() < 1e-9);
        assert_eq!(stats.monthly_invoices[11].issued, 2);
        assert_eq!(stats.monthly_invoices[11].paid, 1);
    }

    #[test]
    fn settings_update_reaches_engine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = DashboardCore::new(dir.path().to_path_buf()).expect("core");
        let operator = core.create_operator(operator_input("Oi")).expect("operator");
        core.create_contract(contract_input(&operator.id, Duration::days(8)))
            .expect("contract");
        assert!(core.notifications().get_notifications().is_empty());

        let settings = core
            .update_settings(serde_json::json!({ "expirationWindowDays": 10 }))
            .expect("settings");
        assert_eq!(settings.expiration_window_days, 10);
        assert_eq!(core.refresh_notifications().len(), 1);
    }
}
