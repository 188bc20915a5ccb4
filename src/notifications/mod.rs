pub mod mailer;

use crate::dates::days_until;
use crate::db::{Database, StoreKey};
use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, Contract, EmailConfig, Notification, Operator, SendSummary};
use crate::redaction::Redactor;
use crate::scheduler::{RecurringTask, TaskFuture};
use crate::stats::upcoming_expirations;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mailer::{compose_message, Mailer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::time::Duration;
use uuid::Uuid;

pub const OPERATOR_NOT_FOUND: &str = "Operator not found";

const RETENTION_PERIOD: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed { pending: usize },
    Skipped,
    Failed,
}

struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the expiration-notification log and mirrors it to the store on every
/// mutation.
pub struct NotificationEngine {
    db: Arc<Database>,
    mailer: Arc<dyn Mailer>,
    notifications: Mutex<Vec<Notification>>,
    config: RwLock<Option<EmailConfig>>,
    settings: RwLock<AppSettings>,
    redactor: Redactor,
    scan_in_progress: AtomicBool,
    scan_task: RecurringTask,
    retention_task: RecurringTask,
}

impl NotificationEngine {
    pub fn new(db: Arc<Database>, mailer: Arc<dyn Mailer>) -> AppResult<Self> {
        let notifications: Vec<Notification> = db.read_collection(StoreKey::EmailNotifications);
        let config = match db.read_value::<EmailConfig>(StoreKey::EmailConfig) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(error = %error, "failed to load email config");
                None
            }
        };
        let settings = db.get_settings()?;

        tracing::info!(count = notifications.len(), "loaded notification log");

        Ok(Self {
            db,
            mailer,
            notifications: Mutex::new(notifications),
            config: RwLock::new(config),
            settings: RwLock::new(settings),
            redactor: Redactor::new(true),
            scan_in_progress: AtomicBool::new(false),
            scan_task: RecurringTask::new("expiration-scan"),
            retention_task: RecurringTask::new("notification-retention"),
        })
    }

    fn lock_notifications(&self) -> AppResult<MutexGuard<'_, Vec<Notification>>> {
        self.notifications
            .lock()
            .map_err(|_| AppError::Internal("notification mutex poisoned".to_string()))
    }

    fn settings(&self) -> AppSettings {
        self.settings
            .read()
            .map(|settings| settings.clone())
            .unwrap_or_default()
    }

    pub fn apply_settings(&self, settings: &AppSettings) {
        if let Ok(mut writer) = self.settings.write() {
            *writer = settings.clone();
        }
    }

    fn persist(&self, notifications: &[Notification]) -> AppResult<()> {
        self.db.write_collection(StoreKey::EmailNotifications, notifications)
    }

    pub fn configure_email(&self, config: EmailConfig) -> AppResult<()> {
        let redacted = self.redactor.redact(&serde_json::to_string(&config)?);
        tracing::info!(config = %redacted.content, "email delivery configured");
        self.db.write_value(StoreKey::EmailConfig, &config)?;
        let mut writer = self
            .config
            .write()
            .map_err(|_| AppError::Internal("email config lock poisoned".to_string()))?;
        *writer = Some(config);
        Ok(())
    }

    pub fn email_config(&self) -> Option<EmailConfig> {
        self.config.read().ok().and_then(|config| config.clone())
    }

    pub fn check_expiring_contracts(&self, contracts: &[Contract], operators: &[Operator]) -> Vec<Notification> {
        self.check_expiring_contracts_at(contracts, operators, Utc::now())
    }

    /// Creates one unsent notification per expiring contract that does not
    /// already have one. Existing unsent notifications keep their first
    /// snapshot and day count. Returns every unsent notification.
    pub fn check_expiring_contracts_at(
        &self,
        contracts: &[Contract],
        operators: &[Operator],
        now: DateTime<Utc>,
    ) -> Vec<Notification> {
        let window_days = self.settings().expiration_window_days;
        let expiring = upcoming_expirations(contracts, window_days, now);

        let mut notifications = match self.lock_notifications() {
            Ok(guard) => guard,
            Err(error) => {
                tracing::error!(error = %error, "expiration check aborted");
                return Vec::new();
            }
        };

        let mut created = 0usize;
        for contract in expiring {
            let already_pending = notifications
                .iter()
                .any(|existing| existing.contract_id == contract.id && !existing.email_sent);
            if already_pending {
                continue;
            }

            let operator_name = operators
                .iter()
                .find(|operator| operator.id == contract.operator_id)
                .map(|operator| operator.name.clone())
                .unwrap_or_else(|| OPERATOR_NOT_FOUND.to_string());

            let notification = Notification {
                id: format!("notif_{}_{}", contract.id, Uuid::new_v4().simple()),
                contract_id: contract.id.clone(),
                branch_name: contract.branch_name.clone(),
                operator_name,
                plan: contract.plan.clone(),
                expiration_date: contract.end_date,
                days_until_expiration: days_until(contract.end_date, now),
                email_sent: false,
                sent_at: None,
            };
            tracing::info!(
                contract_id = %contract.id,
                notification_id = %notification.id,
                days = notification.days_until_expiration,
                "created expiration notification"
            );
            notifications.push(notification);
            created += 1;
        }

        if created > 0 {
            if let Err(error) = self.persist(&notifications) {
                tracing::warn!(error = %error, "failed to persist notification log");
            }
        }

        notifications.iter().filter(|n| !n.email_sent).cloned().collect()
    }

    /// Simulated delivery. On success the record is marked sent and persisted;
    /// on any failure it is left untouched and `false` is returned.
    pub async fn send_email_notification(&self, notification: &Notification) -> bool {
        match self.try_send(notification).await {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(notification_id = %notification.id, error = %error, "failed to send notification email");
                false
            }
        }
    }

    fn tracked(&self, notification_id: &str) -> AppResult<Notification> {
        self.lock_notifications()?
            .iter()
            .find(|existing| existing.id == notification_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", notification_id)))
    }

    /// Works from the engine's record, not the caller's copy, so a stale copy
    /// of a sent notification is never delivered again.
    async fn try_send(&self, notification: &Notification) -> AppResult<()> {
        let tracked = self.tracked(&notification.id)?;
        if tracked.email_sent {
            tracing::debug!(notification_id = %tracked.id, "notification already sent");
            return Ok(());
        }

        let settings = self.settings();
        let message = compose_message(&tracked, &settings.recipient, Utc::now());
        let config = self.email_config();
        self.mailer.deliver(&message, config.as_ref())?;

        tokio::time::sleep(Duration::from_millis(settings.send_delay_ms)).await;

        let mut notifications = self.lock_notifications()?;
        let index = notifications
            .iter()
            .position(|existing| existing.id == tracked.id)
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", tracked.id)))?;
        if notifications[index].email_sent {
            tracing::debug!(notification_id = %tracked.id, "notification marked sent during delivery");
            return Ok(());
        }

        let mut updated = notifications.clone();
        updated[index].email_sent = true;
        updated[index].sent_at = Some(Utc::now());
        self.persist(&updated)?;
        *notifications = updated;

        tracing::info!(notification_id = %tracked.id, "notification email sent");
        Ok(())
    }

    /// Sends every unsent notification in creation order, pausing between
    /// sends. A failed send does not stop the batch.
    pub async fn send_pending_notifications(&self) -> SendSummary {
        let pending = self.get_pending_notifications();
        let spacing = Duration::from_millis(self.settings().send_spacing_ms);

        let mut summary = SendSummary {
            attempted: pending.len(),
            sent: 0,
            failed: 0,
        };
        for (index, notification) in pending.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(spacing).await;
            }
            if self.send_email_notification(notification).await {
                summary.sent += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::info!(attempted = summary.attempted, sent = summary.sent, failed = summary.failed, "pending notifications processed");
        summary
    }

    /// Manual dismissal: marks the notification sent without delivering it.
    pub fn mark_as_read(&self, notification_id: &str) -> AppResult<bool> {
        let mut notifications = self.lock_notifications()?;
        let Some(notification) = notifications.iter_mut().find(|n| n.id == notification_id) else {
            return Ok(false);
        };
        if notification.email_sent {
            return Ok(true);
        }
        notification.email_sent = true;
        notification.sent_at = Some(Utc::now());

        if let Err(error) = self.persist(&notifications) {
            tracing::warn!(notification_id, error = %error, "failed to persist notification log");
        }
        Ok(true)
    }

    pub fn get_notifications(&self) -> Vec<Notification> {
        self.lock_notifications()
            .map(|notifications| notifications.clone())
            .unwrap_or_default()
    }

    pub fn get_pending_notifications(&self) -> Vec<Notification> {
        self.lock_notifications()
            .map(|notifications| notifications.iter().filter(|n| !n.email_sent).cloned().collect())
            .unwrap_or_default()
    }

    pub fn clean_old_notifications(&self) -> AppResult<usize> {
        self.clean_old_notifications_at(Utc::now())
    }

    /// Drops sent notifications older than the retention horizon. Unsent ones
    /// are always kept.
    pub fn clean_old_notifications_at(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let threshold = ChronoDuration::try_days(self.settings().retention_days)
            .and_then(|retention| now.checked_sub_signed(retention))
            .ok_or_else(|| AppError::validation("retentionDays", "is out of range"))?;
        let mut notifications = self.lock_notifications()?;
        let before = notifications.len();
        notifications.retain(|n| {
            !n.email_sent || n.sent_at.map(|sent_at| sent_at > threshold).unwrap_or(true)
        });
        let removed = before - notifications.len();

        if let Err(error) = self.persist(&notifications) {
            tracing::warn!(error = %error, "failed to persist notification log");
        }
        if removed > 0 {
            tracing::info!(removed, "purged old notifications");
        }
        Ok(removed)
    }

    /// Re-reads contracts and operators from the store and runs the expiration
    /// check. Only one scan runs at a time.
    pub async fn run_background_check(&self) -> ScanOutcome {
        let Some(_guard) = ScanGuard::acquire(&self.scan_in_progress) else {
            tracing::info!("expiration scan already in progress, skipping");
            return ScanOutcome::Skipped;
        };

        let loaded = self
            .db
            .try_read_collection::<Contract>(StoreKey::Contracts)
            .and_then(|contracts| {
                let operators = self.db.try_read_collection::<Operator>(StoreKey::Operators)?;
                Ok((contracts, operators))
            });
        let (contracts, operators) = match loaded {
            Ok(loaded) => loaded,
            Err(error) => {
                tracing::error!(error = %error, "background expiration check failed");
                return ScanOutcome::Failed;
            }
        };

        let pending = self.check_expiring_contracts(&contracts, &operators);
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "contracts expiring soon");
            if self.settings().auto_send_pending {
                self.send_pending_notifications().await;
            }
        }

        ScanOutcome::Completed { pending: pending.len() }
    }

    /// Starts the hourly scan (first run immediately) and the retention sweep.
    pub fn start_background_service(self: &Arc<Self>) -> bool {
        let settings = self.settings();
        let period = Duration::from_secs(settings.scan_interval_secs);

        let weak = Arc::downgrade(self);
        let started = self.scan_task.start(
            period,
            Arc::new(move || -> TaskFuture {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(engine) = weak.upgrade() {
                        engine.run_background_check().await;
                    }
                })
            }),
        );

        let weak = Arc::downgrade(self);
        self.retention_task.start(
            RETENTION_PERIOD,
            Arc::new(move || -> TaskFuture {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(engine) = weak.upgrade() {
                        if let Err(error) = engine.clean_old_notifications() {
                            tracing::warn!(error = %error, "notification retention failed");
                        }
                    }
                })
            }),
        );

        started
    }

    pub fn stop_background_service(&self) -> bool {
        let stopped = self.scan_task.stop();
        self.retention_task.stop();
        stopped
    }

    pub fn is_background_running(&self) -> bool {
        self.scan_task.is_running()
    }
}
