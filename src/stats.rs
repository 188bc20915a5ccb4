use crate::dates::{month_label, months_ending_at, same_month};
use crate::models::{
    Contract, ContractStatus, DashboardStats, Invoice, InvoiceStatus, MonthlyInvoices, StatusBreakdown,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};

const TRAILING_MONTHS: u32 = 12;

pub fn compute_stats(invoices: &[Invoice], contracts: &[Contract]) -> DashboardStats {
    compute_stats_at(invoices, contracts, Utc::now().date_naive())
}

/// `_contracts` is accepted for per-contract breakdowns that are not computed yet.
pub fn compute_stats_at(invoices: &[Invoice], _contracts: &[Contract], today: NaiveDate) -> DashboardStats {
    let total_invoices = invoices.len();
    let total_amount: f64 = invoices.iter().map(|invoice| invoice.amount).sum();

    let monthly_invoices = months_ending_at(today, TRAILING_MONTHS)
        .into_iter()
        .map(|month| {
            let in_month = invoices
                .iter()
                .filter(|invoice| same_month(invoice.issue_date, month))
                .collect::<Vec<_>>();
            MonthlyInvoices {
                month: month_label(month),
                issued: in_month.len(),
                paid: in_month
                    .iter()
                    .filter(|invoice| invoice.status == InvoiceStatus::Paid)
                    .count(),
            }
        })
        .collect();

    let invoices_by_status = InvoiceStatus::ALL
        .iter()
        .map(|status| {
            let count = invoices.iter().filter(|invoice| invoice.status == *status).count();
            let percentage = if total_invoices > 0 {
                count as f64 / total_invoices as f64 * 100.0
            } else {
                0.0
            };
            StatusBreakdown {
                status: *status,
                count,
                percentage,
            }
        })
        .collect();

    DashboardStats {
        total_invoices,
        total_amount,
        monthly_invoices,
        invoices_by_status,
    }
}

pub fn monthly_total(invoices: &[Invoice], month: NaiveDate) -> f64 {
    invoices
        .iter()
        .filter(|invoice| same_month(invoice.issue_date, month))
        .map(|invoice| invoice.amount)
        .sum()
}

/// Active contracts ending within `[now, now + days]`, both ends inclusive.
/// A window that does not fit in the calendar matches nothing.
pub fn upcoming_expirations(contracts: &[Contract], days: i64, now: DateTime<Utc>) -> Vec<&Contract> {
    let Some(horizon) = Duration::try_days(days).and_then(|window| now.checked_add_signed(window)) else {
        return Vec::new();
    };
    contracts
        .iter()
        .filter(|contract| {
            contract.status == ContractStatus::Active && contract.end_date >= now && contract.end_date <= horizon
        })
        .collect()
}
