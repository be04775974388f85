//! Consultas de apoio: painel inicial e trilha de auditoria

use tracing::debug;

use super::ChangeCoordinator;
use crate::audit::AuditFilter;
use crate::commands::AuditQuery;
use crate::error::{CoreError, CoreResult};
use crate::models::{AuditAction, AuditLog, DashboardStats};
use crate::permission::{self, Capability, Principal};
use crate::store::{self, appointments, patients, procedures, Page, PageRequest};
use crate::validators::parse_period_bound;

/// Datas ilegíveis nos filtros de auditoria são ignoradas
fn period_bound(name: &str, raw: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match parse_period_bound(raw) {
        Some(bound) => Some(bound.and_utc()),
        None => {
            debug!(filter = name, value = raw, "Filtro de data ignorado");
            None
        }
    }
}

impl ChangeCoordinator {
    /// Totais de pacientes e procedimentos, atendimentos de hoje e receita do mês
    pub async fn dashboard_stats(&self, actor: &Principal) -> CoreResult<DashboardStats> {
        permission::require(actor, Capability::ViewAllAppointments)?;

        let today = self.clock.today();
        let mut conn = self.store.acquire().await?;
        Ok(DashboardStats {
            total_patients: patients::count(&mut conn).await?,
            appointments_today: appointments::count_on_day(&mut conn, today).await?,
            total_procedures: procedures::count(&mut conn).await?,
            monthly_revenue: appointments::revenue_for_month(&mut conn, today).await?,
        })
    }

    /// Registros de auditoria, mais recentes primeiro (somente administradores)
    pub async fn list_audit_logs(
        &self,
        actor: &Principal,
        query: &AuditQuery,
        page: PageRequest,
    ) -> CoreResult<Page<AuditLog>> {
        permission::require(actor, Capability::ViewAuditTrail)?;

        let action = match query.action.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                raw.to_uppercase()
                    .parse::<AuditAction>()
                    .map_err(CoreError::validation)?,
            ),
            _ => None,
        };
        let filter = AuditFilter {
            action,
            table_name: query
                .table_name
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            user_id: query.user_id,
            from: period_bound("start_date", query.start_date.as_deref()),
            to: period_bound("end_date", query.end_date.as_deref()),
        };

        let mut conn = self.store.acquire().await?;
        Ok(store::audit::list(&mut conn, &filter, page).await?)
    }
}
