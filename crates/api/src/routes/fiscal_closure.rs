//! Fiscal closure routes: monthly and annual runs plus run history.

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use closure_core::closure::{
    AnnualOptions, ClosureReport, ClosureRequest, DistributionRequest, MonthlyOptions, RunFilter,
    RunMode, TaxAdjustments,
};
use closure_core::fiscal::PeriodKey;
use closure_shared::AppError;
use closure_shared::types::{ClosureRunId, PageRequest, PageResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{AppState, error::ApiError, middleware::AuthUser};

/// Creates the fiscal closure routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounting/fiscal-closure/month", post(close_month))
        .route("/accounting/fiscal-closure/year", post(close_year))
        .route("/accounting/fiscal-closure/runs", get(list_runs))
        .route("/accounting/fiscal-closure/runs/{run_id}", get(get_run))
}

/// Request body of a monthly closure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthClosureBody {
    /// Calendar year.
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
    /// Skip depreciation.
    #[serde(default)]
    pub skip_depreciation: bool,
    /// Skip FX revaluation.
    #[serde(default, rename = "skipFXRevaluation")]
    pub skip_fx_revaluation: bool,
    /// Skip VAT settlement.
    #[serde(default, rename = "skipVAT")]
    pub skip_vat: bool,
    /// Preview only.
    #[serde(default)]
    pub dry_run: bool,
}

/// Request body of an annual closure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearClosureBody {
    /// Fiscal year.
    pub fiscal_year: i32,
    /// Tax adjustments.
    #[serde(default)]
    pub tax_adjustments: TaxAdjustments,
    /// Requested profit allocation.
    #[serde(default)]
    pub profit_distribution: DistributionRequest,
    /// Preview only.
    #[serde(default)]
    pub dry_run: bool,
}

/// Query of the run history.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunsQuery {
    /// Restrict to a year.
    pub year: Option<i32>,
    /// Restrict to a month.
    pub month: Option<u32>,
    /// Page number, from 1.
    pub page: Option<u32>,
    /// Page size.
    pub per_page: Option<u32>,
}

impl RunsQuery {
    fn page_request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
        .normalized()
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError(AppError::Validation(rejection.body_text())))
}

/// Commits need a closing role; previews are open to every member.
fn authorize(auth: &AuthUser, mode: RunMode) -> Result<(), ApiError> {
    let role = auth.role()?;
    if mode.is_commit() && !role.can_close_periods() {
        return Err(ApiError(AppError::Forbidden(format!(
            "role '{role}' cannot commit a fiscal closure"
        ))));
    }
    Ok(())
}

async fn run_closure(state: &AppState, request: ClosureRequest) -> Response {
    let run = state.orchestrator.run(request).await;
    let report = ClosureReport::from(&run);
    let status =
        StatusCode::from_u16(report.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(report)).into_response()
}

/// POST `/accounting/fiscal-closure/month` - Close a month.
async fn close_month(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<MonthClosureBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = body(payload)?;
    let mode = RunMode::from_dry_run(body.dry_run);
    authorize(&auth, mode)?;

    info!(
        company_id = %auth.company_id(),
        user_id = %auth.user_id(),
        year = body.year,
        month = body.month,
        dry_run = body.dry_run,
        "Monthly closure requested"
    );
    let request = ClosureRequest::monthly(
        PeriodKey::monthly(auth.company_id(), body.year, body.month),
        mode,
        MonthlyOptions {
            skip_depreciation: body.skip_depreciation,
            skip_fx_revaluation: body.skip_fx_revaluation,
            skip_vat: body.skip_vat,
        },
    )
    .requested_by(auth.user_id());
    Ok(run_closure(&state, request).await)
}

/// POST `/accounting/fiscal-closure/year` - Close a fiscal year.
async fn close_year(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<YearClosureBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = body(payload)?;
    let mode = RunMode::from_dry_run(body.dry_run);
    authorize(&auth, mode)?;

    info!(
        company_id = %auth.company_id(),
        user_id = %auth.user_id(),
        fiscal_year = body.fiscal_year,
        dry_run = body.dry_run,
        "Annual closure requested"
    );
    let request = ClosureRequest::annual(
        PeriodKey::annual(auth.company_id(), body.fiscal_year),
        mode,
        AnnualOptions {
            tax_adjustments: body.tax_adjustments,
            profit_distribution: body.profit_distribution,
        },
    )
    .requested_by(auth.user_id());
    Ok(run_closure(&state, request).await)
}

/// GET `/accounting/fiscal-closure/runs` - Run history of the caller's company.
async fn list_runs(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<RunsQuery>,
) -> Result<Response, ApiError> {
    let page = query.page_request();
    let filter = RunFilter {
        year: query.year,
        month: query.month,
    };
    let (runs, total) = state
        .orchestrator
        .run_store()
        .list(auth.company_id(), filter, page)
        .await?;
    let reports: Vec<ClosureReport> = runs.iter().map(ClosureReport::from).collect();
    let response = PageResponse::new(reports, page.page, page.per_page, total);
    Ok((StatusCode::OK, Json(json!({ "success": true, "data": response }))).into_response())
}

/// GET `/accounting/fiscal-closure/runs/{run_id}` - One finished run.
async fn get_run(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(run_id): Path<ClosureRunId>,
) -> Result<Response, ApiError> {
    let run = state
        .orchestrator
        .run_store()
        .find(auth.company_id(), run_id)
        .await?
        .ok_or_else(|| ApiError(AppError::NotFound(format!("closure run {run_id}"))))?;
    Ok((StatusCode::OK, Json(ClosureReport::from(&run))).into_response())
}
