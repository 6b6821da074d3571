//! HTTP handlers for the inventory kardex endpoints
//!
//! Authentication and authorization live in front of this API; the actor id
//! (`realizado_por`) arrives in the request payload.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use shared::{AlertState, DateRange, MovementResult, Pagination, StockAlert, StockView, TransferResult};

use crate::error::AppResult;
use crate::services::kardex::{
    AjusteInput, EntradaInput, KardexService, KardexView, SalidaInput, TrasladoInput,
};
use crate::AppState;

fn kardex_service(state: &AppState) -> KardexService {
    KardexService::new(state.db.clone(), &state.config.inventory)
}

/// Record a stock receipt
pub async fn registrar_entrada(
    State(state): State<AppState>,
    Json(input): Json<EntradaInput>,
) -> AppResult<Json<MovementResult>> {
    let result = kardex_service(&state).registrar_entrada(input).await?;
    Ok(Json(result))
}

/// Record a stock exit
pub async fn registrar_salida(
    State(state): State<AppState>,
    Json(input): Json<SalidaInput>,
) -> AppResult<Json<MovementResult>> {
    let result = kardex_service(&state).registrar_salida(input).await?;
    Ok(Json(result))
}

/// Record a manual adjustment
pub async fn registrar_ajuste(
    State(state): State<AppState>,
    Json(input): Json<AjusteInput>,
) -> AppResult<Json<MovementResult>> {
    let result = kardex_service(&state).registrar_ajuste(input).await?;
    Ok(Json(result))
}

/// Record an inter-location transfer
pub async fn registrar_traslado(
    State(state): State<AppState>,
    Json(input): Json<TrasladoInput>,
) -> AppResult<Json<TransferResult>> {
    let result = kardex_service(&state).registrar_traslado(input).await?;
    Ok(Json(result))
}

/// Get the current stock view for a component
pub async fn get_stock(
    State(state): State<AppState>,
    Path(componente_id): Path<i64>,
) -> AppResult<Json<StockView>> {
    let view = kardex_service(&state).get_stock(componente_id).await?;
    Ok(Json(view))
}

/// Query parameters for the kardex reconstruction
#[derive(Debug, Deserialize)]
pub struct KardexQuery {
    pub fecha_desde: Option<DateTime<Utc>>,
    pub fecha_hasta: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Reconstruct the kardex for a component
pub async fn get_kardex(
    State(state): State<AppState>,
    Path(componente_id): Path<i64>,
    Query(query): Query<KardexQuery>,
) -> AppResult<Json<KardexView>> {
    let rango = DateRange {
        desde: query.fecha_desde,
        hasta: query.fecha_hasta,
    };
    let default_pagination = Pagination::default();
    let paginacion = Pagination {
        page: query.page.unwrap_or(default_pagination.page),
        per_page: query.per_page.unwrap_or(default_pagination.per_page),
    };

    let view = kardex_service(&state)
        .get_kardex(componente_id, rango, paginacion)
        .await?;
    Ok(Json(view))
}

/// Query parameters for listing alerts
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub estado: Option<AlertState>,
}

/// List stock alerts, optionally filtered by state
pub async fn list_alertas(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> AppResult<Json<Vec<StockAlert>>> {
    let alertas = kardex_service(&state).list_alertas(query.estado).await?;
    Ok(Json(alertas))
}
