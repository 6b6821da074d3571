//! Route definitions for the Field Service Management Platform

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Inventory kardex
        .nest("/inventario", inventario_routes())
}

/// Inventory kardex routes
fn inventario_routes() -> Router<AppState> {
    Router::new()
        // Movements
        .route("/entradas", post(handlers::registrar_entrada))
        .route("/salidas", post(handlers::registrar_salida))
        .route("/ajustes", post(handlers::registrar_ajuste))
        .route("/traslados", post(handlers::registrar_traslado))
        // Stock and reconstruction
        .route("/componentes/:componente_id/stock", get(handlers::get_stock))
        .route(
            "/componentes/:componente_id/kardex",
            get(handlers::get_kardex),
        )
        // Alerts
        .route("/alertas", get(handlers::list_alertas))
}
