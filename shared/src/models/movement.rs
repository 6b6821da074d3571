//! Stock movements (kardex ledger entries) and weighted-average costing

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Decimal places kept for unit costs (matches the NUMERIC(14,4) columns).
pub const COST_SCALE: u32 = 4;

/// Movement types of the kardex ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tipo_movimiento", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Entrada,
    Salida,
    Ajuste,
    Traslado,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entrada => "entrada",
            MovementType::Salida => "salida",
            MovementType::Ajuste => "ajuste",
            MovementType::Traslado => "traslado",
        }
    }
}

/// A committed ledger entry. Immutable once written: the ledger is
/// append-only, and replay order is `(fecha, id)` ascending.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Movement {
    pub id: i64,
    pub componente_id: i64,
    pub tipo: MovementType,
    /// Free-form source tag: purchase, order consumption, manual
    /// adjustment, transfer leg, ...
    pub origen: String,
    /// Signed magnitude: entries positive, exits negative,
    /// adjustments either sign.
    pub cantidad: i64,
    /// Required for entradas; for salidas, the average cost at the
    /// time of exit (a valuation snapshot).
    pub costo_unitario: Option<Decimal>,
    /// Balance immediately after this movement. Denormalized cache
    /// written once at commit time, never a source of truth.
    pub saldo_resultante: i64,
    pub fecha: DateTime<Utc>,
    pub referencia_tipo: Option<String>,
    pub referencia_id: Option<i64>,
    pub realizado_por: Uuid,
    pub observaciones: Option<String>,
    pub clave_idempotencia: Option<Uuid>,
}

/// Opaque pointer to the business document that originated a movement
/// (service order, purchase order, remission). Never dereferenced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementReference {
    pub tipo: String,
    pub id: i64,
}

/// Result of a committed movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementResult {
    pub movimiento: Movement,
    pub stock_anterior: i64,
    pub stock_actual: i64,
}

/// Result of a transfer: both legs, committed atomically
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub salida: MovementResult,
    pub entrada: MovementResult,
}

/// One row of a reconstructed kardex, with the running balance
/// recomputed independently of the cached `saldo_resultante`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KardexEntry {
    #[serde(flatten)]
    pub movimiento: Movement,
    pub saldo_calculado: i64,
    /// False when the recomputed balance disagrees with the cache
    /// (valuation/balance drift, see the reconstruction query).
    pub consistente: bool,
}

/// Weighted-average unit cost after receiving `cantidad` units at
/// `costo_unitario`, on top of `stock_actual` units valued at
/// `costo_promedio`.
///
/// With zero stock on hand the stale average is discarded and the new
/// cost is simply the receipt cost (also avoids division by zero).
/// Updated only on entradas; exits and adjustments are cost-neutral.
pub fn weighted_average_cost(
    stock_actual: i64,
    costo_promedio: Decimal,
    cantidad: i64,
    costo_unitario: Decimal,
) -> Decimal {
    if stock_actual == 0 {
        return costo_unitario.round_dp(COST_SCALE);
    }

    let on_hand = Decimal::from(stock_actual);
    let received = Decimal::from(cantidad);
    let total_value = on_hand * costo_promedio + received * costo_unitario;

    (total_value / (on_hand + received)).round_dp(COST_SCALE)
}
