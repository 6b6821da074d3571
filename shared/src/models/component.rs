//! Stock-bearing components and their stock-level classification

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stock-bearing component from the spare-parts catalog.
///
/// The catalog owns creation and the descriptive fields; this core mutates
/// only the stock fields, and exclusively through the kardex engine.
/// Components are never deleted, only deactivated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Component {
    pub id: i64,
    /// Immutable business reference code
    pub codigo: String,
    pub nombre: String,
    pub stock_actual: i64,
    pub stock_minimo: i64,
    pub costo_promedio: Decimal,
    pub activo: bool,
    pub creado_en: DateTime<Utc>,
    pub actualizado_en: DateTime<Utc>,
}

/// Stock view returned to callers, with the derived classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockView {
    pub componente_id: i64,
    pub codigo: String,
    pub stock_actual: i64,
    pub stock_minimo: i64,
    pub costo_promedio: Decimal,
    pub clasificacion: StockClassification,
}

/// Stock-level tiers, ordered from worst to best. First match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "clasificacion_stock", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StockClassification {
    Agotado,
    Critico,
    Bajo,
    Ok,
}

impl StockClassification {
    /// Classify a component from its current stock and reorder threshold.
    ///
    /// The 50% comparison is done in integer arithmetic
    /// (`stock * 2 <= minimo`) so odd thresholds round the same way
    /// everywhere.
    pub fn classify(stock_actual: i64, stock_minimo: i64) -> Self {
        if stock_actual == 0 {
            StockClassification::Agotado
        } else if stock_actual * 2 <= stock_minimo {
            StockClassification::Critico
        } else if stock_actual <= stock_minimo {
            StockClassification::Bajo
        } else {
            StockClassification::Ok
        }
    }

    /// True when the tier should raise or keep an alert open.
    pub fn is_breach(&self) -> bool {
        !matches!(self, StockClassification::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockClassification::Agotado => "agotado",
            StockClassification::Critico => "critico",
            StockClassification::Bajo => "bajo",
            StockClassification::Ok => "ok",
        }
    }
}
