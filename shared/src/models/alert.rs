//! Stock-level alerts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::StockClassification;

/// Alert lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "estado_alerta", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Pendiente,
    Resuelta,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Pendiente => "pendiente",
            AlertState::Resuelta => "resuelta",
        }
    }
}

/// Alert severity, derived from the stock classification tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "nivel_alerta", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Advertencia,
    Critica,
}

impl AlertLevel {
    /// Severity for a breached tier. `Ok` never carries an alert.
    pub fn for_classification(clasificacion: StockClassification) -> Option<Self> {
        match clasificacion {
            StockClassification::Agotado | StockClassification::Critico => {
                Some(AlertLevel::Critica)
            }
            StockClassification::Bajo => Some(AlertLevel::Advertencia),
            StockClassification::Ok => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Advertencia => "advertencia",
            AlertLevel::Critica => "critica",
        }
    }
}

/// A stock-level alert. At most one open (pendiente) alert exists per
/// component; further breaches update it in place instead of creating
/// duplicates, and recovery above the threshold resolves it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockAlert {
    pub id: i64,
    pub componente_id: i64,
    pub tipo_alerta: StockClassification,
    pub nivel: AlertLevel,
    pub estado: AlertState,
    pub mensaje: String,
    pub creada_en: DateTime<Utc>,
    pub actualizada_en: DateTime<Utc>,
    pub resuelta_en: Option<DateTime<Utc>>,
}
