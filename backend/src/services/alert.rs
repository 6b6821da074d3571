//! Stock-level alert evaluation
//!
//! Runs after every committed movement, reading only the just-updated
//! snapshot: the classification is a pure function of
//! `(stock_actual, stock_minimo)`, so no extra transaction is needed.
//! A partial unique index keeps at most one open alert per component;
//! further breaches update it in place, recovery resolves it.

use sqlx::PgPool;

use shared::{AlertLevel, AlertState, StockAlert, StockClassification};

use crate::error::AppResult;

/// Alert evaluator and query service
#[derive(Clone)]
pub struct AlertService {
    db: PgPool,
}

impl AlertService {
    /// Create a new AlertService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Re-classify a component from its fresh snapshot and create, update
    /// or resolve its open alert accordingly. OK with no open alert is a
    /// no-op.
    pub async fn evaluate(
        &self,
        componente_id: i64,
        codigo: &str,
        stock_actual: i64,
        stock_minimo: i64,
    ) -> AppResult<()> {
        let clasificacion = StockClassification::classify(stock_actual, stock_minimo);

        match AlertLevel::for_classification(clasificacion) {
            None => self.resolve_open(componente_id).await,
            Some(nivel) => {
                let mensaje = format!(
                    "Componente {}: {} unidades en stock, mínimo {} (nivel {})",
                    codigo,
                    stock_actual,
                    stock_minimo,
                    clasificacion.as_str()
                );
                self.upsert_open(componente_id, clasificacion, nivel, &mensaje)
                    .await
            }
        }
    }

    /// List alerts, optionally filtered by state, newest first
    pub async fn list(&self, estado: Option<AlertState>) -> AppResult<Vec<StockAlert>> {
        let alertas = sqlx::query_as::<_, StockAlert>(
            r#"
            SELECT id, componente_id, tipo_alerta, nivel, estado, mensaje,
                   creada_en, actualizada_en, resuelta_en
            FROM alertas_stock
            WHERE ($1::estado_alerta IS NULL OR estado = $1)
            ORDER BY creada_en DESC
            "#,
        )
        .bind(estado)
        .fetch_all(&self.db)
        .await?;

        Ok(alertas)
    }

    /// Create the open alert for a breach, or refresh the existing one in
    /// place. The partial unique index on open alerts is the arbiter, so a
    /// racing evaluator cannot create a duplicate row.
    async fn upsert_open(
        &self,
        componente_id: i64,
        tipo_alerta: StockClassification,
        nivel: AlertLevel,
        mensaje: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alertas_stock (componente_id, tipo_alerta, nivel, estado, mensaje)
            VALUES ($1, $2, $3, 'pendiente', $4)
            ON CONFLICT (componente_id) WHERE estado = 'pendiente'
            DO UPDATE SET tipo_alerta = EXCLUDED.tipo_alerta,
                          nivel = EXCLUDED.nivel,
                          mensaje = EXCLUDED.mensaje,
                          actualizada_en = now()
            "#,
        )
        .bind(componente_id)
        .bind(tipo_alerta)
        .bind(nivel)
        .bind(mensaje)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Resolve the open alert for a component that recovered above its
    /// threshold. No-op when nothing is open.
    async fn resolve_open(&self, componente_id: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE alertas_stock
            SET estado = 'resuelta', resuelta_en = now(), actualizada_en = now()
            WHERE componente_id = $1 AND estado = 'pendiente'
            "#,
        )
        .bind(componente_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
