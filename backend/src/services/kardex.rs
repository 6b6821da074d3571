//! Kardex service: the transactional core of the spare-parts inventory ledger
//!
//! Every movement commits inside a single transaction that locks the
//! component row (`SELECT ... FOR UPDATE`), re-checks the non-negativity
//! invariant against the fresh snapshot, updates the balance and the
//! weighted-average cost, and appends the ledger entry. The pre-transaction
//! validation in `shared::validation` is advisory only; the check under the
//! lock is the authoritative one. Stock alerts are evaluated after commit on
//! a best-effort basis.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{
    validate_ajuste, validate_entrada, validate_salida, weighted_average_cost, AlertState,
    Component, DateRange, KardexEntry, Movement, MovementReference, MovementResult, MovementType,
    Pagination, StockAlert, StockClassification, StockView, TransferResult,
};

use crate::config::InventoryConfig;
use crate::error::{AppError, AppResult};
use crate::services::AlertService;

/// Kardex service for recording stock movements and reconstructing history
#[derive(Clone)]
pub struct KardexService {
    db: PgPool,
    alerts: AlertService,
    lock_retry_attempts: u32,
    lock_retry_backoff: Duration,
}

/// Input for recording an entrada (stock receipt)
#[derive(Debug, Deserialize)]
pub struct EntradaInput {
    pub componente_id: i64,
    pub cantidad: i64,
    pub costo_unitario: Decimal,
    pub origen: Option<String>,
    pub referencia: Option<MovementReference>,
    pub observaciones: Option<String>,
    pub realizado_por: Uuid,
    pub clave_idempotencia: Option<Uuid>,
}

/// Input for recording a salida (stock exit)
#[derive(Debug, Deserialize)]
pub struct SalidaInput {
    pub componente_id: i64,
    pub cantidad: i64,
    pub origen: Option<String>,
    pub referencia: Option<MovementReference>,
    pub observaciones: Option<String>,
    pub realizado_por: Uuid,
    pub clave_idempotencia: Option<Uuid>,
}

/// Input for recording a manual adjustment (signed quantity)
#[derive(Debug, Deserialize)]
pub struct AjusteInput {
    pub componente_id: i64,
    pub cantidad: i64,
    pub motivo: String,
    pub realizado_por: Uuid,
    pub clave_idempotencia: Option<Uuid>,
}

/// Input for recording an inter-location transfer
#[derive(Debug, Deserialize)]
pub struct TrasladoInput {
    pub componente_origen_id: i64,
    pub componente_destino_id: i64,
    pub cantidad: i64,
    pub realizado_por: Uuid,
}

/// Reconstructed kardex for a component over an optional window
#[derive(Debug, Serialize)]
pub struct KardexView {
    pub componente_id: i64,
    /// True balance at the window boundary, from replaying everything
    /// before it
    pub saldo_inicial: i64,
    pub movimientos: Vec<KardexEntry>,
}

/// A validated movement about to be committed
struct MovementIntent {
    componente_id: i64,
    tipo: MovementType,
    origen: String,
    cantidad: i64,
    costo_unitario: Option<Decimal>,
    referencia: Option<MovementReference>,
    observaciones: Option<String>,
    realizado_por: Uuid,
    clave_idempotencia: Option<Uuid>,
}

/// Row for the locked snapshot read
#[derive(sqlx::FromRow)]
struct LockedComponent {
    codigo: String,
    stock_actual: i64,
    stock_minimo: i64,
    costo_promedio: Decimal,
}

/// Row for the two-component locked read of a transfer
#[derive(sqlx::FromRow)]
struct LockedTransferLeg {
    id: i64,
    codigo: String,
    stock_actual: i64,
    stock_minimo: i64,
    costo_promedio: Decimal,
}

/// Row for the kardex reconstruction query
#[derive(sqlx::FromRow)]
struct KardexRow {
    #[sqlx(flatten)]
    movimiento: Movement,
    saldo_calculado: i64,
}

impl KardexService {
    /// Create a new KardexService instance
    pub fn new(db: PgPool, config: &InventoryConfig) -> Self {
        Self {
            alerts: AlertService::new(db.clone()),
            db,
            lock_retry_attempts: config.lock_retry_attempts,
            lock_retry_backoff: Duration::from_millis(config.lock_retry_backoff_ms),
        }
    }

    /// Record a stock receipt. Updates the weighted-average cost.
    pub async fn registrar_entrada(&self, input: EntradaInput) -> AppResult<MovementResult> {
        validate_entrada(input.cantidad, input.costo_unitario)?;

        self.commit_with_retry(MovementIntent {
            componente_id: input.componente_id,
            tipo: MovementType::Entrada,
            origen: input.origen.unwrap_or_else(|| "compra".to_string()),
            cantidad: input.cantidad,
            costo_unitario: Some(input.costo_unitario),
            referencia: input.referencia,
            observaciones: input.observaciones,
            realizado_por: input.realizado_por,
            clave_idempotencia: input.clave_idempotencia,
        })
        .await
    }

    /// Record a stock exit, valued at the average cost at the time of exit.
    pub async fn registrar_salida(&self, input: SalidaInput) -> AppResult<MovementResult> {
        let disponible = self.stock_on_hand(input.componente_id).await?;
        validate_salida(input.cantidad, disponible)?;

        self.commit_with_retry(MovementIntent {
            componente_id: input.componente_id,
            tipo: MovementType::Salida,
            origen: input.origen.unwrap_or_else(|| "consumo_orden".to_string()),
            cantidad: -input.cantidad,
            costo_unitario: None,
            referencia: input.referencia,
            observaciones: input.observaciones,
            realizado_por: input.realizado_por,
            clave_idempotencia: input.clave_idempotencia,
        })
        .await
    }

    /// Record a manual adjustment. Cost-neutral in both directions.
    pub async fn registrar_ajuste(&self, input: AjusteInput) -> AppResult<MovementResult> {
        let disponible = self.stock_on_hand(input.componente_id).await?;
        validate_ajuste(input.cantidad, disponible)?;

        self.commit_with_retry(MovementIntent {
            componente_id: input.componente_id,
            tipo: MovementType::Ajuste,
            origen: "ajuste_manual".to_string(),
            cantidad: input.cantidad,
            costo_unitario: None,
            referencia: None,
            observaciones: Some(input.motivo),
            realizado_por: input.realizado_por,
            clave_idempotencia: input.clave_idempotencia,
        })
        .await
    }

    /// Record an inter-location transfer: a paired exit at the source and
    /// receipt at the destination, committed atomically or not at all.
    pub async fn registrar_traslado(&self, input: TrasladoInput) -> AppResult<TransferResult> {
        if input.cantidad <= 0 {
            return Err(AppError::InvalidQuantity(format!(
                "traslado quantity must be positive, got {}",
                input.cantidad
            )));
        }
        if input.componente_origen_id == input.componente_destino_id {
            return Err(AppError::Validation {
                field: "componente_destino_id".to_string(),
                message: "transfer source and destination must differ".to_string(),
                message_es: "El origen y el destino del traslado deben ser distintos".to_string(),
            });
        }

        let mut attempt = 0u32;
        loop {
            match self.commit_traslado(&input).await {
                Err(AppError::DatabaseError(err)) if is_write_conflict(&err) => {
                    attempt += 1;
                    if attempt > self.lock_retry_attempts {
                        return Err(AppError::ConcurrentModification);
                    }
                    tracing::debug!(attempt, "write conflict committing transfer, retrying");
                    tokio::time::sleep(self.lock_retry_backoff).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Current stock view for a component, with the derived classification
    pub async fn get_stock(&self, componente_id: i64) -> AppResult<StockView> {
        let comp = sqlx::query_as::<_, Component>(
            r#"
            SELECT id, codigo, nombre, stock_actual, stock_minimo, costo_promedio,
                   activo, creado_en, actualizado_en
            FROM componentes
            WHERE id = $1 AND activo
            "#,
        )
        .bind(componente_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::ComponentNotFound(componente_id))?;

        Ok(StockView {
            componente_id: comp.id,
            codigo: comp.codigo,
            stock_actual: comp.stock_actual,
            stock_minimo: comp.stock_minimo,
            costo_promedio: comp.costo_promedio,
            clasificacion: StockClassification::classify(comp.stock_actual, comp.stock_minimo),
        })
    }

    /// Reconstruct the kardex for a component over an optional date window.
    ///
    /// The running balance is recomputed from replay, independent of the
    /// cached `saldo_resultante`; each row reports whether the two agree.
    /// The running sum is seeded with the true balance at the window
    /// boundary and computed before LIMIT/OFFSET, so pagination cannot
    /// corrupt it. All reads share one transaction so a concurrent writer
    /// cannot split the snapshot between the seed and the window.
    /// Read-only and idempotent.
    pub async fn get_kardex(
        &self,
        componente_id: i64,
        rango: DateRange,
        paginacion: Pagination,
    ) -> AppResult<KardexView> {
        if !rango.is_well_formed() {
            return Err(AppError::Validation {
                field: "fecha_desde".to_string(),
                message: "date range start must not be after its end".to_string(),
                message_es: "La fecha inicial no puede ser posterior a la final".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;

        // Reconstruction also covers deactivated components: deactivation
        // must not hide history from an audit.
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM componentes WHERE id = $1)",
        )
        .bind(componente_id)
        .fetch_one(&mut *tx)
        .await?;

        if !exists {
            return Err(AppError::ComponentNotFound(componente_id));
        }

        let saldo_inicial = match rango.desde {
            Some(desde) => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COALESCE(SUM(cantidad), 0)::bigint
                    FROM movimientos
                    WHERE componente_id = $1 AND fecha < $2
                    "#,
                )
                .bind(componente_id)
                .bind(desde)
                .fetch_one(&mut *tx)
                .await?
            }
            None => 0,
        };

        let rows = sqlx::query_as::<_, KardexRow>(
            r#"
            SELECT id, componente_id, tipo, origen, cantidad, costo_unitario,
                   saldo_resultante, fecha, referencia_tipo, referencia_id,
                   realizado_por, observaciones, clave_idempotencia,
                   ($4 + SUM(cantidad) OVER (
                        ORDER BY fecha, id
                        ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
                   ))::bigint AS saldo_calculado
            FROM movimientos
            WHERE componente_id = $1
              AND ($2::timestamptz IS NULL OR fecha >= $2)
              AND ($3::timestamptz IS NULL OR fecha <= $3)
            ORDER BY fecha, id
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(componente_id)
        .bind(rango.desde)
        .bind(rango.hasta)
        .bind(saldo_inicial)
        .bind(paginacion.limit())
        .bind(paginacion.offset())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let movimientos = rows
            .into_iter()
            .map(|row| {
                let consistente = row.saldo_calculado == row.movimiento.saldo_resultante;
                KardexEntry {
                    movimiento: row.movimiento,
                    saldo_calculado: row.saldo_calculado,
                    consistente,
                }
            })
            .collect();

        Ok(KardexView {
            componente_id,
            saldo_inicial,
            movimientos,
        })
    }

    /// List stock alerts, optionally filtered by state
    pub async fn list_alertas(&self, estado: Option<AlertState>) -> AppResult<Vec<StockAlert>> {
        self.alerts.list(estado).await
    }

    /// Advisory read of the stock on hand for pre-validation
    async fn stock_on_hand(&self, componente_id: i64) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT stock_actual FROM componentes WHERE id = $1 AND activo",
        )
        .bind(componente_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::ComponentNotFound(componente_id))
    }

    /// Commit a movement, transparently retrying bounded times on a write
    /// conflict (Postgres SQLSTATE 40001/40P01). Exhausted retries surface
    /// as a retryable `ConcurrentModification`.
    async fn commit_with_retry(&self, intent: MovementIntent) -> AppResult<MovementResult> {
        let mut attempt = 0u32;
        loop {
            match self.commit_movement(&intent).await {
                Err(AppError::DatabaseError(err)) if is_write_conflict(&err) => {
                    attempt += 1;
                    if attempt > self.lock_retry_attempts {
                        return Err(AppError::ConcurrentModification);
                    }
                    tracing::debug!(attempt, "write conflict committing movement, retrying");
                    tokio::time::sleep(self.lock_retry_backoff).await;
                }
                Err(AppError::DatabaseError(err)) if is_idempotency_replay(&err) => {
                    // Lost the insert race for this key; the winner's
                    // committed movement is the outcome.
                    return match intent.clave_idempotencia {
                        Some(clave) => self
                            .find_by_idempotency_key(clave)
                            .await?
                            .map(movement_result)
                            .ok_or_else(|| {
                                AppError::Internal(
                                    "idempotency key conflict without a stored movement"
                                        .to_string(),
                                )
                            }),
                        None => Err(AppError::DatabaseError(err)),
                    };
                }
                outcome => return outcome,
            }
        }
    }

    /// The balance & costing engine: one transaction holding the component
    /// row lock across the snapshot re-read, the balance update and the
    /// ledger append.
    async fn commit_movement(&self, intent: &MovementIntent) -> AppResult<MovementResult> {
        // Duplicate submission: return the originally committed movement
        // instead of double-applying.
        if let Some(clave) = intent.clave_idempotencia {
            if let Some(existing) = self.find_by_idempotency_key(clave).await? {
                return Ok(movement_result(existing));
            }
        }

        let mut tx = self.db.begin().await?;

        let comp = sqlx::query_as::<_, LockedComponent>(
            r#"
            SELECT codigo, stock_actual, stock_minimo, costo_promedio
            FROM componentes
            WHERE id = $1 AND activo
            FOR UPDATE
            "#,
        )
        .bind(intent.componente_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::ComponentNotFound(intent.componente_id))?;

        // Authoritative non-negativity check under the row lock; the
        // advisory pre-check may be stale by now.
        let nuevo_stock = comp.stock_actual + intent.cantidad;
        if nuevo_stock < 0 {
            return Err(AppError::InsufficientStock {
                available: comp.stock_actual,
                requested: -intent.cantidad,
            });
        }

        let (nuevo_costo, costo_movimiento) = match intent.tipo {
            MovementType::Entrada => {
                let costo = intent.costo_unitario.ok_or_else(|| {
                    AppError::Internal("entrada intent without a unit cost".to_string())
                })?;
                let promedio = weighted_average_cost(
                    comp.stock_actual,
                    comp.costo_promedio,
                    intent.cantidad,
                    costo,
                );
                (promedio, Some(costo))
            }
            // Exits are valued at the average cost at the time of exit;
            // the average itself does not move.
            MovementType::Salida => (comp.costo_promedio, Some(comp.costo_promedio)),
            // Adjustments are cost-neutral in both directions.
            MovementType::Ajuste => (comp.costo_promedio, None),
            // Transfers take their own two-row path; a single-leg intent
            // moves stock at the carrying cost.
            MovementType::Traslado => (comp.costo_promedio, Some(comp.costo_promedio)),
        };

        sqlx::query(
            r#"
            UPDATE componentes
            SET stock_actual = $1, costo_promedio = $2, actualizado_en = now()
            WHERE id = $3
            "#,
        )
        .bind(nuevo_stock)
        .bind(nuevo_costo)
        .bind(intent.componente_id)
        .execute(&mut *tx)
        .await?;

        let movimiento = insert_movement(&mut tx, intent, costo_movimiento, nuevo_stock).await?;

        tx.commit().await?;

        // The committed movement is the authoritative fact; alerting is
        // best-effort and never rolls it back.
        if let Err(err) = self
            .alerts
            .evaluate(intent.componente_id, &comp.codigo, nuevo_stock, comp.stock_minimo)
            .await
        {
            tracing::warn!(
                componente_id = intent.componente_id,
                error = %err,
                "alert evaluation failed after movement commit"
            );
        }

        Ok(MovementResult {
            movimiento,
            stock_anterior: comp.stock_actual,
            stock_actual: nuevo_stock,
        })
    }

    /// Both legs of a transfer in one transaction. The two component rows
    /// are locked in ascending id order so two opposing transfers over the
    /// same pair cannot deadlock.
    async fn commit_traslado(&self, input: &TrasladoInput) -> AppResult<TransferResult> {
        let mut tx = self.db.begin().await?;

        let rows = sqlx::query_as::<_, LockedTransferLeg>(
            r#"
            SELECT id, codigo, stock_actual, stock_minimo, costo_promedio
            FROM componentes
            WHERE id = ANY($1) AND activo
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(vec![input.componente_origen_id, input.componente_destino_id])
        .fetch_all(&mut *tx)
        .await?;

        let origen = rows
            .iter()
            .find(|c| c.id == input.componente_origen_id)
            .ok_or(AppError::ComponentNotFound(input.componente_origen_id))?;
        let destino = rows
            .iter()
            .find(|c| c.id == input.componente_destino_id)
            .ok_or(AppError::ComponentNotFound(input.componente_destino_id))?;

        if input.cantidad > origen.stock_actual {
            return Err(AppError::InsufficientStock {
                available: origen.stock_actual,
                requested: input.cantidad,
            });
        }

        let stock_origen = origen.stock_actual - input.cantidad;
        let stock_destino = destino.stock_actual + input.cantidad;

        // Stock moves at the source's carrying cost; the destination blends
        // it into its own average like a receipt. The source average does
        // not change.
        let costo_traslado = origen.costo_promedio;
        let costo_destino = weighted_average_cost(
            destino.stock_actual,
            destino.costo_promedio,
            input.cantidad,
            costo_traslado,
        );

        sqlx::query(
            "UPDATE componentes SET stock_actual = $1, actualizado_en = now() WHERE id = $2",
        )
        .bind(stock_origen)
        .bind(origen.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE componentes
            SET stock_actual = $1, costo_promedio = $2, actualizado_en = now()
            WHERE id = $3
            "#,
        )
        .bind(stock_destino)
        .bind(costo_destino)
        .bind(destino.id)
        .execute(&mut *tx)
        .await?;

        let leg_salida = MovementIntent {
            componente_id: origen.id,
            tipo: MovementType::Traslado,
            origen: "traslado".to_string(),
            cantidad: -input.cantidad,
            costo_unitario: None,
            referencia: None,
            observaciones: Some(format!("Traslado hacia {}", destino.codigo)),
            realizado_por: input.realizado_por,
            clave_idempotencia: None,
        };
        let leg_entrada = MovementIntent {
            componente_id: destino.id,
            tipo: MovementType::Traslado,
            origen: "traslado".to_string(),
            cantidad: input.cantidad,
            costo_unitario: None,
            referencia: None,
            observaciones: Some(format!("Traslado desde {}", origen.codigo)),
            realizado_por: input.realizado_por,
            clave_idempotencia: None,
        };

        let salida =
            insert_movement(&mut tx, &leg_salida, Some(costo_traslado), stock_origen).await?;
        let entrada =
            insert_movement(&mut tx, &leg_entrada, Some(costo_traslado), stock_destino).await?;

        let resultado = TransferResult {
            salida: MovementResult {
                movimiento: salida,
                stock_anterior: origen.stock_actual,
                stock_actual: stock_origen,
            },
            entrada: MovementResult {
                movimiento: entrada,
                stock_anterior: destino.stock_actual,
                stock_actual: stock_destino,
            },
        };

        let alert_targets = [
            (origen.id, origen.codigo.clone(), stock_origen, origen.stock_minimo),
            (
                destino.id,
                destino.codigo.clone(),
                stock_destino,
                destino.stock_minimo,
            ),
        ];

        tx.commit().await?;

        for (componente_id, codigo, stock, minimo) in alert_targets {
            if let Err(err) = self.alerts.evaluate(componente_id, &codigo, stock, minimo).await {
                tracing::warn!(
                    componente_id,
                    error = %err,
                    "alert evaluation failed after transfer commit"
                );
            }
        }

        Ok(resultado)
    }

    /// Previously committed movement for a deduplication key, if any
    async fn find_by_idempotency_key(&self, clave: Uuid) -> AppResult<Option<Movement>> {
        let movimiento = sqlx::query_as::<_, Movement>(
            r#"
            SELECT id, componente_id, tipo, origen, cantidad, costo_unitario,
                   saldo_resultante, fecha, referencia_tipo, referencia_id,
                   realizado_por, observaciones, clave_idempotencia
            FROM movimientos
            WHERE clave_idempotencia = $1
            "#,
        )
        .bind(clave)
        .fetch_optional(&self.db)
        .await?;

        Ok(movimiento)
    }
}

/// Append one ledger entry inside the committing transaction
async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    intent: &MovementIntent,
    costo_unitario: Option<Decimal>,
    saldo_resultante: i64,
) -> Result<Movement, sqlx::Error> {
    sqlx::query_as::<_, Movement>(
        r#"
        INSERT INTO movimientos (
            componente_id, tipo, origen, cantidad, costo_unitario, saldo_resultante,
            referencia_tipo, referencia_id, realizado_por, observaciones, clave_idempotencia
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id, componente_id, tipo, origen, cantidad, costo_unitario,
                  saldo_resultante, fecha, referencia_tipo, referencia_id,
                  realizado_por, observaciones, clave_idempotencia
        "#,
    )
    .bind(intent.componente_id)
    .bind(intent.tipo)
    .bind(&intent.origen)
    .bind(intent.cantidad)
    .bind(costo_unitario)
    .bind(saldo_resultante)
    .bind(intent.referencia.as_ref().map(|r| r.tipo.clone()))
    .bind(intent.referencia.as_ref().map(|r| r.id))
    .bind(intent.realizado_por)
    .bind(&intent.observaciones)
    .bind(intent.clave_idempotencia)
    .fetch_one(&mut **tx)
    .await
}

/// Rebuild a MovementResult from a committed movement: the prior balance
/// falls out of the cached snapshot and the signed quantity.
fn movement_result(movimiento: Movement) -> MovementResult {
    let stock_actual = movimiento.saldo_resultante;
    let stock_anterior = stock_actual - movimiento.cantidad;
    MovementResult {
        movimiento,
        stock_anterior,
        stock_actual,
    }
}

/// Serialization failure or deadlock: safe to retry the whole transaction
fn is_write_conflict(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
    )
}

/// Unique violation on the idempotency key: a concurrent duplicate won
fn is_idempotency_replay(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if db.code().as_deref() == Some("23505")
                && db.constraint() == Some("uq_movimientos_clave_idempotencia")
    )
}
