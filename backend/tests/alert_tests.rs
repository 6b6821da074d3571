//! Stock alert tests
//!
//! Tests for the alert evaluator: tier classification, severity mapping,
//! and the per-component state machine (open on breach, refresh in place,
//! resolve on recovery, never duplicate open alerts).

use proptest::prelude::*;

use shared::{AlertLevel, AlertState, StockClassification};

// ============================================================================
// Evaluator state-machine model
// ============================================================================

/// Mirror of the evaluator's decision table over one component: the
/// database counterpart enforces the single-open-alert rule with a partial
/// unique index, this model enforces it structurally.
#[derive(Debug, Default)]
struct AlertModel {
    open: Option<(StockClassification, AlertLevel)>,
    resolved_count: u32,
}

impl AlertModel {
    fn evaluate(&mut self, stock_actual: i64, stock_minimo: i64) {
        let clasificacion = StockClassification::classify(stock_actual, stock_minimo);
        match AlertLevel::for_classification(clasificacion) {
            Some(nivel) => {
                // Open or refresh in place; never a second open alert
                self.open = Some((clasificacion, nivel));
            }
            None => {
                if self.open.take().is_some() {
                    self.resolved_count += 1;
                }
            }
        }
    }

    fn estado(&self) -> Option<AlertState> {
        self.open.map(|_| AlertState::Pendiente)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Tier thresholds, first match wins
    #[test]
    fn test_classification_tiers() {
        assert_eq!(
            StockClassification::classify(0, 20),
            StockClassification::Agotado
        );
        assert_eq!(
            StockClassification::classify(10, 20),
            StockClassification::Critico
        );
        assert_eq!(
            StockClassification::classify(11, 20),
            StockClassification::Bajo
        );
        assert_eq!(
            StockClassification::classify(20, 20),
            StockClassification::Bajo
        );
        assert_eq!(
            StockClassification::classify(21, 20),
            StockClassification::Ok
        );
    }

    /// Severity mapping: exhausted and critical stock are critical alerts
    #[test]
    fn test_severity_mapping() {
        assert_eq!(
            AlertLevel::for_classification(StockClassification::Agotado),
            Some(AlertLevel::Critica)
        );
        assert_eq!(
            AlertLevel::for_classification(StockClassification::Critico),
            Some(AlertLevel::Critica)
        );
        assert_eq!(
            AlertLevel::for_classification(StockClassification::Bajo),
            Some(AlertLevel::Advertencia)
        );
        assert_eq!(AlertLevel::for_classification(StockClassification::Ok), None);
    }

    /// Scenario: a critical breach opens an alert, recovery resolves it
    #[test]
    fn test_breach_then_recovery() {
        let mut model = AlertModel::default();
        let stock_minimo = 20;

        // SALIDA brings stock to 10 (<= 50% of 20): CRITICO, PENDIENTE
        model.evaluate(10, stock_minimo);
        assert_eq!(model.estado(), Some(AlertState::Pendiente));
        assert_eq!(
            model.open,
            Some((StockClassification::Critico, AlertLevel::Critica))
        );

        // ENTRADA brings stock to 25 (> 20): RESUELTA
        model.evaluate(25, stock_minimo);
        assert_eq!(model.estado(), None);
        assert_eq!(model.resolved_count, 1);
    }

    /// A further breach refreshes the open alert instead of duplicating it
    #[test]
    fn test_further_breach_updates_in_place() {
        let mut model = AlertModel::default();

        model.evaluate(15, 20);
        assert_eq!(
            model.open,
            Some((StockClassification::Bajo, AlertLevel::Advertencia))
        );

        // Worse tier: same open alert, escalated
        model.evaluate(5, 20);
        assert_eq!(
            model.open,
            Some((StockClassification::Critico, AlertLevel::Critica))
        );

        model.evaluate(0, 20);
        assert_eq!(
            model.open,
            Some((StockClassification::Agotado, AlertLevel::Critica))
        );
        assert_eq!(model.resolved_count, 0);
    }

    /// OK to OK transitions do nothing
    #[test]
    fn test_ok_to_ok_is_noop() {
        let mut model = AlertModel::default();
        model.evaluate(100, 20);
        model.evaluate(90, 20);

        assert_eq!(model.estado(), None);
        assert_eq!(model.resolved_count, 0);
    }

    /// Wire format: enums serialize as their snake_case tags
    #[test]
    fn test_wire_format_tags() {
        assert_eq!(
            serde_json::to_string(&AlertState::Pendiente).unwrap(),
            "\"pendiente\""
        );
        assert_eq!(
            serde_json::to_string(&AlertState::Resuelta).unwrap(),
            "\"resuelta\""
        );
        assert_eq!(
            serde_json::to_string(&StockClassification::Critico).unwrap(),
            "\"critico\""
        );
        assert_eq!(
            serde_json::to_string(&AlertLevel::Advertencia).unwrap(),
            "\"advertencia\""
        );
    }

    /// Recovery to exactly the threshold is still a breach (BAJO)
    #[test]
    fn test_recovery_must_exceed_threshold() {
        let mut model = AlertModel::default();
        model.evaluate(5, 20);
        model.evaluate(20, 20);

        assert_eq!(model.estado(), Some(AlertState::Pendiente));
        assert_eq!(
            model.open,
            Some((StockClassification::Bajo, AlertLevel::Advertencia))
        );
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// An open alert exists if and only if the last snapshot breached
        #[test]
        fn prop_open_alert_iff_breached(
            snapshots in prop::collection::vec((0i64..=200, 0i64..=100), 1..30)
        ) {
            let mut model = AlertModel::default();
            let mut last = None;
            for (stock, minimo) in snapshots {
                model.evaluate(stock, minimo);
                last = Some((stock, minimo));
            }

            let (stock, minimo) = last.unwrap();
            let breached = StockClassification::classify(stock, minimo).is_breach();
            prop_assert_eq!(model.estado().is_some(), breached);
        }

        /// The model never holds more than one open alert, by construction
        /// matching the partial unique index
        #[test]
        fn prop_tier_ordering_is_total(stock in 0i64..=500, minimo in 0i64..=500) {
            // Exactly one tier matches
            let clasificacion = StockClassification::classify(stock, minimo);
            match clasificacion {
                StockClassification::Agotado => prop_assert_eq!(stock, 0),
                StockClassification::Critico => {
                    prop_assert!(stock > 0 && stock * 2 <= minimo)
                }
                StockClassification::Bajo => {
                    prop_assert!(stock > 0 && stock * 2 > minimo && stock <= minimo)
                }
                StockClassification::Ok => prop_assert!(stock > minimo),
            }
        }
    }
}
