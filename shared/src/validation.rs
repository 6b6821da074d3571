//! Movement admission rules
//!
//! Pure business-rule checks applied before a movement touches the
//! database. The backend re-runs the stock check under the row lock;
//! against concurrent writers these pre-checks are advisory only.

use rust_decimal::Decimal;
use thiserror::Error;

/// A rejected movement intent. Terminal for the attempt: the caller
/// gets the specific rule that failed, never a generic error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MovementRuleViolation {
    #[error("Quantity must be a non-zero integer: {0}")]
    InvalidQuantity(String),

    #[error("Unit cost must be greater than zero: {0}")]
    InvalidCost(String),

    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i64, requested: i64 },
}

/// ENTRADA: positive quantity and a positive unit cost.
pub fn validate_entrada(cantidad: i64, costo_unitario: Decimal) -> Result<(), MovementRuleViolation> {
    if cantidad <= 0 {
        return Err(MovementRuleViolation::InvalidQuantity(format!(
            "entrada quantity must be positive, got {cantidad}"
        )));
    }
    if costo_unitario <= Decimal::ZERO {
        return Err(MovementRuleViolation::InvalidCost(format!(
            "entrada unit cost must be positive, got {costo_unitario}"
        )));
    }
    Ok(())
}

/// SALIDA: positive quantity, covered by the stock on hand.
pub fn validate_salida(cantidad: i64, stock_actual: i64) -> Result<(), MovementRuleViolation> {
    if cantidad <= 0 {
        return Err(MovementRuleViolation::InvalidQuantity(format!(
            "salida quantity must be positive, got {cantidad}"
        )));
    }
    if cantidad > stock_actual {
        return Err(MovementRuleViolation::InsufficientStock {
            available: stock_actual,
            requested: cantidad,
        });
    }
    Ok(())
}

/// AJUSTE: either sign, non-zero; a negative adjustment follows the
/// same insufficient-stock rule as a salida.
pub fn validate_ajuste(cantidad: i64, stock_actual: i64) -> Result<(), MovementRuleViolation> {
    if cantidad == 0 {
        return Err(MovementRuleViolation::InvalidQuantity(
            "ajuste quantity must be non-zero".to_string(),
        ));
    }
    if cantidad < 0 && -cantidad > stock_actual {
        return Err(MovementRuleViolation::InsufficientStock {
            available: stock_actual,
            requested: -cantidad,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn entrada_requires_positive_quantity_and_cost() {
        assert!(validate_entrada(10, dec("5.00")).is_ok());
        assert!(matches!(
            validate_entrada(0, dec("5.00")),
            Err(MovementRuleViolation::InvalidQuantity(_))
        ));
        assert!(matches!(
            validate_entrada(-3, dec("5.00")),
            Err(MovementRuleViolation::InvalidQuantity(_))
        ));
        assert!(matches!(
            validate_entrada(10, Decimal::ZERO),
            Err(MovementRuleViolation::InvalidCost(_))
        ));
        assert!(matches!(
            validate_entrada(10, dec("-1.00")),
            Err(MovementRuleViolation::InvalidCost(_))
        ));
    }

    #[test]
    fn salida_cannot_exceed_stock() {
        assert!(validate_salida(4, 4).is_ok());
        assert_eq!(
            validate_salida(10, 4),
            Err(MovementRuleViolation::InsufficientStock {
                available: 4,
                requested: 10
            })
        );
        assert_eq!(
            validate_salida(1, 0),
            Err(MovementRuleViolation::InsufficientStock {
                available: 0,
                requested: 1
            })
        );
    }

    #[test]
    fn salida_rejects_non_positive_quantity() {
        assert!(matches!(
            validate_salida(0, 10),
            Err(MovementRuleViolation::InvalidQuantity(_))
        ));
        assert!(matches!(
            validate_salida(-5, 10),
            Err(MovementRuleViolation::InvalidQuantity(_))
        ));
    }

    #[test]
    fn ajuste_allows_either_sign_but_not_zero() {
        assert!(validate_ajuste(5, 0).is_ok());
        assert!(validate_ajuste(-3, 10).is_ok());
        assert!(matches!(
            validate_ajuste(0, 10),
            Err(MovementRuleViolation::InvalidQuantity(_))
        ));
    }

    #[test]
    fn negative_ajuste_respects_stock() {
        assert_eq!(
            validate_ajuste(-11, 10),
            Err(MovementRuleViolation::InsufficientStock {
                available: 10,
                requested: 11
            })
        );
        // Draining to exactly zero is allowed
        assert!(validate_ajuste(-10, 10).is_ok());
    }
}
