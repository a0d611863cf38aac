//! # Stock Transitions
//!
//! Decides what a stock adjustment does before the Stock Ledger writes it.
//!
//! ## Change Types
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  change_type   delta     oversized deduction                            │
//! │  ───────────   ───────   ─────────────────────────────────────────────  │
//! │  restock       > 0       n/a                                            │
//! │  return        > 0       n/a                                            │
//! │  sale          < 0       REJECTED: InsufficientStock{available,..}      │
//! │  adjustment    != 0      clamped at 0, requested delta kept in notes   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Notification Triggers
//! ```text
//!   stock ──────────────────────────────────────────────────────────────►
//!        0        1 ........ threshold        threshold+1 ...
//!        │        └──── low band ────┘
//!        │
//!   low stock:     a DEcrease that lands inside the low band
//!                  → notify un-notified subscribers, flag them
//!   back in stock: 0 → anything above 0
//!                  → notify every subscriber, clear all flags
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::ChangeType;

/// The planned effect of one stock adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransition {
    pub previous_quantity: i64,
    pub new_quantity: i64,
    /// An adjustment asked for more than was on the shelf.
    pub clamped: bool,
    pub low_stock: bool,
    pub back_in_stock: bool,
    /// Notes for the audit entry, including the clamp record if any.
    pub notes: Option<String>,
}

/// `0 < stock <= threshold`.
#[inline]
pub fn is_low_stock(stock: i64, threshold: i64) -> bool {
    stock > 0 && stock <= threshold
}

/// Plans an adjustment of `current` by `delta`.
///
/// `product` is only used in the rejection message.
pub fn plan_adjustment(
    product: &str,
    current: i64,
    delta: i64,
    change_type: ChangeType,
    low_stock_threshold: i64,
    notes: Option<&str>,
) -> CoreResult<StockTransition> {
    if delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "delta".to_string(),
            reason: "must not be zero".to_string(),
        }
        .into());
    }

    match change_type {
        ChangeType::Restock | ChangeType::Return if delta < 0 => {
            return Err(ValidationError::must_be_positive("delta").into());
        }
        ChangeType::Sale if delta > 0 => {
            return Err(ValidationError::InvalidFormat {
                field: "delta".to_string(),
                reason: "a sale must decrease stock".to_string(),
            }
            .into());
        }
        _ => {}
    }

    let raw = current
        .checked_add(delta)
        .ok_or_else(|| delta_out_of_range(current))?;

    if change_type == ChangeType::Sale && raw < 0 {
        return Err(CoreError::InsufficientStock {
            product: product.to_string(),
            available: current,
            requested: delta.checked_neg().ok_or_else(|| delta_out_of_range(current))?,
        });
    }

    let clamped = raw < 0;
    let new_quantity = raw.max(0);

    let notes = if clamped {
        let clamp_note = format!("requested delta {} clamped at 0", delta);
        Some(match notes {
            Some(n) => format!("{}; {}", n, clamp_note),
            None => clamp_note,
        })
    } else {
        notes.map(str::to_string)
    };

    Ok(StockTransition {
        previous_quantity: current,
        new_quantity,
        clamped,
        low_stock: new_quantity < current && is_low_stock(new_quantity, low_stock_threshold),
        back_in_stock: current == 0 && new_quantity > 0,
        notes,
    })
}

/// Rejection for a delta whose result does not fit the stock column.
fn delta_out_of_range(current: i64) -> CoreError {
    ValidationError::OutOfRange {
        field: "delta".to_string(),
        min: -i64::MAX,
        max: i64::MAX - current.max(0),
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================
