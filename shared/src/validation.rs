//! Input validation for workflow operations
//!
//! Field-level checks run before any state is read or written. The first
//! failing field is reported.

use rust_decimal::Decimal;
use validator::Validate;

use crate::models::{
    money_limit, CreateGateEntryInput, CreateGrnInput, CreateTestInput, GrnItem, GrnTotals,
};

/// Quantities are stored as NUMERIC(18,3)
const QUANTITY_SCALE: u32 = 3;

/// A rejected input field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<_> = field_errors.iter().collect();
        fields.sort_by_key(|(field, _)| **field);

        match fields.first() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "is invalid".to_string());
                ValidationError::new(**field, message)
            }
            None => ValidationError::new("input", "is invalid"),
        }
    }
}

fn quantity_limit() -> Decimal {
    Decimal::from(1_000_000_000_000_000_i64)
}

/// Positive, at most three decimal places and below 10^15
fn require_quantity(field: &str, value: Decimal) -> Result<(), ValidationError> {
    if value <= Decimal::ZERO {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }
    if value.normalize().scale() > QUANTITY_SCALE {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} decimal places", QUANTITY_SCALE),
        ));
    }
    if value >= quantity_limit() {
        return Err(ValidationError::new(field, "exceeds the supported range"));
    }
    Ok(())
}

/// Gate entry: material and vehicle present, quantity positive and storable
pub fn validate_gate_entry(input: &CreateGateEntryInput) -> Result<(), ValidationError> {
    input.validate()?;
    require_quantity("quantity", input.quantity)
}

/// GRN: at least one line; each line has a positive quantity, a non-negative
/// price and a VAT rate between 0 and 100. Line amounts and document totals
/// must fit the stored money columns.
pub fn validate_grn(input: &CreateGrnInput) -> Result<(), ValidationError> {
    input.validate()?;
    require_quantity("quantity_received", input.quantity_received)?;

    if input.items.is_empty() {
        return Err(ValidationError::new("items", "at least one line item is required"));
    }

    let mut lines = Vec::with_capacity(input.items.len());
    for (i, item) in input.items.iter().enumerate() {
        item.validate().map_err(|e| {
            let inner = ValidationError::from(e);
            ValidationError::new(format!("items[{}].{}", i, inner.field), inner.message)
        })?;
        require_quantity(&format!("items[{}].quantity", i), item.quantity)?;
        if item.price < Decimal::ZERO {
            return Err(ValidationError::new(
                format!("items[{}].price", i),
                "cannot be negative",
            ));
        }
        if item.price >= money_limit() {
            return Err(ValidationError::new(
                format!("items[{}].price", i),
                "exceeds the supported range",
            ));
        }
        if let Some(rate) = item.vat_rate {
            if rate < Decimal::ZERO || rate > Decimal::from(100) {
                return Err(ValidationError::new(
                    format!("items[{}].vat_rate", i),
                    "must be between 0 and 100",
                ));
            }
        }
        let line = GrnItem::priced(item.clone()).ok_or_else(|| {
            ValidationError::new(format!("items[{}]", i), "amount exceeds the supported range")
        })?;
        lines.push(line);
    }

    if GrnTotals::from_items(&lines).is_none() {
        return Err(ValidationError::new(
            "items",
            "document total exceeds the supported range",
        ));
    }
    Ok(())
}

/// Ad-hoc tests: a non-empty list of named tests
pub fn validate_new_tests(tests: &[CreateTestInput]) -> Result<(), ValidationError> {
    if tests.is_empty() {
        return Err(ValidationError::new("tests", "at least one test is required"));
    }
    for (i, test) in tests.iter().enumerate() {
        if test.test_name.trim().is_empty() {
            return Err(ValidationError::new(
                format!("tests[{}].test_name", i),
                "Test name is required",
            ));
        }
        test.validate().map_err(|e| {
            let inner = ValidationError::from(e);
            ValidationError::new(format!("tests[{}].{}", i, inner.field), inner.message)
        })?;
    }
    Ok(())
}

/// Result data must be a JSON object of readings
pub fn validate_result_data(data: &serde_json::Value) -> Result<(), ValidationError> {
    if !data.is_object() {
        return Err(ValidationError::new("result_data", "must be a JSON object"));
    }
    Ok(())
}

/// Identifiers of users referenced by an operation
pub fn validate_user_ref(field: &str, id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    Ok(())
}
