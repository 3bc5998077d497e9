//! WebAssembly module for the Patronaje storefront
//!
//! Provides client-side computation for:
//! - Local-storage cart totals (same rules the API applies at checkout)
//! - Price formatting in Colombian pesos
//! - Sign-up form validation
//! - Training schedule checks

use chrono::DateTime;
use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Calculate the cart total from the JSON array kept in local storage.
/// Returns the total as a decimal string to avoid float rounding in JS.
#[wasm_bindgen]
pub fn calculate_cart_total(cart_json: &str) -> Result<String, JsValue> {
    match cart_total_from_json(cart_json) {
        Ok(total) => Ok(total.to_string()),
        Err(msg) => {
            web_sys::console::warn_1(&JsValue::from_str(&msg));
            Err(JsValue::from_str(&msg))
        }
    }
}

fn cart_total_from_json(cart_json: &str) -> Result<Decimal, String> {
    let lines: Vec<CartLine> =
        serde_json::from_str(cart_json).map_err(|e| format!("Invalid cart JSON: {}", e))?;
    cart_total(&lines).map_err(|e| e.to_string())
}

/// Format an amount as Colombian pesos, e.g. "$ 45.000" or "$ 19.999,50"
#[wasm_bindgen]
pub fn format_cop(amount: &str) -> Result<String, JsValue> {
    let value: Decimal = amount
        .parse()
        .map_err(|_| JsValue::from_str("Invalid amount"))?;
    Ok(format_price(value))
}

fn format_price(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let abs = rounded.abs();
    let integer = abs.trunc().to_string();
    let fraction = (abs.fract() * Decimal::from(100)).round().to_string();

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, c) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    if fraction == "0" {
        format!("{}$ {}", sign, grouped)
    } else {
        format!("{}$ {},{:0>2}", sign, grouped, fraction)
    }
}

/// Integer cents the payment widget expects for an amount
#[wasm_bindgen]
pub fn amount_in_cents(amount: &str) -> Result<i64, JsValue> {
    let value: Decimal = amount
        .parse()
        .map_err(|_| JsValue::from_str("Invalid amount"))?;
    to_amount_in_cents(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Validate email format
#[wasm_bindgen]
pub fn is_valid_email(email: &str) -> bool {
    validate_email(email).is_ok()
}

/// Password problem to show under the field, if any
#[wasm_bindgen]
pub fn password_error(password: &str) -> Option<String> {
    validate_password(password).err().map(str::to_string)
}

/// Validate a Colombian mobile number
#[wasm_bindgen]
pub fn is_valid_colombian_phone(phone: &str) -> bool {
    validate_colombian_phone(phone).is_ok()
}

/// Check a training schedule chosen in the patronista dashboard
#[wasm_bindgen]
pub fn training_schedule_error(scheduled_at_ms: f64, duration_minutes: i32) -> Option<String> {
    schedule_error_at(scheduled_at_ms, duration_minutes, js_sys::Date::now())
}

fn schedule_error_at(scheduled_at_ms: f64, duration_minutes: i32, now_ms: f64) -> Option<String> {
    let scheduled = DateTime::from_timestamp_millis(scheduled_at_ms as i64)?;
    let now = DateTime::from_timestamp_millis(now_ms as i64)?;
    validate_schedule(scheduled, duration_minutes, now)
        .err()
        .map(str::to_string)
}
