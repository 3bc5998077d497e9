//! Validation utilities for the Patronaje marketplace
//!
//! Includes Colombia-specific checks (mobile numbers) used on sign-up.

use rust_decimal::Decimal;

// ============================================================================
// Account Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };
    if local.is_empty() || domain.len() < 3 || !domain.contains('.') || email.contains(' ') {
        return Err("Invalid email format");
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Validate password strength: 8+ characters with at least one letter and one digit
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit");
    }
    Ok(())
}

/// Validate a Colombian mobile number
/// Accepts: 3001234567, 300 123 4567, +57 300 123 4567
pub fn validate_colombian_phone(phone: &str) -> Result<(), &'static str> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    let national = if digits.len() == 12 && digits.starts_with("57") {
        &digits[2..]
    } else {
        digits.as_str()
    };

    if national.len() == 10 && national.starts_with('3') {
        Ok(())
    } else {
        Err("Invalid Colombian mobile number")
    }
}

// ============================================================================
// Catalog Validations
// ============================================================================

/// Validate a product price: positive, at most two decimals
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price <= Decimal::ZERO {
        return Err("Price must be greater than zero");
    }
    if price.normalize().scale() > 2 {
        return Err("Price cannot have more than two decimals");
    }
    Ok(())
}

/// Validate the training add-on settings of a product
pub fn validate_training_offer(
    training_available: bool,
    training_price: Option<Decimal>,
) -> Result<(), &'static str> {
    match (training_available, training_price) {
        (true, None) => Err("Training price is required when training is offered"),
        (_, Some(price)) if price < Decimal::ZERO => Err("Training price cannot be negative"),
        (_, Some(price)) if price.normalize().scale() > 2 => {
            Err("Training price cannot have more than two decimals")
        }
        _ => Ok(()),
    }
}

/// Content types accepted for pattern files
pub const ALLOWED_PATTERN_TYPES: &[&str] = &[
    "application/pdf",
    "application/zip",
    "application/x-zip-compressed",
    "image/png",
    "image/jpeg",
    "image/svg+xml",
    "application/dxf",
    "image/vnd.dxf",
];

/// Content types accepted for product thumbnails
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

/// Validate an uploaded pattern file content type
pub fn validate_pattern_content_type(content_type: &str) -> Result<(), &'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if ALLOWED_PATTERN_TYPES.contains(&essence) {
        Ok(())
    } else {
        Err("Unsupported pattern file type")
    }
}

/// Validate an uploaded thumbnail content type
pub fn validate_image_content_type(content_type: &str) -> Result<(), &'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if ALLOWED_IMAGE_TYPES.contains(&essence) {
        Ok(())
    } else {
        Err("Unsupported image type")
    }
}

/// Reduce a client-supplied file name to a safe display name.
/// Path components are dropped and quote/control characters replaced.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '"' | '\'' | ';' | ':' | '*' | '?' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "archivo".to_string()
    } else {
        cleaned.chars().take(200).collect()
    }
}
