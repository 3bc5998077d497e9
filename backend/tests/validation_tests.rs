//! Validation tests for accounts, catalog input and listings
//!
//! - Colombian mobile numbers, emails and passwords on sign-up
//! - Product prices and training offers
//! - Category slugs, uploaded file names and pagination bounds

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    sanitize_file_name, slugify, validate_colombian_phone, validate_email, validate_password,
    validate_price, validate_training_offer, Pagination, PaginationMeta, MAX_PER_PAGE,
};

// ============================================================================
// Account Validations
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn valid_emails_accepted(email in "[a-z]{5,10}@[a-z]{3,8}\\.(com|org|co|com\\.co)") {
        prop_assert!(validate_email(&email).is_ok());
    }

    #[test]
    fn passwords_with_letters_and_digits_accepted(password in "[a-zA-Z]{4,10}[0-9]{4,10}") {
        prop_assert!(validate_password(&password).is_ok());
    }

    #[test]
    fn passwords_without_digits_rejected(password in "[a-zA-Z]{1,30}") {
        prop_assert!(validate_password(&password).is_err());
    }

    #[test]
    fn colombian_mobiles_accepted(
        number in "3[0-9]{9}",
        with_prefix in any::<bool>(),
    ) {
        let phone = if with_prefix { format!("+57 {}", number) } else { number };
        prop_assert!(validate_colombian_phone(&phone).is_ok());
    }

    #[test]
    fn landlines_rejected(number in "[124-9][0-9]{9}") {
        prop_assert!(validate_colombian_phone(&number).is_err());
    }
}

// ============================================================================
// Catalog Validations
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Any positive amount with at most two decimals is a valid price
    #[test]
    fn two_decimal_prices_accepted(cents in 1i64..100_000_000_000) {
        prop_assert!(validate_price(Decimal::new(cents, 2)).is_ok());
    }

    /// A third significant decimal is rejected
    #[test]
    fn three_decimal_prices_rejected(cents in 0i64..100_000_000) {
        let price = Decimal::new(cents * 10 + 1, 3);
        prop_assert!(validate_price(price).is_err());
    }

    #[test]
    fn non_positive_prices_rejected(cents in 0i64..100_000_000) {
        prop_assert!(validate_price(Decimal::new(-cents, 2)).is_err());
    }

    /// Offering training requires a price
    #[test]
    fn training_offer_needs_price(price in proptest::option::of(0i64..1_000_000)) {
        let result = validate_training_offer(true, price.map(Decimal::from));
        prop_assert_eq!(result.is_ok(), price.is_some());
    }

    /// Slugs are lowercase ASCII words joined by single dashes
    #[test]
    fn slugs_are_url_safe(name in "\\PC{0,40}") {
        let slug = slugify(&name);
        prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        prop_assert!(!slug.starts_with('-'));
        prop_assert!(!slug.ends_with('-'));
        prop_assert!(!slug.contains("--"));
    }

    /// Stored file names never carry a path and are never empty
    #[test]
    fn file_names_are_sanitized(name in "\\PC{0,300}") {
        let clean = sanitize_file_name(&name);
        prop_assert!(!clean.is_empty());
        prop_assert!(!clean.contains('/'));
        prop_assert!(!clean.contains('\\'));
        prop_assert!(!clean.starts_with('.'));
        prop_assert!(clean.chars().count() <= 200);
    }
}

#[test]
fn test_category_slugs() {
    assert_eq!(slugify("Blusas y Camisas"), "blusas-y-camisas");
    assert_eq!(slugify("Diseño Básico 2024"), "diseno-basico-2024");
    assert_eq!(slugify("¡¡!!"), "");
}

// ============================================================================
// Pagination
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Query values are clamped into the served range
    #[test]
    fn pagination_is_clamped(
        page in proptest::option::of(any::<u32>()),
        per_page in proptest::option::of(any::<u32>()),
    ) {
        let p = Pagination::from_query(page, per_page);
        prop_assert!(p.page >= 1);
        prop_assert!((1..=MAX_PER_PAGE).contains(&p.per_page));
        prop_assert_eq!(p.offset(), i64::from(p.page - 1) * i64::from(p.per_page));
    }

    /// total_pages is the smallest page count that covers every item
    #[test]
    fn total_pages_cover_items(per_page in 1u32..=100, total in 0u64..100_000) {
        let meta = PaginationMeta::new(Pagination { page: 1, per_page }, total);
        let pages = u64::from(meta.total_pages);
        let per_page = u64::from(per_page);

        prop_assert!(pages * per_page >= total);
        if total > 0 {
            prop_assert!((pages - 1) * per_page < total);
        } else {
            prop_assert_eq!(pages, 0);
        }
    }
}
