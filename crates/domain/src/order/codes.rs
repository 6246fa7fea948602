//! Human-facing order numbers and SKUs.
//!
//! Codes are short and random, so collisions are possible. Storage enforces
//! uniqueness; callers treat a collision as retryable via [`retry_on_conflict`].

use std::future::Future;

use rand::Rng;

const FILLER: char = 'X';
const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Width of the sanitised prefix taken from a name.
pub const PREFIX_LEN: usize = 3;

/// Width of the random suffix.
pub const SUFFIX_LEN: usize = 6;

/// Derives a fixed-width uppercase code from a free-form name.
///
/// Non-alphanumeric characters are dropped and short results are padded with
/// `X`, so `""` becomes `"XXX"` and `"a-b"` becomes `"ABX"`.
pub fn code_from_name(name: &str, width: usize) -> String {
    let mut code: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(width)
        .collect();
    while code.len() < width {
        code.push(FILLER);
    }
    code
}

/// Random uppercase alphanumeric string of `len` characters.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Generates an order number such as `ACM4F7K2Q` from a business code or name.
pub fn generate_order_number(business_code: &str) -> String {
    format!(
        "{}{}",
        code_from_name(business_code, PREFIX_LEN),
        random_suffix(SUFFIX_LEN)
    )
}

/// Generates a SKU of the form `PPP-VVV-RRRRRR`.
pub fn generate_sku(product_name: &str, variant_name: &str) -> String {
    format!(
        "{}-{}-{}",
        code_from_name(product_name, PREFIX_LEN),
        code_from_name(variant_name, PREFIX_LEN),
        random_suffix(SUFFIX_LEN)
    )
}

/// Runs `op` up to `max_attempts` times while it fails with a retryable error.
///
/// `op` receives the zero-based attempt number. Non-retryable errors and the
/// error from the final attempt are returned unchanged. A budget of zero is
/// treated as one attempt.
pub async fn retry_on_conflict<T, E, F, Fut>(
    max_attempts: u32,
    mut op: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempt + 1 < attempts => {
                tracing::debug!(attempt, "retrying after conflict");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_from_name() {
        assert_eq!(code_from_name("Acme Store", 3), "ACM");
        assert_eq!(code_from_name("a-b", 3), "ABX");
        assert_eq!(code_from_name("", 3), "XXX");
        assert_eq!(code_from_name("!!! ??", 3), "XXX");
        assert_eq!(code_from_name("ماء", 3), "XXX");
    }

    #[test]
    fn test_order_number_format() {
        let number = generate_order_number("acme");
        assert_eq!(number.len(), PREFIX_LEN + SUFFIX_LEN);
        assert!(number.starts_with("ACM"));
        assert!(
            number
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_order_number_from_empty_code_is_well_formed() {
        let number = generate_order_number("");
        assert!(number.starts_with("XXX"));
        assert_eq!(number.len(), 9);
    }

    #[test]
    fn test_sku_format() {
        let sku = generate_sku("Linen Shirt", "Blue / M");
        let parts: Vec<_> = sku.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "LIN");
        assert_eq!(parts[1], "BLU");
        assert_eq!(parts[2].len(), SUFFIX_LEN);
    }

    #[test]
    fn test_random_suffix_varies() {
        let a = random_suffix(SUFFIX_LEN);
        let b = random_suffix(SUFFIX_LEN);
        let c = random_suffix(SUFFIX_LEN);
        assert!(a != b || b != c);
    }

    #[tokio::test]
    async fn test_retry_stops_at_first_success() {
        let result: Result<u32, &str> = retry_on_conflict(
            5,
            |attempt| async move {
                if attempt < 2 {
                    Err("conflict")
                } else {
                    Ok(attempt)
                }
            },
            |e| *e == "conflict",
        )
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_retry_surfaces_conflict_after_budget() {
        let mut calls = 0;
        let result: Result<(), &str> = retry_on_conflict(
            1,
            |_| {
                calls += 1;
                async { Err("conflict") }
            },
            |e| *e == "conflict",
        )
        .await;
        assert_eq!(result, Err("conflict"));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_other_errors() {
        let mut calls = 0;
        let result: Result<(), &str> = retry_on_conflict(
            3,
            |_| {
                calls += 1;
                async { Err("boom") }
            },
            |e| *e == "conflict",
        )
        .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls, 1);
    }
}
