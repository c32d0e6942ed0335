//! Kubernetes quantity normalization
//!
//! Resource lists are compared by value so `"1Gi"` equals `"1024Mi"` and
//! `"0.5"` equals `"500m"`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a quantity string into base units, `None` when malformed
pub fn normalize_quantity(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| raw.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((raw, 1.0));

    // A bare exponent ("1e3") is allowed, a unit followed by anything else is not.
    if number.is_empty() || number.ends_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value * multiplier)
}

fn same_value(a: &Quantity, b: &Quantity) -> bool {
    match (normalize_quantity(&a.0), normalize_quantity(&b.0)) {
        (Some(x), Some(y)) => {
            let scale = x.abs().max(y.abs()).max(1e-12);
            (x - y).abs() / scale < 1e-9
        }
        _ => a.0.trim() == b.0.trim(),
    }
}

/// Compare two resource lists by normalized value; `None` equals empty
pub fn resource_lists_equal(
    a: Option<&BTreeMap<String, Quantity>>,
    b: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);

    a.len() == b.len()
        && a.iter()
            .all(|(name, qa)| b.get(name).is_some_and(|qb| same_value(qa, qb)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(pairs: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
            .collect()
    }

    #[test]
    fn test_normalize_units() {
        assert_eq!(normalize_quantity("1Mi"), Some(1048576.0));
        assert_eq!(normalize_quantity("2"), Some(2.0));
        assert_eq!(normalize_quantity("1e3"), Some(1000.0));
        assert_eq!(normalize_quantity("128974848"), Some(128974848.0));
        let milli = normalize_quantity("500m").expect("valid");
        assert!((milli - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(normalize_quantity(""), None);
        assert_eq!(normalize_quantity("lots"), None);
        assert_eq!(normalize_quantity("1Xi"), None);
        assert_eq!(normalize_quantity("-1"), None);
        assert_eq!(normalize_quantity("Gi"), None);
    }

    #[test]
    fn test_resource_lists_equal_by_value() {
        let a = list(&[("cpu", "0.5"), ("memory", "1Gi")]);
        let b = list(&[("cpu", "500m"), ("memory", "1024Mi")]);
        assert!(resource_lists_equal(Some(&a), Some(&b)));

        let c = list(&[("cpu", "1"), ("memory", "1Gi")]);
        assert!(!resource_lists_equal(Some(&a), Some(&c)));
    }

    #[test]
    fn test_resource_lists_missing_keys() {
        let a = list(&[("cpu", "1m")]);
        let b = list(&[("cpu", "1m"), ("memory", "1Mi")]);
        assert!(!resource_lists_equal(Some(&a), Some(&b)));
        assert!(resource_lists_equal(None, Some(&BTreeMap::new())));
        assert!(!resource_lists_equal(None, Some(&a)));
    }
}
