use std::collections::BTreeMap;

/// Shannon entropy of a string, in bits per character
///
/// The empty string has entropy 0. Counts are summed in character order so
/// the same input always yields the same bits.
///
/// # Examples
///
/// ```
/// use urlscope::features::shannon_entropy;
///
/// assert_eq!(shannon_entropy(""), 0.0);
/// assert_eq!(shannon_entropy("aaaa"), 0.0);
/// assert!((shannon_entropy("ab") - 1.0).abs() < 1e-12);
/// ```
pub fn shannon_entropy(s: &str) -> f64 {
    let mut counts: BTreeMap<char, usize> = BTreeMap::new();
    let mut total = 0usize;
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }

    if total == 0 {
        return 0.0;
    }

    let len = total as f64;
    let sum: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            p * p.log2()
        })
        .sum();

    0.0 - sum
}
