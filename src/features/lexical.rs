//! Lexical features (`lx_`)
//!
//! Pure functions of the resolved URL string and its components. Counting
//! works on Unicode scalar values; vowels, consonants, digits and
//! punctuation are ASCII classes. Lexical extraction never fails.

use crate::features::{
    evaluate, manifest_names, shannon_entropy, FeatureError, FeatureFamily, FeatureRecord,
    FeatureSet, FeatureValue, Manifest,
};
use crate::resolver::ResolvedUrl;
use crate::source::UrlLabel;
use crate::url::UrlComponents;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'A' | 'E' | 'I' | 'O' | 'U')
}

fn is_consonant(c: char) -> bool {
    c.is_ascii_alphabetic() && !is_vowel(c)
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
}

/// Everything the lexical extractors read
#[derive(Debug, Clone)]
pub struct LexicalContext {
    raw: String,
    url: String,
    label: Option<UrlLabel>,
    parts: UrlComponents,
    chars: Vec<char>,
}

impl LexicalContext {
    pub fn new(resolved: &ResolvedUrl) -> Self {
        let url = resolved.resolved_url().to_string();
        Self {
            raw: resolved.raw_url().to_string(),
            chars: url.chars().collect(),
            url,
            label: resolved.label(),
            parts: resolved.components().clone(),
        }
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    fn count(&self, class: fn(char) -> bool) -> usize {
        self.chars.iter().filter(|c| class(**c)).count()
    }

    fn count_unique(&self, class: fn(char) -> bool) -> usize {
        self.chars
            .iter()
            .filter(|c| class(**c))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of adjacent pairs `(a, b)` where `a` is in `first` and `b` in `second`
    fn count_pairs(&self, first: fn(char) -> bool, second: fn(char) -> bool) -> usize {
        self.chars
            .windows(2)
            .filter(|pair| first(pair[0]) && second(pair[1]))
            .count()
    }

    /// Sum over matching characters of the first index at which that character occurs
    fn position_sum(&self, class: fn(char) -> bool) -> usize {
        let mut first_index: HashMap<char, usize> = HashMap::new();
        for (i, c) in self.chars.iter().enumerate() {
            first_index.entry(*c).or_insert(i);
        }

        self.chars
            .iter()
            .filter(|c| class(**c))
            .map(|c| first_index.get(c).copied().unwrap_or_default())
            .sum()
    }

    /// Consonants are counted after the scheme, with `w` trimmed off both ends
    fn num_consonants(&self) -> usize {
        let after_scheme = self.url.split("://").last().unwrap_or_default();
        after_scheme
            .trim_matches('w')
            .chars()
            .filter(|c| is_consonant(*c))
            .count()
    }

    fn num_vowels(&self) -> usize {
        self.count(is_vowel)
    }

    fn tld(&self) -> &str {
        self.parts.host.split('.').last().unwrap_or_default()
    }
}

fn ratio(numerator: usize, denominator: usize) -> FeatureValue {
    if denominator == 0 {
        FeatureValue::Null
    } else {
        FeatureValue::Float(numerator as f64 / denominator as f64)
    }
}

fn count_char(s: &str, needle: char) -> usize {
    s.chars().filter(|c| *c == needle).count()
}

fn path_extension(path: &str) -> FeatureValue {
    if !path.contains('.') {
        return FeatureValue::Null;
    }
    path.split('.')
        .last()
        .map(|ext| ext.trim_matches('/'))
        .into()
}

fn avg_len_query_params(ctx: &LexicalContext) -> FeatureValue {
    let params = &ctx.parts.query_params;
    if params.is_empty() {
        return FeatureValue::Float(0.0);
    }
    let total: usize = params.iter().map(|p| p.value.chars().count()).sum();
    FeatureValue::Float(total as f64 / params.len() as f64)
}

fn num_int_query_params(ctx: &LexicalContext) -> FeatureValue {
    ctx.parts
        .query_params
        .iter()
        .filter(|p| p.value.chars().all(is_digit))
        .count()
        .into()
}

const LEXICAL_FEATURES: Manifest<LexicalContext> = &[
    ("lx_url_raw", |c| c.raw.as_str().into()),
    ("lx_url_string", |c| c.url.as_str().into()),
    ("lx_num_periods", |c| count_char(&c.url, '.').into()),
    ("lx_label", |c| c.label.map(|l| l.as_str()).into()),
    ("lx_path_extension", |c| path_extension(&c.parts.path)),
    ("lx_scheme", |c| c.parts.scheme.as_str().into()),
    ("lx_url_length", |c| c.len().into()),
    ("lx_length_of_host", |c| c.parts.host.chars().count().into()),
    ("lx_length_of_path", |c| c.parts.path.chars().count().into()),
    ("lx_num_paths", |c| count_char(&c.parts.path, '/').into()),
    ("lx_entropy_fragment", |c| {
        shannon_entropy(&c.parts.fragments.join(" ")).into()
    }),
    ("lx_entropy_query", |c| {
        if c.parts.query.is_empty() {
            FeatureValue::Null
        } else {
            shannon_entropy(&c.parts.query).into()
        }
    }),
    ("lx_entropy_path", |c| shannon_entropy(&c.parts.path).into()),
    ("lx_entropy_host", |c| shannon_entropy(&c.parts.host).into()),
    ("lx_has_tls", |c| c.url.starts_with("https").into()),
    ("lx_tld", |c| c.tld().into()),
    ("lx_len_tld", |c| c.tld().chars().count().into()),
    ("lx_num_hyphens", |c| count_char(&c.url, '-').into()),
    ("lx_num_query_params", |c| c.parts.query_params.len().into()),
    ("lx_avg_len_query_params", avg_len_query_params),
    ("lx_num_int_query_params", num_int_query_params),
    ("lx_num_underscore", |c| count_char(&c.url, '_').into()),
    ("lx_num_fragment", |c| count_char(&c.url, '#').into()),
    ("lx_has_username", |c| c.parts.username.is_some().into()),
    ("lx_has_password", |c| c.parts.password.is_some().into()),
    ("lx_has_port", |c| c.parts.port.is_some().into()),
    ("lx_has_www", |c| c.url.contains("www.").into()),
    ("lx_url_string_entropy", |c| shannon_entropy(&c.url).into()),
    ("lx_url_raw_entropy", |c| shannon_entropy(&c.raw).into()),
    ("lx_diff_entropy_raw_resolved", |c| {
        (shannon_entropy(&c.raw) - shannon_entropy(&c.url)).into()
    }),
    ("lx_num_vowels", |c| c.num_vowels().into()),
    ("lx_num_consonants", |c| c.num_consonants().into()),
    ("lx_num_digits", |c| c.count(is_digit).into()),
    ("lx_num_puncs", |c| c.count(is_punctuation).into()),
    ("lx_num_unique_chars", |c| {
        c.chars.iter().collect::<HashSet<_>>().len().into()
    }),
    ("lx_num_lowercase", |c| c.count(char::is_lowercase).into()),
    ("lx_num_unique_vowels", |c| c.count_unique(is_vowel).into()),
    ("lx_num_unique_consonants", |c| c.count_unique(is_consonant).into()),
    ("lx_num_unique_digits", |c| c.count_unique(is_digit).into()),
    ("lx_num_unique_puncs", |c| c.count_unique(is_punctuation).into()),
    ("lx_num_subdirectories", |c| count_char(&c.parts.path, '/').into()),
    ("lx_num_uppercase", |c| c.count(char::is_uppercase).into()),
    ("lx_vowel_density", |c| ratio(c.num_vowels(), c.len())),
    ("lx_consonant_density", |c| {
        if c.len() == 0 {
            FeatureValue::Float(0.0)
        } else {
            ratio(c.num_consonants(), c.len())
        }
    }),
    ("lx_digit_density", |c| ratio(c.count(is_digit), c.len())),
    ("lx_punctuation_density", |c| ratio(c.count(is_punctuation), c.len())),
    ("lx_vowel_to_consonant_ratio", |c| {
        ratio(c.num_vowels(), c.num_consonants())
    }),
    ("lx_vowel_following_vowel", |c| c.count_pairs(is_vowel, is_vowel).into()),
    ("lx_consonant_following_consonant", |c| {
        c.count_pairs(is_consonant, is_consonant).into()
    }),
    ("lx_digit_following_digit", |c| c.count_pairs(is_digit, is_digit).into()),
    ("lx_vowel_following_consonant", |c| {
        c.count_pairs(is_consonant, is_vowel).into()
    }),
    ("lx_consonant_following_vowel", |c| {
        c.count_pairs(is_vowel, is_consonant).into()
    }),
    ("lx_vowel_positions", |c| c.position_sum(is_vowel).into()),
    ("lx_consonant_positions", |c| c.position_sum(is_consonant).into()),
    ("lx_digit_positions", |c| c.position_sum(is_digit).into()),
    ("lx_punctuation_positions", |c| c.position_sum(is_punctuation).into()),
    ("lx_num_encoded_chars", |c| count_char(&c.url, '%').into()),
    ("lx_num_encoded_chars_ratio", |c| ratio(count_char(&c.url, '%'), c.len())),
    ("lx_special_chars", |c| {
        c.chars.iter().filter(|ch| **ch as u32 > 127).count().into()
    }),
    ("lx_num_domains", |c| c.parts.domains.len().into()),
    // Labels beyond the registrable name and the TLD
    ("lx_num_subdomains", |c| c.parts.domains.len().saturating_sub(2).into()),
];

/// Computes the lexical record synchronously
pub fn extract_lexical(resolved: &ResolvedUrl) -> FeatureRecord {
    evaluate(
        FeatureFamily::Lexical,
        LEXICAL_FEATURES,
        &LexicalContext::new(resolved),
    )
}

/// Lexical feature set
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalFeatures;

#[async_trait]
impl FeatureSet for LexicalFeatures {
    fn family(&self) -> FeatureFamily {
        FeatureFamily::Lexical
    }

    fn names(&self) -> Vec<&'static str> {
        manifest_names(LEXICAL_FEATURES)
    }

    async fn extract(&self, resolved: &ResolvedUrl) -> Result<FeatureRecord, FeatureError> {
        Ok(extract_lexical(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexical(url: &str) -> FeatureRecord {
        extract_lexical(&ResolvedUrl::offline(url, None))
    }

    fn int(record: &FeatureRecord, name: &str) -> i64 {
        record.get(name).and_then(FeatureValue::as_i64).unwrap()
    }

    fn float(record: &FeatureRecord, name: &str) -> f64 {
        record.get(name).and_then(FeatureValue::as_f64).unwrap()
    }

    #[test]
    fn test_record_has_every_declared_name() {
        let record = lexical("http://example.com");
        let names: Vec<_> = record.values().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, LexicalFeatures.names());
        assert!(names.iter().all(|n| n.starts_with("lx_")));
    }

    #[test]
    fn test_simple_url() {
        let record = lexical("http://ab12.com");
        assert_eq!(int(&record, "lx_num_digits"), 2);
        // 'a' and 'o'
        assert_eq!(int(&record, "lx_num_vowels"), 2);
        assert!(float(&record, "lx_url_string_entropy") > 0.0);
        assert_eq!(int(&record, "lx_url_length"), 15);
        assert_eq!(int(&record, "lx_num_periods"), 1);
        assert_eq!(record.get("lx_tld"), Some(&FeatureValue::Text("com".into())));
        assert_eq!(record.get("lx_label"), Some(&FeatureValue::Null));
        assert_eq!(record.get("lx_entropy_query"), Some(&FeatureValue::Null));
        assert_eq!(record.get("lx_has_tls"), Some(&FeatureValue::Bool(false)));
    }

    #[test]
    fn test_deterministic() {
        let url = "https://www.Example.com:8080/a/b.php?id=12&x=abc#frag";
        assert_eq!(lexical(url), lexical(url));
    }

    #[test]
    fn test_consonants_skip_scheme_and_trim_w() {
        // "www.wow.com" trimmed of 'w' is ".wow.com": w, w, c, m
        let record = lexical("http://www.wow.com");
        assert_eq!(int(&record, "lx_num_consonants"), 4);
    }

    #[test]
    fn test_query_features() {
        let record = lexical("http://example.com/p?id=12&name=ab&flag&empty=");
        assert_eq!(int(&record, "lx_num_query_params"), 3);
        // "12" and the empty value are all-digit
        assert_eq!(int(&record, "lx_num_int_query_params"), 2);
        assert!((float(&record, "lx_avg_len_query_params") - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_query_params() {
        let record = lexical("http://example.com/");
        assert_eq!(record.get("lx_avg_len_query_params"), Some(&FeatureValue::Float(0.0)));
        assert_eq!(int(&record, "lx_num_int_query_params"), 0);
    }

    #[test]
    fn test_path_extension() {
        assert_eq!(
            lexical("http://example.com/files/report.pdf/")
                .get("lx_path_extension")
                .cloned(),
            Some(FeatureValue::Text("pdf".into()))
        );
        assert_eq!(
            lexical("http://example.com/files/").get("lx_path_extension").cloned(),
            Some(FeatureValue::Null)
        );
    }

    #[test]
    fn test_position_sums_use_first_occurrence() {
        // "aa1a": vowels at first index 0 three times
        let resolved = ResolvedUrl::offline("aa1a", None);
        let record = extract_lexical(&resolved);
        assert_eq!(int(&record, "lx_vowel_positions"), 0);
        assert_eq!(int(&record, "lx_digit_positions"), 2);
    }

    #[test]
    fn test_adjacent_pairs() {
        let record = lexical("aeb12");
        assert_eq!(int(&record, "lx_vowel_following_vowel"), 1);
        assert_eq!(int(&record, "lx_consonant_following_vowel"), 1);
        assert_eq!(int(&record, "lx_digit_following_digit"), 1);
    }

    #[test]
    fn test_empty_url_densities() {
        let record = lexical("");
        assert_eq!(int(&record, "lx_url_length"), 0);
        assert_eq!(record.get("lx_vowel_density"), Some(&FeatureValue::Null));
        assert_eq!(record.get("lx_digit_density"), Some(&FeatureValue::Null));
        assert_eq!(record.get("lx_consonant_density"), Some(&FeatureValue::Float(0.0)));
        assert_eq!(record.get("lx_num_encoded_chars_ratio"), Some(&FeatureValue::Null));
        assert_eq!(record.get("lx_url_string_entropy"), Some(&FeatureValue::Float(0.0)));
    }

    #[test]
    fn test_credentials_and_port() {
        let record = lexical("http://user:pw@example.com:8080/");
        assert_eq!(record.get("lx_has_username"), Some(&FeatureValue::Bool(true)));
        assert_eq!(record.get("lx_has_password"), Some(&FeatureValue::Bool(true)));
        assert_eq!(record.get("lx_has_port"), Some(&FeatureValue::Bool(true)));
    }

    #[test]
    fn test_domain_counts() {
        let record = lexical("http://www.mail.example.co.uk/");
        assert_eq!(int(&record, "lx_num_domains"), 4);
        assert_eq!(int(&record, "lx_num_subdomains"), 2);
        assert_eq!(record.get("lx_has_www"), Some(&FeatureValue::Bool(true)));
    }

    #[test]
    fn test_label_and_raw_entropy_difference() {
        let resolved = ResolvedUrl::offline("example.com", Some(UrlLabel::Phishing));
        let record = extract_lexical(&resolved);
        assert_eq!(
            record.get("lx_label"),
            Some(&FeatureValue::Text("phishing".into()))
        );
        assert_eq!(float(&record, "lx_diff_entropy_raw_resolved"), 0.0);
    }

    #[test]
    fn test_special_and_encoded_chars() {
        let record = lexical("http://example.com/caf%C3%A9/ü");
        assert_eq!(int(&record, "lx_num_encoded_chars"), 2);
        assert_eq!(int(&record, "lx_special_chars"), 1);
    }
}
