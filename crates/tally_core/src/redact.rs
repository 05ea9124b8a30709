//! Masking of secrets in free text for logs and diagnostics.
//!
//! Matching is literal, case-sensitive substring matching. When several
//! needles overlap at the same position the longest one wins. Redaction
//! is never applied to the persisted snapshot itself.

use crate::error::{CoreError, CoreResult};
use regex::{Regex, RegexBuilder};

/// Replacement for every exact-match secret, whatever its length.
pub const SECRET_MARKER: &str = "********";

/// Padding character for suffix masking.
pub const PAD_MARKER: char = '*';

/// Number of trailing characters suffix masking keeps visible.
pub const VISIBLE_SUFFIX: usize = 3;

/// Default compiled size limit for each needle alternation (10 MiB).
pub const DEFAULT_PATTERN_SIZE_LIMIT: usize = 10 * (1 << 20);

fn alternation<S: AsRef<str>>(needles: &[S], size_limit: usize) -> CoreResult<Option<Regex>> {
    let mut literals: Vec<&str> = needles
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect();
    if literals.is_empty() {
        return Ok(None);
    }
    literals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    literals.dedup();

    let pattern = literals
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&pattern)
        .size_limit(size_limit)
        .build()
        .map(Some)
        .map_err(|e| CoreError::config(format!("redaction pattern rejected: {e}")))
}

fn keep_suffix(matched: &str) -> String {
    let len = matched.chars().count();
    let keep = len.min(VISIBLE_SUFFIX);
    let mut out: String = std::iter::repeat(PAD_MARKER).take(len - keep).collect();
    out.extend(matched.chars().skip(len - keep));
    out
}

/// A compiled set of secrets and keywords to mask.
///
/// # Example
///
/// ```
/// use tally_core::Redactor;
///
/// let redactor = Redactor::new(&["hunter2"], &["alice@example.org"]).unwrap();
/// assert_eq!(
///     redactor.redact("login alice@example.org pw hunter2"),
///     "login **************org pw ********"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Option<Regex>,
    keywords: Option<Regex>,
}

impl Redactor {
    /// Compiles a redactor. Empty strings are ignored.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the needles are too large to
    /// compile.
    pub fn new<S: AsRef<str>, K: AsRef<str>>(secrets: &[S], keywords: &[K]) -> CoreResult<Self> {
        Self::with_size_limit(secrets, keywords, DEFAULT_PATTERN_SIZE_LIMIT)
    }

    /// Compiles a redactor whose patterns must each fit in `size_limit`
    /// bytes once compiled.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either pattern exceeds the limit.
    pub fn with_size_limit<S: AsRef<str>, K: AsRef<str>>(
        secrets: &[S],
        keywords: &[K],
        size_limit: usize,
    ) -> CoreResult<Self> {
        Ok(Self {
            secrets: alternation(secrets, size_limit)?,
            keywords: alternation(keywords, size_limit)?,
        })
    }

    /// Returns whether the redactor has nothing to mask.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_none() && self.keywords.is_none()
    }

    /// Replaces every secret with [`SECRET_MARKER`].
    #[must_use]
    pub fn mask_exact(&self, text: &str) -> String {
        match &self.secrets {
            Some(re) => re.replace_all(text, SECRET_MARKER).into_owned(),
            None => text.to_string(),
        }
    }

    /// Replaces every keyword with its last three characters, left-padded
    /// with [`PAD_MARKER`] to the keyword's length.
    #[must_use]
    pub fn mask_suffix(&self, text: &str) -> String {
        match &self.keywords {
            Some(re) => re
                .replace_all(text, |caps: &regex::Captures<'_>| keep_suffix(&caps[0]))
                .into_owned(),
            None => text.to_string(),
        }
    }

    /// Applies exact masking, then suffix masking.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        self.mask_suffix(&self.mask_exact(text))
    }
}

/// Masks every occurrence of each secret with a fixed-width marker.
///
/// # Errors
///
/// See [`Redactor::new`].
pub fn mask_exact<S: AsRef<str>>(text: &str, secrets: &[S]) -> CoreResult<String> {
    Ok(Redactor::new(secrets, &[] as &[&str])?.mask_exact(text))
}

/// Masks every occurrence of each keyword, keeping its last three
/// characters and its length.
///
/// # Errors
///
/// See [`Redactor::new`].
pub fn mask_suffix<K: AsRef<str>>(text: &str, keywords: &[K]) -> CoreResult<String> {
    Ok(Redactor::new(&[] as &[&str], keywords)?.mask_suffix(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NONE: &[&str] = &[];

    #[test]
    fn empty_sets_are_noops() {
        assert_eq!(mask_exact("anything goes", NONE).unwrap(), "anything goes");
        assert_eq!(mask_suffix("anything goes", NONE).unwrap(), "anything goes");
        assert_eq!(mask_exact("anything goes", &[""]).unwrap(), "anything goes");
        assert!(Redactor::default().is_empty());
    }

    #[test]
    fn exact_marker_hides_length() {
        assert_eq!(mask_exact("pw=a;", &["a"]).unwrap(), "pw=********;");
        assert_eq!(
            mask_exact("pw=averyveryverylongsecret;", &["averyveryverylongsecret"]).unwrap(),
            "pw=********;"
        );
    }

    #[test]
    fn suffix_keeps_length_and_tail() {
        assert_eq!(
            mask_suffix("user 12345678 logged in", &["12345678"]).unwrap(),
            "user *****678 logged in"
        );
        assert_eq!(mask_suffix("id ab!", &["ab"]).unwrap(), "id ab!");
        assert_eq!(mask_suffix("compte épargne", &["épargne"]).unwrap(), "compte ****gne");
    }

    #[test]
    fn matching_is_literal_and_case_sensitive() {
        assert_eq!(mask_exact("a.c abc A.C", &["a.c"]).unwrap(), "******** abc A.C");
    }

    #[test]
    fn longest_needle_wins() {
        assert_eq!(
            mask_suffix("token abcdef", &["abc", "abcdef"]).unwrap(),
            "token ***def"
        );
    }

    #[test]
    fn every_occurrence_is_masked() {
        assert_eq!(
            mask_exact("s3cr3t and s3cr3t again", &["s3cr3t"]).unwrap(),
            "******** and ******** again"
        );
    }

    #[test]
    fn oversized_patterns_are_rejected() {
        let login = "x".repeat(256);
        let err = Redactor::with_size_limit(NONE, &[login.as_str()], 16).unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
        assert!(Redactor::with_size_limit(NONE, &["short"], DEFAULT_PATTERN_SIZE_LIMIT).is_ok());
    }

    proptest! {
        #[test]
        fn exact_output_length_ignores_secret_length(
            prefix in "[a-z ]{0,16}",
            suffix in "[a-z ]{0,16}",
            short in "[A-Z]{1,4}",
            long in "[0-9]{5,40}",
        ) {
            let with_short = mask_exact(&format!("{prefix}{short}{suffix}"), &[&short]).unwrap();
            let with_long = mask_exact(&format!("{prefix}{long}{suffix}"), &[&long]).unwrap();
            prop_assert_eq!(with_short.len(), with_long.len());
            prop_assert!(!with_long.contains(&long));
        }

        #[test]
        fn suffix_masking_preserves_char_count(
            text in "[a-zé ]{0,40}",
            keyword in "[a-zé]{1,8}",
        ) {
            let masked = mask_suffix(&text, &[&keyword]).unwrap();
            prop_assert_eq!(masked.chars().count(), text.chars().count());
        }
    }
}
