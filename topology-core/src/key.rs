//! Configuration key formatting.
//!
//! Structured sources (config files, ConfigMaps, model documents) address values with
//! dot-separated keys such as `cache.dir`, while environment variables use upper snake case
//! such as `CACHE_DIR`. Every source picks exactly one formatter.

use crate::error::{AppError, Result};

/// A formatter which normalizes, splits and joins keys around a single separator.
pub trait KeyFormatter: Send + Sync {
    /// The separator between key segments.
    fn separator(&self) -> &'static str;

    /// Normalize the given key into this formatter's naming convention.
    fn normalize(&self, key: &str) -> String;

    /// Split the given key into its segments.
    fn split(&self, key: &str) -> Result<Vec<String>> {
        if key.trim().is_empty() {
            return Err(AppError::IllegalArgument("key must not be empty".into()));
        }
        Ok(key.split(self.separator()).map(String::from).collect())
    }

    /// Join the given segments, returning `None` when there are no segments.
    fn join(&self, parts: &[&str]) -> Option<String> {
        if parts.is_empty() {
            return None;
        }
        Some(parts.join(self.separator()))
    }
}

/// Dot separated keys, used by structured sources.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigKeyFormatter;

impl KeyFormatter for ConfigKeyFormatter {
    fn separator(&self) -> &'static str {
        "."
    }

    fn normalize(&self, key: &str) -> String {
        let key = key.trim();
        if key.contains('_') {
            return key.to_lowercase().replace('_', self.separator());
        }
        // Upper case words such as `ENV` must become `env`, not `eNV`.
        if is_uppercase(key) {
            return key.to_lowercase();
        }
        key.to_string()
    }
}

/// Upper snake case keys, used by environment variables.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvironmentKeyFormatter;

impl KeyFormatter for EnvironmentKeyFormatter {
    fn separator(&self) -> &'static str {
        "_"
    }

    fn normalize(&self, key: &str) -> String {
        let key = key.trim();
        if is_uppercase(key) && !key.contains('.') && !key.contains('-') {
            return key.to_string();
        }
        let mut out = String::with_capacity(key.len() + 4);
        let mut prev_lower = false;
        for ch in key.chars() {
            match ch {
                '.' | '-' | '_' => {
                    out.push('_');
                    prev_lower = false;
                }
                ch if ch.is_uppercase() && prev_lower => {
                    out.push('_');
                    out.push(ch);
                    prev_lower = false;
                }
                ch => {
                    out.extend(ch.to_uppercase());
                    prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
                }
            }
        }
        out
    }
}

/// Helpers for keys which live beneath a source prefix.
pub struct Prefix;

impl Prefix {
    /// Prepend the prefix to the given key, normalizing the result.
    pub fn add(key: &str, prefix: Option<&str>, formatter: &dyn KeyFormatter) -> String {
        match prefix.filter(|val| !val.trim().is_empty()) {
            Some(prefix) => {
                let (prefix, key) = (formatter.normalize(prefix), formatter.normalize(key));
                format!("{}{}{}", prefix, formatter.separator(), key)
            }
            None => formatter.normalize(key),
        }
    }

    /// Remove the prefix from the given key, normalizing the result.
    pub fn strip(key: &str, prefix: Option<&str>, formatter: &dyn KeyFormatter) -> String {
        let key = formatter.normalize(key);
        match prefix.filter(|val| !val.trim().is_empty()) {
            Some(prefix) => {
                let head = format!("{}{}", formatter.normalize(prefix), formatter.separator());
                key.strip_prefix(head.as_str()).map(String::from).unwrap_or(key)
            }
            None => key,
        }
    }

    /// Check if the given key falls beneath the prefix. Every key matches an empty prefix.
    pub fn matches(key: &str, prefix: Option<&str>, formatter: &dyn KeyFormatter) -> bool {
        match prefix.filter(|val| !val.trim().is_empty()) {
            Some(prefix) => {
                let head = format!("{}{}", formatter.normalize(prefix), formatter.separator());
                formatter.normalize(key).starts_with(head.as_str())
            }
            None => true,
        }
    }
}

fn is_uppercase(key: &str) -> bool {
    key.chars().any(|ch| ch.is_alphabetic()) && !key.chars().any(|ch| ch.is_lowercase())
}
