//! Round-robin credential selection
//!
//! A setting may carry several API keys. One key is picked per logical call
//! (list models, generate, stream, image) and the cursor advances, so load
//! spreads evenly across keys without any retry logic in the core.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::ProviderSetting;

/// Per-setting round-robin cursor
#[derive(Debug, Default)]
pub struct KeyRotator {
    cursors: Mutex<HashMap<String, usize>>,
}

impl KeyRotator {
    /// Create a rotator with all cursors at the first key
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the key for the next call, or `None` when the setting has none
    ///
    /// # Examples
    ///
    /// ```
    /// use streamchat::config::ProviderConfig;
    /// use streamchat::providers::KeyRotator;
    ///
    /// let mut setting = ProviderConfig::default().settings[0].clone();
    /// setting.api_keys = vec!["a".into(), "b".into()];
    ///
    /// let rotator = KeyRotator::new();
    /// assert_eq!(rotator.next_key(&setting), Some("a"));
    /// assert_eq!(rotator.next_key(&setting), Some("b"));
    /// assert_eq!(rotator.next_key(&setting), Some("a"));
    /// ```
    pub fn next_key<'a>(&self, setting: &'a ProviderSetting) -> Option<&'a str> {
        let keys: Vec<&str> = setting
            .api_keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return None;
        }

        let mut cursors = self.cursors.lock().unwrap_or_else(|p| p.into_inner());
        let cursor = cursors.entry(setting.rotation_key()).or_insert(0);
        let key = keys[*cursor % keys.len()];
        *cursor = cursor.wrapping_add(1);
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn setting(name: &str, keys: &[&str]) -> ProviderSetting {
        let mut setting = ProviderConfig::default().settings[0].clone();
        setting.name = name.to_string();
        setting.api_keys = keys.iter().map(|k| k.to_string()).collect();
        setting
    }

    #[test]
    fn test_no_keys_yields_none() {
        let rotator = KeyRotator::new();
        assert_eq!(rotator.next_key(&setting("a", &[])), None);
        assert_eq!(rotator.next_key(&setting("a", &["  "])), None);
    }

    #[test]
    fn test_single_key_is_always_used() {
        let rotator = KeyRotator::new();
        let s = setting("a", &["only"]);
        for _ in 0..3 {
            assert_eq!(rotator.next_key(&s), Some("only"));
        }
    }

    #[test]
    fn test_cursors_are_per_setting() {
        let rotator = KeyRotator::new();
        let a = setting("a", &["a1", "a2"]);
        let b = setting("b", &["b1", "b2"]);
        assert_eq!(rotator.next_key(&a), Some("a1"));
        assert_eq!(rotator.next_key(&b), Some("b1"));
        assert_eq!(rotator.next_key(&a), Some("a2"));
        assert_eq!(rotator.next_key(&b), Some("b2"));
    }
}
