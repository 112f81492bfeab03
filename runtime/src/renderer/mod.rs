// Copyright 2026 Lead Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser backend for the harvesting engine.
//!
//! Implements the engine's `Driver`/`DriverFactory` traits on top of
//! Chromium via chromiumoxide, and locates a Chromium binary on the host.

pub mod chromium;

use std::path::PathBuf;

/// Failures while starting a browser.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("Chromium not found. Set LEADHARVEST_CHROMIUM_PATH or install Chrome/Chromium.")]
    ChromiumNotFound,

    #[error("invalid browser config: {0}")]
    Config(String),

    #[error("failed to launch Chromium: {0}")]
    Launch(#[from] chromiumoxide::error::CdpError),
}

/// How each fresh browser session is launched.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Explicit binary; falls back to [`find_chromium`].
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub window: (u32, u32),
    /// Page-level navigation timeout.
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            window: (1920, 1080),
            navigation_timeout_ms: 30_000,
        }
    }
}

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. LEADHARVEST_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("LEADHARVEST_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.leadharvest/chromium/
    if let Some(home) = dirs::home_dir() {
        let root = home.join(".leadharvest").join("chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                root.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome"),
            ]
        } else {
            vec![root.join("chrome-linux64/chrome"), root.join("chrome")]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Escape `s` for use inside a single- or double-quoted JS string literal.
pub(crate) fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '`' => out.push_str("\\`"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => {}
            '<' => out.push_str("\\x3c"),
            '>' => out.push_str("\\x3e"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_selector_quotes() {
        assert_eq!(
            js_string("div[role='feed']"),
            "div[role=\\'feed\\']"
        );
        assert_eq!(js_string("a\\b\n"), "a\\\\b\\n");
        assert_eq!(js_string("</script>"), "\\x3c/script\\x3e");
    }

    #[test]
    fn test_env_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").unwrap();
        std::env::set_var("LEADHARVEST_CHROMIUM_PATH", &fake);
        assert_eq!(find_chromium(), Some(fake));
        std::env::remove_var("LEADHARVEST_CHROMIUM_PATH");
    }
}
