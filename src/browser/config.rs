use serde::Deserialize;
use std::time::Duration;

/// Configuration for the shared rendering browser
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,

    /// Browser window size
    pub window_size: (u32, u32),

    /// Custom user agent applied to every tab
    pub user_agent: Option<String>,

    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,

    /// How long to wait for a render marker before taking the page as-is
    pub render_marker_timeout_secs: u64,

    /// Idle time after which Chrome closes itself
    pub idle_timeout_secs: u64,

    /// Resource types refused by request interception (lowercase CDP names)
    pub blocked_resource_types: Vec<String>,

    /// Domains refused by request interception, including their subdomains
    pub blocked_domains: Vec<String>,

    /// Refuse scripts and XHR/fetch calls to hosts other than the page's
    pub block_cross_origin_scripts: bool,

    /// Additional Chrome flags
    pub chrome_flags: Vec<String>,

    /// Scroll to the bottom before extracting, for lazy-loaded images
    pub scroll_for_lazy_content: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1366, 900),
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            navigation_timeout_secs: 20,
            render_marker_timeout_secs: 7,
            idle_timeout_secs: 300,
            blocked_resource_types: ["image", "font", "media", "stylesheet", "manifest"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blocked_domains: [
                "googletagmanager.com",
                "google-analytics.com",
                "doubleclick.net",
                "adservice.google.com",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            block_cross_origin_scripts: true,
            chrome_flags: Self::stealth_flags(),
            scroll_for_lazy_content: true,
        }
    }
}

impl BrowserConfig {
    fn stealth_flags() -> Vec<String> {
        vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--no-sandbox".to_string(),
        ]
    }

    /// Create a configuration optimized for stealth mode
    pub fn stealth_mode() -> Self {
        Self::default()
    }

    /// Create a configuration for debugging (non-headless, nothing blocked)
    pub fn debug_mode() -> Self {
        Self {
            headless: false,
            blocked_resource_types: Vec::new(),
            blocked_domains: Vec::new(),
            ..Self::default()
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn render_marker_timeout(&self) -> Duration {
        Duration::from_secs(self.render_marker_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(config.user_agent.is_some());
        assert_eq!(config.navigation_timeout(), Duration::from_secs(20));
        assert_eq!(config.render_marker_timeout(), Duration::from_secs(7));
        assert!(config.blocked_resource_types.iter().any(|t| t == "stylesheet"));
        assert!(config.blocked_domains.iter().any(|d| d == "doubleclick.net"));
    }

    #[test]
    fn test_stealth_mode() {
        let config = BrowserConfig::stealth_mode();
        assert!(config
            .chrome_flags
            .iter()
            .any(|f| f.contains("AutomationControlled")));
    }

    #[test]
    fn test_debug_mode() {
        let config = BrowserConfig::debug_mode();
        assert!(!config.headless);
        assert!(config.blocked_resource_types.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: BrowserConfig = toml::from_str("headless = false\nnavigation_timeout_secs = 5").unwrap();
        assert!(!config.headless);
        assert_eq!(config.navigation_timeout_secs, 5);
        assert_eq!(config.render_marker_timeout_secs, 7);
    }
}
