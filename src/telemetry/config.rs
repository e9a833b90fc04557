/// Configuration for the telemetry subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Reported in the startup line.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset (e.g. "info", "starkloop_keeper=debug,warn").
    pub log_filter: String,
    /// Whether to enable ANSI-colored console output.
    pub enable_console_colors: bool,
    /// Whether to include target module in output.
    pub show_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "starkloop-keeper".into(),
            log_filter: "info".into(),
            enable_console_colors: true,
            show_target: false,
        }
    }
}

impl TelemetryConfig {
    /// Defaults adjusted by `LOG_FILTER` and `NO_COLOR`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(filter) = lookup("LOG_FILTER").filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }
        // https://no-color.org: any non-empty value disables color.
        if lookup("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            config.enable_console_colors = false;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lookup_overrides() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "LOG_FILTER" => Some("starkloop_keeper=debug".into()),
            "NO_COLOR" => Some("1".into()),
            _ => None,
        });
        assert_eq!(config.log_filter, "starkloop_keeper=debug");
        assert!(!config.enable_console_colors);
    }

    #[test]
    fn test_from_lookup_defaults() {
        assert_eq!(TelemetryConfig::from_lookup(|_| None), TelemetryConfig::default());
    }
}
