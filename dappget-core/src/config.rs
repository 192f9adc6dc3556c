use crate::resolve::DEFAULT_MAX_SEARCH_STEPS;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DappGetConfig {
    pub fetch_concurrency: usize,
    pub timeout: Duration,
    pub max_search_steps: usize,
    pub verbose: bool,
}

impl Default for DappGetConfig {
    fn default() -> Self {
        DappGetConfig {
            fetch_concurrency: 16,
            timeout: Duration::from_secs(60),
            max_search_steps: DEFAULT_MAX_SEARCH_STEPS,
            verbose: false,
        }
    }
}

impl DappGetConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = DappGetConfig::default();

        if let Some(value) = var("DAPPGET_FETCH_CONCURRENCY")
            && let Ok(parsed) = value.trim().parse::<usize>()
            && parsed > 0
        {
            config.fetch_concurrency = parsed;
        }

        if let Some(value) = var("DAPPGET_TIMEOUT_SECS")
            && let Ok(parsed) = value.trim().parse::<u64>()
            && parsed > 0
        {
            config.timeout = Duration::from_secs(parsed);
        }

        if let Some(value) = var("DAPPGET_MAX_SEARCH_STEPS")
            && let Ok(parsed) = value.trim().parse::<usize>()
            && parsed > 0
        {
            config.max_search_steps = parsed;
        }

        if let Some(value) = var("DAPPGET_VERBOSE") {
            config.verbose = is_truthy(&value);
        }

        config
    }
}

fn is_truthy(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    matches!(v.as_str(), "1" | "true" | "yes" | "y" | "on")
}
