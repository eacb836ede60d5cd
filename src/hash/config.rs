// Matcher tuning.
//
// `MatcherConfig` holds the knobs of the greedy parser.  A few named
// profiles trade speed for delta size; `config_for_level` maps the CLI's
// 0..=9 levels onto them.

/// Shortest COPY worth emitting (the code table's smallest implicit size).
pub const MIN_MATCH: usize = 4;

/// Shortest byte run emitted as RUN.
pub const MIN_RUN: usize = 8;

/// Default block width for the source and target index.
pub const DEFAULT_BLOCK_SIZE: usize = 16;

/// Smallest accepted block width.
pub const MIN_BLOCK_SIZE: usize = 2;

/// Default chain entries examined per lookup.
pub const DEFAULT_MAX_PROBES: usize = 16;

/// Default target window size (8 MiB).
pub const DEFAULT_WINDOW_SIZE: usize = 1 << 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    /// Shortest accepted match.
    pub min_match: usize,
    /// Shortest run emitted as RUN.
    pub min_run: usize,
    /// Equal-hash chain entries verified per lookup.
    pub max_probes: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        DEFAULT
    }
}

pub const FAST: MatcherConfig = MatcherConfig {
    min_match: MIN_MATCH,
    min_run: MIN_RUN,
    max_probes: 2,
};

pub const DEFAULT: MatcherConfig = MatcherConfig {
    min_match: MIN_MATCH,
    min_run: MIN_RUN,
    max_probes: DEFAULT_MAX_PROBES,
};

pub const SLOW: MatcherConfig = MatcherConfig {
    min_match: MIN_MATCH,
    min_run: MIN_RUN,
    max_probes: 128,
};

/// Level 0..=9 to profile: 0-2 fast, 3-6 default, 7-9 slow.
pub fn config_for_level(level: u32) -> MatcherConfig {
    match level {
        0..=2 => FAST,
        3..=6 => DEFAULT,
        _ => SLOW,
    }
}

/// Name of the profile a level selects.
pub fn profile_name(level: u32) -> &'static str {
    match level {
        0..=2 => "fast",
        3..=6 => "default",
        _ => "slow",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = MatcherConfig::default();
        assert_eq!((c.min_match, c.min_run, c.max_probes), (4, 8, 16));
    }

    #[test]
    fn level_mapping() {
        assert_eq!(config_for_level(0), FAST);
        assert_eq!(config_for_level(6), DEFAULT);
        assert_eq!(config_for_level(9), SLOW);
        assert_eq!(profile_name(7), "slow");
        assert!(FAST.max_probes < DEFAULT.max_probes && DEFAULT.max_probes < SLOW.max_probes);
    }
}
