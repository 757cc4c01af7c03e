use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

/// The execution strategy a benchmark run uses to generate load.
///
/// Each strategy is scored independently; scores from different strategies are not comparable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the set of strategies is fixed by the persisted history format"
)]
pub enum Strategy {
    /// The workload kernel runs on a single background thread.
    SingleCore,

    /// The workload kernel runs on one thread per available processor.
    MultiCore,

    /// The workload is dispatched as compute batches to a GPU.
    Gpu,
}

impl Strategy {
    /// All strategies, in the order they are usually presented.
    pub const ALL: [Self; 3] = [Self::SingleCore, Self::MultiCore, Self::Gpu];

    /// The numeric identifier used for this strategy in persisted history records.
    ///
    /// The mapping is part of the history file format and never changes:
    /// `0` = single-core, `1` = GPU, `2` = multi-core.
    #[must_use]
    pub const fn persisted_id(self) -> u8 {
        match self {
            Self::SingleCore => 0,
            Self::Gpu => 1,
            Self::MultiCore => 2,
        }
    }

    /// Resolves a persisted identifier back into a strategy.
    ///
    /// Returns `None` for identifiers this version does not know about.
    #[must_use]
    pub const fn from_persisted_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::SingleCore),
            1 => Some(Self::Gpu),
            2 => Some(Self::MultiCore),
            _ => None,
        }
    }

    /// A short human-readable label, suitable for menus and log output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SingleCore => "single-core",
            Self::MultiCore => "multi-core",
            Self::Gpu => "gpu",
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single-core" | "single" | "cpu" => Ok(Self::SingleCore),
            "multi-core" | "multi" => Ok(Self::MultiCore),
            "gpu" => Ok(Self::Gpu),
            _ => Err(ParseStrategyError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// The provided text did not name a known [`Strategy`].
#[derive(Debug, Error)]
#[error("unknown benchmark strategy '{invalid_value}', expected single-core, multi-core or gpu")]
#[non_exhaustive]
pub struct ParseStrategyError {
    /// The text that failed to parse.
    pub invalid_value: String,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Strategy: Send, Sync, Copy);
    assert_impl_all!(ParseStrategyError: Send, Sync);

    #[test]
    fn persisted_ids_match_history_format() {
        assert_eq!(Strategy::SingleCore.persisted_id(), 0);
        assert_eq!(Strategy::Gpu.persisted_id(), 1);
        assert_eq!(Strategy::MultiCore.persisted_id(), 2);
    }

    #[test]
    fn persisted_ids_resolve_back() {
        for strategy in Strategy::ALL {
            assert_eq!(
                Strategy::from_persisted_id(strategy.persisted_id()),
                Some(strategy)
            );
        }
    }

    #[test]
    fn unknown_persisted_id_is_none() {
        assert_eq!(Strategy::from_persisted_id(3), None);
        assert_eq!(Strategy::from_persisted_id(u8::MAX), None);
    }

    #[test]
    fn parses_labels_and_aliases() {
        assert_eq!("single-core".parse::<Strategy>().unwrap(), Strategy::SingleCore);
        assert_eq!("CPU".parse::<Strategy>().unwrap(), Strategy::SingleCore);
        assert_eq!(" multi ".parse::<Strategy>().unwrap(), Strategy::MultiCore);
        assert_eq!("Gpu".parse::<Strategy>().unwrap(), Strategy::Gpu);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.to_string().parse::<Strategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn rejects_unknown_names() {
        let error = "quantum".parse::<Strategy>().unwrap_err();
        assert_eq!(error.invalid_value, "quantum");
        assert!(error.to_string().contains("quantum"));
    }
}
