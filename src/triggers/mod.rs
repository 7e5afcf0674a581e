/// Pattern analysis engine and rule implementations
pub mod pattern_analyzer;
pub mod rules;

pub use pattern_analyzer::{PatternAnalyzer, PatternDetection, PatternRule};
pub use rules::{ErrorRateRule, ErrorSpikeRule, NewErrorTypeRule};
