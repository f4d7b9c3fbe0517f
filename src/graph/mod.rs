pub mod analyzer;
pub mod front_matter;
pub mod pagerank;
pub mod similarity;

pub use analyzer::{AnalyzeOptions, GraphAnalyzer, NoteGraphStats, QuickStats};
