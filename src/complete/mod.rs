pub mod candidate;
pub mod matcher;

pub use candidate::{Candidate, rank, synthesize};
pub use matcher::{Syntax, TriggerMatch, match_trigger};
