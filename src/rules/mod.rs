//! Rule-based classification — deterministic pattern/keyword scoring.
//!
//! The rule pass never touches the network. Tables are immutable
//! configuration injected at construction, so multiple engines with
//! different tables can coexist.

pub mod engine;
pub mod table;

pub use engine::{RuleEngine, RuleMatch, RuleResult};
pub use table::{Rule, RuleCategory, RuleTable};
