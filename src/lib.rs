//! # Lexgate: Content-Module Rule Evaluation
//!
//! Lexgate decides which content modules belong in a generated legal
//! document. Each module may carry declarative rules over the facts
//! collected from the user; when it does, inclusion is decided
//! deterministically, otherwise the decision is left to a language model.
//!
//! ## Building Blocks
//!
//! ### 1. Values and Normalization
//! - Fact maps and rule literals ([`value`])
//! - Boolean-token, number and accent-insensitive text handling ([`normalize`])
//!
//! ### 2. Rules
//! - Rule tree and its lenient JSON decoding ([`ast`])
//! - Evaluation and conclusiveness analysis ([`eval`])
//! - Variable validation against the known catalogue ([`integrity`])
//!
//! ### 3. Modules
//! - Activation-mode resolution and per-module decisions ([`activation`])
//! - Transactional module persistence ([`store`])
//! - Batch repair of drifted activation flags ([`activation::repair`])
//!
//! ### 4. Form Dependencies
//! - Question visibility and not-applicable marking ([`dependency`])
//!
//! ## Decision Pipeline
//!
//! ```text
//! Answers → Dependency preprocessing → Mode resolution → Rule selection → Evaluation
//! ```
//!
//! Rule evaluation never fails: malformed nodes and missing data evaluate to
//! `false`. Fallible edges (files, stores, configuration) report through
//! [`Error`].

pub mod activation;
pub mod ast;
pub mod config;
pub mod dependency;
pub mod error;
pub mod eval;
pub mod integrity;
pub mod normalize;
pub mod store;
pub mod value;

// Re-exports
pub use activation::repair::{ModeChange, ModeRepair, RepairReport};
pub use activation::{fast_path, resolve_mode, ActivationMode, Module, ModuleDecision, RuleSlot};
pub use ast::{Condition, Defect, DefectKind, Operator, RuleNode};
pub use config::{ConfigError, ConfigValidation, EngineConfig};
pub use error::*;
pub use eval::*;
pub use store::{InMemoryModuleStore, JsonFileModuleStore, ModuleStore, StoreError, StoreResult};
pub use value::{FactMap, FactValue, Literal, NOT_APPLICABLE_SENTINEL};
