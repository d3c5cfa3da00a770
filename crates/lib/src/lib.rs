//! rulegraph-lib: rule graph construction and incremental execution.
//!
//! - `TargetId` / `SourcePath`: what a rule is called and what it reads
//! - `TargetGraph` → `RuleGraph`: descriptions resolve target nodes into rules
//! - `traversal`: filtered dependency closures over the rule graph
//! - `capability`: optional rule views consumed by packaging and linking
//! - `RuleKey` + `ArtifactCache` + `BuildEngine`: build each rule at most once

pub mod cache;
pub mod capability;
pub mod config;
pub mod consts;
pub mod description;
pub mod execute;
pub mod graph;
pub mod layout;
pub mod packaging;
pub mod resolve;
pub mod rulekey;
pub mod rules;
pub mod source;
pub mod target;
pub mod traversal;
pub mod util;

pub use cache::{ArtifactCache, BuildOutput, DirArtifactCache, InMemoryArtifactCache};
pub use config::EngineConfig;
pub use description::DescriptionRegistry;
pub use execute::{BuildEngine, BuildReport, ShellStepExecutor};
pub use graph::{RuleGraph, RuleGraphBuilder};
pub use resolve::{TargetGraph, resolve_target_graph, resolve_target_graph_parallel};
pub use rulekey::{RuleKey, RuleKeyFactory};
pub use rules::Rule;
pub use source::SourcePath;
pub use target::TargetId;
