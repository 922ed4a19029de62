//! Issue-store contract, issue types, and bead-ID utilities.

pub mod ids;
pub mod memory;
pub mod store;

pub use ids::{extract_bead_id_from_json, new_issue_id, PrefixMap};
pub use memory::MemoryStore;
pub use store::{
    CreateOptions, DepEdge, DepKind, Issue, IssueStatus, IssueStore, IssueType, ListQuery,
};
