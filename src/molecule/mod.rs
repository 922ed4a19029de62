//! Molecule engine: step-graph parsing, template expansion, and bonding.
//!
//! A molecule is a named, parameterized step graph. Bonding instantiates it
//! under a parent issue; the Christmas-ornament pattern bonds children
//! dynamically at runtime and gates an aggregate step on `WaitsFor:
//! all-children`.

pub mod bond;
pub mod catalog;
pub mod parser;
pub mod template;

pub use bond::{bond, extract_step_ref, Bond};
pub use catalog::{builtin_molecules, find_molecule, BuiltinMolecule};
pub use parser::{
    parse_molecule_steps, serialize_step, serialize_steps, MoleculeStep, WAITS_ALL_CHILDREN,
    WAITS_EXTERNAL_SIGNAL, WAITS_TIMEOUT,
};
pub use template::{expand_vars, unresolved_vars};
