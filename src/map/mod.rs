//! Static index machinery: ownership map, external index set, dependent-node
//! table and Dirichlet boundary-condition records.
//!
//! Everything in this module is immutable once shared with a vector; the
//! structures are built up front (collectively where noted) and then held by
//! `Arc` for the lifetime of every vector that references them.

pub mod bc;
pub mod dep_nodes;
pub mod index_set;
pub mod var_map;

pub use bc::BcMap;
pub use dep_nodes::DepNodes;
pub use index_set::IndexSet;
pub use var_map::VarMap;
