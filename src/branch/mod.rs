pub mod manager;

pub use manager::{BranchManager, generate_branch_name};
