pub mod node;
pub mod tree;

pub use node::form_deposit_node;
pub use tree::{DepositTree, DEPOSIT_CONTRACT_TREE_DEPTH};
