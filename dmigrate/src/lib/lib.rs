pub mod drive;
pub mod exec;
pub mod load;
pub mod migrate;
pub mod multi_parent;
pub mod oauth2;
pub mod reconcile;
pub mod run;
pub mod tree;

pub use crate::run::{run, Options, Summary};
