pub mod rewrite;
pub mod timing;
