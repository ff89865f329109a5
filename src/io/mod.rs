//! Response-body rewriting: the buffering filter, the injected fragment and
//! the stream helpers it is built on.

pub mod copy;
pub mod fragment;
pub mod meta;
pub mod rewrite;

pub use copy::{copy_stream, copy_stream_with};
pub use meta::ResponseMeta;
pub use rewrite::RewriteFilter;
