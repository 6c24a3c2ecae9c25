//! Answers asset requests under the reserved prefix.
//!
//! Three responders share one contract: normalize the request path, resolve
//! it with [`crate::models::Resolver`] against a consistent snapshot, and
//! reply with the blob or a plain-text 404. None of them ever falls back to
//! serving a generic document for a reserved path.

mod in_process;
mod path;
mod response;
mod static_files;
mod worker;

use bytes::Bytes;

use crate::models::MatchTier;

pub use in_process::{AssetFetcher, FetchedResponse, HttpFetcher, InterceptingFetcher};
pub use path::{is_reserved, normalize, normalize_prefix, DEFAULT_PREFIX};
pub use response::{answer, AssetResponse, Resolved, TEXT_CONTENT_TYPE};
pub use static_files::static_router;
pub use worker::{worker_router, WorkerHandle, WorkerState};

/// A blob picked by the resolver together with how it was matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub name: String,
    pub tier: MatchTier,
    pub content_type: String,
    pub body: Bytes,
}

/// Something a responder can resolve requests against.
pub trait AssetLookup: Send + Sync {
    /// Resolves `relative` against a single consistent snapshot.
    fn locate(&self, relative: &str) -> Option<Located>;
}
