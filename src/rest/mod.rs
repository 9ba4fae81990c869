//! Generic record endpoints over document collections.
//!
//! A [`Document`] type describes the shape stored in a collection; the
//! [`RecordEndpointMaker`] binds a collection name and a shape to the six
//! REST handlers (get, list, create, update, remove, search).

pub mod endpoint;

use serde::{de::DeserializeOwned, Serialize};

use crate::database::object_id::ObjectId;

pub use crate::error::ErrorResponse;
pub use endpoint::RecordEndpointMaker;

/// Message returned when a document fails its validity check
pub const REQUIRED_FIELDS_MISSING: &str = "Required fields missing";

/// Shape of the documents stored in one collection
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// JSON field carrying the identifier; ignored in update bodies
    const ID_FIELD: &'static str = "id";

    fn doc_id(&self) -> Option<ObjectId>;

    fn assign_id(&mut self, id: ObjectId);

    /// Whether the document carries everything required to be stored
    fn is_valid(&self) -> bool;

    /// Prepare a freshly decoded document for insertion
    fn build_for_insertion(&mut self) {
        self.assign_id(ObjectId::new());
    }
}

/// Join `/prefix/endpoint/more...`, skipping empty segments
pub fn make_path(prefix: &str, endpoint: &str, more: &[&str]) -> String {
    let mut path = String::new();
    for segment in [prefix, endpoint].into_iter().chain(more.iter().copied()) {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        path.push('/');
        path.push_str(segment);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}
