use serde::{Deserialize, Serialize};

use crate::database::object_id::ObjectId;
use crate::rest::Document;

/// A project record, stored in the `projects` collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub category: String,
    pub description: String,
}

impl Project {
    pub fn new(name: impl Into<String>, category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            category: category.into(),
            description: description.into(),
        }
    }
}

impl Document for Project {
    fn doc_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn assign_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    /// Name, category and description are all required
    fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.category.is_empty() && !self.description.is_empty()
    }
}
