//! Menu node and content models.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of media attached to a menu node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image,
    Video,
    Document,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Image => "image",
            ContentType::Video => "video",
            ContentType::Document => "document",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "image" => Some(ContentType::Image),
            "video" => Some(ContentType::Video),
            "document" => Some(ContentType::Document),
            _ => None,
        }
    }

    /// Human label for the button that opens this content.
    pub fn label(&self) -> &'static str {
        match self {
            ContentType::Image => "Image",
            ContentType::Video => "Video",
            ContentType::Document => "Document",
        }
    }
}

/// A media/document attachment owned by exactly one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: Uuid,
    pub menu_id: Uuid,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// URL or local blob reference
    pub server_path: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One entry of the menu hierarchy, with its content and the names of its direct children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MenuNode {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default)]
    pub children_names: Vec<String>,
}

impl MenuNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A node carrying its nested children instead of only their names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FullMenuNode {
    #[serde(flatten)]
    pub node: MenuNode,
    pub children: Vec<FullMenuNode>,
}

impl FullMenuNode {
    /// Number of nodes in this subtree, itself included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(FullMenuNode::len).sum::<usize>()
    }

    /// Ids of every node in this subtree, depth first.
    #[cfg(test)]
    pub fn ids(&self) -> Vec<Uuid> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack = vec![self];
        while let Some(current) = stack.pop() {
            out.push(current.node.id);
            stack.extend(current.children.iter().rev());
        }
        out
    }
}

/// Request body for creating a new menu node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMenuNodeRequest {
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub subscription_type: Option<String>,
}

/// Request body for updating an existing menu node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMenuNodeRequest {
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub subscription_type: Option<String>,
}

/// Request body for attaching or replacing content.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub server_path: String,
}

/// Local blob references live under this prefix.
pub const LOCAL_CONTENT_PREFIX: &str = "uploaded_content/";

impl ContentRequest {
    pub fn validate(&self) -> Result<(), crate::errors::AppError> {
        let path = self.server_path.trim();
        if path.is_empty() {
            return Err(crate::errors::AppError::Validation(
                "Content path is required".to_string(),
            ));
        }
        if !(is_url(path) || path.starts_with(LOCAL_CONTENT_PREFIX)) {
            return Err(crate::errors::AppError::Validation(format!(
                "Content path must be an http(s) URL or start with {}",
                LOCAL_CONTENT_PREFIX
            )));
        }
        Ok(())
    }
}

pub fn is_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}
