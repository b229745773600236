use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crm_core::{ApplicationId, CommentId, DomainError, DomainResult, UserId};

pub const MAX_COMMENT_LEN: usize = 1000;

/// Staff note attached to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub application_id: ApplicationId,
    pub text: String,
    pub author: UserId,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(application_id: ApplicationId, text: String, author: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CommentId::new(),
            application_id,
            text,
            author,
            created_at: now,
        }
    }
}

/// Body of `PATCH /applications/addcomm/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub text: String,
}

impl NewComment {
    /// Trimmed comment text, 1..=1000 characters.
    pub fn validate(self) -> DomainResult<String> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(DomainError::validation("comment text is required"));
        }
        if text.chars().count() > MAX_COMMENT_LEN {
            return Err(DomainError::validation(format!(
                "comment text must be at most {MAX_COMMENT_LEN} characters"
            )));
        }
        Ok(text.to_string())
    }
}
