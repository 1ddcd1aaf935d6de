//! Document uploader
//!
//! Hands a local file to the generative backend and records the returned
//! URI against the session.

use std::path::Path;
use std::sync::Arc;

use crate::services::chat::ChatError;
use crate::services::gemini::GenerativeBackend;
use crate::services::session_store::SessionStore;

pub struct DocumentUploader {
    store: Arc<SessionStore>,
    backend: Arc<dyn GenerativeBackend>,
}

impl DocumentUploader {
    pub fn new(store: Arc<SessionStore>, backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { store, backend }
    }

    /// Upload `path` for `session_id` and return the document URI
    pub async fn upload(
        &self,
        session_id: &str,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<String, ChatError> {
        // Fail before spending an upload on a dead session
        self.store.get(session_id).await?;

        let uri = self
            .backend
            .upload_file(path, display_name, mime_type)
            .await
            .map_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "document upload failed");
                e
            })?;

        self.store.set_document_uri(session_id, uri.clone()).await?;
        self.store.touch(session_id).await?;
        Ok(uri)
    }
}
