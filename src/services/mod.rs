//! Services layer - Business logic
//!
//! This module contains the services behind both HTTP surfaces:
//! - Session store (chat session lifecycle and expiry)
//! - Chat dispatcher and document uploader (generative AI backend)
//! - Email service (contract notifications over SMTP)

pub mod chat;
pub mod documents;
pub mod email;
pub mod gemini;
pub mod session_store;

pub use chat::{ChatDispatcher, ChatError};
pub use documents::DocumentUploader;
pub use email::{EmailContent, EmailError, EmailService, MailTransport, SmtpMailer};
pub use gemini::{BackendError, GeminiClient, GenerativeBackend};
pub use session_store::{SessionError, SessionStore};
