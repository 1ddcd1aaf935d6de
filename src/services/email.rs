//! Email service for contract notifications
//!
//! Renders the signature-request and signed-successfully emails from the
//! embedded tera templates and hands them to a [`MailTransport`].

use async_trait::async_trait;
use chrono::Datelike;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest::Url;
use std::sync::Arc;
use tera::{Context, Tera};

use crate::config::SmtpConfig;

const BASE_TEMPLATE: &str = include_str!("../../templates/email/base.html");
const SIGN_REQUEST_TEMPLATE: &str = include_str!("../../templates/email/sign_request.html");
const SUCCESS_TEMPLATE: &str = include_str!("../../templates/email/success.html");

const BRAND: &str = "Contract Lock";
const ACCENT: &str = "#1C01FE";
const LOGO_URL: &str = "https://i.ibb.co/3Lb99Mr/blue.png";
const SUPPORT_EMAIL: &str = "support@contractlock.com";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),

    #[error("Failed to render email: {0}")]
    Template(#[from] tera::Error),

    #[error("Failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("Failed to send email: {0}")]
    Transport(String),
}

/// Rendered email, ready to be wrapped in a message
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub subject: String,
    pub plain: String,
    pub html: String,
}

/// Something that can deliver a built message
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), EmailError>;
}

/// SMTP delivery over STARTTLS
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let creds = Credentials::new(config.login.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
            .map_err(|e| EmailError::Transport(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(creds)
            .port(config.port)
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: Message) -> Result<(), EmailError> {
        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Email service for sending contract notifications
pub struct EmailService {
    transport: Arc<dyn MailTransport>,
    from: Mailbox,
}

impl EmailService {
    pub fn new(config: &SmtpConfig, transport: Arc<dyn MailTransport>) -> Result<Self, EmailError> {
        let address: Address = config.from_email.parse()?;
        let name = (!config.from_name.is_empty()).then(|| config.from_name.clone());

        Ok(Self {
            transport,
            from: Mailbox::new(name, address),
        })
    }

    /// Ask `to` to review and sign the contract at `contract_link`
    pub async fn send_sign_request(&self, to: &Address, contract_link: &Url) -> Result<(), EmailError> {
        let content = render_sign_request(contract_link)?;
        self.deliver(to, content).await?;
        tracing::info!(to = %to, "signature request email sent");
        Ok(())
    }

    /// Tell `to` the contract was signed, linking the NFT proof when there is one
    pub async fn send_success(
        &self,
        to: &Address,
        contract_link: &Url,
        nft_link: Option<&Url>,
    ) -> Result<(), EmailError> {
        let content = render_success(contract_link, nft_link)?;
        self.deliver(to, content).await?;
        tracing::info!(to = %to, "success email sent");
        Ok(())
    }

    pub fn build_message(&self, to: &Address, content: EmailContent) -> Result<Message, EmailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(None, to.clone()))
            .subject(content.subject)
            .multipart(MultiPart::alternative_plain_html(content.plain, content.html))?;
        Ok(message)
    }

    async fn deliver(&self, to: &Address, content: EmailContent) -> Result<(), EmailError> {
        let message = self.build_message(to, content)?;
        self.transport.send(message).await
    }
}

pub fn render_sign_request(contract_link: &Url) -> Result<EmailContent, EmailError> {
    let mut context = base_context();
    context.insert("contract_link", contract_link.as_str());

    Ok(EmailContent {
        subject: format!("Contract Awaiting Your Signature – {}", BRAND),
        plain: format!("Please sign your contract: {}", contract_link),
        html: templates()?.render("sign_request.html", &context)?,
    })
}

pub fn render_success(contract_link: &Url, nft_link: Option<&Url>) -> Result<EmailContent, EmailError> {
    let mut context = base_context();
    context.insert("contract_link", contract_link.as_str());
    context.insert("nft_link", &nft_link.map(Url::as_str));

    let mut plain = format!("Contract signed successfully. Contract: {}", contract_link);
    if let Some(nft) = nft_link {
        plain.push_str(&format!(" | NFT: {}", nft));
    }

    Ok(EmailContent {
        subject: format!("Contract Signed Successfully – {}", BRAND),
        plain,
        html: templates()?.render("success.html", &context)?,
    })
}

/// Links are inserted unescaped; they are parsed URLs, which percent-encode
/// quotes and angle brackets.
fn templates() -> Result<Tera, EmailError> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.add_raw_templates(vec![
        ("base.html", BASE_TEMPLATE),
        ("sign_request.html", SIGN_REQUEST_TEMPLATE),
        ("success.html", SUCCESS_TEMPLATE),
    ])?;
    Ok(tera)
}

fn base_context() -> Context {
    let mut context = Context::new();
    context.insert("brand", BRAND);
    context.insert("accent", ACCENT);
    context.insert("logo_url", LOGO_URL);
    context.insert("support_email", SUPPORT_EMAIL);
    context.insert("year", &chrono::Utc::now().year());
    context
}
