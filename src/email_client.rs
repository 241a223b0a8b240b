use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Serialize;

use crate::domain::EmailAddress;

/// A named result artifact included with the outbound mail.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

impl Attachment {
    /// Guess the content type from the file extension; anything unknown is
    /// shipped as raw bytes.
    pub fn new(
        name: String,
        content: Vec<u8>,
    ) -> Self {
        let content_type = match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("csv") => "text/csv",
            Some("png") => "image/png",
            Some("pdf") => "application/pdf",
            Some("txt") => "text/plain",
            Some("json") => "application/json",
            _ => "application/octet-stream",
        };
        Self {
            name,
            content,
            content_type: content_type.to_string(),
        }
    }
}

pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: EmailAddress,
    authorization_token: Secret<String>,
}

// establishing a HTTP connection is expensive; the single `Client` at the
// top level is cloned into handlers so connections get reused

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: EmailAddress,
        authorization_token: Secret<String>,
        timeout: Duration,
    ) -> Self {
        let http_client = Client::builder().timeout(timeout).build().unwrap();
        Self {
            http_client,
            base_url,
            sender,
            authorization_token,
        }
    }

    /// Send one message, awaited to completion (the caller decides what a
    /// failure means; for result mail it is logged and swallowed, for
    /// confirmation mail it is surfaced to the submitter).
    pub async fn send_email(
        &self,
        recipient: &EmailAddress,
        subject: &str,
        text_content: &str,
        attachments: &[Attachment],
    ) -> Result<(), reqwest::Error> {
        let url = format!("{}/email", self.base_url);
        let body = SendEmailRequest {
            from: self.sender.as_ref(),
            to: recipient.as_ref(),
            subject,
            text_body: text_content,
            attachments: attachments
                .iter()
                .map(|a| WireAttachment {
                    name: &a.name,
                    content: BASE64.encode(&a.content),
                    content_type: &a.content_type,
                })
                .collect(),
        };
        self.http_client
            .post(&url)
            .header(
                "X-Postmark-Server-Token",
                self.authorization_token.expose_secret(),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text_body: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<WireAttachment<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireAttachment<'a> {
    name: &'a str,
    /// base64 of the raw bytes
    content: String,
    content_type: &'a str,
}
