//! Gmail API provider implementation.
//!
//! This module provides a [`MailProvider`] implementation using the Gmail
//! REST API v1. Bearer tokens come from the auth module, which refreshes
//! them as needed; this client never touches refresh tokens itself.
//!
//! # API Usage
//!
//! - `users.messages.list` with `q=is:unread` for the unread queue
//! - `users.messages.get` (format=full) for complete messages
//! - `users.messages.attachments.get` for attachment bytes
//! - `users.messages.send` for forwards and report delivery
//! - `users.messages.modify` for read state, labels, and importance
//! - `users.labels.list` / `users.labels.create` for label management
//! - `users.getProfile` for the authenticated address

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{MailProvider, OutgoingEmail, Profile, ProviderError, Result};
use crate::auth::OAuthFlow;
use crate::domain::{Address, Attachment, AttachmentId, Email, EmailId, LabelId};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<MessageRef>>,
    #[allow(dead_code)]
    next_page_token: Option<String>,
    #[allow(dead_code)]
    result_size_estimate: Option<u32>,
}

/// Minimal message reference from list responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    #[allow(dead_code)]
    thread_id: Option<String>,
}

/// Gmail API message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    label_ids: Option<Vec<String>>,
    snippet: Option<String>,
    payload: Option<GmailMessagePayload>,
    internal_date: Option<String>,
}

/// Gmail message payload (headers and body parts).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessagePayload {
    headers: Option<Vec<GmailHeader>>,
    parts: Option<Vec<GmailPart>>,
    body: Option<GmailBody>,
    #[allow(dead_code)]
    mime_type: Option<String>,
}

/// Gmail message header.
#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

/// Gmail message part (for multipart messages).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPart>>,
    filename: Option<String>,
}

/// Gmail message body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailBody {
    data: Option<String>,
    size: Option<u64>,
    attachment_id: Option<String>,
}

/// Gmail attachment body response.
#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    data: Option<String>,
}

/// Gmail API label.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailLabel {
    id: String,
    name: String,
}

/// Gmail labels list response.
#[derive(Debug, Deserialize)]
struct LabelsListResponse {
    labels: Option<Vec<GmailLabel>>,
}

/// Gmail label creation request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelRequest {
    name: String,
    label_list_visibility: &'static str,
    message_list_visibility: &'static str,
}

/// Gmail modify request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_label_ids: Vec<String>,
}

/// Gmail profile response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    email_address: String,
}

#[derive(Serialize)]
struct SendRequest {
    raw: String,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

/// Gmail REST client.
///
/// # Example
///
/// ```ignore
/// use sift::providers::email::{GmailClient, MailProvider};
///
/// let client = GmailClient::new(flow);
/// let profile = client.profile().await?;
/// let unread = client.list_unread(10).await?;
/// ```
pub struct GmailClient {
    /// HTTP client for API requests.
    client: reqwest::Client,
    /// Auth flow supplying (and refreshing) bearer tokens.
    flow: Arc<OAuthFlow>,
    /// Label name -> id cache, filled lazily.
    label_cache: Mutex<std::collections::HashMap<String, String>>,
}

impl GmailClient {
    /// Creates a new Gmail client over an authorized flow.
    pub fn new(flow: Arc<OAuthFlow>) -> Self {
        Self {
            client: reqwest::Client::new(),
            flow,
            label_cache: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Builds authorization headers, refreshing the access token if needed.
    async fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self
            .flow
            .access_token()
            .await
            .map_err(|e| ProviderError::Authentication(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ProviderError::Internal(format!("invalid header: {}", e)))?,
        );
        Ok(headers)
    }

    /// Makes an authenticated GET request to the Gmail API.
    async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let headers = self.auth_headers().await?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Makes an authenticated POST request to the Gmail API.
    async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let mut headers = self.auth_headers().await?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Makes an authenticated POST request that ignores the response body.
    async fn post_no_response<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<()> {
        let url = format!("{}{}", GMAIL_API_BASE, endpoint);
        let mut headers = self.auth_headers().await?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(())
    }

    /// Handles API response, checking for errors.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse response: {}", e)))
    }

    /// Handles API error responses.
    async fn handle_error(&self, response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            400 => ProviderError::InvalidRequest(body),
            401 | 403 => ProviderError::Authentication(format!("unauthorized: {}", body)),
            404 => ProviderError::NotFound(body),
            429 => ProviderError::RateLimited {
                retry_after_secs: None,
            },
            _ => ProviderError::Internal(format!("API error ({}): {}", status, body)),
        }
    }

    /// Resolves a label name to its id, creating the label if missing.
    async fn ensure_label(&self, name: &str) -> Result<String> {
        {
            let cache = self.label_cache.lock().await;
            if let Some(id) = cache.get(name) {
                return Ok(id.clone());
            }
        }

        let response: LabelsListResponse = self.get("/labels").await?;
        let labels = response.labels.unwrap_or_default();

        let mut cache = self.label_cache.lock().await;
        for label in &labels {
            cache.insert(label.name.clone(), label.id.clone());
        }
        if let Some(id) = cache.get(name) {
            return Ok(id.clone());
        }

        let created: GmailLabel = self
            .post(
                "/labels",
                &CreateLabelRequest {
                    name: name.to_string(),
                    label_list_visibility: "labelShow",
                    message_list_visibility: "show",
                },
            )
            .await?;
        tracing::info!(label = %name, id = %created.id, "created Gmail label");
        cache.insert(created.name, created.id.clone());
        Ok(created.id)
    }

    /// Extracts the body text/html from a Gmail message payload.
    fn extract_body(payload: &GmailMessagePayload) -> (Option<String>, Option<String>) {
        let mut text = None;
        let mut html = None;

        // Check direct body
        if let Some(body) = &payload.body {
            if let Some(data) = &body.data {
                if let Ok(decoded) = BASE64_URL_SAFE_NO_PAD.decode(data) {
                    if let Ok(s) = String::from_utf8(decoded) {
                        text = Some(s);
                    }
                }
            }
        }

        // Check parts for multipart messages
        if let Some(parts) = &payload.parts {
            Self::extract_body_from_parts(parts, &mut text, &mut html);
        }

        (text, html)
    }

    /// Recursively extracts body from message parts.
    fn extract_body_from_parts(
        parts: &[GmailPart],
        text: &mut Option<String>,
        html: &mut Option<String>,
    ) {
        for part in parts {
            let mime = part.mime_type.as_deref().unwrap_or("");

            if mime == "text/plain" && text.is_none() {
                if let Some(body) = &part.body {
                    if let Some(data) = &body.data {
                        if let Ok(decoded) = BASE64_URL_SAFE_NO_PAD.decode(data) {
                            if let Ok(s) = String::from_utf8(decoded) {
                                *text = Some(s);
                            }
                        }
                    }
                }
            } else if mime == "text/html" && html.is_none() {
                if let Some(body) = &part.body {
                    if let Some(data) = &body.data {
                        if let Ok(decoded) = BASE64_URL_SAFE_NO_PAD.decode(data) {
                            if let Ok(s) = String::from_utf8(decoded) {
                                *html = Some(s);
                            }
                        }
                    }
                }
            }

            // Recurse into nested parts
            if let Some(nested) = &part.parts {
                Self::extract_body_from_parts(nested, text, html);
            }
        }
    }

    /// Collects attachment metadata from message parts.
    fn extract_attachments(parts: &[GmailPart], out: &mut Vec<Attachment>) {
        for part in parts {
            if let (Some(filename), Some(body)) = (&part.filename, &part.body) {
                if !filename.is_empty() {
                    if let Some(attachment_id) = &body.attachment_id {
                        out.push(Attachment {
                            id: AttachmentId::from(attachment_id.clone()),
                            filename: filename.clone(),
                            mime_type: part
                                .mime_type
                                .clone()
                                .unwrap_or_else(|| "application/octet-stream".to_string()),
                            size_bytes: body.size.unwrap_or(0),
                        });
                    }
                }
            }
            if let Some(nested) = &part.parts {
                Self::extract_attachments(nested, out);
            }
        }
    }

    /// Converts a Gmail message to the domain Email type.
    fn to_domain_email(msg: &GmailMessage) -> Email {
        let payload = msg.payload.as_ref();
        let headers = payload.and_then(|p| p.headers.as_ref());

        let get_header = |name: &str| -> Option<String> {
            headers.and_then(|h| {
                h.iter()
                    .find(|hdr| hdr.name.eq_ignore_ascii_case(name))
                    .map(|hdr| hdr.value.clone())
            })
        };

        let from = get_header("From")
            .map(|v| Address::parse(&v))
            .unwrap_or_else(|| Address::new("unknown@unknown.invalid"));

        let to = get_header("To")
            .map(|v| v.split(',').map(Address::parse).collect())
            .unwrap_or_default();

        let subject = get_header("Subject");

        let date = msg
            .internal_date
            .as_ref()
            .and_then(|d| d.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let label_strings = msg.label_ids.clone().unwrap_or_default();
        let is_read = !label_strings.iter().any(|l| l == "UNREAD");
        let labels: Vec<LabelId> = label_strings.into_iter().map(LabelId::from).collect();

        let (body_text, body_html) = payload.map(Self::extract_body).unwrap_or((None, None));

        let mut attachments = Vec::new();
        if let Some(parts) = payload.and_then(|p| p.parts.as_ref()) {
            Self::extract_attachments(parts, &mut attachments);
        }

        Email {
            id: EmailId::from(msg.id.clone()),
            subject,
            from,
            to,
            date,
            snippet: msg.snippet.clone().unwrap_or_default(),
            body_text,
            body_html,
            labels,
            attachments,
            is_read,
        }
    }

    /// Builds an RFC 5322 message for sending.
    ///
    /// The `from` address is the authenticated account; Gmail fills it in,
    /// but including the header keeps the message well-formed. Attachments
    /// turn the message into multipart/mixed with base64 parts.
    fn build_raw_message(email: &OutgoingEmail, from_address: &str) -> String {
        let mut message = String::new();

        message.push_str(&format!("From: {}\r\n", from_address));

        let to_addrs: Vec<String> = email.to.iter().map(|a| a.email.clone()).collect();
        message.push_str(&format!("To: {}\r\n", to_addrs.join(", ")));
        message.push_str(&format!("Subject: {}\r\n", email.subject));
        message.push_str("MIME-Version: 1.0\r\n");

        if email.attachments.is_empty() {
            message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
            message.push_str("\r\n");
            message.push_str(&email.body_text);
            return message;
        }

        let boundary = format!("sift_{}", uuid::Uuid::new_v4().simple());
        message.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
            boundary
        ));

        message.push_str(&format!("--{}\r\n", boundary));
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
        message.push_str(&email.body_text);
        message.push_str("\r\n");

        for attachment in &email.attachments {
            message.push_str(&format!("--{}\r\n", boundary));
            message.push_str(&format!(
                "Content-Type: {}; name=\"{}\"\r\n",
                attachment.content_type, attachment.filename
            ));
            message.push_str("Content-Transfer-Encoding: base64\r\n");
            message.push_str(&format!(
                "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
                attachment.filename
            ));
            // Wrap base64 at 76 columns per RFC 2045
            let encoded = BASE64_STANDARD.encode(&attachment.data);
            for chunk in encoded.as_bytes().chunks(76) {
                message.push_str(std::str::from_utf8(chunk).unwrap_or_default());
                message.push_str("\r\n");
            }
        }
        message.push_str(&format!("--{}--\r\n", boundary));

        message
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn profile(&self) -> Result<Profile> {
        let response: ProfileResponse = self.get("/profile").await?;
        Ok(Profile {
            email_address: response.email_address,
        })
    }

    async fn list_unread(&self, max: u32) -> Result<Vec<EmailId>> {
        let endpoint = format!("/messages?q=is%3Aunread&maxResults={}", max);
        let response: MessageListResponse = self.get(&endpoint).await?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| EmailId::from(m.id))
            .collect())
    }

    async fn fetch(&self, id: &EmailId) -> Result<Email> {
        let endpoint = format!("/messages/{}?format=full", id);
        let msg: GmailMessage = self.get(&endpoint).await?;
        Ok(Self::to_domain_email(&msg))
    }

    async fn download_attachment(
        &self,
        email_id: &EmailId,
        attachment_id: &AttachmentId,
    ) -> Result<Vec<u8>> {
        let endpoint = format!("/messages/{}/attachments/{}", email_id, attachment_id);
        let response: AttachmentResponse = self.get(&endpoint).await?;

        let data = response
            .data
            .ok_or_else(|| ProviderError::NotFound(format!("attachment {}", attachment_id)))?;
        BASE64_URL_SAFE_NO_PAD
            .decode(&data)
            .map_err(|e| ProviderError::Internal(format!("attachment decode: {}", e)))
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<EmailId> {
        let profile = self.profile().await?;
        let raw_message = Self::build_raw_message(email, &profile.email_address);
        let encoded = BASE64_URL_SAFE_NO_PAD.encode(raw_message.as_bytes());

        let response: SendResponse = self
            .post("/messages/send", &SendRequest { raw: encoded })
            .await?;

        tracing::info!(message_id = %response.id, "email sent via Gmail API");
        Ok(EmailId::from(response.id))
    }

    async fn mark_read(&self, id: &EmailId) -> Result<()> {
        let endpoint = format!("/messages/{}/modify", id);
        let body = ModifyRequest {
            add_label_ids: vec![],
            remove_label_ids: vec!["UNREAD".to_string()],
        };
        self.post_no_response(&endpoint, &body).await
    }

    async fn add_label(&self, id: &EmailId, name: &str) -> Result<()> {
        let label_id = self.ensure_label(name).await?;
        let endpoint = format!("/messages/{}/modify", id);
        let body = ModifyRequest {
            add_label_ids: vec![label_id],
            remove_label_ids: vec![],
        };
        self.post_no_response(&endpoint, &body).await
    }

    async fn mark_important(&self, id: &EmailId) -> Result<()> {
        let endpoint = format!("/messages/{}/modify", id);
        let body = ModifyRequest {
            add_label_ids: vec!["IMPORTANT".to_string()],
            remove_label_ids: vec![],
        };
        self.post_no_response(&endpoint, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;

    fn message_json() -> &'static str {
        // Captured shape of users.messages.get with a text part and a PDF
        // attachment. Body data is URL-safe base64 of "invoice attached".
        r#"{
            "id": "18c2f0a9b3d4e5f6",
            "threadId": "18c2f0a9b3d4e5f6",
            "labelIds": ["UNREAD", "INBOX"],
            "snippet": "invoice attached",
            "internalDate": "1714400000000",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "From", "value": "Billing <billing@vendor.example>"},
                    {"name": "To", "value": "me@example.com"},
                    {"name": "Subject", "value": "Invoice INV-1"}
                ],
                "parts": [
                    {
                        "mimeType": "text/plain",
                        "body": {"data": "aW52b2ljZSBhdHRhY2hlZA", "size": 16}
                    },
                    {
                        "mimeType": "application/pdf",
                        "filename": "INV-1.pdf",
                        "body": {"attachmentId": "ANGjdJ8w", "size": 4096}
                    }
                ]
            }
        }"#
    }

    #[test]
    fn parse_full_message() {
        let msg: GmailMessage = serde_json::from_str(message_json()).unwrap();
        let email = GmailClient::to_domain_email(&msg);

        assert_eq!(email.id, EmailId::from("18c2f0a9b3d4e5f6"));
        assert_eq!(email.subject.as_deref(), Some("Invoice INV-1"));
        assert_eq!(email.from.email, "billing@vendor.example");
        assert_eq!(email.from.name.as_deref(), Some("Billing"));
        assert_eq!(email.body_text.as_deref(), Some("invoice attached"));
        assert!(!email.is_read);
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].filename, "INV-1.pdf");
        assert_eq!(email.attachments[0].size_bytes, 4096);
    }

    #[test]
    fn parse_nested_multipart_body() {
        let json = r#"{
            "id": "m1",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [{"name": "From", "value": "a@example.com"}],
                "parts": [{
                    "mimeType": "multipart/related",
                    "parts": [
                        {"mimeType": "text/html", "body": {"data": "PGI-aGk8L2I-"}},
                        {"mimeType": "text/plain", "body": {"data": "aGk"}}
                    ]
                }]
            }
        }"#;
        let msg: GmailMessage = serde_json::from_str(json).unwrap();
        let email = GmailClient::to_domain_email(&msg);
        assert_eq!(email.body_text.as_deref(), Some("hi"));
        assert_eq!(email.body_html.as_deref(), Some("<b>hi</b>"));
    }

    #[test]
    fn missing_headers_get_placeholders() {
        let msg: GmailMessage = serde_json::from_str(r#"{"id": "m2", "payload": {}}"#).unwrap();
        let email = GmailClient::to_domain_email(&msg);
        assert_eq!(email.from.email, "unknown@unknown.invalid");
        assert!(email.subject.is_none());
        assert!(email.attachments.is_empty());
    }

    #[test]
    fn raw_message_plain() {
        let email = OutgoingEmail::plain("dest@example.com", "Fwd: hi", "body text");
        let raw = GmailClient::build_raw_message(&email, "me@example.com");

        assert!(raw.starts_with("From: me@example.com\r\n"));
        assert!(raw.contains("To: dest@example.com\r\n"));
        assert!(raw.contains("Subject: Fwd: hi\r\n"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.ends_with("body text"));
    }

    #[test]
    fn raw_message_with_attachment_is_multipart() {
        let email = OutgoingEmail {
            to: vec![Address::new("dest@example.com")],
            subject: "Fwd: invoice".to_string(),
            body_text: "see attached".to_string(),
            attachments: vec![super::super::OutgoingAttachment {
                filename: "inv.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                data: b"%PDF-1.4".to_vec(),
            }],
        };
        let raw = GmailClient::build_raw_message(&email, "me@example.com");

        assert!(raw.contains("multipart/mixed; boundary="));
        assert!(raw.contains("Content-Disposition: attachment; filename=\"inv.pdf\""));
        assert!(raw.contains(&BASE64_STANDARD.encode(b"%PDF-1.4")));
        // Closing boundary present
        let boundary = raw
            .split("boundary=\"")
            .nth(1)
            .and_then(|s| s.split('"').next())
            .unwrap();
        assert!(raw.contains(&format!("--{}--", boundary)));
    }

    #[test]
    fn label_list_parsing() {
        let json = r#"{"labels": [
            {"id": "Label_1", "name": "invoices", "type": "user"},
            {"id": "INBOX", "name": "INBOX", "type": "system"}
        ]}"#;
        let response: LabelsListResponse = serde_json::from_str(json).unwrap();
        let labels = response.labels.unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].id, "Label_1");
    }

    #[test]
    fn modify_request_skips_empty_lists() {
        let body = ModifyRequest {
            add_label_ids: vec![],
            remove_label_ids: vec!["UNREAD".to_string()],
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"removeLabelIds":["UNREAD"]}"#);
    }
}
