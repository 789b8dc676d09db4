pub mod dto;

use std::env;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::AppError;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub api_key: String,
    pub from_address: String,
}

impl EmailConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let api_key = env::var("RESEND_API_KEY")
            .map_err(|_| AppError::BadRequest("RESEND_API_KEY is not set".to_string()))?;
        let from_address = env::var("EMAIL_FROM")
            .unwrap_or_else(|_| "Tutorrito <no-reply@tutorrito.app>".to_string());

        Ok(Self {
            api_key,
            from_address,
        })
    }
}

#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError>;
}

pub struct ResendHttpClient {
    client: Client,
    config: EmailConfig,
}

impl ResendHttpClient {
    pub fn new(config: EmailConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::BadRequest(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmailClient for ResendHttpClient {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        let request_body = dto::SendEmailRequest {
            from: self.config.from_address.clone(),
            to: vec![to.to_string()],
            subject: subject.to_string(),
            html: html.to_string(),
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|_| AppError::InternalServerError)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::BadRequest(format!(
                "Resend API error {}: {}",
                status, body
            )));
        }

        let parsed: dto::SendEmailResponse = response
            .json()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to parse Resend response: {}", e)))?;
        tracing::debug!("email accepted by Resend: {}", parsed.id);

        Ok(())
    }
}

/// Discards every email. Used in tests and in deployments without an API key.
pub struct NoopEmailClient;

#[async_trait]
impl EmailClient for NoopEmailClient {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), AppError> {
        tracing::debug!("noop email client: dropping '{}' to {}", subject, to);
        Ok(())
    }
}
