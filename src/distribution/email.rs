//! SMTP delivery with the video attached.

use super::{Channel, VideoMetadata};
use crate::config::EmailSettings;
use crate::error::{PosterError, Result};
use crate::video::ComposedVideo;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

/// Email channel using an application password.
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    receiver: Mailbox,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PosterError::Config(format!("email.{} is not set", name)))
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| PosterError::Config(format!("Invalid email address '{}': {}", address, e)))
}

impl EmailChannel {
    pub fn new(settings: &EmailSettings) -> Result<Self> {
        let sender = required(&settings.sender, "sender")?;
        let receiver = required(&settings.receiver, "receiver")?;
        let password = required(&settings.app_password, "app_password")?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
            .map_err(|e| PosterError::Config(format!("Invalid SMTP host: {}", e)))?
            .credentials(Credentials::new(sender.to_string(), password.to_string()))
            .build();

        Ok(Self {
            transport,
            sender: mailbox(sender)?,
            receiver: mailbox(receiver)?,
        })
    }

    fn build_message(&self, file_name: &str, video: Vec<u8>, metadata: &VideoMetadata) -> Result<Message> {
        let content_type = ContentType::parse("video/mp4")
            .map_err(|e| PosterError::Distribution(e.to_string()))?;

        Message::builder()
            .from(self.sender.clone())
            .to(self.receiver.clone())
            .subject(metadata.email_subject())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(metadata.email_body()))
                    .singlepart(Attachment::new(file_name.to_string()).body(video, content_type)),
            )
            .map_err(|e| PosterError::Distribution(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl Channel for EmailChannel {
    #[instrument(skip(self, video, metadata), fields(to = %self.receiver))]
    async fn deliver(&self, video: &ComposedVideo, metadata: &VideoMetadata) -> Result<Option<String>> {
        let bytes = tokio::fs::read(&video.path).await?;
        let file_name = video
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4");

        let message = self.build_message(file_name, bytes, metadata)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| PosterError::Distribution(format!("SMTP send failed: {}", e)))?;

        info!("Email sent to {}", self.receiver);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EmailSettings {
        EmailSettings {
            sender: Some("bot@example.com".to_string()),
            receiver: Some("me@example.com".to_string()),
            app_password: Some("abcd efgh".to_string()),
            ..EmailSettings::default()
        }
    }

    #[tokio::test]
    async fn test_message_has_subject_and_attachment() {
        let channel = EmailChannel::new(&settings()).unwrap();
        let metadata = VideoMetadata {
            subject: "Mazda Miata".to_string(),
            concept: "Lightweight joy".to_string(),
            caption: String::new(),
        };

        let message = channel
            .build_message("001_Mazda_Miata.mp4", b"fake video".to_vec(), &metadata)
            .unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(raw.contains("Subject: PosterBot Video: Lightweight joy"));
        assert!(raw.contains("video/mp4"));
        assert!(raw.contains("001_Mazda_Miata.mp4"));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut incomplete = settings();
        incomplete.app_password = None;
        let err = EmailChannel::new(&incomplete).err().unwrap();
        assert!(err.is_configuration());
    }
}
