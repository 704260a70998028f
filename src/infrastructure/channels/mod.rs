//! Channel adapters.
//!
//! - [`LogChannel`] writes notices to the `tracing` pipeline.
//! - [`WebhookChannel`] posts markdown messages to a chat robot webhook.
//! - [`WorkWxChannel`] posts quoted markdown to a WeChat Work group robot.
//! - [`MailChannel`] hands messages to a mail transport.
//!
//! The network-facing channels take their transport as a collaborator so the
//! host application chooses the HTTP or SMTP client.

pub mod log;
pub mod mail;
pub mod webhook;
pub mod work_wx;

pub use self::log::LogChannel;
pub use mail::{MailChannel, MailMessage, MailSettings, MailTransport};
pub use webhook::{WebhookChannel, WebhookSettings, WebhookTransport};
pub use work_wx::WorkWxChannel;
