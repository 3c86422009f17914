//! Service clients for the dispatch pipeline
//!
//! Content generation and SMTP delivery sit behind traits so the worker can
//! be driven by scripted implementations in tests.

pub mod generator;
pub mod mailer;

pub use generator::{ContentGenerator, GenerationError, GroqClient};
pub use mailer::{DeliveryError, MessageDeliverer, SmtpMailer, TlsMode};
