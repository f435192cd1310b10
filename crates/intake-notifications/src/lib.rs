pub mod error;
pub mod sms;
pub mod webhook;

pub use error::{NotificationError, SmsError};
pub use sms::{
    DEFAULT_CLINIC_NAME, HttpSmsTransport, SmsChannel, SmsGate, SmsReceipt, SmsSettings,
    SmsStatus, SmsTransport, format_phone_number, intake_link_message, is_opt_out, mask_phone,
    reminder_message,
};
pub use webhook::{DEFAULT_WEBHOOK_TIMEOUT, SIGNATURE_HEADER, WebhookDispatcher, WebhookTarget};
