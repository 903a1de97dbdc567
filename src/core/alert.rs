//! User-facing notifications

pub const PRICE_ALERT_TITLE: &str = "Error";
pub const PRICE_ALERT_MESSAGE: &str = "Error loading current prices";

pub trait AlertSink: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}
