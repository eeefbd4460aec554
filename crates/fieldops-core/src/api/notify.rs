use tracing::warn;

/// Fire-and-forget "tell the user" hook for failed requests.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Default notifier: the message only goes to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(message, "Request failed");
    }
}
