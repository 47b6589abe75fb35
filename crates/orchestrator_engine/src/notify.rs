use std::sync::mpsc;

use engine_logging::{engine_info, engine_warn};
use orchestrator_core::JobNotification;

/// Receives terminal job notifications from the dispatcher.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &JobNotification);
}

/// Default sink: writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, notification: &JobNotification) {
        match notification {
            JobNotification::Completed { job_id } => {
                engine_info!("analysis job {} completed", job_id)
            }
            JobNotification::Failed { job_id, kind } => {
                engine_warn!("analysis job {} failed: {}", job_id, kind)
            }
            JobNotification::Cancelled { job_id } => {
                engine_info!("analysis job {} cancelled", job_id)
            }
        }
    }
}

/// Forwards notifications into a channel; a dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    sender: mpsc::Sender<JobNotification>,
}

impl ChannelNotificationSink {
    pub fn new(sender: mpsc::Sender<JobNotification>) -> Self {
        Self { sender }
    }
}

impl NotificationSink for ChannelNotificationSink {
    fn notify(&self, notification: &JobNotification) {
        let _ = self.sender.send(notification.clone());
    }
}
