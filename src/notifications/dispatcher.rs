//! Bounded notice queue and its mail worker

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::{EmailMessage, Mailer};
use crate::bins::ThresholdCrossed;
use crate::collection::TaskAssigned;
use crate::store::{Store, StoreError};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Event worth telling someone about
#[derive(Debug, Clone)]
pub enum Notice {
    ThresholdCrossed(ThresholdCrossed),
    TaskAssigned(TaskAssigned),
}

/// Fire-and-forget handle onto the notification queue
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Option<mpsc::Sender<Notice>>,
}

impl NotificationDispatcher {
    /// Dispatcher that discards every notice
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Start the mail worker. It stops once every dispatcher clone is dropped
    /// and the queue has drained.
    pub fn spawn(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run(receiver, store, mailer));
        (
            Self {
                sender: Some(sender),
            },
            handle,
        )
    }

    pub fn on_threshold_crossed(&self, event: ThresholdCrossed) {
        self.enqueue(Notice::ThresholdCrossed(event));
    }

    pub fn on_task_assigned(&self, event: TaskAssigned) {
        self.enqueue(Notice::TaskAssigned(event));
    }

    fn enqueue(&self, notice: Notice) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(notice) {
            Ok(()) => {}
            Err(TrySendError::Full(notice)) => {
                tracing::warn!(?notice, "Notification queue full, dropping notice");
            }
            Err(TrySendError::Closed(notice)) => {
                tracing::warn!(?notice, "Notification worker stopped, dropping notice");
            }
        }
    }
}

async fn run(mut receiver: mpsc::Receiver<Notice>, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) {
    tracing::info!("Notification worker started");
    while let Some(notice) = receiver.recv().await {
        let messages = match compose(store.as_ref(), &notice).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!(?notice, error = %e, "Could not resolve notification recipients");
                continue;
            }
        };
        for message in messages {
            if let Err(e) = mailer.send(&message).await {
                tracing::error!(
                    to = %message.to,
                    subject = %message.subject,
                    error = %e,
                    "Failed to send notification"
                );
            }
        }
    }
    tracing::info!("Notification worker stopped");
}

/// Build the emails for a notice, skipping recipients that cannot be found
async fn compose(store: &dyn Store, notice: &Notice) -> Result<Vec<EmailMessage>, StoreError> {
    let mut messages = Vec::new();
    match notice {
        Notice::ThresholdCrossed(event) => {
            if let Some(customer_id) = event.customer_id {
                if let Some(customer) = store.user(customer_id).await? {
                    messages.push(EmailMessage::new(
                        customer.email,
                        "Smart Bin Alert - Collection Needed",
                        format!(
                            "Your smart bin {} is {}% full. Collection will be scheduled soon.",
                            event.bin_id, event.fill_percentage
                        ),
                    ));
                }
            }
            if let Some(municipality) = store.municipality(event.municipality_id).await? {
                messages.push(EmailMessage::new(
                    municipality.email,
                    "Smart Bin Alert - Collection Required",
                    format!(
                        "Smart bin {} at {} is {}% full and needs collection.",
                        event.bin_id, event.location, event.fill_percentage
                    ),
                ));
            }
        }
        Notice::TaskAssigned(event) => {
            let date = event.scheduled_date.format(DATE_FORMAT);
            if let Some(customer) = store.user(event.customer_id).await? {
                messages.push(EmailMessage::new(
                    customer.email,
                    "Waste Collection Scheduled",
                    format!("Waste collection scheduled for {}.", date),
                ));
            }
            if let Some(agent) = store.user(event.agent_id).await? {
                let body = match &event.bin_id {
                    Some(bin_id) => {
                        format!("New collection task assigned. Bin: {}, Date: {}", bin_id, date)
                    }
                    None => format!("New recycling pickup assigned. Date: {}", date),
                };
                messages.push(EmailMessage::new(agent.email, "New Collection Task", body));
            }
        }
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::BinStatus;
    use crate::models::{Municipality, User, UserRole};
    use crate::notifications::NotifyError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _message: &EmailMessage) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected(503))
        }
    }

    fn user(email: &str, role: UserRole, municipality_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: None,
            role,
            municipality_id,
            is_approved: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn seeded() -> (Arc<MemoryStore>, User, Municipality) {
        let store = Arc::new(MemoryStore::new());
        let municipality_id = Uuid::new_v4();
        let admin = user("admin@city.test", UserRole::Municipality, Some(municipality_id));
        let municipality = Municipality {
            id: municipality_id,
            name: "City".to_string(),
            email: "ops@city.test".to_string(),
            admin_user_id: admin.id,
            created_at: Utc::now(),
        };
        let customer = user("jane@home.test", UserRole::Customer, None);
        store.insert_user(admin).await;
        store.insert_user(customer.clone()).await;
        store.insert_municipality(municipality.clone()).await;
        (store, customer, municipality)
    }

    fn crossed(customer: &User, municipality: &Municipality) -> ThresholdCrossed {
        ThresholdCrossed {
            bin_id: "BIN001".to_string(),
            municipality_id: municipality.id,
            customer_id: Some(customer.id),
            location: "12 Main St".to_string(),
            fill_percentage: 92,
            previous_status: BinStatus::Full,
            status: BinStatus::Overflow,
        }
    }

    #[tokio::test]
    async fn test_threshold_alerts_customer_and_municipality() {
        let (store, customer, municipality) = seeded().await;
        let mailer = Arc::new(RecordingMailer::default());
        let (dispatcher, worker) = NotificationDispatcher::spawn(store, mailer.clone(), 8);

        dispatcher.on_threshold_crossed(crossed(&customer, &municipality));
        drop(dispatcher);
        worker.await.unwrap();

        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "jane@home.test");
        assert_eq!(sent[0].subject, "Smart Bin Alert - Collection Needed");
        assert_eq!(
            sent[0].body,
            "Your smart bin BIN001 is 92% full. Collection will be scheduled soon."
        );
        assert_eq!(sent[1].to, "ops@city.test");
        assert_eq!(
            sent[1].body,
            "Smart bin BIN001 at 12 Main St is 92% full and needs collection."
        );
    }

    #[tokio::test]
    async fn test_assignment_notice_texts() {
        let (store, customer, municipality) = seeded().await;
        let agent = user("agent@city.test", UserRole::Agent, Some(municipality.id));
        store.insert_user(agent.clone()).await;
        let mailer = Arc::new(RecordingMailer::default());
        let (dispatcher, worker) = NotificationDispatcher::spawn(store, mailer.clone(), 8);

        dispatcher.on_task_assigned(TaskAssigned {
            task_id: Uuid::new_v4(),
            customer_id: customer.id,
            agent_id: agent.id,
            bin_id: Some("BIN001".to_string()),
            scheduled_date: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
        });
        drop(dispatcher);
        worker.await.unwrap();

        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "Waste Collection Scheduled");
        assert_eq!(sent[0].body, "Waste collection scheduled for 2025-03-14 09:30.");
        assert_eq!(sent[1].to, "agent@city.test");
        assert_eq!(
            sent[1].body,
            "New collection task assigned. Bin: BIN001, Date: 2025-03-14 09:30"
        );
    }

    #[tokio::test]
    async fn test_mailer_failure_does_not_stop_worker() {
        let (store, customer, municipality) = seeded().await;
        let (dispatcher, worker) =
            NotificationDispatcher::spawn(store, Arc::new(FailingMailer), 8);

        dispatcher.on_threshold_crossed(crossed(&customer, &municipality));
        dispatcher.on_threshold_crossed(crossed(&customer, &municipality));
        drop(dispatcher);

        assert!(worker.await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_discards() {
        let dispatcher = NotificationDispatcher::disabled();
        dispatcher.on_task_assigned(TaskAssigned {
            task_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            bin_id: None,
            scheduled_date: Utc::now(),
        });
    }
}
