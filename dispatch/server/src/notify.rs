use crate::db::schema::ReportStatus;
use anyhow::Result;
use futures::StreamExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::{postgres::PgListener, PgPool};
use tokio::sync::mpsc;
use tracing::{debug, error, span, Level};

/// Best-effort events fanned out over Postgres notify channels. Payloads
/// carry the recipient ids; delivery beyond the channel is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum DispatchEvent {
    #[serde(rename_all = "camelCase")]
    AssignmentsCreated {
        report_id: i64,
        volunteer_ids: Vec<i64>,
    },
    #[serde(rename_all = "camelCase")]
    AssignmentsExpired {
        report_id: i64,
        volunteer_ids: Vec<i64>,
    },
    #[serde(rename_all = "camelCase")]
    ReportFinalized {
        report_id: i64,
        status: ReportStatus,
        reporter_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    TaskAssigned {
        task_id: i64,
        authority_id: Option<i64>,
    },
}

#[derive(Clone)]
pub struct TypedChannel<T> {
    pub channel_name: String,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> TypedChannel<T> {
    pub fn new(channel_name: &str) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            _phantom: std::marker::PhantomData,
        }
    }
}

pub fn dispatch_channel() -> TypedChannel<DispatchEvent> {
    TypedChannel::new("dispatch_events")
}

/// Fire-and-forget publisher. At-most-once: failures are logged and never
/// surfaced to the caller.
#[derive(Clone)]
pub struct Notifier {
    pool: PgPool,
    channel_name: String,
}

impl Notifier {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            channel_name: dispatch_channel().channel_name,
        }
    }

    pub fn publish(&self, event: DispatchEvent) {
        let pool = self.pool.clone();
        let channel_name = self.channel_name.clone();
        tokio::spawn(async move {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("failed to encode notification: {}", e);
                    return;
                }
            };
            match sqlx::query("SELECT pg_notify($1, $2)")
                .bind(&channel_name)
                .bind(&payload)
                .execute(&pool)
                .await
            {
                Ok(_) => debug!("published {} notification", channel_name),
                Err(e) => error!("failed to publish notification: {}", e),
            }
        });
    }
}

/// Subscription side: a PgListener bridged onto an mpsc receiver, with
/// undecodable payloads dropped.
pub struct PgSubscriber<T> {
    events: mpsc::UnboundedReceiver<T>,
}

impl<T: DeserializeOwned + Send + 'static> PgSubscriber<T> {
    pub async fn new(pool: &PgPool, channel: TypedChannel<T>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(&channel.channel_name).await?;

        let listener_span = span!(
            Level::INFO,
            "pg_listener",
            channel = %channel.channel_name
        );

        tokio::spawn(async move {
            let mut stream = listener.into_stream();
            while let Some(message) = stream.next().await {
                let notification = match message {
                    Ok(notification) => notification,
                    Err(e) => {
                        error!(parent: &listener_span, error = %e, "error receiving notification");
                        continue;
                    }
                };
                match serde_json::from_str::<T>(notification.payload()) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(parent: &listener_span, error = %e, "undecodable notification payload");
                    }
                }
            }
        });
        Ok(Self { events: rx })
    }

    pub fn subscribe(self) -> mpsc::UnboundedReceiver<T> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DB;
    use std::time::Duration;

    #[test]
    fn events_round_trip_through_json() {
        let event = DispatchEvent::AssignmentsExpired {
            report_id: 12,
            volunteer_ids: vec![3, 5],
        };
        let payload = serde_json::to_string(&event).unwrap();
        assert_eq!(
            payload,
            r#"{"kind":"assignmentsExpired","reportId":12,"volunteerIds":[3,5]}"#
        );
        let decoded: DispatchEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    #[ignore = "requires postgres instance"]
    async fn published_events_reach_the_subscriber() -> Result<()> {
        let db = DB::new_from_environment().await?;
        let pool = db.pool;

        let subscriber = PgSubscriber::new(&pool, dispatch_channel()).await?;
        let mut events = subscriber.subscribe();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let notifier = Notifier::new(pool);
        let sent = DispatchEvent::TaskAssigned {
            task_id: 42,
            authority_id: Some(7),
        };
        notifier.publish(sent.clone());

        let received = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("subscriber channel closed");
        assert_eq!(received, sent);
        Ok(())
    }
}
