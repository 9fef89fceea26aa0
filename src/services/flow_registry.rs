//! In-progress consultations keyed by chat session id, with idle eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::services::consultation::ConsultationFlow;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct ActiveFlow {
    pub flow: ConsultationFlow,
    last_active: Instant,
}

impl ActiveFlow {
    fn new(flow: ConsultationFlow) -> Self {
        Self {
            flow,
            last_active: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active)
    }
}

pub struct FlowRegistry {
    flows: RwLock<HashMap<Uuid, Arc<Mutex<ActiveFlow>>>>,
    idle_timeout: Duration,
}

impl FlowRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            flows: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub async fn insert(&self, flow: ConsultationFlow) {
        let session_id = flow.session_id;
        self.flows
            .write()
            .await
            .insert(session_id, Arc::new(Mutex::new(ActiveFlow::new(flow))));
    }

    pub async fn get(&self, session_id: Uuid) -> Option<Arc<Mutex<ActiveFlow>>> {
        self.flows.read().await.get(&session_id).cloned()
    }

    pub async fn remove(&self, session_id: Uuid) {
        self.flows.write().await.remove(&session_id);
    }

    pub async fn len(&self) -> usize {
        self.flows.read().await.len()
    }

    /// Drops flows idle for longer than the timeout. Returns how many went.
    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now()).await
    }

    async fn evict_idle_at(&self, now: Instant) -> usize {
        let mut flows = self.flows.write().await;
        let before = flows.len();

        flows.retain(|_, slot| {
            // a locked flow is being advanced right now
            let keep = match slot.try_lock() {
                Ok(active) => active.idle_for(now) < self.idle_timeout,
                Err(_) => true,
            };
            keep
        });

        before - flows.len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let evicted = registry.evict_idle().await;
                if evicted > 0 {
                    tracing::info!(
                        "Evicted {} idle consultations, {} still active",
                        evicted,
                        registry.len().await
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> ConsultationFlow {
        ConsultationFlow::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_idle_flow_evicted() {
        let registry = FlowRegistry::new(Duration::from_secs(60));
        registry.insert(flow()).await;

        assert_eq!(registry.evict_idle_at(Instant::now()).await, 0);
        assert_eq!(registry.len().await, 1);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(registry.evict_idle_at(later).await, 1);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_flow_in_use_is_kept() {
        let registry = FlowRegistry::new(Duration::from_secs(60));
        let consultation = flow();
        let session_id = consultation.session_id;
        registry.insert(consultation).await;

        let slot = registry.get(session_id).await.unwrap();
        let _guard = slot.lock().await;

        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(registry.evict_idle_at(later).await, 0);
        assert!(registry.get(session_id).await.is_some());
    }

    #[tokio::test]
    async fn test_touch_postpones_eviction() {
        let registry = FlowRegistry::new(Duration::from_millis(50));
        let consultation = flow();
        let session_id = consultation.session_id;
        registry.insert(consultation).await;
        let inserted_at = Instant::now();

        tokio::time::sleep(Duration::from_millis(30)).await;
        registry.get(session_id).await.unwrap().lock().await.touch();

        // idle past the timeout counted from insertion, but not from the touch
        let check_at = inserted_at + Duration::from_millis(60);
        assert_eq!(registry.evict_idle_at(check_at).await, 0);
        assert!(registry.get(session_id).await.is_some());
    }

    #[tokio::test]
    async fn test_sweeper_removes_idle_flows() {
        let registry = Arc::new(FlowRegistry::new(Duration::ZERO));
        registry.insert(flow()).await;
        let sweeper = registry.spawn_sweeper(Duration::from_millis(10));

        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.len().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sweeper did not evict the flow");

        sweeper.abort();
    }
}
