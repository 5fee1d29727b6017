use futures_util::future::BoxFuture;
use std::collections::VecDeque;

/// An opaque retry continuation: invoking it re-enters the router with the
/// original command context (§3 "Queued item").
pub type RetryThunk = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// The three FIFOs of §4.D. Each retry queue (failover, cluster-down) is
/// meant to be drained behind a single shared timer per queue; this struct
/// only tracks FIFO order and the "is a timer already armed" bit so the
/// [`crate::controller::ClusterController`] can decide whether a push needs
/// to spawn a new timer or piggyback on one already in flight.
#[derive(Default)]
pub struct Queues {
    offline: VecDeque<RetryThunk>,
    failover: VecDeque<RetryThunk>,
    failover_armed: bool,
    cluster_down: VecDeque<RetryThunk>,
    cluster_down_armed: bool,
}

impl Queues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_offline(&mut self, thunk: RetryThunk) {
        self.offline.push_back(thunk);
    }

    pub fn offline_len(&self) -> usize {
        self.offline.len()
    }

    /// Drains the offline queue in submission order (on `ready`, or to
    /// reject everything on terminal `end`).
    pub fn take_offline(&mut self) -> VecDeque<RetryThunk> {
        std::mem::take(&mut self.offline)
    }

    /// Pushes onto the failover-retry queue. Returns `true` exactly when
    /// this push is the one that should arm the shared timer.
    pub fn push_failover(&mut self, thunk: RetryThunk) -> bool {
        self.failover.push_back(thunk);
        if self.failover_armed {
            false
        } else {
            self.failover_armed = true;
            true
        }
    }

    pub fn failover_len(&self) -> usize {
        self.failover.len()
    }

    /// Drains the failover queue and clears the armed bit, so the next push
    /// arms a fresh timer.
    pub fn take_failover(&mut self) -> VecDeque<RetryThunk> {
        self.failover_armed = false;
        std::mem::take(&mut self.failover)
    }

    pub fn push_cluster_down(&mut self, thunk: RetryThunk) -> bool {
        self.cluster_down.push_back(thunk);
        if self.cluster_down_armed {
            false
        } else {
            self.cluster_down_armed = true;
            true
        }
    }

    pub fn cluster_down_len(&self) -> usize {
        self.cluster_down.len()
    }

    pub fn take_cluster_down(&mut self) -> VecDeque<RetryThunk> {
        self.cluster_down_armed = false;
        std::mem::take(&mut self.cluster_down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_thunk(order: Arc<Mutex<Vec<u32>>>, id: u32) -> RetryThunk {
        Box::new(move || {
            Box::pin(async move {
                order.lock().unwrap().push(id);
            })
        })
    }

    #[tokio::test]
    async fn offline_queue_drains_in_fifo_order() {
        let mut queues = Queues::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        queues.push_offline(recording_thunk(order.clone(), 1));
        queues.push_offline(recording_thunk(order.clone(), 2));
        queues.push_offline(recording_thunk(order.clone(), 3));

        for thunk in queues.take_offline() {
            thunk().await;
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(queues.offline_len(), 0);
    }

    #[test]
    fn only_first_push_arms_the_failover_timer() {
        let mut queues = Queues::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        assert!(queues.push_failover(recording_thunk(order.clone(), 1)));
        assert!(!queues.push_failover(recording_thunk(order.clone(), 2)));
        assert!(!queues.push_failover(recording_thunk(order.clone(), 3)));
        assert_eq!(queues.failover_len(), 3);
    }

    #[test]
    fn draining_failover_rearms_next_push() {
        let mut queues = Queues::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        queues.push_failover(recording_thunk(order.clone(), 1));
        queues.take_failover();
        assert!(queues.push_failover(recording_thunk(order.clone(), 2)));
    }
}
