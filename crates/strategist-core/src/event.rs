use crate::types::{ExecutionId, NodeType, StrategyId};

/// Engine lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RunStarted {
        strategy_id: StrategyId,
        execution_id: ExecutionId,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_type: NodeType,
        node_id: i64,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node_type: NodeType,
        node_id: i64,
        duration_ms: u64,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_type: NodeType,
        node_id: i64,
        error: String,
    },
    RunFinished {
        strategy_id: StrategyId,
        execution_id: ExecutionId,
        success: bool,
        error: Option<String>,
    },
    ScheduleFired {
        strategy_id: StrategyId,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::ScheduleFired { strategy_id: 4 });
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::ScheduleFired { strategy_id: 4 }
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(EngineEvent::ScheduleFired { strategy_id: 1 });
    }
}
