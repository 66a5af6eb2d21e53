//! Scene loader: turns load requests into `scene-ready` announcements.

use module_bus::{handler_fn, HandlerError, MessageBusApi, Priority, SubscriptionToken};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::events::{SCENE_LOAD, SCENE_READY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRequest {
    pub id: u32,
    pub name: String,
}

pub struct SceneLoader {
    bus: Arc<dyn MessageBusApi>,
    token: SubscriptionToken,
}

impl SceneLoader {
    pub fn attach(bus: Arc<dyn MessageBusApi>) -> Self {
        let publisher = Arc::clone(&bus);
        let token = bus.subscribe(
            SCENE_LOAD,
            handler_fn(move |payload| {
                let request = SceneRequest::deserialize(payload)?;
                if request.name.is_empty() {
                    return Err(HandlerError::failed(format!(
                        "scene {} has no name",
                        request.id
                    )));
                }
                info!(id = request.id, name = %request.name, "Scene loaded");
                publisher.publish(
                    SCENE_READY,
                    json!({"id": request.id, "name": request.name}),
                    Priority::High,
                );
                Ok(())
            }),
        );
        Self { bus, token }
    }

    pub fn detach(self) -> bool {
        self.bus.unsubscribe(SCENE_LOAD, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use module_bus::{BusConfig, MessageBus};

    #[test]
    fn test_load_request_announces_scene() {
        let bus = MessageBus::new(BusConfig::without_optimizer()).unwrap();
        let loader = SceneLoader::attach(Arc::new(bus.clone()));

        bus.publish(SCENE_LOAD, json!({"id": 3, "name": "lobby"}), Priority::Critical);

        let depths = bus.stats().queue_depths;
        assert_eq!(depths.high, 1);
        assert!(loader.detach());
    }

    #[test]
    fn test_bad_request_is_a_handler_failure() {
        let bus = MessageBus::new(BusConfig::without_optimizer()).unwrap();
        let _loader = SceneLoader::attach(Arc::new(bus.clone()));

        bus.publish(SCENE_LOAD, json!({"id": 3}), Priority::Critical);

        assert_eq!(bus.stats().metrics[SCENE_LOAD].errors, 1);
    }
}
