use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    DisputeOpenedEvent,
    DisputeResolvedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderCreatedEvent,
    OrderEscalatedEvent,
    OrderSettledEvent,
    StatusChangedEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Declares the hook plumbing for every engine event: the user-facing [`EventHooks`] builder, the running
/// [`EventHandlers`], and the [`EventProducers`] handed to the APIs.
macro_rules! event_hooks {
    ($($field:ident : $event:ty),+ $(,)?) => {
        #[derive(Default, Clone)]
        pub struct EventProducers {
            $(pub $field: Vec<EventProducer<$event>>,)+
        }

        pub struct EventHandlers {
            $(pub $field: Option<EventHandler<$event>>,)+
        }

        impl EventHandlers {
            pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
                Self {
                    $($field: hooks.$field.map(|f| EventHandler::new(buffer_size, f)),)+
                }
            }

            pub fn producers(&self) -> EventProducers {
                let mut result = EventProducers::default();
                $(
                    if let Some(handler) = &self.$field {
                        result.$field.push(handler.subscribe());
                    }
                )+
                result
            }

            /// Spawns every configured handler. Each one runs until the last of its producers is dropped.
            pub fn start_handlers(self) {
                $(
                    if let Some(handler) = self.$field {
                        tokio::spawn(async move {
                            handler.start_handler().await;
                        });
                    }
                )+
            }
        }

        #[derive(Default, Clone)]
        pub struct EventHooks {
            $(pub $field: Option<Handler<$event>>,)+
        }

        impl EventHooks {
            $(
                pub fn $field<F>(&mut self, f: F) -> &mut Self
                where F: (Fn($event) -> HookFuture) + Send + Sync + 'static {
                    self.$field = Some(Arc::new(f));
                    self
                }
            )+
        }
    };
}

event_hooks!(
    on_order_created: OrderCreatedEvent,
    on_status_changed: StatusChangedEvent,
    on_dispute_opened: DisputeOpenedEvent,
    on_dispute_resolved: DisputeResolvedEvent,
    on_order_settled: OrderSettledEvent,
    on_order_escalated: OrderEscalatedEvent,
);

impl EventProducers {
    pub async fn publish_order_created(&self, event: OrderCreatedEvent) {
        publish(&self.on_order_created, event).await;
    }

    pub async fn publish_status_changed(&self, event: StatusChangedEvent) {
        publish(&self.on_status_changed, event).await;
    }

    pub async fn publish_dispute_opened(&self, event: DisputeOpenedEvent) {
        publish(&self.on_dispute_opened, event).await;
    }

    pub async fn publish_dispute_resolved(&self, event: DisputeResolvedEvent) {
        publish(&self.on_dispute_resolved, event).await;
    }

    pub async fn publish_order_settled(&self, event: OrderSettledEvent) {
        publish(&self.on_order_settled, event).await;
    }

    pub async fn publish_order_escalated(&self, event: OrderEscalatedEvent) {
        publish(&self.on_order_escalated, event).await;
    }
}

async fn publish<E: Clone + Send + Sync>(producers: &[EventProducer<E>], event: E) {
    for producer in producers {
        producer.publish_event(event.clone()).await;
    }
}
