use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

/// Domain events emitted after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i32,
        code: String,
        shop_id: i32,
        total_price: Decimal,
    },
    OrderStatusChanged {
        order_id: i32,
        old_status: String,
        new_status: String,
    },
    StockAllocated {
        product_id: i32,
        warehouse_id: i32,
        quantity: i32,
        lot_ids: Vec<i32>,
    },
    StockReleased {
        lot_id: i32,
        quantity: i32,
    },
    StockReceived {
        lot_id: i32,
        product_id: i32,
        warehouse_id: i32,
        quantity: i32,
    },
    StockAdjusted {
        lot_id: i32,
        old_quantity: i32,
        new_quantity: i32,
    },
    StockOut {
        stock_out_id: i32,
        product_id: i32,
        warehouse_id: i32,
        quantity: i32,
    },
    CustomerCreated(i32),
}

impl Event {
    /// Short metric-friendly name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::StockAllocated { .. } => "stock_allocated",
            Event::StockReleased { .. } => "stock_released",
            Event::StockReceived { .. } => "stock_received",
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::StockOut { .. } => "stock_out",
            Event::CustomerCreated(_) => "customer_created",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event without waiting for room in the channel. The state
    /// change behind it is already committed, so a full or closed channel
    /// drops the event instead of holding up the caller.
    pub fn send_or_log(&self, event: Event) {
        let kind = event.kind();
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(event = kind, "Event channel full, dropping event");
                counter!("shopstock.events.dropped", 1, "reason" => "full");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(event = kind, "Event channel closed, dropping event");
                counter!("shopstock.events.dropped", 1, "reason" => "closed");
            }
        }
    }
}

/// Drains the event channel, logging every event until all senders are gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("shopstock.events.processed", 1, "kind" => event.kind());
        match &event {
            Event::OrderCreated {
                order_id,
                code,
                shop_id,
                total_price,
            } => {
                info!(order_id, %code, shop_id, %total_price, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id, %old_status, %new_status, "Order status changed");
            }
            Event::StockAllocated {
                product_id,
                warehouse_id,
                quantity,
                lot_ids,
            } => {
                info!(product_id, warehouse_id, quantity, ?lot_ids, "Stock allocated");
            }
            other => info!(event = ?other, "Event received"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sent_events_arrive_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender.send_or_log(Event::CustomerCreated(1));
        sender.send_or_log(Event::StockReleased {
            lot_id: 3,
            quantity: 2,
        });

        assert_eq!(rx.recv().await, Some(Event::CustomerCreated(1)));
        assert_eq!(rx.recv().await.map(|e| e.kind()), Some("stock_released"));
    }

    #[tokio::test]
    async fn closed_channel_drops_quietly() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // must not panic or block
        sender.send_or_log(Event::CustomerCreated(2));
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_waiting() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);

        sender.send_or_log(Event::CustomerCreated(1));
        sender.send_or_log(Event::CustomerCreated(2));

        assert_eq!(rx.recv().await, Some(Event::CustomerCreated(1)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn processor_stops_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        tx.send(Event::CustomerCreated(5)).await.unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
