pub mod statuses;

pub use statuses::{
    EventProcessingStatus, OrderPaymentStatus, OrderStatus, PaymentMethod, PaymentStatus,
};
