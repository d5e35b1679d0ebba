pub mod gateway;
pub mod issuer;
pub mod notification;
pub mod receiver;

pub use issuer::{IssuedOrder, OrderIssuer};
pub use receiver::SettlementReceiver;
