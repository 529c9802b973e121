pub mod fcm;
pub mod message;
