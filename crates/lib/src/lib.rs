//! Gembot core library: the Telegram chat relay and the Dialogflow fulfillment webhook,
//! plus the Google Cloud clients both are built on.

pub mod channels;
pub mod config;
pub mod fulfillment;
pub mod google;
pub mod llm;
pub mod relay;
pub mod retry;
pub mod session;
pub mod shutdown;
