pub mod alt_channel;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod filter;
pub mod inbound;
pub mod model {
    pub mod alert;
    pub mod signal;
    pub mod state;
    pub mod timeframe;
}
pub mod parser;
pub mod render;
pub mod server;
pub mod state_store;
pub mod storage;
pub mod toggle_store;
