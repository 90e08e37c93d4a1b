pub mod position;
pub mod state_store;
pub mod storage;
