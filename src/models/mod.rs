//! Data types shared between the worker and the adapter

pub mod async_requests;
pub mod descriptor;
pub mod event_bridge;
pub mod kind;
pub mod row;
pub mod window;
