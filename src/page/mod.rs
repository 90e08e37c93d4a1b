pub mod request;
pub mod view;
