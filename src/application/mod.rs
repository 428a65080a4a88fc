pub mod dto;
pub mod inference;
pub mod ports;
pub mod services;
pub mod session;
