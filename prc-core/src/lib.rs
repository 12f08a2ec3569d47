pub mod capture;
pub mod catalyst;
pub mod controller;
pub mod error;
pub mod logger;
pub mod merge;
pub mod status;
pub mod store;
pub mod timeline;
pub mod timing;
