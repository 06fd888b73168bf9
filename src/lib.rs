pub mod app;
pub mod complete;
pub mod forester;
pub mod model;
pub mod msg;
pub mod notice;
pub mod serve;
pub mod session;
pub mod watch;
