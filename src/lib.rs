pub mod chat;
pub mod logging;
pub mod media;
pub mod presence;
pub mod push;
pub mod relay;
pub mod server;
pub mod sidebar;
pub mod status;
pub mod storage;
