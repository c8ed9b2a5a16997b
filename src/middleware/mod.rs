mod core;
mod logger;

pub use core::Middleware;
pub use logger::LoggerMiddleware;
pub use crate::static_files::StaticMiddleware;
