//! Redis adapters: the login code cache and the lifecycle event stream.

pub mod code_cache;
pub mod events;
pub mod lua_scripts;

pub use code_cache::{CacheError, CodeCache, RedisCodeCache};
pub use events::{EventNotifier, RedisEventNotifier};
