// Gateway module for cache - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod etag_cache;
mod instructions;

// Public re-exports - the ONLY way to access cache functionality
pub use etag_cache::{is_fresh, load, revalidation_headers, store, CacheLoad, CacheMetadata};
pub use instructions::InstructionCache;
