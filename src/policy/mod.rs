pub mod lru;
pub mod nop;
