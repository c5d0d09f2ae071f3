//! Spin rate limiting: in-memory anti-flood gate and durable daily quota

pub mod anti_flood;
pub mod spin_limit;

pub use anti_flood::{AntiFlood, SpinGate};
pub use spin_limit::{
    InMemorySpinLimitStore, RocksSpinLimitStore, SpinAllowance, SpinLimitStore, SpinLimiter,
};
