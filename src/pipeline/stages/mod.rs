//! Building-block stages
//!
//! - `Filter` / `grep` / `field_equals` - forward matching items
//! - `Broadcast` - copy each item to several targets
//! - `RecordAssembler` - turn markup events into records
//! - `Map` / `relay` - convert or pass items through
//! - `Printer` / `Collector` / `Discard` - terminal stages

pub mod assemble;
pub mod broadcast;
pub mod filter;
pub mod map;
pub mod sink;

// Re-export stages
pub use assemble::{AssemblerState, RecordAssembler};
pub use broadcast::{broadcast, Broadcast, DeliveryPolicy};
pub use filter::{field_equals, filter, grep, Filter};
pub use map::{map, relay, Map};
pub use sink::{Collected, Collector, Discard, Printer};
