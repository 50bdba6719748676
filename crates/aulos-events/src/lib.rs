#![forbid(unsafe_code)]

//! Unified event surface of the streaming engine.
//!
//! Hierarchical: each subsystem has its own sub-enum, all converging on
//! [`Event`] through `From` impls so components can publish their own type
//! directly: `bus.publish(StreamEvent::StreamComplete { .. })`.

mod bus;
mod event;
mod player;
mod stream;

pub use bus::EventBus;
pub use event::Event;
pub use player::PlayerEvent;
pub use stream::StreamEvent;
