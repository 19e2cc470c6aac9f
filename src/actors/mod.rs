//! Long-running actors
//!
//! Each actor is an independent tokio task driven by its own loop, controlled through a
//! cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!   inbound bus (UDP)          remote hub (WebSocket)
//!          │                            │
//!   ┌──────▼──────┐             ┌───────▼───────┐
//!   │  OscRouter  │             │  HubListener  │
//!   └──┬───────┬──┘             └───────┬───────┘
//!      │       │ telemetry              │ RemoteEvent
//!      │   ┌───▼────────────┐           │
//!      │   │ TriggerEngine  │           │
//!      │   └───┬────────────┘           │
//!   ┌──▼───────▼──┐                     │
//!   │ Dispatcher  │──► OSC / HTTP       │
//!   └──────┬──────┘                     │
//!          │ ShockEvent                 │
//!   ┌──────▼────────────────────────────▼──┐
//!   │           DisplayActor               │
//!   └──────────────────────────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel
//! 2. **Events**: shock and remote events fan out over broadcast channels
//! 3. **Request/Response**: oneshot channels for queries such as `tick_now`
//! 4. **Configuration**: a watch channel every actor re-reads on change

pub mod display;
pub mod hub;
pub mod messages;
pub mod trigger;
