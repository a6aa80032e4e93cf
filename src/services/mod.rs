//! Service layer: room workers, registry, finalization, and socket handling.

pub mod finalizer;
pub mod room_actor;
pub mod room_registry;
pub mod websocket_service;
