//! Concrete event types the bridge fires on the event bus: player lifecycle,
//! block/entity mutation, explosions, command execution, and container
//! clicks. Each implements [`alloy_events::Event`] with a tag under its
//! family's prefix so handlers can subscribe either to the exact event or to
//! the whole family.

use alloy_events::{impl_event_any, Cancellable, Event};

use crate::wrapper::HostId;

pub struct PlayerJoinEvent {
    pub player_id: HostId,
    pub display_name: String,
}
impl Event for PlayerJoinEvent {
    fn tag(&self) -> &'static str {
        "player.join"
    }
    impl_event_any!();
}

pub struct PlayerQuitEvent {
    pub player_id: HostId,
}
impl Event for PlayerQuitEvent {
    fn tag(&self) -> &'static str {
        "player.quit"
    }
    impl_event_any!();
}

macro_rules! cancellable_event {
    ($name:ident, $tag:literal, { $($field:ident : $ty:ty),* $(,)? }) => {
        pub struct $name {
            $(pub $field: $ty,)*
            pub cancelled: bool,
        }
        impl Event for $name {
            fn tag(&self) -> &'static str {
                $tag
            }
            impl_event_any!();
            fn as_cancellable_mut(&mut self) -> Option<&mut dyn Cancellable> {
                Some(self)
            }
        }
        impl Cancellable for $name {
            fn cancelled(&self) -> bool {
                self.cancelled
            }
            fn set_cancelled(&mut self, cancelled: bool) {
                self.cancelled = cancelled;
            }
        }
    };
}

cancellable_event!(BlockBreakEvent, "block.break", {
    player_id: HostId,
    position: (i32, i32, i32),
});

cancellable_event!(BlockPlaceEvent, "block.place", {
    player_id: HostId,
    position: (i32, i32, i32),
});

cancellable_event!(EntityDamageEvent, "entity.damage", {
    entity_id: HostId,
    amount: f64,
});

cancellable_event!(EntityDeathEvent, "entity.death", {
    entity_id: HostId,
});

cancellable_event!(ExplosionEvent, "world.explosion", {
    origin: (f64, f64, f64),
    power: f32,
});

cancellable_event!(CommandExecuteEvent, "command.execute", {
    player_id: HostId,
    command: String,
    arguments: Vec<String>,
});

cancellable_event!(ContainerClickEvent, "inventory.click", {
    player_id: HostId,
    slot: i32,
});

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_events::EventBus;

    #[test]
    fn supertype_subscribers_see_every_mutation_event() {
        let bus = EventBus::new();
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.register(
            "block",
            std::sync::Arc::new(move |event: &mut dyn Event| seen_clone.lock().push(event.tag())),
            alloy_events::Priority::Normal,
            false,
            "test",
        );

        bus.fire(BlockBreakEvent {
            player_id: HostId("p1".to_string()),
            position: (0, 0, 0),
            cancelled: false,
        });
        bus.fire(BlockPlaceEvent {
            player_id: HostId("p1".to_string()),
            position: (0, 0, 0),
            cancelled: false,
        });

        assert_eq!(*seen.lock(), vec!["block.break", "block.place"]);
    }
}
