//! Bridge-method responsibilities and the concurrency contract they run
//! under: thread-identity detection for dual-dispatched packet trampolines,
//! the server-façade upgrade/revert flag, and the open-inventory/open-menu
//! tracking map, all reached through one [`BridgeContext`] rather than as
//! ambient globals.

use std::collections::HashMap;
use std::sync::Arc;

use custom_error::custom_error;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use alloy_events::EventBus;

use crate::events::{
    BlockBreakEvent, BlockPlaceEvent, CommandExecuteEvent, ContainerClickEvent,
    EntityDamageEvent, EntityDeathEvent, ExplosionEvent, PlayerJoinEvent, PlayerQuitEvent,
};
use crate::wrapper::{HostId, ServerFacade};

custom_error! {pub CommandInstallError
    Rejected { command: String, reason: String } = "host dispatcher rejected command '{command}': {reason}",
}

/// Driven once per host tick by [`Bridge::on_tick`]; implemented by
/// `alloy-loader`'s scheduler so this crate never depends upward on it.
pub trait TickDriver: Send + Sync {
    fn drive_tick(&self);
}

/// Installs a delegating executor node into the host's command dispatcher
/// through reflection. Implemented by the host embedding, consumed here.
pub trait CommandDispatcherInstaller: Send + Sync {
    fn install(
        &self,
        name: &str,
        executor: Arc<dyn Fn(&[String]) + Send + Sync>,
    ) -> Result<(), CommandInstallError>;
}

/// Forces the client to resynchronize a container after a cancelled or
/// custom-inventory click.
pub trait MenuResync: Send + Sync {
    fn resync(&self, player_id: &HostId);
}

pub struct CommandDescriptor {
    pub name: String,
    pub executor: Arc<dyn Fn(&[String]) + Send + Sync>,
}

#[derive(Debug, Clone, Default)]
struct OpenInventoryState {
    custom_inventory: Option<String>,
    custom_menu: Option<String>,
}

/// Process-wide state the bridge methods share, owned by the loader and
/// handed down rather than reached for as globals.
pub struct BridgeContext {
    game_thread_name: String,
    event_bus: Arc<EventBus>,
    server_facade: RwLock<ServerFacade>,
    open_inventories: RwLock<HashMap<HostId, OpenInventoryState>>,
}

impl BridgeContext {
    pub fn new(game_thread_name: impl Into<String>, event_bus: Arc<EventBus>) -> Self {
        BridgeContext {
            game_thread_name: game_thread_name.into(),
            event_bus,
            server_facade: RwLock::new(ServerFacade::Stub),
            open_inventories: RwLock::new(HashMap::new()),
        }
    }

    /// Detects current-thread identity by name equality against the
    /// documented game-thread name.
    pub fn is_game_thread(&self) -> bool {
        std::thread::current()
            .name()
            .is_some_and(|name| name == self.game_thread_name)
    }

    pub fn server_is_upgraded(&self) -> bool {
        self.server_facade.read().is_full()
    }
}

/// The set of bridge methods host bytecode calls into after transformation.
pub struct Bridge {
    context: Arc<BridgeContext>,
}

impl Bridge {
    pub fn new(context: Arc<BridgeContext>) -> Self {
        Bridge { context }
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.context
    }

    /// On the host's server-start completion: upgrade the server façade
    /// from stub to fully reflective.
    pub fn on_server_start_complete(&self, identity: HostId) {
        *self.context.server_facade.write() = ServerFacade::Full(Arc::new(identity));
        info!("server façade upgraded to fully reflective");
    }

    /// On the host's server-stop: revert the server façade to a stub.
    pub fn on_server_stop(&self) {
        *self.context.server_facade.write() = ServerFacade::Stub;
        info!("server façade reverted to stub");
    }

    /// Drives the loader's own tick-synchronized scheduler once per host
    /// tick.
    pub fn on_tick(&self, scheduler: &dyn TickDriver) {
        scheduler.drive_tick();
    }

    /// On player-accepted: fires a join event. Returns the event for
    /// callers that need the final (possibly mod-mutated, though join is
    /// non-cancellable) payload.
    pub fn on_player_join(&self, player_id: HostId, display_name: String) -> PlayerJoinEvent {
        self.context.event_bus.fire(PlayerJoinEvent {
            player_id,
            display_name,
        })
    }

    /// On player-removed: fires a quit event and drops any open-inventory
    /// tracking state for that player.
    pub fn on_player_quit(&self, player_id: HostId) -> PlayerQuitEvent {
        self.context.open_inventories.write().remove(&player_id);
        self.context.event_bus.fire(PlayerQuitEvent { player_id })
    }

    /// Packet-receive trampolines run on both the I/O thread and the game
    /// thread; the bridge must detect it is on the I/O thread and
    /// early-return to avoid double-firing. Returns `None` on the I/O thread
    /// without invoking `f`.
    pub fn on_game_thread_or_skip<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        if self.context.is_game_thread() {
            Some(f())
        } else {
            None
        }
    }

    pub fn on_block_break(&self, event: BlockBreakEvent) -> bool {
        self.context.event_bus.fire(event).cancelled
    }

    pub fn on_block_place(&self, event: BlockPlaceEvent) -> bool {
        self.context.event_bus.fire(event).cancelled
    }

    pub fn on_entity_damage(&self, event: EntityDamageEvent) -> bool {
        self.context.event_bus.fire(event).cancelled
    }

    pub fn on_entity_death(&self, event: EntityDeathEvent) -> bool {
        self.context.event_bus.fire(event).cancelled
    }

    pub fn on_explosion(&self, event: ExplosionEvent) -> bool {
        self.context.event_bus.fire(event).cancelled
    }

    /// On server-start completion: walk the command registry and install a
    /// delegating executor node per command. A command the host dispatcher
    /// rejects is logged and skipped, leaving that mod without commands
    /// rather than aborting the whole batch.
    pub fn install_commands(
        &self,
        commands: &[CommandDescriptor],
        dispatcher: &dyn CommandDispatcherInstaller,
    ) {
        for command in commands {
            match dispatcher.install(&command.name, command.executor.clone()) {
                Ok(()) => debug!(command = %command.name, "installed command"),
                Err(error) => warn!(command = %command.name, %error, "failed to install command"),
            }
        }
    }

    /// Fires a command-execution event; `false` (not cancelled) means the
    /// host-side dispatcher node should invoke the Alloy command's
    /// `execute` method.
    pub fn on_command_execute(&self, event: CommandExecuteEvent) -> bool {
        self.context.event_bus.fire(event).cancelled
    }

    /// Records that `player_id` opened a custom inventory/menu pair.
    pub fn track_open_inventory(
        &self,
        player_id: HostId,
        custom_inventory: Option<String>,
        custom_menu: Option<String>,
    ) {
        self.context.open_inventories.write().insert(
            player_id,
            OpenInventoryState {
                custom_inventory,
                custom_menu,
            },
        );
    }

    /// The container-click packet bridge: consults the open-inventory map,
    /// fires a click event, and resyncs the client if the event was
    /// cancelled or the open inventory is a custom one.
    pub fn on_container_click(
        &self,
        player_id: HostId,
        slot: i32,
        resync: &dyn MenuResync,
    ) -> bool {
        let is_custom = self
            .context
            .open_inventories
            .read()
            .get(&player_id)
            .is_some_and(|state| state.custom_inventory.is_some());

        let result = self.context.event_bus.fire(ContainerClickEvent {
            player_id: player_id.clone(),
            slot,
            cancelled: false,
        });

        if result.cancelled || is_custom {
            resync.resync(&player_id);
        }

        result.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn bridge() -> Bridge {
        let context = Arc::new(BridgeContext::new("server-main", Arc::new(EventBus::new())));
        Bridge::new(context)
    }

    #[test]
    fn off_game_thread_trampoline_is_skipped() {
        let b = bridge();
        assert!(!b.context().is_game_thread());
        let ran = b.on_game_thread_or_skip(|| 42);
        assert_eq!(ran, None);
    }

    #[test]
    fn on_game_thread_trampoline_runs() {
        let context = Arc::new(BridgeContext::new(
            std::thread::current().name().unwrap().to_string(),
            Arc::new(EventBus::new()),
        ));
        let b = Bridge::new(context);
        assert!(b.context().is_game_thread());
        assert_eq!(b.on_game_thread_or_skip(|| 42), Some(42));
    }

    #[test]
    fn server_facade_upgrades_and_reverts() {
        let b = bridge();
        assert!(!b.context().server_is_upgraded());
        b.on_server_start_complete(HostId("server".to_string()));
        assert!(b.context().server_is_upgraded());
        b.on_server_stop();
        assert!(!b.context().server_is_upgraded());
    }

    #[test]
    fn player_quit_clears_open_inventory_tracking() {
        let b = bridge();
        let player = HostId("p1".to_string());
        b.track_open_inventory(player.clone(), Some("chest".to_string()), None);
        assert!(b
            .context()
            .open_inventories
            .read()
            .contains_key(&player));
        b.on_player_quit(player.clone());
        assert!(!b
            .context()
            .open_inventories
            .read()
            .contains_key(&player));
    }

    #[test]
    fn custom_inventory_click_always_resyncs() {
        let b = bridge();
        let player = HostId("p1".to_string());
        b.track_open_inventory(player.clone(), Some("chest".to_string()), None);

        struct CountingResync(AtomicUsize);
        impl MenuResync for CountingResync {
            fn resync(&self, _player_id: &HostId) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let resync = CountingResync(AtomicUsize::new(0));

        b.on_container_click(player, 3, &resync);
        assert_eq!(resync.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_command_install_is_logged_and_does_not_stop_remaining() {
        let b = bridge();
        struct FlakyInstaller {
            installed: StdMutex<Vec<String>>,
        }
        impl CommandDispatcherInstaller for FlakyInstaller {
            fn install(
                &self,
                name: &str,
                _executor: Arc<dyn Fn(&[String]) + Send + Sync>,
            ) -> Result<(), CommandInstallError> {
                if name == "broken" {
                    return Err(CommandInstallError::Rejected {
                        command: name.to_string(),
                        reason: "reserved name".to_string(),
                    });
                }
                self.installed.lock().unwrap().push(name.to_string());
                Ok(())
            }
        }
        let installer = FlakyInstaller {
            installed: StdMutex::new(Vec::new()),
        };

        let commands = vec![
            CommandDescriptor {
                name: "broken".to_string(),
                executor: Arc::new(|_| {}),
            },
            CommandDescriptor {
                name: "ok".to_string(),
                executor: Arc::new(|_| {}),
            },
        ];
        b.install_commands(&commands, &installer);
        assert_eq!(*installer.installed.lock().unwrap(), vec!["ok".to_string()]);
    }

    #[test]
    fn entity_damage_reports_cancellation_result() {
        let b = bridge();
        b.context().event_bus.register(
            "entity.damage",
            Arc::new(|event: &mut dyn alloy_events::Event| {
                event
                    .as_any_mut()
                    .downcast_mut::<EntityDamageEvent>()
                    .unwrap()
                    .cancelled = true;
            }),
            alloy_events::Priority::Normal,
            false,
            "test",
        );

        let cancelled = b.on_entity_damage(EntityDamageEvent {
            entity_id: HostId("e1".to_string()),
            amount: 5.0,
            cancelled: false,
        });
        assert!(cancelled);
    }
}
