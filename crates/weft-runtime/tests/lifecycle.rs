//! Weave a compiled module, then run it in the host

use std::cell::Cell;
use std::fs;
use std::rc::Rc;

use weft_bytecode::{method_attrs, Instruction, MethodDef, Module, TypeDef, TypeRef};
use weft_runtime::{
    runtime_module, EventHistory, EventLogKind, EventRegistry, FallbackRegistrar, Host,
    HostConfig, Listener,
};
use weft_weaver::{WeaveStatus, Weaver, WeaverConfig};

#[derive(Debug)]
struct Ping;
impl weft_runtime::Event for Ping {}

#[derive(Debug)]
struct Pong;
impl weft_runtime::Event for Pong {}

#[derive(Default)]
struct Hud {
    pings: Cell<u32>,
}

impl Listener<Ping> for Hud {
    fn on_event(&self, _: &Ping) {
        self.pings.set(self.pings.get() + 1);
    }
}

#[derive(Default)]
struct Unit {
    pings: Cell<u32>,
    pongs: Cell<u32>,
}

impl Listener<Ping> for Unit {
    fn on_event(&self, _: &Ping) {
        self.pings.set(self.pings.get() + 1);
    }
}

impl Listener<Pong> for Unit {
    fn on_event(&self, _: &Pong) {
        self.pongs.set(self.pongs.get() + 1);
    }
}

fn listener(event: &str) -> TypeRef {
    TypeRef::generic(
        TypeRef::external("weft", "weft.Listener"),
        vec![TypeRef::local(event)],
    )
}

/// `game.Hud` is a component announcing itself on enable; `game.Soldier`
/// is a plain type deriving from `game.Unit`.
fn game_module() -> Module {
    let mut game = Module::new("app");
    game.add_reference("weft");
    game.add_reference("host");
    let announce = game.constants.add_string("announce");
    let spawn = game.constants.add_string("spawn");

    game.add_type(TypeDef::new("game.Ping"));
    game.add_type(TypeDef::new("game.Pong"));
    game.add_type(
        TypeDef::new("game.Hud")
            .with_base(TypeRef::external("host", "host.Component"))
            .with_interface(listener("game.Ping"))
            .with_method(
                MethodDef::new("on_enable", method_attrs::PUBLIC | method_attrs::VIRTUAL)
                    .with_body(vec![Instruction::CallNative(announce), Instruction::Return]),
            ),
    );
    game.add_type(
        TypeDef::new("game.Unit")
            .with_interface(listener("game.Ping"))
            .with_method(
                MethodDef::new(".ctor", method_attrs::PUBLIC | method_attrs::CONSTRUCTOR)
                    .with_body(vec![Instruction::CallNative(spawn), Instruction::Return]),
            ),
    );
    game.add_type(
        TypeDef::new("game.Soldier")
            .with_base(TypeRef::local("game.Unit"))
            .with_interface(listener("game.Pong")),
    );
    game
}

struct Fixture {
    host: Host,
    registry: Rc<EventRegistry>,
    spawned: Rc<Cell<u32>>,
}

fn host_for(module: Module) -> Fixture {
    let registry = Rc::new(EventRegistry::new());
    let spawned = Rc::new(Cell::new(0));
    let mut host = Host::new(module, Rc::clone(&registry));

    host.bind_type("game.Hud", Hud::default);
    host.bind_type("game.Unit", Unit::default);
    host.bind_event::<Ping>("game.Ping");
    host.bind_event::<Pong>("game.Pong");
    host.bind_capability::<Hud, Ping>("game.Hud").unwrap();
    host.bind_capability::<Unit, Ping>("game.Unit").unwrap();
    host.bind_capability::<Unit, Pong>("game.Soldier").unwrap();

    let announcer = Rc::clone(&registry);
    host.bind_native("announce", move |_| announcer.raise(Ping));
    let counter = Rc::clone(&spawned);
    host.bind_native("spawn", move |_| counter.set(counter.get() + 1));

    Fixture {
        host,
        registry,
        spawned,
    }
}

fn woven_through_disk() -> Module {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("weft.wbc"),
        runtime_module(&HostConfig::default()).encode(),
    )
    .unwrap();
    let artifact = dir.path().join("app.wbc");
    fs::write(&artifact, game_module().encode()).unwrap();

    let config = WeaverConfig {
        search_dirs: vec![dir.path().to_path_buf()],
        ..WeaverConfig::default()
    };
    let report = Weaver::from_config(config).on_module_compiled(&artifact);
    assert_eq!(report.status, WeaveStatus::Woven, "{:?}", report.warnings);
    assert_eq!(report.woven.len(), 3);

    Module::decode(&fs::read(&artifact).unwrap()).unwrap()
}

#[test]
fn test_component_registers_while_enabled() {
    let Fixture {
        mut host, registry, ..
    } = host_for(woven_through_disk());
    let history = EventHistory::attach(&registry);

    let handle = host.instantiate("game.Hud").unwrap();
    assert!(!registry.has_listeners::<Ping>());

    host.activate(handle).unwrap();
    let hud = host.get::<Hud>(handle).unwrap();
    // The announcement raised inside on_enable already reaches the hud.
    assert_eq!(hud.pings.get(), 1);
    assert_eq!(registry.listener_count::<Ping>(), 1);

    host.deactivate(handle).unwrap();
    registry.raise(Ping);
    assert_eq!(hud.pings.get(), 1);
    assert!(!registry.has_listeners::<Ping>());

    let messages: Vec<_> = history.logs().into_iter().map(|l| l.message).collect();
    assert_eq!(
        messages,
        vec![
            "Hud registered for Ping",
            "Ping raised by game.Hud.on_enable",
            "Hud unregistered for Ping",
        ]
    );
}

#[test]
fn test_plain_type_registers_for_its_lifetime() {
    let Fixture {
        mut host,
        registry,
        spawned,
    } = host_for(woven_through_disk());

    let handle = host.instantiate("game.Soldier").unwrap();
    // The synthesized constructor chains to game.Unit's.
    assert_eq!(spawned.get(), 1);
    assert_eq!(registry.listener_count::<Ping>(), 1);
    assert_eq!(registry.listener_count::<Pong>(), 1);

    registry.raise(Ping);
    registry.raise(Pong);
    let soldier = host.get::<Unit>(handle).unwrap();
    assert_eq!((soldier.pings.get(), soldier.pongs.get()), (1, 1));

    host.destroy(handle).unwrap();
    assert!(registry.event_types().is_empty());
    assert!(host.object(handle).is_none());
}

#[test]
fn test_registration_order_follows_capabilities() {
    let Fixture {
        mut host, registry, ..
    } = host_for(woven_through_disk());
    let history = EventHistory::attach(&registry);

    host.instantiate("game.Soldier").unwrap();
    let registrations: Vec<_> = history
        .logs()
        .into_iter()
        .filter(|l| l.kind == EventLogKind::Register)
        .map(|l| l.message)
        .collect();
    assert_eq!(
        registrations,
        vec!["Unit registered for Pong", "Unit registered for Ping"]
    );
}

#[test]
fn test_unwoven_module_falls_back_to_recorded_capabilities() {
    let Fixture {
        mut host, registry, ..
    } = host_for(game_module());

    let handle = host.instantiate("game.Soldier").unwrap();
    assert!(registry.event_types().is_empty());

    let mut registrar = FallbackRegistrar::new();
    registrar.refresh(host.table(), host.instances(), &[handle]);
    assert_eq!(registrar.records().len(), 2);
    assert_eq!(
        registrar.register_all(&registry, host.table(), host.instances()),
        2
    );

    registry.raise(Pong);
    assert_eq!(host.get::<Unit>(handle).unwrap().pongs.get(), 1);

    assert_eq!(
        registrar.unregister_all(&registry, host.table(), host.instances()),
        2
    );
    assert!(registry.event_types().is_empty());
}

#[test]
fn test_weaving_twice_changes_nothing() {
    let module = woven_through_disk();
    let mut again = module.clone();
    let report = Weaver::new(
        WeaverConfig::default(),
        weft_weaver::InMemoryResolver::new().with(runtime_module(&HostConfig::default())),
    )
    .weave_module(&mut again);
    assert_eq!(report.status, WeaveStatus::AlreadyWoven);
    assert_eq!(again, module);
}
