//! End-to-end weaving tests over encoded artifacts

use std::fs;
use std::path::{Path, PathBuf};

use weft_bytecode::{
    method_attrs, type_attrs, verify_module, Instruction, MethodDef, Module, Param, TypeDef,
    TypeRef,
};
use weft_weaver::{
    DirectoryResolver, InMemoryResolver, LifecycleShape, WeaveStatus, WeaveWarning, Weaver,
    WeaverConfig,
};

fn listener(event: TypeRef) -> TypeRef {
    TypeRef::generic(TypeRef::external("weft", "weft.Listener"), vec![event])
}

fn entry_point(name: &str) -> MethodDef {
    MethodDef::new(name, method_attrs::PUBLIC | method_attrs::STATIC)
        .with_generic_params(1)
        .with_param(Param::new("listener", TypeRef::local("E")))
        .with_body(vec![Instruction::Return])
}

fn weft_module() -> Module {
    let mut weft = Module::new("weft");
    weft.add_type(
        TypeDef::new("weft.EventRegistry")
            .with_method(entry_point("register"))
            .with_method(entry_point("unregister")),
    );
    weft.add_type(
        TypeDef::new("weft.Listener")
            .with_attributes(type_attrs::INTERFACE)
            .with_generic_params(1)
            .with_method(
                MethodDef::new("on_event", method_attrs::PUBLIC | method_attrs::ABSTRACT)
                    .with_param(Param::new("event", TypeRef::local("E"))),
            ),
    );
    weft
}

fn ctor(body: Vec<Instruction>) -> MethodDef {
    MethodDef::new(".ctor", method_attrs::PUBLIC | method_attrs::CONSTRUCTOR).with_body(body)
}

fn lib_module() -> Module {
    let mut lib = Module::new("lib");
    lib.add_reference("weft");
    lib.add_type(
        TypeDef::new("lib.Actor")
            .with_interface(listener(TypeRef::local("lib.Tick")))
            .with_method(ctor(vec![Instruction::Return]))
            .with_method(
                MethodDef::new("finalize", method_attrs::FAMILY | method_attrs::VIRTUAL)
                    .with_body(vec![Instruction::Return]),
            ),
    );
    lib.add_type(TypeDef::new("lib.Tick"));
    lib
}

/// `game.Hud` is a component handling A and B.
fn game_module() -> Module {
    let mut game = Module::new("app");
    game.add_reference("weft");
    game.add_reference("host");
    game.add_type(TypeDef::new("game.A"));
    game.add_type(TypeDef::new("game.B"));
    game.add_type(
        TypeDef::new("game.Hud")
            .with_base(TypeRef::external("host", "host.Component"))
            .with_interface(listener(TypeRef::local("game.A")))
            .with_interface(listener(TypeRef::local("game.B"))),
    );
    game
}

/// Render every call in a body as `name<args>` for compact assertions.
fn calls(module: &Module, body: &[Instruction]) -> Vec<String> {
    body.iter()
        .filter_map(|instr| instr.method_ref())
        .map(|id| {
            let target = module.method_ref(id).expect("valid method ref");
            let args: Vec<String> = target.generic_args.iter().map(|a| a.to_string()).collect();
            if args.is_empty() {
                format!("{}::{}", target.declaring_type.name(), target.name)
            } else {
                format!("{}<{}>", target.name, args.join(", "))
            }
        })
        .collect()
}

fn hook<'a>(module: &'a Module, ty: &str, name: &str) -> &'a MethodDef {
    module
        .find_type(ty)
        .and_then(|t| t.find_method(name, 0))
        .unwrap_or_else(|| panic!("{}::{} missing", ty, name))
}

fn weaver() -> Weaver<InMemoryResolver> {
    Weaver::new(
        WeaverConfig::default(),
        InMemoryResolver::new().with(weft_module()).with(lib_module()),
    )
}

fn write_artifact(dir: &Path, name: &str, module: &Module) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, module.encode()).unwrap();
    path
}

#[test]
fn test_component_gets_one_call_per_capability_in_order() {
    let mut module = game_module();
    let report = weaver().weave_module(&mut module);

    assert_eq!(report.status, WeaveStatus::Woven);
    assert!(report.warnings.is_empty());
    assert_eq!(report.woven.len(), 1);
    assert_eq!(report.woven[0].shape, LifecycleShape::Component);
    assert_eq!(report.register_calls(), 2);

    let enable = hook(&module, "game.Hud", "on_enable");
    assert_eq!(calls(&module, &enable.body), vec!["register<game.A>", "register<game.B>"]);
    assert_eq!(enable.body.len(), 5);
    assert_eq!(enable.body[0], Instruction::LoadSelf);
    assert_eq!(enable.body.last(), Some(&Instruction::Return));

    let disable = hook(&module, "game.Hud", "on_disable");
    assert_eq!(
        calls(&module, &disable.body),
        vec!["unregister<game.A>", "unregister<game.B>"]
    );

    assert!(module.is_woven());
    verify_module(&module).unwrap();
}

#[test]
fn test_weaving_is_deterministic() {
    let mut first = game_module();
    let mut second = game_module();
    weaver().weave_module(&mut first);
    weaver().weave_module(&mut second);
    assert_eq!(first.encode(), second.encode());
}

#[test]
fn test_existing_hook_keeps_leading_nops_and_body() {
    let mut module = game_module();
    let native = module.constants.add_string("show_hud");
    module.types[2].methods.push(
        MethodDef::new("on_enable", method_attrs::PUBLIC | method_attrs::VIRTUAL).with_body(vec![
            Instruction::Nop,
            Instruction::CallNative(native),
            Instruction::Return,
        ]),
    );

    weaver().weave_module(&mut module);

    let enable = hook(&module, "game.Hud", "on_enable");
    assert_eq!(enable.body[0], Instruction::Nop);
    assert_eq!(enable.body[1], Instruction::LoadSelf);
    assert_eq!(enable.body[5], Instruction::CallNative(native));
    assert_eq!(module.find_type("game.Hud").unwrap().methods.len(), 2);
}

#[test]
fn test_plain_type_inherits_capabilities_across_modules() {
    let dir = tempfile::tempdir().unwrap();
    write_artifact(dir.path(), "weft.wbc", &weft_module());
    write_artifact(dir.path(), "lib.wbc", &lib_module());

    let mut game = Module::new("app");
    game.add_reference("weft");
    game.add_reference("lib");
    game.add_type(TypeDef::new("game.Ping"));
    game.add_type(
        TypeDef::new("game.Player")
            .with_base(TypeRef::external("lib", "lib.Actor"))
            .with_interface(listener(TypeRef::local("game.Ping"))),
    );
    let path = write_artifact(dir.path(), "app.wbc", &game);

    let weaver = Weaver::new(
        WeaverConfig::default(),
        DirectoryResolver::new(vec![dir.path().to_path_buf()]),
    );
    let report = weaver.weave_file(&path).unwrap();
    assert_eq!(report.status, WeaveStatus::Woven, "{:?}", report.warnings);

    let woven = Module::decode(&fs::read(&path).unwrap()).unwrap();
    let player = woven.find_type("game.Player").unwrap();
    assert_eq!(report.woven[0].shape, LifecycleShape::Plain);

    let ctor = player.instance_constructor().unwrap();
    assert_eq!(
        calls(&woven, &ctor.body),
        vec!["register<game.Ping>", "register<[lib]lib.Tick>", "lib.Actor::.ctor"]
    );

    let finalize = hook(&woven, "game.Player", "finalize");
    assert_eq!(
        calls(&woven, &finalize.body),
        vec![
            "unregister<game.Ping>",
            "unregister<[lib]lib.Tick>",
            "lib.Actor::finalize"
        ]
    );
    assert!(matches!(
        finalize.body[finalize.body.len() - 2],
        Instruction::CallVirt(_)
    ));
    assert!(woven.references.iter().any(|r| r.name == "lib"));
}

#[test]
fn test_missing_registry_leaves_artifact_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_artifact(dir.path(), "app.wbc", &game_module());
    let before = fs::read(&path).unwrap();

    let weaver = Weaver::new(WeaverConfig::default(), InMemoryResolver::new());
    let report = weaver.on_module_compiled(&path);

    assert_eq!(report.status, WeaveStatus::MissingPrerequisite);
    assert!(matches!(
        report.warnings.as_slice(),
        [WeaveWarning::RegistryNotFound { .. }]
    ));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_registry_without_generic_entry_points() {
    let mut broken = Module::new("weft");
    broken.add_type(
        TypeDef::new("weft.EventRegistry").with_method(
            MethodDef::new("register", method_attrs::PUBLIC | method_attrs::STATIC)
                .with_param(Param::new("listener", TypeRef::local("object")))
                .with_body(vec![Instruction::Return]),
        ),
    );
    let weaver = Weaver::new(WeaverConfig::default(), InMemoryResolver::new().with(broken));

    let mut module = game_module();
    let untouched = module.clone();
    let report = weaver.weave_module(&mut module);

    assert_eq!(report.status, WeaveStatus::MissingPrerequisite);
    assert!(matches!(
        report.warnings.as_slice(),
        [WeaveWarning::EntryPointsMissing { .. }]
    ));
    assert_eq!(module, untouched);
}

#[test]
fn test_registry_outside_prefix_is_ignored() {
    let mut config = WeaverConfig::default();
    config.registry.module_prefix = "events".to_string();
    let weaver = Weaver::new(config, InMemoryResolver::new().with(weft_module()));

    let report = weaver.weave_module(&mut game_module());
    assert_eq!(report.status, WeaveStatus::MissingPrerequisite);
}

#[test]
fn test_local_registry() {
    let mut module = game_module();
    module.add_type(
        TypeDef::new("weft.EventRegistry")
            .with_method(entry_point("register"))
            .with_method(entry_point("unregister")),
    );
    let weaver = Weaver::new(WeaverConfig::default(), InMemoryResolver::new());

    let report = weaver.weave_module(&mut module);
    assert_eq!(report.status, WeaveStatus::Woven);

    let enable = hook(&module, "game.Hud", "on_enable");
    let Instruction::Call(id) = enable.body[1] else {
        panic!("expected a call");
    };
    assert_eq!(
        module.method_ref(id).unwrap().declaring_type,
        TypeRef::local("weft.EventRegistry")
    );
}

#[test]
fn test_second_pass_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_artifact(dir.path(), "app.wbc", &game_module());
    let weaver = weaver();

    assert_eq!(weaver.weave_file(&path).unwrap().status, WeaveStatus::Woven);
    let once = fs::read(&path).unwrap();

    let report = weaver.weave_file(&path).unwrap();
    assert_eq!(report.status, WeaveStatus::AlreadyWoven);
    assert_eq!(fs::read(&path).unwrap(), once);

    let module = Module::decode(&once).unwrap();
    assert_eq!(hook(&module, "game.Hud", "on_enable").body.len(), 5);
}

#[test]
fn test_non_target_artifacts_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_artifact(dir.path(), "plugin.wbc", &game_module());
    let before = fs::read(&path).unwrap();

    let report = weaver().on_module_compiled(&path);
    assert_eq!(report.status, WeaveStatus::NotTargeted);
    assert_eq!(report.module, "plugin");
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_editor_artifact_is_targeted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_artifact(dir.path(), "app-editor.wbc", &game_module());
    assert_eq!(weaver().on_module_compiled(&path).status, WeaveStatus::Woven);
}

#[test]
fn test_busy_artifact_is_reported_not_woven() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_artifact(dir.path(), "app.wbc", &game_module());
    let before = fs::read(&path).unwrap();
    fs::write(dir.path().join("app.wbc.lock"), b"").unwrap();

    let report = weaver().on_module_compiled(&path);
    assert_eq!(report.status, WeaveStatus::Failed);
    assert!(matches!(
        report.warnings.as_slice(),
        [WeaveWarning::ArtifactFailed { .. }]
    ));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_plain_type_without_base_constructor_is_skipped() {
    let mut module = game_module();
    module.add_type(TypeDef::new("game.Base"));
    module.add_type(
        TypeDef::new("game.Orphan")
            .with_base(TypeRef::local("game.Base"))
            .with_interface(listener(TypeRef::local("game.A"))),
    );

    let report = weaver().weave_module(&mut module);

    assert_eq!(report.status, WeaveStatus::Woven);
    assert_eq!(report.woven.len(), 1);
    assert_eq!(report.woven[0].name, "game.Hud");
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, WeaveWarning::BaseConstructorMissing { .. })));
    assert!(module.find_type("game.Orphan").unwrap().methods.is_empty());
}

#[test]
fn test_root_plain_type_gets_empty_hooks() {
    let mut module = game_module();
    module.add_type(TypeDef::new("game.Service").with_interface(listener(TypeRef::local("game.B"))));

    weaver().weave_module(&mut module);

    let ctor = hook(&module, "game.Service", ".ctor");
    assert!(ctor.is_constructor());
    assert_eq!(
        ctor.body,
        vec![
            Instruction::LoadSelf,
            ctor.body[1],
            Instruction::Return,
        ]
    );
    assert_eq!(calls(&module, &ctor.body), vec!["register<game.B>"]);
    let finalize = hook(&module, "game.Service", "finalize");
    assert_eq!(calls(&module, &finalize.body), vec!["unregister<game.B>"]);
}

#[test]
fn test_abstract_types_and_types_without_capabilities_are_untouched() {
    let mut module = game_module();
    module.add_type(
        TypeDef::new("game.Template")
            .with_attributes(type_attrs::ABSTRACT)
            .with_base(TypeRef::external("host", "host.Component"))
            .with_interface(listener(TypeRef::local("game.A"))),
    );
    let template_before = module.find_type("game.Template").unwrap().clone();
    let plain_before = module.find_type("game.A").unwrap().clone();

    let report = weaver().weave_module(&mut module);

    assert_eq!(report.woven.len(), 1);
    assert_eq!(module.find_type("game.Template").unwrap(), &template_before);
    assert_eq!(module.find_type("game.A").unwrap(), &plain_before);
}

#[test]
fn test_unresolved_ancestor_warns_but_keeps_own_capabilities() {
    let mut module = game_module();
    module.add_type(
        TypeDef::new("game.Stray")
            .with_base(TypeRef::external("vendor", "vendor.Widget"))
            .with_interface(listener(TypeRef::local("game.A")))
            .with_method(ctor(vec![Instruction::Return])),
    );

    let report = weaver().weave_module(&mut module);

    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, WeaveWarning::AncestorUnresolved { .. })));
    let stray = hook(&module, "game.Stray", ".ctor");
    assert_eq!(calls(&module, &stray.body), vec!["register<game.A>"]);
}

#[test]
fn test_config_file_drives_names() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("weft.toml");
    fs::write(
        &config_path,
        "targets = [\"Game.wbc\"]\n\n[hooks]\nactivate = \"enable\"\ndeactivate = \"disable\"\n",
    )
    .unwrap();
    let config = WeaverConfig::from_file(&config_path).unwrap();

    let weaver = Weaver::new(config, InMemoryResolver::new().with(weft_module()));
    let path = write_artifact(dir.path(), "Game.wbc", &game_module());
    assert_eq!(weaver.weave_file(&path).unwrap().status, WeaveStatus::Woven);

    let module = Module::decode(&fs::read(&path).unwrap()).unwrap();
    assert!(module.find_type("game.Hud").unwrap().find_method("enable", 0).is_some());
    assert!(module.find_type("game.Hud").unwrap().find_method("on_enable", 0).is_none());
}
