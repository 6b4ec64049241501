//! Nested configuration of generated stand-ins.

use mocker_builder::{
    CallError, Mocker, PatchError, PatchWarning, Raised, SideEffect, SymbolRegistry, Target,
    TargetDescriptor, Value,
};
use std::sync::Arc;

fn setup() -> (Arc<SymbolRegistry>, Mocker) {
    let symbols = Arc::new(SymbolRegistry::new());
    symbols
        .register_routine("app.factory", |_| Ok(Value::None))
        .unwrap()
        .register_attribute("app.settings", "prod")
        .unwrap();
    let mocker = Mocker::new(Arc::clone(&symbols));
    (symbols, mocker)
}

#[test]
fn test_return_value_chain() {
    let (symbols, mocker) = setup();
    let patch = mocker
        .patch(
            TargetDescriptor::new(Target::path("app.factory"))
                .kwarg("return_value.foo.return_value", "bar"),
        )
        .unwrap();

    let product = symbols.call("app.factory", &[]).unwrap();
    let product = product.as_mock().unwrap();
    assert_eq!(product.call_method("foo", &[]), Ok(Value::from("bar")));

    // The same graph is reachable from the substitute.
    let substitute = patch.mock().unwrap();
    let via_substitute = substitute.return_value();
    assert_eq!(via_substitute.as_mock(), Some(product));
}

#[test]
fn test_side_effect_deep_in_graph() {
    let (symbols, mocker) = setup();
    mocker
        .patch(
            TargetDescriptor::new(Target::path("app.factory"))
                .configure(
                    "return_value.engine.start.side_effect",
                    SideEffect::raise(Raised::error("no fuel")),
                ),
        )
        .unwrap();

    let car = symbols.call("app.factory", &[]).unwrap();
    let engine = car.as_mock().unwrap().attr("engine").unwrap();
    let result = engine.as_mock().unwrap().call_method("start", &[]);
    assert_eq!(result, Err(Raised::error("no fuel")));
}

#[test]
fn test_attributes_and_sequences() {
    let (symbols, mocker) = setup();
    mocker
        .patch(
            TargetDescriptor::new(Target::path("app.factory"))
                .configure("name", "Factory")
                .configure("side_effect", Value::from(vec![1, 2])),
        )
        .unwrap();

    assert_eq!(symbols.call("app.factory", &[]), Ok(Value::from(1)));
    assert_eq!(symbols.call("app.factory", &[]), Ok(Value::from(2)));
    assert!(matches!(
        symbols.call("app.factory", &[]),
        Err(CallError::Raised(_))
    ));
}

#[test]
fn test_malformed_key_installs_nothing() {
    let (symbols, mocker) = setup();
    for key in ["side_effect.x", "return_value..foo", "return_value.1x"] {
        let err = mocker
            .patch(TargetDescriptor::new(Target::path("app.factory")).configure(key, 1))
            .unwrap_err();
        assert!(matches!(err, PatchError::InvalidConfiguration { .. }), "{key}");
    }
    assert!(!symbols.is_patched("app.factory"));
    assert!(mocker.manager().patches().is_empty());
}

#[test]
fn test_side_effect_value_needs_side_effect_key() {
    let (_, mocker) = setup();
    let err = mocker
        .patch(
            TargetDescriptor::new(Target::path("app.factory"))
                .configure("return_value", SideEffect::raise(Raised::error("x"))),
        )
        .unwrap_err();
    assert!(matches!(err, PatchError::InvalidConfiguration { .. }));
}

#[test]
fn test_new_value_ignores_configuration() {
    let (symbols, mocker) = setup();
    let patch = mocker
        .patch(
            TargetDescriptor::new(Target::path("app.settings"))
                .new_value("test")
                .configure("return_value.debug", true),
        )
        .unwrap();

    assert_eq!(symbols.get("app.settings"), Ok(Value::from("test")));
    assert_eq!(
        patch.warnings(),
        vec![PatchWarning::ConfigurationIgnored {
            path: "app.settings".to_string()
        }]
    );
}

#[test]
fn test_runtime_configure_is_replayed_after_restart() {
    let (symbols, mocker) = setup();
    let patch = mocker.patch(Target::path("app.factory")).unwrap();
    patch.configure("return_value.size", 3).unwrap();

    patch.stop().unwrap();
    patch.set_result(None, None).unwrap();
    patch.start().unwrap();

    let product = symbols.call("app.factory", &[]).unwrap();
    assert_eq!(product.as_mock().unwrap().attr("size"), Ok(Value::Int(3)));
}
