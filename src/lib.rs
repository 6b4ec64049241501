//! # mocker-builder
//!
//! Target resolution and patch lifecycle management for test doubles.
//!
//! Code that wants to be replaceable in tests calls its collaborators through
//! a [`SymbolRegistry`]. A test describes what to replace with a
//! [`TargetDescriptor`], and a [`Mocker`] fixture resolves the description to
//! a dotted path, builds the substitute, installs it, and reverts everything
//! when the test ends.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use mocker_builder::{Mocker, SymbolRegistry, Target, TargetDescriptor, Value};
//!
//! let symbols = Arc::new(SymbolRegistry::new());
//! symbols
//!     .register_class("app.heroes.Batman")
//!     .unwrap()
//!     .register_routine("app.heroes.Batman.eat", |_| Ok(Value::from("fruits")))
//!     .unwrap();
//!
//! let mocker = Mocker::new(Arc::clone(&symbols));
//! let eat = mocker
//!     .patch(
//!         TargetDescriptor::new(Target::class_at("app.heroes", "Batman"))
//!             .method("eat")
//!             .return_value("burger"),
//!     )
//!     .unwrap();
//!
//! assert_eq!(symbols.call("app.heroes.Batman.eat", &[]), Ok(Value::from("burger")));
//! assert!(eat.mock().unwrap().called());
//!
//! eat.stop().unwrap();
//! assert_eq!(symbols.call("app.heroes.Batman.eat", &[]), Ok(Value::from("fruits")));
//! ```
//!
//! ## Targets
//!
//! A [`Target`] names the thing being replaced:
//!
//! - [`Target::class`] and [`Target::class_at`]: a type, or one of its members
//!   when combined with `method` or `attribute`
//! - [`Target::module`]: a module; a member is required to patch into it
//! - [`Target::routine`] and [`Target::routine_at`]: a free function or a
//!   method; methods patched with a member are redirected to that member of
//!   the owning type
//! - [`Target::instance`]: the type of a value
//! - [`Target::path`]: a dotted path given verbatim
//!
//! Resolution rejects `method` together with `attribute`, and missing
//! symbols unless `create` is set.
//!
//! ## Behavior Options
//!
//! ```rust
//! use std::sync::Arc;
//! use mocker_builder::{
//!     Mocker, Raised, SideEffect, SymbolRegistry, Target, TargetDescriptor, Value,
//! };
//!
//! let symbols = Arc::new(SymbolRegistry::new());
//! symbols.register_routine("app.load", |_| Ok(Value::None)).unwrap();
//! let mocker = Mocker::new(Arc::clone(&symbols));
//!
//! mocker
//!     .patch(TargetDescriptor::new(Target::path("app.load")).side_effect(SideEffect::sequence([
//!         Value::from(1),
//!         Value::from(2),
//!     ])))
//!     .unwrap();
//!
//! assert_eq!(symbols.call("app.load", &[]), Ok(Value::from(1)));
//! assert_eq!(symbols.call("app.load", &[]), Ok(Value::from(2)));
//! // An exhausted sequence raises.
//! assert!(symbols.call("app.load", &[]).is_err());
//! ```
//!
//! Setting both a return value and a side effect records a
//! [`PatchWarning::AmbiguousBehavior`]; the side effect wins when the
//! stand-in is called. Return values of `__init__` and `new` are never
//! configured (see [`MockerBuilder::with_bypass_names`]).
//!
//! ## Async Targets
//!
//! Async routines registered with [`SymbolRegistry::register_async_routine`]
//! are patched with awaitable results: the configured return value, side
//! effect values and raised errors come back as [`Deferred`] values that
//! resolve when awaited.
//!
//! ## Nested Configuration
//!
//! Keys like `return_value.fly.side_effect` configure the stand-in graph
//! behind a patch:
//!
//! ```rust
//! use std::sync::Arc;
//! use mocker_builder::{Mocker, SymbolRegistry, Target, TargetDescriptor, Value};
//!
//! let symbols = Arc::new(SymbolRegistry::new());
//! symbols.register_class("app.Hero").unwrap();
//! let mocker = Mocker::new(Arc::clone(&symbols));
//!
//! let hero = mocker
//!     .patch(
//!         TargetDescriptor::new(Target::class_at("app", "Hero"))
//!             .configure("return_value.name", "Robin"),
//!     )
//!     .unwrap();
//!
//! let instance = symbols.call("app.Hero", &[]).unwrap();
//! let name = instance.as_mock().unwrap().attr("name").unwrap();
//! assert_eq!(name, Value::from("Robin"));
//! # drop(hero);
//! ```
//!
//! ## Lifecycle
//!
//! Every patch moves through `built`, `active`, `inactive` and `discarded`.
//! [`Patch::stop`] and [`Patch::start`] toggle the substitution and keep the
//! same substitute; [`Patch::set_result`] replaces the behavior and
//! re-installs an active patch. Patches on the same path stack: the newest
//! active one is in effect.
//!
//! [`Mocker::teardown`], or dropping the fixture, stops active patches newest
//! first, discards inactive ones and empties the primitive's ledger.
//!
//! ## Observability
//!
//! Lifecycle transitions are logged with `tracing` at `debug` level,
//! resolution and primitive calls at `trace`, warnings at `warn`, and
//! teardown failures at `error`. Counters are available through
//! [`Mocker::metrics`].

// Domain layer - pure types
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - registry, primitive and fixture
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    configure::{ConfigValue, ConfigureCommand, ConfigurePlan, Segment},
    error::PatchError,
    metadata::{PatchHandle, PatchId, PatchMetadata, PatchState},
    options::{NewCallable, PatchOptions, PatchWarning},
    path::ResolvedPath,
    stand_in::{MockHandle, StandIn},
    target::{SymbolRef, Target, TargetDescriptor},
    value::{Deferred, Effect, EffectFn, Raised, SideEffect, Value},
};

pub use application::{
    configure::ConfigureMockApplier,
    lifecycle::{CleanupReport, Patch, PatchLifecycleManager, ScopedPatch},
    metrics::{LifecycleMetrics, MetricsSnapshot},
    ports::{Installed, PatchPrimitive, SymbolKind, SymbolTable},
    resolver::{Resolution, TargetResolver},
    spec_builder::{PatchSpecBuilder, DEFAULT_BYPASS_NAMES},
};

pub use infrastructure::{
    fixture::{BuildError, Mocker, MockerBuilder},
    patcher::SlotPatcher,
    symbols::{CallError, Routine, SymbolRegistry},
};
