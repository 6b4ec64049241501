//! Patch lifecycle orchestration.
//!
//! The [`PatchLifecycleManager`] turns descriptors into installed patches,
//! drives them through `start`/`stop`/`set_result`/`configure`, and tears
//! everything down at the end of a test.
//!
//! # Stacking
//!
//! Patches are never deduplicated by path. Installing a second patch on a
//! path shadows the first until it stops; `set_result` on an active patch
//! re-installs it, which moves it to the top of its path's stack.
//!
//! # Recovery
//!
//! When the primitive no longer tracks a handle, `stop` treats the
//! substitution as already reverted and `start` installs a fresh one. Both
//! cases are counted in [`LifecycleMetrics`] and never reported as errors.

use crate::application::configure::ConfigureMockApplier;
use crate::application::metrics::LifecycleMetrics;
use crate::application::ports::{Installed, PatchPrimitive};
use crate::application::registry::PatchRegistry;
use crate::application::resolver::TargetResolver;
use crate::application::spec_builder::PatchSpecBuilder;
use crate::domain::configure::ConfigValue;
use crate::domain::error::PatchError;
use crate::domain::metadata::{PatchId, PatchMetadata, PatchState};
use crate::domain::options::PatchWarning;
use crate::domain::path::ResolvedPath;
use crate::domain::stand_in::MockHandle;
use crate::domain::target::TargetDescriptor;
use crate::domain::value::{SideEffect, Value};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// Outcome of a cleanup or teardown pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    /// Active patches stopped
    pub stopped: usize,
    /// Inactive patches discarded
    pub discarded: usize,
    /// Handles removed from the primitive's ledger
    pub reconciled: usize,
}

#[derive(Debug)]
struct Shared {
    registry: Mutex<PatchRegistry>,
    primitive: Arc<dyn PatchPrimitive>,
    resolver: TargetResolver,
    spec_builder: PatchSpecBuilder,
    metrics: LifecycleMetrics,
}

/// Installs and tracks the patches of one test.
///
/// Cloning is cheap; clones share the same registry. The registry lock is
/// never held while the primitive runs, since installing may call user
/// factories.
#[derive(Debug, Clone)]
pub struct PatchLifecycleManager {
    shared: Arc<Shared>,
}

impl PatchLifecycleManager {
    /// Create a manager over a primitive.
    pub fn new(
        primitive: Arc<dyn PatchPrimitive>,
        resolver: TargetResolver,
        spec_builder: PatchSpecBuilder,
        metrics: LifecycleMetrics,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(PatchRegistry::new()),
                primitive,
                resolver,
                spec_builder,
                metrics,
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, PatchRegistry> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The primitive substitutions are installed with.
    pub fn primitive(&self) -> &Arc<dyn PatchPrimitive> {
        &self.shared.primitive
    }

    /// Lifecycle counters.
    pub fn metrics(&self) -> &LifecycleMetrics {
        &self.shared.metrics
    }

    /// Resolve, build and install a patch.
    ///
    /// # Errors
    /// Returns resolution, option and installation errors. Nothing is
    /// registered when an error is returned.
    pub fn patch(&self, descriptor: impl Into<TargetDescriptor>) -> Result<Patch, PatchError> {
        let descriptor = PatchSpecBuilder::route_kwargs(descriptor.into())?;
        let resolution = self.shared.resolver.resolve(&descriptor)?;
        let metadata = self.shared.spec_builder.build(descriptor, resolution)?;
        self.install(metadata)
    }

    /// Install prepared metadata and register it.
    ///
    /// # Errors
    /// Returns the primitive's error, or `InvalidConfiguration` when nested
    /// configuration fails. The substitution is rolled back in both cases.
    pub fn install(&self, mut metadata: PatchMetadata) -> Result<Patch, PatchError> {
        metadata.ensure_alive("install")?;
        self.count_ambiguity(&metadata);

        let installed = self.install_substitution(&metadata)?;
        let handle = installed.handle;
        metadata.mark_installed(installed.handle, installed.substitute)?;

        let path = metadata.path.clone();
        let id = self.registry().insert(metadata);
        debug!(patch = %id, path = %path, handle = %handle, "patch installed");

        Ok(Patch {
            id,
            path,
            manager: self.clone(),
        })
    }

    fn install_substitution(&self, metadata: &PatchMetadata) -> Result<Installed, PatchError> {
        let installed = self
            .shared
            .primitive
            .install(&metadata.path, &metadata.options)?;

        if let Err(err) =
            ConfigureMockApplier::apply_to_substitute(&metadata.options, &installed.substitute)
        {
            self.shared.primitive.forget(installed.handle);
            return Err(err);
        }

        self.shared.metrics.record_installed();
        Ok(installed)
    }

    fn count_ambiguity(&self, metadata: &PatchMetadata) {
        if metadata
            .warnings
            .iter()
            .any(|w| matches!(w, PatchWarning::AmbiguousBehavior { .. }))
        {
            self.shared.metrics.record_ambiguous();
        }
    }

    fn snapshot(&self, id: PatchId) -> Result<PatchMetadata, PatchError> {
        self.registry()
            .get(id)
            .cloned()
            .ok_or(PatchError::UnknownPatch { id })
    }

    fn commit(&self, id: PatchId, metadata: PatchMetadata) -> Result<(), PatchError> {
        let mut registry = self.registry();
        let slot = registry.get_mut(id).ok_or(PatchError::UnknownPatch { id })?;
        *slot = metadata;
        Ok(())
    }

    /// Install a fresh substitution for an existing patch, dropping its
    /// previous handle from the ledger.
    fn reinstall(&self, id: PatchId, mut metadata: PatchMetadata) -> Result<(), PatchError> {
        let installed = self.install_substitution(&metadata)?;
        if let Some(previous) = metadata.patch_handle {
            self.shared.primitive.forget(previous);
        }
        metadata.mark_installed(installed.handle, installed.substitute)?;
        debug!(
            patch = %id,
            path = %metadata.path,
            handle = %installed.handle,
            "patch re-installed"
        );
        self.commit(id, metadata)
    }

    /// Put a stopped patch back in effect.
    ///
    /// Starting an active patch does nothing. The same substitute comes
    /// back unless options changed while the patch was stopped.
    ///
    /// # Errors
    /// Returns `InvalidState` for discarded patches and `UnknownPatch` for
    /// ids that are not registered.
    pub fn start(&self, id: PatchId) -> Result<(), PatchError> {
        let mut metadata = self.snapshot(id)?;
        metadata.ensure_alive("start")?;

        match (metadata.state, metadata.patch_handle) {
            (PatchState::Active, _) => Ok(()),
            (PatchState::Inactive, Some(handle)) if !metadata.needs_reinstall => {
                match self.shared.primitive.start(handle) {
                    Ok(()) => {
                        metadata.mark_started()?;
                        self.shared.metrics.record_started();
                        debug!(
                            patch = %id,
                            path = %metadata.path,
                            handle = %handle,
                            "patch started"
                        );
                        self.commit(id, metadata)
                    }
                    Err(err) if err.is_stale_handle() => {
                        self.shared.metrics.record_stale_recovered();
                        debug!(
                            patch = %id,
                            path = %metadata.path,
                            error = %err,
                            "patch handle lost, installing a fresh substitution"
                        );
                        metadata.patch_handle = None;
                        self.reinstall(id, metadata)
                    }
                    Err(err) => Err(err),
                }
            }
            _ => self.reinstall(id, metadata),
        }
    }

    /// Revert an active patch. Stopping an inactive patch does nothing.
    ///
    /// # Errors
    /// Returns `InvalidState` for discarded patches, `UnknownPatch` for
    /// unregistered ids, and primitive errors other than lost handles.
    pub fn stop(&self, id: PatchId) -> Result<(), PatchError> {
        let mut metadata = self.snapshot(id)?;
        metadata.ensure_alive("stop")?;
        if metadata.state != PatchState::Active {
            return Ok(());
        }

        if let Some(handle) = metadata.patch_handle {
            match self.shared.primitive.stop(handle) {
                Ok(()) => {}
                Err(err) if err.is_stale_handle() => {
                    self.shared.metrics.record_stale_recovered();
                    debug!(
                        patch = %id,
                        path = %metadata.path,
                        error = %err,
                        "patch handle lost, treating as reverted"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        metadata.mark_stopped()?;
        self.shared.metrics.record_stopped();
        debug!(patch = %id, path = %metadata.path, "patch stopped");
        self.commit(id, metadata)
    }

    /// Replace the return value and side effect of a patch.
    ///
    /// An active patch is re-installed at once. An inactive one picks the new
    /// behavior up on its next start.
    ///
    /// # Errors
    /// Returns `InvalidState` for discarded patches and installation errors;
    /// on error the previous substitution stays in effect.
    pub fn set_result(
        &self,
        id: PatchId,
        return_value: Option<Value>,
        side_effect: Option<SideEffect>,
    ) -> Result<(), PatchError> {
        let mut metadata = self.snapshot(id)?;
        metadata.ensure_alive("set_result")?;

        self.shared
            .spec_builder
            .refresh(&mut metadata, return_value, side_effect);
        self.shared.metrics.record_refreshed();
        self.count_ambiguity(&metadata);

        match metadata.state {
            // The new substitution is installed before the old handle is
            // forgotten, so a failure leaves the previous one in effect.
            PatchState::Active => self.reinstall(id, metadata),
            _ => {
                metadata.needs_reinstall = true;
                self.commit(id, metadata)
            }
        }
    }

    /// Add a nested configuration entry to a patch.
    ///
    /// The entry is applied to the current substitute immediately and kept in
    /// the options so re-installs replay it.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` when the key is malformed or cannot be
    /// applied; the patch is left unchanged.
    pub fn configure(
        &self,
        id: PatchId,
        key: &str,
        value: impl Into<ConfigValue>,
    ) -> Result<(), PatchError> {
        let mut metadata = self.snapshot(id)?;
        metadata.ensure_alive("configure")?;
        metadata.options.configure.push(key, value)?;

        if metadata.options.new.is_some() {
            let warning = PatchWarning::ConfigurationIgnored {
                path: metadata.path.to_string(),
            };
            if !metadata.warnings.contains(&warning) {
                warn!(path = %metadata.path, "{}", warning);
                metadata.warnings.push(warning);
            }
        } else if let Some(Value::Mock(handle)) = &metadata.substitute {
            if let Some(command) = metadata.options.configure.commands().last() {
                ConfigureMockApplier::apply_command(command, handle)?;
            }
        }

        self.commit(id, metadata)
    }

    /// Discard every inactive patch and drop its handle from the primitive's
    /// ledger when still tracked.
    pub fn cleanup_all(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let inactive = self.registry().ids_in_state(PatchState::Inactive);

        for id in inactive {
            let Ok(mut metadata) = self.snapshot(id) else {
                continue;
            };
            if let Some(handle) = metadata.patch_handle {
                let primitive = &self.shared.primitive;
                if primitive.is_tracked(handle) && primitive.forget(handle) {
                    report.reconciled += 1;
                    self.shared.metrics.record_reconciled();
                }
            }
            if metadata.mark_discarded().is_ok() && self.commit(id, metadata).is_ok() {
                report.discarded += 1;
            }
        }

        debug!(
            discarded = report.discarded,
            reconciled = report.reconciled,
            "inactive patches cleaned up"
        );
        report
    }

    /// Stop every active patch newest first, clean up, and clear the
    /// registry.
    ///
    /// # Errors
    /// Every patch is attempted; the first stop error is returned after the
    /// registry was cleared.
    pub fn teardown(&self) -> Result<CleanupReport, PatchError> {
        let active = self.registry().ids_in_state(PatchState::Active);
        let mut first_error = None;
        let mut stopped = 0;

        for id in active.into_iter().rev() {
            match self.stop(id) {
                Ok(()) => stopped += 1,
                Err(err) => {
                    error!(patch = %id, error = %err, "failed to stop patch during teardown");
                    first_error.get_or_insert(err);
                }
            }
        }

        let mut report = self.cleanup_all();
        report.stopped = stopped;
        self.registry().clear();

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// A copy of a patch's record.
    pub fn get(&self, id: PatchId) -> Option<PatchMetadata> {
        self.registry().get(id).cloned()
    }

    /// The most recent patch registered under `name`.
    pub fn find(&self, name: &str) -> Option<Patch> {
        let registry = self.registry();
        let id = registry.find_by_name(name)?;
        let path = registry.get(id)?.path.clone();
        Some(Patch {
            id,
            path,
            manager: self.clone(),
        })
    }

    /// Every registered patch, oldest first.
    pub fn patches(&self) -> Vec<Patch> {
        self.registry()
            .iter()
            .map(|(id, metadata)| Patch {
                id,
                path: metadata.path.clone(),
                manager: self.clone(),
            })
            .collect()
    }

    /// Active patches stacked on `path`, oldest first.
    pub fn active_on(&self, path: &str) -> Vec<PatchId> {
        self.registry().active_on(path)
    }
}

/// Handle to a registered patch.
#[derive(Debug, Clone)]
pub struct Patch {
    id: PatchId,
    path: ResolvedPath,
    manager: PatchLifecycleManager,
}

impl Patch {
    /// Registry id.
    pub fn id(&self) -> PatchId {
        self.id
    }

    /// Where the substitution is installed.
    pub fn path(&self) -> &ResolvedPath {
        &self.path
    }

    /// A copy of the current record.
    ///
    /// # Errors
    /// Returns `UnknownPatch` once the registry was torn down.
    pub fn metadata(&self) -> Result<PatchMetadata, PatchError> {
        self.manager
            .get(self.id)
            .ok_or(PatchError::UnknownPatch { id: self.id })
    }

    /// Current state. Patches removed by teardown report `Discarded`.
    pub fn state(&self) -> PatchState {
        self.manager
            .get(self.id)
            .map_or(PatchState::Discarded, |metadata| metadata.state)
    }

    /// Whether the substitution is in effect.
    pub fn is_active(&self) -> bool {
        self.state() == PatchState::Active
    }

    /// The installed substitute.
    pub fn substitute(&self) -> Option<Value> {
        self.manager.get(self.id).and_then(|metadata| metadata.substitute)
    }

    /// The installed substitute when it is a generated stand-in.
    pub fn mock(&self) -> Option<MockHandle> {
        match self.substitute() {
            Some(Value::Mock(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Warnings recorded while building the patch.
    pub fn warnings(&self) -> Vec<PatchWarning> {
        self.manager
            .get(self.id)
            .map(|metadata| metadata.warnings)
            .unwrap_or_default()
    }

    /// See [`PatchLifecycleManager::start`].
    ///
    /// # Errors
    /// Propagates the manager's error.
    pub fn start(&self) -> Result<(), PatchError> {
        self.manager.start(self.id)
    }

    /// See [`PatchLifecycleManager::stop`].
    ///
    /// # Errors
    /// Propagates the manager's error.
    pub fn stop(&self) -> Result<(), PatchError> {
        self.manager.stop(self.id)
    }

    /// See [`PatchLifecycleManager::set_result`].
    ///
    /// # Errors
    /// Propagates the manager's error.
    pub fn set_result(
        &self,
        return_value: Option<Value>,
        side_effect: Option<SideEffect>,
    ) -> Result<(), PatchError> {
        self.manager.set_result(self.id, return_value, side_effect)
    }

    /// Shorthand for `set_result(Some(value), None)`.
    ///
    /// # Errors
    /// Propagates the manager's error.
    pub fn set_return_value(&self, value: impl Into<Value>) -> Result<(), PatchError> {
        self.set_result(Some(value.into()), None)
    }

    /// See [`PatchLifecycleManager::configure`].
    ///
    /// # Errors
    /// Propagates the manager's error.
    pub fn configure(&self, key: &str, value: impl Into<ConfigValue>) -> Result<(), PatchError> {
        self.manager.configure(self.id, key, value)
    }

    /// Make sure the patch is active and stop it when the guard drops.
    ///
    /// # Errors
    /// Returns the error of starting the patch.
    pub fn scoped(self) -> Result<ScopedPatch, PatchError> {
        self.start()?;
        Ok(ScopedPatch { patch: self })
    }
}

/// Guard that stops its patch on drop.
#[derive(Debug)]
pub struct ScopedPatch {
    patch: Patch,
}

impl Deref for ScopedPatch {
    type Target = Patch;

    fn deref(&self) -> &Patch {
        &self.patch
    }
}

impl Drop for ScopedPatch {
    fn drop(&mut self) {
        match self.patch.stop() {
            Ok(()) => {}
            // Already removed by teardown.
            Err(PatchError::UnknownPatch { .. } | PatchError::InvalidState { .. }) => {}
            Err(err) => error!(patch = %self.patch.id, error = %err, "failed to stop scoped patch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stand_in::StandIn;
    use crate::domain::target::Target;
    use crate::domain::value::Raised;
    use crate::infrastructure::mocks::{MockCaptureLayer, PrimitiveCall, RecordingPatcher};
    use crate::infrastructure::symbols::SymbolRegistry;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    struct Fixture {
        symbols: Arc<SymbolRegistry>,
        primitive: Arc<RecordingPatcher>,
        manager: PatchLifecycleManager,
    }

    fn fixture() -> Fixture {
        let symbols = Arc::new(SymbolRegistry::new());
        symbols
            .register_class("app.Hero")
            .unwrap()
            .register_routine("app.Hero.run", |_| Ok(Value::from("original")))
            .unwrap()
            .register_routine("app.Hero.fly", |_| Ok(Value::from("flying")))
            .unwrap()
            .register_attribute("app.Hero.level", 1)
            .unwrap();
        let primitive = Arc::new(RecordingPatcher::new(Arc::clone(&symbols)));
        let manager = PatchLifecycleManager::new(
            primitive.clone(),
            TargetResolver::new(symbols.clone()),
            PatchSpecBuilder::new(),
            LifecycleMetrics::new(),
        );
        Fixture {
            symbols,
            primitive,
            manager,
        }
    }

    fn returning(path: &str, value: &str) -> TargetDescriptor {
        TargetDescriptor::new(Target::path(path)).return_value(value)
    }

    fn run(fx: &Fixture) -> Value {
        fx.symbols.call("app.Hero.run", &[]).unwrap()
    }

    fn handle_of(patch: &Patch) -> crate::domain::metadata::PatchHandle {
        patch.metadata().unwrap().patch_handle.unwrap()
    }

    #[test]
    fn test_stop_start_keeps_substitute() {
        let fx = fixture();
        let patch = fx.manager.patch(returning("app.Hero.run", "patched")).unwrap();
        assert_eq!(patch.state(), PatchState::Active);
        assert_eq!(run(&fx), Value::from("patched"));
        let before = patch.mock().unwrap();

        patch.stop().unwrap();
        assert_eq!(patch.state(), PatchState::Inactive);
        assert_eq!(run(&fx), Value::from("original"));
        // Stopping twice is a no-op.
        patch.stop().unwrap();

        patch.start().unwrap();
        assert_eq!(run(&fx), Value::from("patched"));
        assert_eq!(patch.mock().unwrap(), before);

        let metrics = fx.manager.metrics();
        assert_eq!(metrics.installed(), 1);
        assert_eq!(metrics.started(), 1);
        assert_eq!(metrics.stopped(), 1);
    }

    #[test]
    fn test_patches_on_same_path_stack() {
        let fx = fixture();
        let first = fx.manager.patch(returning("app.Hero.run", "a")).unwrap();
        let second = fx.manager.patch(returning("app.Hero.run", "b")).unwrap();
        assert_eq!(run(&fx), Value::from("b"));
        assert_eq!(fx.manager.active_on("app.Hero.run"), vec![first.id(), second.id()]);

        // Stopping the shadowed patch leaves the newest in effect.
        first.stop().unwrap();
        assert_eq!(run(&fx), Value::from("b"));
        second.stop().unwrap();
        assert_eq!(run(&fx), Value::from("original"));
    }

    #[test]
    fn test_set_result_reinstalls_on_top() {
        let fx = fixture();
        let first = fx.manager.patch(returning("app.Hero.run", "a")).unwrap();
        let _second = fx.manager.patch(returning("app.Hero.run", "b")).unwrap();
        let old_handle = handle_of(&first);

        first.set_return_value("c").unwrap();
        assert_eq!(run(&fx), Value::from("c"));
        assert_ne!(handle_of(&first), old_handle);
        assert!(fx.primitive.calls().contains(&PrimitiveCall::Forget(old_handle)));
        assert!(!fx.primitive.is_tracked(old_handle));
        assert_eq!(fx.manager.metrics().refreshed(), 1);
    }

    #[test]
    fn test_set_result_on_stopped_patch_applies_at_start() {
        let fx = fixture();
        let patch = fx.manager.patch(returning("app.Hero.run", "early")).unwrap();
        patch.stop().unwrap();

        patch.set_return_value("late").unwrap();
        assert_eq!(run(&fx), Value::from("original"));
        assert!(patch.metadata().unwrap().needs_reinstall);

        patch.start().unwrap();
        assert_eq!(run(&fx), Value::from("late"));
        assert_eq!(fx.primitive.ledger().len(), 1);
    }

    #[test]
    fn test_lost_handle_is_recovered() {
        let fx = fixture();
        let patch = fx.manager.patch(returning("app.Hero.run", "patched")).unwrap();
        assert!(fx.primitive.forget(handle_of(&patch)));

        patch.stop().unwrap();
        assert_eq!(patch.state(), PatchState::Inactive);
        assert_eq!(fx.manager.metrics().stale_recovered(), 1);

        patch.start().unwrap();
        assert_eq!(run(&fx), Value::from("patched"));
        assert_eq!(fx.manager.metrics().stale_recovered(), 2);
        assert!(fx.primitive.is_tracked(handle_of(&patch)));
    }

    #[test]
    fn test_cleanup_all_reconciles_ledger() {
        let fx = fixture();
        let stopped = fx.manager.patch(returning("app.Hero.run", "a")).unwrap();
        let active = fx.manager.patch(returning("app.Hero.fly", "b")).unwrap();
        stopped.stop().unwrap();

        let report = fx.manager.cleanup_all();
        assert_eq!(report.discarded, 1);
        assert_eq!(report.reconciled, 1);
        assert_eq!(stopped.state(), PatchState::Discarded);
        assert_eq!(active.state(), PatchState::Active);
        assert_eq!(fx.primitive.ledger(), vec![handle_of(&active)]);

        assert!(matches!(
            stopped.start(),
            Err(PatchError::InvalidState {
                state: PatchState::Discarded,
                ..
            })
        ));
        assert!(fx.primitive.stop_all().is_ok());
    }

    #[test]
    fn test_teardown_stops_newest_first() {
        let fx = fixture();
        let first = fx.manager.patch(returning("app.Hero.run", "a")).unwrap();
        let second = fx.manager.patch(returning("app.Hero.fly", "b")).unwrap();
        let (h1, h2) = (handle_of(&first), handle_of(&second));
        fx.primitive.clear();

        let report = fx.manager.teardown().unwrap();
        assert_eq!(report.stopped, 2);
        assert_eq!(report.discarded, 2);
        assert_eq!(report.reconciled, 2);

        let calls = fx.primitive.calls();
        assert_eq!(&calls[..2], &[PrimitiveCall::Stop(h2), PrimitiveCall::Stop(h1)]);
        assert!(fx.manager.patches().is_empty());
        assert_eq!(first.state(), PatchState::Discarded);
        assert_eq!(run(&fx), Value::from("original"));
    }

    #[test]
    fn test_teardown_reports_first_error_and_continues() {
        let fx = fixture();
        fx.manager.patch(returning("app.Hero.run", "a")).unwrap();
        fx.manager.patch(returning("app.Hero.fly", "b")).unwrap();
        let failure = PatchError::SymbolNotFound {
            path: "app.Hero.fly".to_string(),
        };
        // Teardown stops newest first, so the fly patch fails.
        fx.primitive.fail_next_stop(failure.clone());

        let err = fx.manager.teardown().unwrap_err();
        assert_eq!(err, failure);
        assert!(fx.manager.patches().is_empty());
        assert_eq!(run(&fx), Value::from("original"));

        // The primitive still holds the failed substitution.
        assert!(fx.symbols.is_patched("app.Hero.fly"));
        fx.primitive.stop_all().unwrap();
        assert!(!fx.symbols.is_patched("app.Hero.fly"));
    }

    #[test]
    fn test_configure_at_runtime_survives_reinstall() {
        let fx = fixture();
        let hero = fx.manager.patch(Target::class_at("app", "Hero")).unwrap();
        hero.configure("return_value.name", "Robin").unwrap();

        let name = |fx: &Fixture| {
            let instance = fx.symbols.call("app.Hero", &[]).unwrap();
            instance.as_mock().unwrap().attr("name").unwrap()
        };
        assert_eq!(name(&fx), Value::from("Robin"));

        hero.set_result(None, None).unwrap();
        assert_eq!(name(&fx), Value::from("Robin"));
    }

    #[test]
    fn test_configure_with_new_value_warns() {
        let fx = fixture();
        let level = fx
            .manager
            .patch(TargetDescriptor::new(Target::path("app.Hero.level")).new_value(5))
            .unwrap();
        level.configure("name", "ignored").unwrap();

        assert_eq!(
            level.warnings(),
            vec![PatchWarning::ConfigurationIgnored {
                path: "app.Hero.level".to_string()
            }]
        );
        assert_eq!(fx.symbols.get("app.Hero.level"), Ok(Value::Int(5)));
    }

    #[test]
    fn test_bad_configuration_rolls_back_install() {
        let fx = fixture();
        let descriptor = TargetDescriptor::new(Target::path("app.Hero.run"))
            .new_callable(|| StandIn::new("strict").with_spec(["allowed"], true))
            .configure("forbidden", 1);

        let err = fx.manager.patch(descriptor).unwrap_err();
        assert!(
            matches!(err, PatchError::InvalidConfiguration { ref key, .. } if key == "forbidden")
        );
        assert!(fx.primitive.ledger().is_empty());
        assert!(fx.manager.patches().is_empty());
        assert_eq!(run(&fx), Value::from("original"));
    }

    #[test]
    fn test_failed_install_registers_nothing() {
        let fx = fixture();
        fx.primitive.fail_next_install();
        let err = fx.manager.patch(returning("app.Hero.run", "x")).unwrap_err();
        assert!(matches!(err, PatchError::SymbolNotFound { .. }));
        assert!(fx.manager.patches().is_empty());
        assert_eq!(fx.manager.metrics().installed(), 0);
    }

    #[test]
    fn test_scoped_patch_stops_on_drop() {
        let fx = fixture();
        let id = {
            let guard = fx
                .manager
                .patch(returning("app.Hero.run", "scoped"))
                .unwrap()
                .scoped()
                .unwrap();
            assert_eq!(run(&fx), Value::from("scoped"));
            guard.id()
        };
        assert_eq!(run(&fx), Value::from("original"));
        assert_eq!(fx.manager.get(id).unwrap().state, PatchState::Inactive);
    }

    #[test]
    fn test_find_latest_by_name() {
        let fx = fixture();
        fx.manager
            .patch(returning("app.Hero.run", "a").named("hero"))
            .unwrap();
        let latest = fx
            .manager
            .patch(returning("app.Hero.fly", "b").named("hero"))
            .unwrap();
        assert_eq!(fx.manager.find("hero").unwrap().id(), latest.id());
        assert!(fx.manager.find("villain").is_none());
    }

    #[test]
    fn test_ambiguous_behavior_is_logged_and_counted() {
        let fx = fixture();
        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        let patch = tracing::subscriber::with_default(subscriber, || {
            fx.manager
                .patch(returning("app.Hero.run", "x").side_effect(Raised::error("boom")))
                .unwrap()
        });

        let warnings = capture.at_level(Level::WARN);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field("path"), Some("app.Hero.run"));
        assert_eq!(fx.manager.metrics().ambiguous_warnings(), 1);
        assert_eq!(patch.warnings().len(), 1);
        // The side effect wins.
        assert!(fx.symbols.call("app.Hero.run", &[]).is_err());
    }
}
